//! Provider boundary for resource listing and usage aggregation.
//!
//! This module defines **only** the provider traits and their error type.
//! No pagination loop, no sorting, no record building belong here.
//!
//! All instants passed across these traits are zone-naive UTC.

use acct_schemas::{
    EnergyReading, PublicIpAllocation, ResourceSnapshot, UsageAggregateEntry, VolumeSnapshot,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a provider implementation may return.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Network or transport failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The upstream API returned an application-level error.
    #[error("provider api error{}: {message}", fmt_code(.code))]
    Api { code: Option<i64>, message: String },
    /// A response payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested resource does not exist (or its metadata was purged).
    #[error("resource '{id}' not found")]
    NotFound { id: String },
    /// A full page came back whose last id equals the cursor that requested it.
    #[error("pagination stalled at cursor '{cursor}'")]
    StalledCursor { cursor: String },
}

fn fmt_code(code: &Option<i64>) -> String {
    match code {
        Some(c) => format!(" code={c}"),
        None => String::new(),
    }
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

/// Compute-resource listing scoped to one subject.
///
/// Object safe: collectors and the reconciler hold `&dyn ListingProvider`.
#[async_trait]
pub trait ListingProvider: Send + Sync {
    /// Human-readable name identifying this provider (e.g. `"file"`).
    fn name(&self) -> &'static str;

    /// One page of resources whose lifecycle changed at or after `since`.
    ///
    /// `cursor` is the id of the last item of the previous page (`None` for
    /// the first page). Pages may come back in any creation order.
    async fn list_changed(
        &self,
        since: NaiveDateTime,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ResourceSnapshot>, ProviderError>;

    /// A single resource by id, or [`ProviderError::NotFound`].
    async fn get_by_id(&self, id: &str) -> Result<ResourceSnapshot, ProviderError>;
}

/// Usage aggregates computed by the provider.
#[async_trait]
pub trait UsageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Usage totals accumulated over `[from, to)` for every resource of
    /// `subject` that had any usage in that range.
    async fn get_usage(
        &self,
        subject: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<UsageAggregateEntry>, ProviderError>;
}

/// Block-storage volume listing scoped to one subject.
#[async_trait]
pub trait VolumeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Same paging contract as [`ListingProvider::list_changed`].
    async fn list_changed_volumes(
        &self,
        since: NaiveDateTime,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VolumeSnapshot>, ProviderError>;
}

/// Per-resource energy measurements.
#[async_trait]
pub trait EnergyProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Energy drawn over `[from, to)` by each resource of `subject` that has
    /// any measurement in that range.
    async fn get_energy(
        &self,
        subject: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<EnergyReading>, ProviderError>;
}

/// Public addresses currently allocated to a subject. Unpaged.
#[async_trait]
pub trait PublicIpProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_public_ips(&self, subject: &str)
        -> Result<Vec<PublicIpAllocation>, ProviderError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
