//! Change-set collection and usage aggregation.
//!
//! Collectors drain cursor-paginated listings until a short page arrives,
//! then de-duplicate by id and sort by `(created_at, id)`. Sorting happens
//! after collection, so providers may return pages in any order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
use std::num::NonZeroUsize;

use acct_schemas::{
    EnergyReading, PublicIpAllocation, ResourceSnapshot, TimeWindow, UsageAggregateEntry,
    VolumeSnapshot,
};
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::provider::{
    EnergyProvider, ListingProvider, ProviderError, PublicIpProvider, UsageProvider,
    VolumeProvider,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A listing call failed. Fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("change-set collection via '{provider}' failed: {source}")]
pub struct CollectionFailedError {
    pub provider: String,
    #[source]
    pub source: ProviderError,
}

/// The usage query failed. Fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("usage aggregation via '{provider}' for subject '{subject}' failed: {source}")]
pub struct AggregationFailedError {
    pub provider: String,
    pub subject: String,
    #[source]
    pub source: ProviderError,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Drain a marker-paginated listing. Stops on the first page shorter than
/// `limit`; the cursor for the next page is the id of the last item.
async fn drain_pages<T, F, Fut>(
    limit: NonZeroUsize,
    id_of: fn(&T) -> &str,
    mut fetch: F,
) -> Result<(Vec<T>, usize), ProviderError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ProviderError>>,
{
    let mut out: Vec<T> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch(cursor.clone()).await?;
        pages += 1;

        let full = page.len() >= limit.get();
        let last_id = page.last().map(|item| id_of(item).to_string());
        out.extend(page);

        if !full {
            break;
        }
        match last_id {
            Some(id) if cursor.as_deref() != Some(id.as_str()) => cursor = Some(id),
            Some(id) => return Err(ProviderError::StalledCursor { cursor: id }),
            None => break,
        }
    }

    Ok((out, pages))
}

/// Keep the last occurrence of each id, then sort with `cmp`.
fn dedup_and_sort<T>(items: Vec<T>, id_of: fn(&T) -> &str, cmp: fn(&T, &T) -> Ordering) -> Vec<T> {
    let mut by_id: BTreeMap<String, T> = BTreeMap::new();
    for item in items {
        by_id.insert(id_of(&item).to_string(), item);
    }
    let mut out: Vec<T> = by_id.into_values().collect();
    out.sort_by(cmp);
    out
}

fn snapshot_id(s: &ResourceSnapshot) -> &str {
    &s.id
}

fn volume_id(v: &VolumeSnapshot) -> &str {
    &v.id
}

fn by_snapshot_order(a: &ResourceSnapshot, b: &ResourceSnapshot) -> Ordering {
    a.order_key().cmp(&b.order_key())
}

fn by_volume_order(a: &VolumeSnapshot, b: &VolumeSnapshot) -> Ordering {
    a.order_key().cmp(&b.order_key())
}

fn allocation_id(a: &PublicIpAllocation) -> &str {
    &a.id
}

fn by_allocation_order(a: &PublicIpAllocation, b: &PublicIpAllocation) -> Ordering {
    a.order_key().cmp(&b.order_key())
}

// ---------------------------------------------------------------------------
// ChangeSetCollector
// ---------------------------------------------------------------------------

/// Collects every compute resource whose lifecycle changed since `from`.
pub struct ChangeSetCollector<'a> {
    provider: &'a dyn ListingProvider,
    page_limit: NonZeroUsize,
}

impl<'a> ChangeSetCollector<'a> {
    pub fn new(provider: &'a dyn ListingProvider, page_limit: NonZeroUsize) -> Self {
        Self {
            provider,
            page_limit,
        }
    }

    /// Snapshots sorted ascending by `(created_at, id)`.
    pub async fn collect(
        &self,
        from: NaiveDateTime,
    ) -> Result<Vec<ResourceSnapshot>, CollectionFailedError> {
        let provider = self.provider;
        let limit = self.page_limit;

        let (raw, pages) = drain_pages(limit, snapshot_id, move |cursor| async move {
            provider
                .list_changed(from, cursor.as_deref(), limit.get())
                .await
        })
        .await
        .map_err(|source| CollectionFailedError {
            provider: provider.name().to_string(),
            source,
        })?;

        let fetched = raw.len();
        let out = dedup_and_sort(raw, snapshot_id, by_snapshot_order);
        debug!(
            provider = provider.name(),
            pages,
            fetched,
            unique = out.len(),
            "change-set collected"
        );
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// VolumeCollector
// ---------------------------------------------------------------------------

/// Volume counterpart of [`ChangeSetCollector`]; identical paging contract.
pub struct VolumeCollector<'a> {
    provider: &'a dyn VolumeProvider,
    page_limit: NonZeroUsize,
}

impl<'a> VolumeCollector<'a> {
    pub fn new(provider: &'a dyn VolumeProvider, page_limit: NonZeroUsize) -> Self {
        Self {
            provider,
            page_limit,
        }
    }

    pub async fn collect(
        &self,
        from: NaiveDateTime,
    ) -> Result<Vec<VolumeSnapshot>, CollectionFailedError> {
        let provider = self.provider;
        let limit = self.page_limit;

        let (raw, pages) = drain_pages(limit, volume_id, move |cursor| async move {
            provider
                .list_changed_volumes(from, cursor.as_deref(), limit.get())
                .await
        })
        .await
        .map_err(|source| CollectionFailedError {
            provider: provider.name().to_string(),
            source,
        })?;

        let out = dedup_and_sort(raw, volume_id, by_volume_order);
        debug!(provider = provider.name(), pages, volumes = out.len(), "volumes collected");
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// UsageAggregator
// ---------------------------------------------------------------------------

/// One usage query per window, keyed by resource id.
pub struct UsageAggregator<'a> {
    provider: &'a dyn UsageProvider,
}

impl<'a> UsageAggregator<'a> {
    pub fn new(provider: &'a dyn UsageProvider) -> Self {
        Self { provider }
    }

    /// An empty map is a valid answer (no usage in the window).
    ///
    /// If the provider reports the same resource twice, the later entry wins
    /// and a warning is logged.
    pub async fn aggregate(
        &self,
        subject: &str,
        window: &TimeWindow,
    ) -> Result<BTreeMap<String, UsageAggregateEntry>, AggregationFailedError> {
        let entries = self
            .provider
            .get_usage(subject, window.from(), window.to())
            .await
            .map_err(|source| AggregationFailedError {
                provider: self.provider.name().to_string(),
                subject: subject.to_string(),
                source,
            })?;

        let mut out: BTreeMap<String, UsageAggregateEntry> = BTreeMap::new();
        for entry in entries {
            let id = entry.resource_id.clone();
            if out.insert(id.clone(), entry).is_some() {
                warn!(subject, resource_id = %id, "duplicate usage entry; keeping the later one");
            }
        }
        debug!(subject, entries = out.len(), "usage aggregated");
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// EnergyAggregator
// ---------------------------------------------------------------------------

/// One energy query per window, keyed by resource id. Same failure and
/// duplicate handling as [`UsageAggregator`].
pub struct EnergyAggregator<'a> {
    provider: &'a dyn EnergyProvider,
}

impl<'a> EnergyAggregator<'a> {
    pub fn new(provider: &'a dyn EnergyProvider) -> Self {
        Self { provider }
    }

    pub async fn aggregate(
        &self,
        subject: &str,
        window: &TimeWindow,
    ) -> Result<BTreeMap<String, EnergyReading>, AggregationFailedError> {
        let readings = self
            .provider
            .get_energy(subject, window.from(), window.to())
            .await
            .map_err(|source| AggregationFailedError {
                provider: self.provider.name().to_string(),
                subject: subject.to_string(),
                source,
            })?;

        let mut out: BTreeMap<String, EnergyReading> = BTreeMap::new();
        for reading in readings {
            let id = reading.resource_id.clone();
            if out.insert(id.clone(), reading).is_some() {
                warn!(subject, resource_id = %id, "duplicate energy reading; keeping the later one");
            }
        }
        debug!(subject, readings = out.len(), "energy aggregated");
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// PublicIpCollector
// ---------------------------------------------------------------------------

pub struct PublicIpCollector<'a> {
    provider: &'a dyn PublicIpProvider,
}

impl<'a> PublicIpCollector<'a> {
    pub fn new(provider: &'a dyn PublicIpProvider) -> Self {
        Self { provider }
    }

    /// Allocations sorted by `(created_at, id)`, one per id.
    pub async fn collect(
        &self,
        subject: &str,
    ) -> Result<Vec<PublicIpAllocation>, CollectionFailedError> {
        let raw = self
            .provider
            .list_public_ips(subject)
            .await
            .map_err(|source| CollectionFailedError {
                provider: self.provider.name().to_string(),
                source,
            })?;
        let out = dedup_and_sort(raw, allocation_id, by_allocation_order);
        debug!(subject, allocations = out.len(), "public ips collected");
        Ok(out)
    }
}
