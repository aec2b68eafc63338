use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use acct_extract::{
    EnergyProvider, ListingProvider, ProviderError, PublicIpProvider, UsageProvider,
    VolumeProvider,
};
use acct_schemas::{
    EnergyReading, PublicIpAllocation, ResourceSnapshot, UsageAggregateEntry, VolumeSnapshot,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;

/// Marker paging in id order, which is deliberately unrelated to creation
/// order: collectors must sort after draining.
fn page<T: Clone>(items: &[T], id_of: fn(&T) -> &str, cursor: Option<&str>, limit: usize) -> Vec<T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| id_of(a).cmp(id_of(b)));
    sorted
        .into_iter()
        .filter(|item| cursor.map_or(true, |c| id_of(item) > c))
        .take(limit)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// FakeListingProvider
// ---------------------------------------------------------------------------

/// Listing fake.
///
/// `changed` is what `list_changed` returns regardless of `since`; `hidden`
/// resources are reachable only through `get_by_id`. Any id not known to
/// either set is `NotFound`.
#[derive(Debug, Default)]
pub struct FakeListingProvider {
    changed: Vec<ResourceSnapshot>,
    hidden: BTreeMap<String, ResourceSnapshot>,
    list_failure: Option<ProviderError>,
    get_failures: BTreeMap<String, ProviderError>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    fetched_ids: std::sync::Mutex<BTreeSet<String>>,
}

impl FakeListingProvider {
    pub fn new(changed: Vec<ResourceSnapshot>) -> Self {
        Self {
            changed,
            ..Self::default()
        }
    }

    pub fn with_hidden(mut self, snap: ResourceSnapshot) -> Self {
        self.hidden.insert(snap.id.clone(), snap);
        self
    }

    pub fn failing_list(mut self, err: ProviderError) -> Self {
        self.list_failure = Some(err);
        self
    }

    pub fn failing_get(mut self, id: &str, err: ProviderError) -> Self {
        self.get_failures.insert(id.to_string(), err);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Ids passed to `get_by_id`, in sorted order.
    pub fn fetched_ids(&self) -> Vec<String> {
        match self.fetched_ids.lock() {
            Ok(g) => g.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}

#[async_trait]
impl ListingProvider for FakeListingProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn list_changed(
        &self,
        _since: NaiveDateTime,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ResourceSnapshot>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.list_failure {
            return Err(err.clone());
        }
        Ok(page(&self.changed, |s| s.id.as_str(), cursor, limit))
    }

    async fn get_by_id(&self, id: &str) -> Result<ResourceSnapshot, ProviderError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut g) = self.fetched_ids.lock() {
            g.insert(id.to_string());
        }
        if let Some(err) = self.get_failures.get(id) {
            return Err(err.clone());
        }
        self.hidden
            .get(id)
            .or_else(|| self.changed.iter().find(|s| s.id == id))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound { id: id.to_string() })
    }
}

// ---------------------------------------------------------------------------
// FakeUsageProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeUsageProvider {
    entries: Vec<UsageAggregateEntry>,
    failure: Option<ProviderError>,
    calls: AtomicUsize,
}

impl FakeUsageProvider {
    pub fn new(entries: Vec<UsageAggregateEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        Self {
            failure: Some(err),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsageProvider for FakeUsageProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn get_usage(
        &self,
        _subject: &str,
        _from: NaiveDateTime,
        _to: NaiveDateTime,
    ) -> Result<Vec<UsageAggregateEntry>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(self.entries.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeVolumeProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeVolumeProvider {
    volumes: Vec<VolumeSnapshot>,
    failure: Option<ProviderError>,
    calls: AtomicUsize,
}

impl FakeVolumeProvider {
    pub fn new(volumes: Vec<VolumeSnapshot>) -> Self {
        Self {
            volumes,
            ..Self::default()
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        Self {
            failure: Some(err),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VolumeProvider for FakeVolumeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn list_changed_volumes(
        &self,
        _since: NaiveDateTime,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VolumeSnapshot>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(page(&self.volumes, |v| v.id.as_str(), cursor, limit))
    }
}

// ---------------------------------------------------------------------------
// FakeEnergyProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeEnergyProvider {
    readings: Vec<EnergyReading>,
    failure: Option<ProviderError>,
    calls: AtomicUsize,
}

impl FakeEnergyProvider {
    pub fn new(readings: Vec<EnergyReading>) -> Self {
        Self {
            readings,
            ..Self::default()
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        Self {
            failure: Some(err),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnergyProvider for FakeEnergyProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn get_energy(
        &self,
        _subject: &str,
        _from: NaiveDateTime,
        _to: NaiveDateTime,
    ) -> Result<Vec<EnergyReading>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(self.readings.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// FakePublicIpProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakePublicIpProvider {
    allocations: Vec<PublicIpAllocation>,
    failure: Option<ProviderError>,
}

impl FakePublicIpProvider {
    pub fn new(allocations: Vec<PublicIpAllocation>) -> Self {
        Self {
            allocations,
            ..Self::default()
        }
    }

    pub fn failing(err: ProviderError) -> Self {
        Self {
            failure: Some(err),
            ..Self::default()
        }
    }
}

#[async_trait]
impl PublicIpProvider for FakePublicIpProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn list_public_ips(
        &self,
        _subject: &str,
    ) -> Result<Vec<PublicIpAllocation>, ProviderError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            // Newest first, so callers have to sort.
            None => Ok(self.allocations.iter().rev().cloned().collect()),
        }
    }
}
