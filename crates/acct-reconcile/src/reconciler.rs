//! Compute-record reconciliation for one subject and one window.
//!
//! # Algorithm
//!
//! 1. Collect the change-set since `from` and aggregate usage over
//!    `[from, to)`. Both reads are independent and run concurrently; either
//!    failing aborts the window with no output.
//! 2. Every changed resource overlapping the window becomes a record.
//! 3. Every usage entry is merged into its record. A usage entry without a
//!    record is resolved individually by id; a failed lookup skips only that
//!    entry and is reported in [`ReconcileOutcome::skipped`].
//! 4. Records are returned ascending by `(created_at, resource_id)`.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use acct_extract::{
    AggregationFailedError, ChangeSetCollector, CollectionFailedError, ListingProvider,
    ProviderError, UsageAggregator, UsageProvider,
};
use acct_schemas::{
    CloudRecord, InvalidWindowError, ResourceSnapshot, TimeWindow, UsageAggregateEntry,
};
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::duration::{apply_usage, calculate};
use crate::enrich::{benchmark, image_id, public_ip_count};
use crate::timestamps::{resolve_end, resolve_start};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Everything the reconciler needs besides its providers. Built once by the
/// caller; never read from process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub site_name: String,
    pub compute_service: String,
    /// Subject -> virtual organisation. Unmapped subjects report themselves.
    pub vo_map: BTreeMap<String, String>,
    pub page_limit: NonZeroUsize,
    pub image_metadata_key: Option<String>,
    pub benchmark_name_key: String,
    pub benchmark_value_key: String,
}

impl ReconcileConfig {
    pub fn vo_for(&self, subject: &str) -> String {
        self.vo_map
            .get(subject)
            .cloned()
            .unwrap_or_else(|| subject.to_string())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            site_name: String::new(),
            compute_service: String::new(),
            vo_map: BTreeMap::new(),
            page_limit: NonZeroUsize::new(200).unwrap_or(NonZeroUsize::MIN),
            image_metadata_key: Some("vmcatcher_event_ad_mpuri".to_string()),
            benchmark_name_key: "accounting:benchmark_type".to_string(),
            benchmark_value_key: "accounting:benchmark_value".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors and outcome
// ---------------------------------------------------------------------------

/// Fatal to the window. Nothing is returned, nothing may be published.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    InvalidWindow(#[from] InvalidWindowError),
    #[error(transparent)]
    CollectionFailed(#[from] CollectionFailedError),
    #[error(transparent)]
    AggregationFailed(#[from] AggregationFailedError),
}

/// Why a usage entry produced no record. Recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndividualFetchError {
    #[error("resource could not be resolved: {source}")]
    Unresolvable {
        #[source]
        source: ProviderError,
    },
    #[error("resource starts at {start}, after the window end")]
    StartsAfterWindow { start: NaiveDateTime },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUsage {
    pub resource_id: String,
    pub reason: IndividualFetchError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub records: Vec<CloudRecord>,
    pub skipped: Vec<SkippedUsage>,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    config: ReconcileConfig,
    listing: Arc<dyn ListingProvider>,
    usage: Arc<dyn UsageProvider>,
}

impl Reconciler {
    pub fn new(
        config: ReconcileConfig,
        listing: Arc<dyn ListingProvider>,
        usage: Arc<dyn UsageProvider>,
    ) -> Self {
        Self {
            config,
            listing,
            usage,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub async fn reconcile(
        &self,
        subject: &str,
        window: &TimeWindow,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let collector = ChangeSetCollector::new(self.listing.as_ref(), self.config.page_limit);
        let aggregator = UsageAggregator::new(self.usage.as_ref());

        let (changeset, usage) = tokio::join!(
            collector.collect(window.from()),
            aggregator.aggregate(subject, window)
        );
        let changeset = changeset?;
        let usage = usage?;

        let vo = self.config.vo_for(subject);
        let mut records: BTreeMap<String, CloudRecord> = BTreeMap::new();
        // Changed but outside the window; reused if usage names them.
        let mut outside: BTreeMap<&str, &ResourceSnapshot> = BTreeMap::new();

        for snap in &changeset {
            if window.overlaps(resolve_start(snap), resolve_end(snap)) {
                records.insert(snap.id.clone(), self.build_record(snap, window, &vo));
            } else {
                outside.insert(snap.id.as_str(), snap);
            }
        }
        let from_changeset = records.len();

        let mut skipped = Vec::new();
        let mut fetched = 0usize;
        for (id, entry) in &usage {
            if let Some(record) = records.get_mut(id) {
                apply_usage(record, entry);
                continue;
            }

            // Usage without a record resolves its resource by id. A resource
            // already in the change-set resolves to that same snapshot, so it
            // is reused without a fetch.
            let snap = match outside.get(id.as_str()) {
                Some(snap) => (*snap).clone(),
                None => {
                    fetched += 1;
                    match self.listing.get_by_id(id).await {
                        Ok(snap) => snap,
                        Err(source) => {
                            let reason = IndividualFetchError::Unresolvable { source };
                            warn!(subject, resource_id = %id, error = %reason, "usage entry skipped");
                            skipped.push(SkippedUsage {
                                resource_id: id.clone(),
                                reason,
                            });
                            continue;
                        }
                    }
                }
            };

            match self.record_for_usage(&snap, entry, window, &vo) {
                Ok(record) => {
                    records.insert(id.clone(), record);
                }
                Err(reason) => {
                    warn!(subject, resource_id = %id, error = %reason, "usage entry skipped");
                    skipped.push(SkippedUsage {
                        resource_id: id.clone(),
                        reason,
                    });
                }
            }
        }

        let mut out: Vec<CloudRecord> = records.into_values().collect();
        out.sort_by(|a, b| {
            (a.created_at, a.resource_id.as_str()).cmp(&(b.created_at, b.resource_id.as_str()))
        });

        debug!(subject, fetched, "individual lookups");
        info!(
            subject,
            from = %window.from(),
            to = %window.to(),
            changed = changeset.len(),
            from_changeset,
            usage_entries = usage.len(),
            records = out.len(),
            skipped = skipped.len(),
            "cloud records reconciled"
        );

        Ok(ReconcileOutcome {
            records: out,
            skipped,
        })
    }

    fn record_for_usage(
        &self,
        snap: &ResourceSnapshot,
        entry: &UsageAggregateEntry,
        window: &TimeWindow,
        vo: &str,
    ) -> Result<CloudRecord, IndividualFetchError> {
        let start = resolve_start(snap);
        if start > window.to() {
            return Err(IndividualFetchError::StartsAfterWindow { start });
        }
        let mut record = self.build_record(snap, window, vo);
        apply_usage(&mut record, entry);
        Ok(record)
    }

    fn build_record(&self, snap: &ResourceSnapshot, window: &TimeWindow, vo: &str) -> CloudRecord {
        let d = calculate(
            resolve_start(snap),
            resolve_end(snap),
            window,
            snap.flavor.vcpus,
            &snap.status,
        );

        CloudRecord {
            resource_id: snap.id.clone(),
            name: snap.name.clone(),
            site_name: self.config.site_name.clone(),
            compute_service: self.config.compute_service.clone(),
            owner_id: snap.owner_id.clone(),
            group_id: snap.group_id.clone(),
            vo: vo.to_string(),
            status: d.status,
            created_at: snap.created_at,
            start_time: d.start,
            end_time: d.end,
            wall: d.wall,
            cpu: d.cpu,
            cpu_count: snap.flavor.vcpus,
            memory_mb: snap.flavor.memory_mb,
            disk_gb: snap.flavor.disk_gb,
            image_id: image_id(&snap.image, self.config.image_metadata_key.as_deref()),
            public_ip_count: public_ip_count(&snap.addresses),
            benchmark: benchmark(
                &snap.flavor,
                &self.config.benchmark_name_key,
                &self.config.benchmark_value_key,
            ),
        }
    }
}
