//! Energy records.
//!
//! One record per resource with a positive energy reading in the window.
//! The resource comes from the change-set when listed there and is fetched
//! by id otherwise; a failed lookup skips only that reading.
//!
//! Start, end and status follow the compute rules of [`crate::calculate`]:
//! a resource that outlives the window is reported running up to `to`.
//! CPU time is `wall * vcpus`.

use std::collections::BTreeMap;
use std::sync::Arc;

use acct_extract::{ChangeSetCollector, EnergyAggregator, EnergyProvider, ListingProvider};
use acct_schemas::{EnergyReading, EnergyRecord, ResourceSnapshot, TimeWindow};
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::duration::calculate;
use crate::reconciler::{IndividualFetchError, ReconcileConfig, ReconcileError, SkippedUsage};
use crate::timestamps::{resolve_end, resolve_start};

pub const DEFAULT_CPU_NORMALIZATION_FACTOR: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EnergyOutcome {
    pub records: Vec<EnergyRecord>,
    pub skipped: Vec<SkippedUsage>,
}

/// Pure record construction for one resource and one reading.
pub fn build_energy_record(
    snap: &ResourceSnapshot,
    reading: &EnergyReading,
    window: &TimeWindow,
    config: &ReconcileConfig,
    vo: &str,
    normalization: f64,
) -> EnergyRecord {
    let d = calculate(
        resolve_start(snap),
        resolve_end(snap),
        window,
        snap.flavor.vcpus,
        &snap.status,
    );
    let wall = d.wall.get();
    let vcpus = i64::from(snap.flavor.vcpus.max(1));
    let cpu = wall.saturating_mul(vcpus);

    let energy_wh = reading.energy_wh * normalization;
    let work = if energy_wh > 0.0 {
        cpu as f64 / energy_wh
    } else {
        0.0
    };
    let efficiency = if wall > 0 {
        cpu as f64 / wall.saturating_mul(vcpus) as f64
    } else {
        0.0
    };

    EnergyRecord {
        resource_id: snap.id.clone(),
        site_name: config.site_name.clone(),
        compute_service: config.compute_service.clone(),
        owner_id: snap.owner_id.clone(),
        group_id: snap.group_id.clone(),
        vo: vo.to_string(),
        status: d.status,
        start_time: d.start,
        end_time: d.end.unwrap_or(window.to()),
        energy_wh,
        work,
        efficiency,
        wall_duration: wall,
        cpu_duration: cpu,
        suspend_duration: 0,
        cpu_normalization_factor: normalization,
        finished: d.end.is_some(),
    }
}

pub struct EnergyReconciler {
    config: ReconcileConfig,
    normalization: f64,
    listing: Arc<dyn ListingProvider>,
    energy: Arc<dyn EnergyProvider>,
}

impl EnergyReconciler {
    pub fn new(
        config: ReconcileConfig,
        listing: Arc<dyn ListingProvider>,
        energy: Arc<dyn EnergyProvider>,
    ) -> Self {
        Self {
            config,
            normalization: DEFAULT_CPU_NORMALIZATION_FACTOR,
            listing,
            energy,
        }
    }

    /// Multiplier applied to every measured reading.
    pub fn with_normalization_factor(mut self, factor: f64) -> Self {
        self.normalization = factor;
        self
    }

    /// Records ascending by `(created_at, resource_id)`. Listing or energy
    /// query failures are fatal; per-resource lookups are not.
    pub async fn reconcile(
        &self,
        subject: &str,
        window: &TimeWindow,
    ) -> Result<EnergyOutcome, ReconcileError> {
        let collector = ChangeSetCollector::new(self.listing.as_ref(), self.config.page_limit);
        let aggregator = EnergyAggregator::new(self.energy.as_ref());

        let (changeset, readings) = tokio::join!(
            collector.collect(window.from()),
            aggregator.aggregate(subject, window)
        );
        let changeset = changeset?;
        let readings = readings?;

        let listed: BTreeMap<&str, &ResourceSnapshot> =
            changeset.iter().map(|s| (s.id.as_str(), s)).collect();
        let vo = self.config.vo_for(subject);

        let mut keyed: Vec<((NaiveDateTime, String), EnergyRecord)> = Vec::new();
        let mut skipped = Vec::new();
        let mut skip = |id: &str, reason: IndividualFetchError| {
            warn!(subject, resource_id = %id, error = %reason, "energy reading skipped");
            skipped.push(SkippedUsage {
                resource_id: id.to_string(),
                reason,
            });
        };

        for (id, reading) in &readings {
            if !reading.has_energy() {
                debug!(subject, resource_id = %id, "no energy drawn");
                continue;
            }

            let snap = match listed.get(id.as_str()) {
                Some(snap) => (*snap).clone(),
                None => match self.listing.get_by_id(id).await {
                    Ok(snap) => snap,
                    Err(source) => {
                        skip(id, IndividualFetchError::Unresolvable { source });
                        continue;
                    }
                },
            };

            let start = resolve_start(&snap);
            if start >= window.to() {
                skip(id, IndividualFetchError::StartsAfterWindow { start });
                continue;
            }

            let record =
                build_energy_record(&snap, reading, window, &self.config, &vo, self.normalization);
            keyed.push(((snap.created_at, snap.id), record));
        }

        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let records: Vec<EnergyRecord> = keyed.into_iter().map(|(_, r)| r).collect();

        info!(
            subject,
            readings = readings.len(),
            records = records.len(),
            skipped = skipped.len(),
            "energy records reconciled"
        );
        Ok(EnergyOutcome { records, skipped })
    }
}
