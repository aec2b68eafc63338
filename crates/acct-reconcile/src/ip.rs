//! Public IP records.
//!
//! Allocations created before `to` are counted per `(owner, ip version)`.
//! The provider lists current allocations only, so the count is the one
//! observed at query time restricted to addresses that existed by `to`;
//! `measure_time` is the window end.

use std::collections::BTreeMap;
use std::sync::Arc;

use acct_extract::{PublicIpCollector, PublicIpProvider};
use acct_schemas::{IpRecord, PublicIpAllocation, TimeWindow};
use tracing::info;

use crate::reconciler::{ReconcileConfig, ReconcileError};

/// One record per `(owner, version)` pair, ordered by owner then version.
/// Allocations without an owner sort first.
pub fn build_ip_records(
    allocations: &[PublicIpAllocation],
    window: &TimeWindow,
    config: &ReconcileConfig,
    subject: &str,
    vo: &str,
) -> Vec<IpRecord> {
    let mut counts: BTreeMap<(Option<&str>, u8), u32> = BTreeMap::new();
    for a in allocations.iter().filter(|a| a.created_at < window.to()) {
        *counts
            .entry((a.owner_id.as_deref(), a.version))
            .or_default() += 1;
    }

    counts
        .into_iter()
        .map(|((owner, version), count)| IpRecord {
            site_name: config.site_name.clone(),
            compute_service: config.compute_service.clone(),
            owner_id: owner.map(str::to_string),
            group_id: subject.to_string(),
            vo: vo.to_string(),
            measure_time: window.to(),
            ip_version: version,
            public_ip_count: count,
        })
        .collect()
}

pub struct IpReconciler {
    config: ReconcileConfig,
    ips: Arc<dyn PublicIpProvider>,
}

impl IpReconciler {
    pub fn new(config: ReconcileConfig, ips: Arc<dyn PublicIpProvider>) -> Self {
        Self { config, ips }
    }

    pub async fn reconcile(
        &self,
        subject: &str,
        window: &TimeWindow,
    ) -> Result<Vec<IpRecord>, ReconcileError> {
        let allocations = PublicIpCollector::new(self.ips.as_ref())
            .collect(subject)
            .await?;
        let vo = self.config.vo_for(subject);
        let records = build_ip_records(&allocations, window, &self.config, subject, &vo);

        info!(
            subject,
            allocations = allocations.len(),
            records = records.len(),
            "ip records reconciled"
        );
        Ok(records)
    }
}
