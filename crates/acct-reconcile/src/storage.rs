//! Block-storage records.
//!
//! A volume counts for the part of its lifetime inside the window:
//! `start = max(created, from)`, `end = min(deleted or to, to)`. Volumes
//! created at or after `to`, or deleted before `from`, produce nothing.
//! `measure_time` is always the window end so republishing is reproducible.

use std::sync::Arc;

use acct_extract::{VolumeCollector, VolumeProvider};
use acct_schemas::{StorageRecord, TimeWindow, VolumeSnapshot};
use tracing::info;

use crate::reconciler::{ReconcileConfig, ReconcileError};

fn secs_between(from: chrono::NaiveDateTime, to: chrono::NaiveDateTime) -> i64 {
    (to - from).num_seconds().max(0)
}

pub fn build_storage_record(
    volume: &VolumeSnapshot,
    window: &TimeWindow,
    config: &ReconcileConfig,
    vo: &str,
) -> Option<StorageRecord> {
    if volume.created_at >= window.to() {
        return None;
    }
    if volume.deleted_at.is_some_and(|d| d < window.from()) {
        return None;
    }

    let start = window.clamp_start(volume.created_at);
    let end = volume
        .deleted_at
        .map_or(window.to(), |d| d.min(window.to()));

    let (attached_to, attached_duration) = match volume.attachments.first() {
        Some(att) if volume.is_in_use() => {
            let since = window.clamp_start(att.attached_at.unwrap_or(volume.created_at));
            (Some(att.server_id.clone()), secs_between(since, end))
        }
        _ => (None, 0),
    };

    Some(StorageRecord {
        resource_id: volume.id.clone(),
        name: volume.name.clone(),
        site_name: config.site_name.clone(),
        compute_service: config.compute_service.clone(),
        owner_id: volume.owner_id.clone(),
        group_id: volume.group_id.clone(),
        vo: vo.to_string(),
        status: volume.status.clone(),
        capacity_gb: volume.size_gb,
        created_at: volume.created_at,
        start_time: start,
        measure_time: window.to(),
        active_duration: secs_between(start, end),
        attached_to,
        attached_duration,
    })
}

pub struct StorageReconciler {
    config: ReconcileConfig,
    volumes: Arc<dyn VolumeProvider>,
}

impl StorageReconciler {
    pub fn new(config: ReconcileConfig, volumes: Arc<dyn VolumeProvider>) -> Self {
        Self { config, volumes }
    }

    /// Records ascending by `(created_at, resource_id)`.
    pub async fn reconcile(
        &self,
        subject: &str,
        window: &TimeWindow,
    ) -> Result<Vec<StorageRecord>, ReconcileError> {
        let listed = VolumeCollector::new(self.volumes.as_ref(), self.config.page_limit)
            .collect(window.from())
            .await?;

        let vo = self.config.vo_for(subject);
        // The collector already sorted by (created_at, id).
        let records: Vec<StorageRecord> = listed
            .iter()
            .filter_map(|v| build_storage_record(v, window, &self.config, &vo))
            .collect();

        info!(
            subject,
            volumes = listed.len(),
            records = records.len(),
            "storage records reconciled"
        );
        Ok(records)
    }
}
