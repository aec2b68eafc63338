//! acct-reconcile
//!
//! Window reconciliation: turns a change-set listing plus usage aggregates
//! into one [`acct_schemas::CloudRecord`] per resource, volume listings into
//! [`acct_schemas::StorageRecord`]s, energy readings into
//! [`acct_schemas::EnergyRecord`]s and public address allocations into
//! per-owner [`acct_schemas::IpRecord`]s. Also owns the per-subject
//! watermark that supplies the next window's `from`.
//!
//! Output is a pure function of the window and upstream state: two runs over
//! the same `[from, to)` against unchanged providers yield identical records
//! in identical order.

mod duration;
mod energy;
mod enrich;
mod ip;
mod reconciler;
mod storage;
mod timestamps;
pub mod watermark;

pub use duration::{apply_usage, calculate, Durations};
pub use energy::{
    build_energy_record, EnergyOutcome, EnergyReconciler, DEFAULT_CPU_NORMALIZATION_FACTOR,
};
pub use enrich::{benchmark, image_id, public_ip_count};
pub use ip::{build_ip_records, IpReconciler};
pub use reconciler::{
    IndividualFetchError, ReconcileConfig, ReconcileError, ReconcileOutcome, Reconciler,
    SkippedUsage,
};
pub use storage::{build_storage_record, StorageReconciler};
pub use timestamps::{resolve_end, resolve_start};
pub use watermark::{
    CorruptWatermarkError, FileWatermarkStore, MemoryWatermarkStore, WatermarkError,
    WatermarkStore,
};
