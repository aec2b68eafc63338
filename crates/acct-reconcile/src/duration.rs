//! Window-truncated wall and compute durations.
//!
//! # Invariants
//!
//! - `0 <= cpu <= wall` for every record, whichever path produced it.
//! - `end >= start` whenever an end is reported. A resource that ended
//!   before `from` but still shows up (usage lookups) gets its end pinned
//!   to the clamped start and zero wall time.
//! - A resource whose end lies beyond `to` (or is unknown) is reported as
//!   `active` with no end: a record describes the state as of `to`, not as
//!   of query time.

use acct_schemas::{CloudRecord, Overridable, ResourceStatus, TimeWindow, UsageAggregateEntry};
use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Durations {
    /// Resolved start clamped to `from`.
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub status: ResourceStatus,
    pub wall: Overridable<i64>,
    pub cpu: Overridable<i64>,
}

fn secs_between(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_seconds().max(0)
}

/// `wall * vcpus`, clamped to `wall`.
fn baseline_cpu(wall: i64, vcpus: u32) -> i64 {
    wall.saturating_mul(i64::from(vcpus)).min(wall)
}

pub fn calculate(
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
    window: &TimeWindow,
    vcpus: u32,
    upstream: &ResourceStatus,
) -> Durations {
    let effective_start = window.clamp_start(start);

    let (end, status, wall) = match end {
        Some(e) if e <= window.to() => {
            let e = e.max(effective_start);
            (Some(e), upstream.clone(), secs_between(effective_start, e))
        }
        _ => (
            None,
            ResourceStatus::Active,
            secs_between(effective_start, window.to()),
        ),
    };

    Durations {
        start: effective_start,
        end,
        status,
        wall: Overridable::computed(wall),
        cpu: Overridable::computed(baseline_cpu(wall, vcpus)),
    }
}

/// Merge a usage entry into a record built from a snapshot.
///
/// Sizes from the entry replace the flavor defaults. Measured compute time
/// overrides the baseline, clamped to the wall duration. Start, end and
/// status are untouched: usage never moves the resolved end, so the
/// status-forcing decision made by [`calculate`] still holds.
pub fn apply_usage(record: &mut CloudRecord, entry: &UsageAggregateEntry) {
    record.memory_mb = entry.memory_mb;
    record.cpu_count = entry.vcpus;
    record.disk_gb = entry.disk_gb;

    let wall = record.wall.get();
    let measured = entry.compute_secs().clamp(0, wall.max(0));
    record.cpu = Overridable::computed(baseline_cpu(wall, entry.vcpus)).with_override(measured);
}
