//! Effective start/end instants of a compute resource.
//!
//! Resize, rebuild and rescue reset the launch instant upstream, so the start
//! is always the creation instant. The end precedence for deleted resources
//! is a provider heuristic: once metadata is scrubbed the last-updated
//! instant is the closest proxy for the delete time.

use acct_schemas::ResourceSnapshot;
use chrono::NaiveDateTime;

pub fn resolve_start(snap: &ResourceSnapshot) -> NaiveDateTime {
    snap.created_at
}

/// Precedence: explicit termination, then creation for a resource that never
/// launched, then last-updated for a deleted one. `None` means still active.
pub fn resolve_end(snap: &ResourceSnapshot) -> Option<NaiveDateTime> {
    if let Some(t) = snap.terminated_at {
        return Some(t);
    }
    if snap.launched_at.is_none() {
        return Some(snap.created_at);
    }
    if snap.status.is_terminal() {
        return snap.updated_at;
    }
    None
}
