//! acct-schemas
//!
//! Shared data model for the accounting reconciler.
//!
//! - [`TimeWindow`]: validated `[from, to)` reporting window (zone-naive UTC)
//! - [`ResourceSnapshot`] / [`VolumeSnapshot`]: upstream listing state, immutable once read
//! - [`UsageAggregateEntry`]: provider-computed usage totals for one resource
//! - [`Record`]: the closed set of accounting record kinds handed to sinks
//!
//! Pure types. No IO, no clock.

mod record;
mod snapshot;
mod usage;
mod window;

pub use record::*;
pub use snapshot::*;
pub use usage::*;
pub use window::*;
