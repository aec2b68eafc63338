//! acct-extract
//!
//! Provider boundary and collectors.
//!
//! - [`provider`]: the narrow interfaces consumed from upstream (listing, usage, volumes,
//!   energy, public addresses)
//! - [`collector`]: cursor-paginated change-set collection and usage aggregation
//! - [`file_provider`]: offline provider reading provider-shaped JSON documents from disk
//!
//! Nothing here retries; transport failures surface to the caller.

pub mod collector;
pub mod file_provider;
pub mod provider;

pub use collector::{
    AggregationFailedError, ChangeSetCollector, CollectionFailedError, EnergyAggregator,
    PublicIpCollector, UsageAggregator, VolumeCollector,
};
pub use file_provider::FileProvider;
pub use provider::{
    EnergyProvider, ListingProvider, ProviderError, PublicIpProvider, UsageProvider,
    VolumeProvider,
};
