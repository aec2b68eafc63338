//! In-memory fakes and builders shared by scenario tests.
//!
//! Nothing here touches the network or the filesystem. Fakes count their
//! calls so scenarios can assert how often a provider was consulted.

mod builders;
mod providers;

pub use builders::{energy, instant, public_ip, usage, volume, SnapshotBuilder};
pub use providers::{
    FakeEnergyProvider, FakeListingProvider, FakePublicIpProvider, FakeUsageProvider,
    FakeVolumeProvider,
};
