use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a compute resource.
///
/// Upstream status strings are case-insensitive; anything not listed maps to
/// [`ResourceStatus::Other`] carrying the lowercased raw value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceStatus {
    Active,
    Building,
    Deleting,
    Deleted,
    Error,
    Other(String),
}

impl ResourceStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => ResourceStatus::Active,
            "build" | "building" => ResourceStatus::Building,
            "deleting" => ResourceStatus::Deleting,
            "deleted" | "soft_deleted" => ResourceStatus::Deleted,
            "error" => ResourceStatus::Error,
            other => ResourceStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResourceStatus::Active => "active",
            ResourceStatus::Building => "building",
            ResourceStatus::Deleting => "deleting",
            ResourceStatus::Deleted => "deleted",
            ResourceStatus::Error => "error",
            ResourceStatus::Other(s) => s.as_str(),
        }
    }

    /// Only `deleted` is terminal; `deleting` may still be billed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceStatus::Deleted)
    }
}

impl From<String> for ResourceStatus {
    fn from(raw: String) -> Self {
        ResourceStatus::parse(&raw)
    }
}

impl From<ResourceStatus> for String {
    fn from(status: ResourceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    Fixed,
    Floating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub addr: String,
    pub version: u8,
    pub kind: AddressKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Size descriptor. The resource sizes here are defaults; a usage aggregate
/// entry for the same resource is authoritative over them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlavorRef {
    pub id: String,
    pub vcpus: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    #[serde(default)]
    pub extra_specs: BTreeMap<String, String>,
}

/// One compute resource as reported by the listing provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub group_id: String,
    pub created_at: NaiveDateTime,
    pub status: ResourceStatus,
    /// Explicit termination instant, when the provider exposes one.
    pub terminated_at: Option<NaiveDateTime>,
    /// First launch instant; absent if the resource never booted.
    pub launched_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub image: ImageRef,
    pub flavor: FlavorRef,
    pub addresses: Vec<Address>,
}

impl ResourceSnapshot {
    /// Ordering key used everywhere a deterministic order is required.
    pub fn order_key(&self) -> (NaiveDateTime, &str) {
        (self.created_at, self.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub server_id: String,
    pub attached_at: Option<NaiveDateTime>,
}

/// One block-storage volume as reported by the volume listing provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub group_id: String,
    pub created_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
    /// Raw provider status (`available`, `in-use`, ...).
    pub status: String,
    pub size_gb: u64,
    pub attachments: Vec<VolumeAttachment>,
}

impl VolumeSnapshot {
    pub fn order_key(&self) -> (NaiveDateTime, &str) {
        (self.created_at, self.id.as_str())
    }

    pub fn is_in_use(&self) -> bool {
        self.status.eq_ignore_ascii_case("in-use")
    }
}

/// One public address allocated to a subject, as currently listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIpAllocation {
    pub id: String,
    pub address: String,
    pub version: u8,
    /// Allocating user, when the provider records one.
    pub owner_id: Option<String>,
    pub created_at: NaiveDateTime,
}

impl PublicIpAllocation {
    pub fn order_key(&self) -> (NaiveDateTime, &str) {
        (self.created_at, self.id.as_str())
    }
}
