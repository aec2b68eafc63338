//! Offline provider: reads provider-shaped JSON documents from disk and
//! normalise them to internal types.
//!
//! # Layout
//!
//! ```text
//! <root>/<subject>/servers.json   array of RawServer
//! <root>/<subject>/usage.json     array of RawUsage
//! <root>/<subject>/volumes.json   array of RawVolume
//! <root>/<subject>/energy.json    array of RawPowerSample
//! <root>/<subject>/floating_ips.json  array of RawFloatingIp
//! ```
//!
//! Power samples are instantaneous draws in microwatts taken every
//! `energy_step_secs`; each sample stands for one step of consumption.
//!
//! Servers count as changed when created, updated or terminated at or after
//! `since`. Volumes accrue storage for as long as they exist, so every volume
//! not deleted before `since` is listed.
//!
//! A missing document reads as an empty listing. A present but malformed one
//! is a [`ProviderError::Decode`]. Documents are re-read on every call so a
//! run always sees the state on disk at query time.
//!
//! Field names follow the compute/volume/usage REST shapes, including the
//! extension-prefixed ones (`OS-SRV-USG:launched_at`, ...). Unknown fields are
//! ignored.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use acct_schemas::{
    parse_instant, Address, AddressKind, EnergyReading, FlavorRef, ImageRef, PublicIpAllocation,
    ResourceSnapshot, ResourceStatus, UsageAggregateEntry, VolumeAttachment, VolumeSnapshot,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::provider::{
    EnergyProvider, ListingProvider, ProviderError, PublicIpProvider, UsageProvider,
    VolumeProvider,
};

pub const SERVERS_FILE: &str = "servers.json";
pub const USAGE_FILE: &str = "usage.json";
pub const VOLUMES_FILE: &str = "volumes.json";
pub const ENERGY_FILE: &str = "energy.json";
pub const FLOATING_IPS_FILE: &str = "floating_ips.json";

pub const DEFAULT_ENERGY_STEP_SECS: u32 = 30;

// ---------------------------------------------------------------------------
// Normalisation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("{kind} entry has empty id")]
    MissingId { kind: &'static str },
    #[error("{kind} '{id}' has unparsable {field} '{raw}'")]
    BadInstant {
        kind: &'static str,
        id: String,
        field: &'static str,
        raw: String,
    },
    #[error("{kind} '{id}' has unparsable address '{raw}'")]
    BadAddress {
        kind: &'static str,
        id: String,
        raw: String,
    },
}

impl From<AdapterError> for ProviderError {
    fn from(e: AdapterError) -> Self {
        ProviderError::Decode(e.to_string())
    }
}

fn required_instant(
    kind: &'static str,
    id: &str,
    field: &'static str,
    raw: &str,
) -> Result<NaiveDateTime, AdapterError> {
    parse_instant(raw).ok_or_else(|| AdapterError::BadInstant {
        kind,
        id: id.to_string(),
        field,
        raw: raw.to_string(),
    })
}

/// Absent, `null` and empty strings all read as "no instant".
fn optional_instant(
    kind: &'static str,
    id: &str,
    field: &'static str,
    raw: &Option<String>,
) -> Result<Option<NaiveDateTime>, AdapterError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => required_instant(kind, id, field, s).map(Some),
    }
}

// ---------------------------------------------------------------------------
// Raw wire-level structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RawServer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(alias = "tenant_id", default)]
    pub project_id: String,
    pub status: String,
    pub created: String,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(rename = "OS-SRV-USG:launched_at", default)]
    pub launched_at: Option<String>,
    #[serde(rename = "OS-SRV-USG:terminated_at", default)]
    pub terminated_at: Option<String>,
    #[serde(default)]
    pub image: RawImage,
    #[serde(default)]
    pub flavor: RawFlavor,
    /// Network name -> addresses on that network.
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<RawAddress>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFlavor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub vcpus: u32,
    #[serde(default)]
    pub ram: u64,
    #[serde(default)]
    pub disk: u64,
    #[serde(default)]
    pub extra_specs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAddress {
    pub addr: String,
    #[serde(default = "default_ip_version")]
    pub version: u8,
    #[serde(rename = "OS-EXT-IPS:type", default)]
    pub kind: Option<String>,
}

fn default_ip_version() -> u8 {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUsage {
    pub instance_id: String,
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub vcpus: u32,
    #[serde(default)]
    pub local_gb: u64,
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub hours: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVolume {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(rename = "os-vol-tenant-attr:tenant_id", alias = "project_id", default)]
    pub project_id: String,
    pub status: String,
    #[serde(default)]
    pub size: u64,
    pub created_at: String,
    #[serde(default)]
    pub deleted_at: Option<String>,
    #[serde(default)]
    pub attachments: Vec<RawAttachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAttachment {
    pub server_id: String,
    #[serde(default)]
    pub attached_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPowerSample {
    #[serde(alias = "instance_id")]
    pub uuid: String,
    pub timestamp: String,
    /// Microwatts.
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFloatingIp {
    pub id: String,
    pub floating_ip_address: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

pub fn normalize_server(raw: RawServer) -> Result<ResourceSnapshot, AdapterError> {
    const KIND: &str = "server";
    let id = raw.id.trim().to_string();
    if id.is_empty() {
        return Err(AdapterError::MissingId { kind: KIND });
    }

    let created_at = required_instant(KIND, &id, "created", &raw.created)?;
    let updated_at = optional_instant(KIND, &id, "updated", &raw.updated)?;
    let launched_at = optional_instant(KIND, &id, "launched_at", &raw.launched_at)?;
    let terminated_at = optional_instant(KIND, &id, "terminated_at", &raw.terminated_at)?;

    let addresses = raw
        .addresses
        .into_values()
        .flatten()
        .map(|a| Address {
            addr: a.addr,
            version: a.version,
            kind: match a.kind.as_deref() {
                Some(k) if k.eq_ignore_ascii_case("floating") => AddressKind::Floating,
                _ => AddressKind::Fixed,
            },
        })
        .collect();

    Ok(ResourceSnapshot {
        id,
        name: raw.name,
        owner_id: raw.user_id,
        group_id: raw.project_id,
        created_at,
        status: ResourceStatus::parse(&raw.status),
        terminated_at,
        launched_at,
        updated_at,
        image: ImageRef {
            id: raw.image.id,
            metadata: raw.image.metadata,
        },
        flavor: FlavorRef {
            id: raw.flavor.id,
            vcpus: raw.flavor.vcpus,
            memory_mb: raw.flavor.ram,
            disk_gb: raw.flavor.disk,
            extra_specs: raw.flavor.extra_specs,
        },
        addresses,
    })
}

pub fn normalize_usage(raw: RawUsage) -> Result<UsageAggregateEntry, AdapterError> {
    const KIND: &str = "usage";
    let id = raw.instance_id.trim().to_string();
    if id.is_empty() {
        return Err(AdapterError::MissingId { kind: KIND });
    }
    let started_at = required_instant(KIND, &id, "started_at", &raw.started_at)?;
    let ended_at = optional_instant(KIND, &id, "ended_at", &raw.ended_at)?;

    Ok(UsageAggregateEntry {
        resource_id: id,
        memory_mb: raw.memory_mb,
        vcpus: raw.vcpus,
        disk_gb: raw.local_gb,
        started_at,
        ended_at,
        hours: raw.hours,
    })
}

pub fn normalize_volume(raw: RawVolume) -> Result<VolumeSnapshot, AdapterError> {
    const KIND: &str = "volume";
    let id = raw.id.trim().to_string();
    if id.is_empty() {
        return Err(AdapterError::MissingId { kind: KIND });
    }
    let created_at = required_instant(KIND, &id, "created_at", &raw.created_at)?;
    let deleted_at = optional_instant(KIND, &id, "deleted_at", &raw.deleted_at)?;

    let mut attachments = Vec::with_capacity(raw.attachments.len());
    for a in raw.attachments {
        attachments.push(VolumeAttachment {
            attached_at: optional_instant(KIND, &id, "attached_at", &a.attached_at)?,
            server_id: a.server_id,
        });
    }

    Ok(VolumeSnapshot {
        name: raw.name.unwrap_or_default(),
        owner_id: raw.user_id,
        group_id: raw.project_id,
        created_at,
        deleted_at,
        status: raw.status.trim().to_ascii_lowercase(),
        size_gb: raw.size,
        attachments,
        id,
    })
}

pub fn normalize_floating_ip(raw: RawFloatingIp) -> Result<PublicIpAllocation, AdapterError> {
    const KIND: &str = "floating ip";
    let id = raw.id.trim().to_string();
    if id.is_empty() {
        return Err(AdapterError::MissingId { kind: KIND });
    }
    let created_at = required_instant(KIND, &id, "created_at", &raw.created_at)?;
    let address = raw.floating_ip_address.trim().to_string();
    let version = match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => 4,
        Ok(IpAddr::V6(_)) => 6,
        Err(_) => {
            return Err(AdapterError::BadAddress {
                kind: KIND,
                id,
                raw: raw.floating_ip_address,
            })
        }
    };

    Ok(PublicIpAllocation {
        id,
        address,
        version,
        owner_id: raw.user_id.filter(|u| !u.trim().is_empty()),
        created_at,
    })
}

/// Watt-hours drawn by a series of microwatt samples, one per `step_secs`.
/// Non-finite samples are ignored.
pub fn integrate_microwatts(samples: impl IntoIterator<Item = f64>, step_secs: u32) -> f64 {
    let total: f64 = samples.into_iter().filter(|v| v.is_finite()).sum();
    total * f64::from(step_secs) / 3600.0 / 1_000_000.0
}

/// Last-change instant used for `changes-since` filtering.
fn server_changed_at(s: &ResourceSnapshot) -> NaiveDateTime {
    s.updated_at
        .into_iter()
        .chain(s.terminated_at)
        .fold(s.created_at, NaiveDateTime::max)
}

/// Marker paging over an id-ordered listing: items strictly after `cursor`.
fn page_after<T>(mut items: Vec<T>, id_of: fn(&T) -> &str, cursor: Option<&str>, limit: usize) -> Vec<T> {
    items.sort_by(|a, b| id_of(a).cmp(id_of(b)));
    items
        .into_iter()
        .filter(|item| cursor.map_or(true, |c| id_of(item) > c))
        .take(limit)
        .collect()
}

// ---------------------------------------------------------------------------
// FileProvider
// ---------------------------------------------------------------------------

/// Implements every provider trait for one subject directory.
#[derive(Debug, Clone)]
pub struct FileProvider {
    dir: PathBuf,
    energy_step_secs: u32,
}

impl FileProvider {
    pub fn new(root: impl AsRef<Path>, subject: &str) -> Self {
        Self {
            dir: root.as_ref().join(subject),
            energy_step_secs: DEFAULT_ENERGY_STEP_SECS,
        }
    }

    pub fn with_energy_step(mut self, secs: u32) -> Self {
        self.energy_step_secs = secs;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_doc<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, ProviderError> {
        let path = self.dir.join(file);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ProviderError::Transport(format!(
                    "read {} failed: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| ProviderError::Decode(format!("{}: {e}", path.display())))
    }

    async fn servers(&self) -> Result<Vec<ResourceSnapshot>, ProviderError> {
        let raw: Vec<RawServer> = self.read_doc(SERVERS_FILE).await?;
        raw.into_iter()
            .map(|r| normalize_server(r).map_err(ProviderError::from))
            .collect()
    }
}

#[async_trait]
impl ListingProvider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn list_changed(
        &self,
        since: NaiveDateTime,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ResourceSnapshot>, ProviderError> {
        let changed: Vec<ResourceSnapshot> = self
            .servers()
            .await?
            .into_iter()
            .filter(|s| server_changed_at(s) >= since)
            .collect();
        Ok(page_after(changed, |s| s.id.as_str(), cursor, limit))
    }

    async fn get_by_id(&self, id: &str) -> Result<ResourceSnapshot, ProviderError> {
        self.servers()
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| ProviderError::NotFound { id: id.to_string() })
    }
}

#[async_trait]
impl UsageProvider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get_usage(
        &self,
        _subject: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<UsageAggregateEntry>, ProviderError> {
        let raw: Vec<RawUsage> = self.read_doc(USAGE_FILE).await?;
        let mut out = Vec::with_capacity(raw.len());
        for r in raw {
            let entry = normalize_usage(r)?;
            if entry.started_at < to && entry.ended_at.map_or(true, |e| e >= from) {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl VolumeProvider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn list_changed_volumes(
        &self,
        since: NaiveDateTime,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VolumeSnapshot>, ProviderError> {
        let raw: Vec<RawVolume> = self.read_doc(VOLUMES_FILE).await?;
        let mut changed = Vec::with_capacity(raw.len());
        for r in raw {
            let v = normalize_volume(r)?;
            if v.deleted_at.map_or(true, |d| d >= since) {
                changed.push(v);
            }
        }
        Ok(page_after(changed, |v| v.id.as_str(), cursor, limit))
    }
}

#[async_trait]
impl EnergyProvider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get_energy(
        &self,
        _subject: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<EnergyReading>, ProviderError> {
        const KIND: &str = "power sample";
        let raw: Vec<RawPowerSample> = self.read_doc(ENERGY_FILE).await?;

        let mut by_resource: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for r in raw {
            let id = r.uuid.trim().to_string();
            if id.is_empty() {
                return Err(AdapterError::MissingId { kind: KIND }.into());
            }
            let at = required_instant(KIND, &id, "timestamp", &r.timestamp)?;
            if at >= from && at < to {
                by_resource.entry(id).or_default().push(r.value);
            }
        }

        Ok(by_resource
            .into_iter()
            .map(|(resource_id, samples)| EnergyReading {
                energy_wh: integrate_microwatts(samples, self.energy_step_secs),
                resource_id,
            })
            .collect())
    }
}

#[async_trait]
impl PublicIpProvider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn list_public_ips(
        &self,
        _subject: &str,
    ) -> Result<Vec<PublicIpAllocation>, ProviderError> {
        let raw: Vec<RawFloatingIp> = self.read_doc(FLOATING_IPS_FILE).await?;
        raw.into_iter()
            .map(|r| normalize_floating_ip(r).map_err(ProviderError::from))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
