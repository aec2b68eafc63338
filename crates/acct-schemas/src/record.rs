use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};

use crate::ResourceStatus;

// ---------------------------------------------------------------------------
// Computed value with optional override
// ---------------------------------------------------------------------------

/// A computed value plus an optional explicit override.
///
/// [`Overridable::get`] is the only read path: override first, computed otherwise.
/// Serialises as the effective value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overridable<T> {
    computed: T,
    override_value: Option<T>,
}

impl<T: Copy> Overridable<T> {
    pub fn computed(value: T) -> Self {
        Self {
            computed: value,
            override_value: None,
        }
    }

    pub fn with_override(mut self, value: T) -> Self {
        self.override_value = Some(value);
        self
    }

    pub fn get(&self) -> T {
        self.override_value.unwrap_or(self.computed)
    }

    pub fn computed_value(&self) -> T {
        self.computed
    }

    pub fn override_value(&self) -> Option<T> {
        self.override_value
    }
}

impl<T: Copy + Serialize> Serialize for Overridable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Record kinds
// ---------------------------------------------------------------------------

/// Closed set of record kinds; used for sink capability filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Cloud,
    Storage,
    Energy,
    Ip,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Cloud,
        RecordKind::Storage,
        RecordKind::Energy,
        RecordKind::Ip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Cloud => "cloud",
            RecordKind::Storage => "storage",
            RecordKind::Energy => "energy",
            RecordKind::Ip => "ip",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown record type '{0}'. expected one of: cloud | storage | energy | ip")]
pub struct UnknownRecordKind(pub String);

impl FromStr for RecordKind {
    type Err = UnknownRecordKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        RecordKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or(UnknownRecordKind(wanted))
    }
}

// ---------------------------------------------------------------------------
// Cloud (compute) record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Benchmark {
    pub benchmark_type: String,
    pub value: f64,
}

/// Accounting record for one compute resource over one window.
///
/// Built fresh per window and never mutated once handed to sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloudRecord {
    pub resource_id: String,
    pub name: String,
    pub site_name: String,
    pub compute_service: String,
    pub owner_id: String,
    pub group_id: String,
    pub vo: String,
    pub status: ResourceStatus,
    /// Upstream creation instant; the ordering key for record sets.
    pub created_at: NaiveDateTime,
    /// Resolved start clamped to the window.
    pub start_time: NaiveDateTime,
    /// Absent when the resource is still running as of the window end.
    pub end_time: Option<NaiveDateTime>,
    #[serde(rename = "wall_duration")]
    pub wall: Overridable<i64>,
    #[serde(rename = "cpu_duration")]
    pub cpu: Overridable<i64>,
    pub cpu_count: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    pub image_id: String,
    pub public_ip_count: u32,
    pub benchmark: Option<Benchmark>,
}

impl CloudRecord {
    pub fn wall_duration_secs(&self) -> i64 {
        self.wall.get()
    }

    pub fn cpu_duration_secs(&self) -> i64 {
        self.cpu.get()
    }
}

// ---------------------------------------------------------------------------
// Storage record
// ---------------------------------------------------------------------------

/// Accounting record for one block-storage volume over one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageRecord {
    pub resource_id: String,
    pub name: String,
    pub site_name: String,
    pub compute_service: String,
    pub owner_id: String,
    pub group_id: String,
    pub vo: String,
    pub status: String,
    pub capacity_gb: u64,
    pub created_at: NaiveDateTime,
    pub start_time: NaiveDateTime,
    /// Always the window end, so republishing a window is reproducible.
    pub measure_time: NaiveDateTime,
    pub active_duration: i64,
    pub attached_to: Option<String>,
    pub attached_duration: i64,
}

// ---------------------------------------------------------------------------
// Energy record
// ---------------------------------------------------------------------------

/// Energy drawn by one compute resource over one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyRecord {
    pub resource_id: String,
    pub site_name: String,
    pub compute_service: String,
    pub owner_id: String,
    pub group_id: String,
    pub vo: String,
    pub status: ResourceStatus,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Measured energy after the normalisation factor was applied.
    pub energy_wh: f64,
    /// CPU seconds per watt-hour; 0 when no energy was drawn.
    pub work: f64,
    /// CPU seconds per vCPU-second of wall time.
    pub efficiency: f64,
    pub wall_duration: i64,
    pub cpu_duration: i64,
    pub suspend_duration: i64,
    pub cpu_normalization_factor: f64,
    /// The resource ended inside the window.
    pub finished: bool,
}

// ---------------------------------------------------------------------------
// Public IP record
// ---------------------------------------------------------------------------

/// Public addresses held by one owner of a subject at the window end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpRecord {
    pub site_name: String,
    pub compute_service: String,
    pub owner_id: Option<String>,
    pub group_id: String,
    pub vo: String,
    pub measure_time: NaiveDateTime,
    pub ip_version: u8,
    pub public_ip_count: u32,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "record_type", rename_all = "lowercase")]
pub enum Record {
    Cloud(CloudRecord),
    Storage(StorageRecord),
    Energy(EnergyRecord),
    Ip(IpRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Cloud(_) => RecordKind::Cloud,
            Record::Storage(_) => RecordKind::Storage,
            Record::Energy(_) => RecordKind::Energy,
            Record::Ip(_) => RecordKind::Ip,
        }
    }
}

impl From<CloudRecord> for Record {
    fn from(r: CloudRecord) -> Self {
        Record::Cloud(r)
    }
}

impl From<StorageRecord> for Record {
    fn from(r: StorageRecord) -> Self {
        Record::Storage(r)
    }
}

impl From<EnergyRecord> for Record {
    fn from(r: EnergyRecord) -> Self {
        Record::Energy(r)
    }
}

impl From<IpRecord> for Record {
    fn from(r: IpRecord) -> Self {
        Record::Ip(r)
    }
}
