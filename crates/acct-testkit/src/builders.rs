use acct_schemas::{
    parse_instant, Address, AddressKind, EnergyReading, FlavorRef, ImageRef, PublicIpAllocation,
    ResourceSnapshot, ResourceStatus, UsageAggregateEntry, VolumeAttachment, VolumeSnapshot,
};
use chrono::NaiveDateTime;

/// Parse a test instant; panics on malformed input.
pub fn instant(raw: &str) -> NaiveDateTime {
    parse_instant(raw).unwrap_or_else(|| panic!("bad test instant '{raw}'"))
}

/// Fluent builder for [`ResourceSnapshot`]. Defaults: active, launched at
/// creation, one vCPU, owner `user-1`, group `proj-1`.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    snap: ResourceSnapshot,
}

impl SnapshotBuilder {
    pub fn new(id: &str, created_at: NaiveDateTime) -> Self {
        Self {
            snap: ResourceSnapshot {
                id: id.to_string(),
                name: format!("{id}-name"),
                owner_id: "user-1".to_string(),
                group_id: "proj-1".to_string(),
                created_at,
                status: ResourceStatus::Active,
                terminated_at: None,
                launched_at: Some(created_at),
                updated_at: None,
                image: ImageRef {
                    id: "img-default".to_string(),
                    ..ImageRef::default()
                },
                flavor: FlavorRef {
                    id: "m1.tiny".to_string(),
                    vcpus: 1,
                    memory_mb: 512,
                    disk_gb: 1,
                    ..FlavorRef::default()
                },
                addresses: Vec::new(),
            },
        }
    }

    pub fn status(mut self, status: ResourceStatus) -> Self {
        self.snap.status = status;
        self
    }

    pub fn never_launched(mut self) -> Self {
        self.snap.launched_at = None;
        self
    }

    pub fn launched(mut self, at: NaiveDateTime) -> Self {
        self.snap.launched_at = Some(at);
        self
    }

    pub fn terminated(mut self, at: NaiveDateTime) -> Self {
        self.snap.terminated_at = Some(at);
        self
    }

    pub fn updated(mut self, at: NaiveDateTime) -> Self {
        self.snap.updated_at = Some(at);
        self
    }

    pub fn owner(mut self, owner_id: &str, group_id: &str) -> Self {
        self.snap.owner_id = owner_id.to_string();
        self.snap.group_id = group_id.to_string();
        self
    }

    pub fn flavor(mut self, vcpus: u32, memory_mb: u64, disk_gb: u64) -> Self {
        self.snap.flavor.vcpus = vcpus;
        self.snap.flavor.memory_mb = memory_mb;
        self.snap.flavor.disk_gb = disk_gb;
        self
    }

    pub fn extra_spec(mut self, key: &str, value: &str) -> Self {
        self.snap
            .flavor
            .extra_specs
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn image(mut self, id: &str) -> Self {
        self.snap.image.id = id.to_string();
        self
    }

    pub fn image_meta(mut self, key: &str, value: &str) -> Self {
        self.snap
            .image
            .metadata
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn address(mut self, addr: &str, kind: AddressKind) -> Self {
        self.snap.addresses.push(Address {
            addr: addr.to_string(),
            version: if addr.contains(':') { 6 } else { 4 },
            kind,
        });
        self
    }

    pub fn build(self) -> ResourceSnapshot {
        self.snap
    }
}

pub fn usage(
    resource_id: &str,
    started_at: NaiveDateTime,
    ended_at: Option<NaiveDateTime>,
    hours: f64,
) -> UsageAggregateEntry {
    UsageAggregateEntry {
        resource_id: resource_id.to_string(),
        memory_mb: 2048,
        vcpus: 2,
        disk_gb: 20,
        started_at,
        ended_at,
        hours,
    }
}

/// A volume in `status`, attached to `server` when given.
pub fn volume(
    id: &str,
    created_at: NaiveDateTime,
    deleted_at: Option<NaiveDateTime>,
    status: &str,
    attached: Option<(&str, NaiveDateTime)>,
) -> VolumeSnapshot {
    VolumeSnapshot {
        id: id.to_string(),
        name: format!("{id}-name"),
        owner_id: "user-1".to_string(),
        group_id: "proj-1".to_string(),
        created_at,
        deleted_at,
        status: status.to_string(),
        size_gb: 10,
        attachments: attached
            .into_iter()
            .map(|(server_id, at)| VolumeAttachment {
                server_id: server_id.to_string(),
                attached_at: Some(at),
            })
            .collect(),
    }
}

pub fn energy(resource_id: &str, energy_wh: f64) -> EnergyReading {
    EnergyReading {
        resource_id: resource_id.to_string(),
        energy_wh,
    }
}

/// A public address; the version follows the address text.
pub fn public_ip(
    id: &str,
    address: &str,
    owner: Option<&str>,
    created_at: NaiveDateTime,
) -> PublicIpAllocation {
    PublicIpAllocation {
        id: id.to_string(),
        address: address.to_string(),
        version: if address.contains(':') { 6 } else { 4 },
        owner_id: owner.map(str::to_string),
        created_at,
    }
}
