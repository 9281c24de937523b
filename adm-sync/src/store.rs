//! JSON-file-backed source-of-truth inventory.
//!
//! Records are kept in insertion order per kind. Deletes refuse to orphan
//! dependent records and report [`StoreError::Protected`] instead, so the
//! entity stays until a later pass removes its dependents first.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use graph_diff_core::{Attributes, Entity, Store, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{Address, Binding, Device, Port, Record, Site, Subnet};

/// Provenance fields stamped on synced records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomFields {
    pub system_of_record: Option<String>,
    pub last_synchronized: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stored<T> {
    #[serde(flatten)]
    pub record: T,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

impl<T> Stored<T> {
    fn new(record: T) -> Self {
        Self {
            record,
            custom_fields: CustomFields::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDevice {
    #[serde(flatten)]
    pub device: Device,
    #[serde(default)]
    pub primary_ip4: Option<String>,
    #[serde(default)]
    pub primary_ip6: Option<String>,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

impl StoredDevice {
    /// Whether `address` (CIDR form) is this device's primary address.
    pub fn is_primary(&self, address: &str) -> bool {
        self.primary_ip4.as_deref() == Some(address) || self.primary_ip6.as_deref() == Some(address)
    }

    fn primary_slot(&mut self, address: &str) -> &mut Option<String> {
        if address.contains(':') {
            &mut self.primary_ip6
        } else {
            &mut self.primary_ip4
        }
    }
}

/// An address assigned to a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub address: String,
    pub device: String,
    pub port: String,
}

impl Assignment {
    fn matches(&self, binding: &Binding) -> bool {
        self.address == binding.address && self.device == binding.device && self.port == binding.port
    }
}

/// On-disk document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub sites: Vec<Site>,
    pub devices: Vec<StoredDevice>,
    pub ports: Vec<Stored<Port>>,
    pub subnets: Vec<Stored<Subnet>>,
    pub addresses: Vec<Stored<Address>>,
    pub assignments: Vec<Assignment>,
}

impl Inventory {
    pub fn device(&self, name: &str) -> Option<&StoredDevice> {
        self.devices.iter().find(|d| d.device.name == name)
    }

    fn device_mut(&mut self, name: &str) -> Option<&mut StoredDevice> {
        self.devices.iter_mut().find(|d| d.device.name == name)
    }

    fn has_port(&self, name: &str, device: &str) -> bool {
        self.ports
            .iter()
            .any(|p| p.record.name == name && p.record.device == device)
    }

    fn has_address(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a.record.address == address)
    }
}

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to read inventory {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse inventory {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to serialize inventory: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct InventoryStore {
    path: Option<PathBuf>,
    inventory: Inventory,
}

impl InventoryStore {
    /// Open the inventory at `path`. A missing file is an empty inventory.
    pub fn open(path: &Path) -> Result<Self, InventoryError> {
        let inventory = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|source| InventoryError::Io {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| InventoryError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            debug!(path = %path.display(), "inventory file not found, starting empty");
            Inventory::default()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            inventory,
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory(inventory: Inventory) -> Self {
        Self {
            path: None,
            inventory,
        }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn save(&self) -> Result<(), InventoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| InventoryError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = serde_json::to_string_pretty(&self.inventory)?;
        fs::write(path, raw + "\n").map_err(io_err)?;
        debug!(path = %path.display(), "inventory saved");
        Ok(())
    }

    /// Stamp provenance on the stored record. Sites and bindings carry no
    /// custom fields; returns whether a record was stamped.
    pub fn stamp(&mut self, record: &Record, source_name: &str, date: NaiveDate) -> bool {
        let fields = match record {
            Record::Device(device) => self
                .inventory
                .device_mut(&device.name)
                .map(|d| &mut d.custom_fields),
            Record::Port(port) => self
                .inventory
                .ports
                .iter_mut()
                .find(|p| p.record.name == port.name && p.record.device == port.device)
                .map(|p| &mut p.custom_fields),
            Record::Subnet(subnet) => self
                .inventory
                .subnets
                .iter_mut()
                .find(|s| s.record.prefix == subnet.prefix && s.record.namespace == subnet.namespace)
                .map(|s| &mut s.custom_fields),
            Record::Address(addr) => self
                .inventory
                .addresses
                .iter_mut()
                .find(|a| a.record.address == addr.address && a.record.prefix == addr.prefix)
                .map(|a| &mut a.custom_fields),
            Record::Site(_) | Record::Binding(_) => None,
        };
        match fields {
            Some(fields) => {
                fields.system_of_record = Some(source_name.to_string());
                fields.last_synchronized = Some(date);
                true
            }
            None => false,
        }
    }

    fn set_primary(&mut self, binding: &Binding) {
        if let Some(device) = self.inventory.device_mut(&binding.device) {
            *device.primary_slot(&binding.address) = Some(binding.address.clone());
        }
    }

    fn clear_primary(&mut self, device: &str, address: &str) {
        if let Some(device) = self.inventory.device_mut(device) {
            let slot = device.primary_slot(address);
            if slot.as_deref() == Some(address) {
                *slot = None;
            }
        }
    }

    fn create_binding(&mut self, binding: &Binding) -> Result<(), StoreError> {
        if !self.inventory.has_address(&binding.address) {
            return Err(StoreError::MissingDependency(format!(
                "address {} does not exist",
                binding.address
            )));
        }
        if !self.inventory.has_port(&binding.port, &binding.device) {
            return Err(StoreError::MissingDependency(format!(
                "port {} on {} does not exist",
                binding.port, binding.device
            )));
        }
        if self.inventory.assignments.iter().any(|a| a.matches(binding)) {
            return Err(duplicate(&Record::Binding(binding.clone())));
        }
        self.inventory.assignments.push(Assignment {
            address: binding.address.clone(),
            device: binding.device.clone(),
            port: binding.port.clone(),
        });
        if binding.primary {
            self.set_primary(binding);
        }
        Ok(())
    }
}

impl Store<Record> for InventoryStore {
    fn create(&mut self, entity: &Record) -> Result<Option<Record>, StoreError> {
        let inv = &mut self.inventory;
        match entity {
            Record::Site(site) => {
                if let Some(existing) = inv.sites.iter().find(|s| s.name == site.name) {
                    debug!(site = %site.name, region = %existing.region, "site already exists");
                    return Ok(None);
                }
                inv.sites.push(site.clone());
            }
            Record::Device(device) => {
                if inv.device(&device.name).is_some() {
                    return Err(duplicate(entity));
                }
                if let Some(site) = &device.site {
                    if !inv.sites.iter().any(|s| &s.name == site) {
                        return Err(StoreError::MissingDependency(format!(
                            "site {site} does not exist"
                        )));
                    }
                }
                inv.devices.push(StoredDevice {
                    device: device.clone(),
                    primary_ip4: None,
                    primary_ip6: None,
                    custom_fields: CustomFields::default(),
                });
            }
            Record::Port(port) => {
                if inv.device(&port.device).is_none() {
                    return Err(StoreError::MissingDependency(format!(
                        "device {} does not exist",
                        port.device
                    )));
                }
                if inv.has_port(&port.name, &port.device) {
                    return Err(duplicate(entity));
                }
                inv.ports.push(Stored::new(port.clone()));
            }
            Record::Subnet(subnet) => {
                if inv
                    .subnets
                    .iter()
                    .any(|s| s.record.prefix == subnet.prefix && s.record.namespace == subnet.namespace)
                {
                    return Err(duplicate(entity));
                }
                inv.subnets.push(Stored::new(subnet.clone()));
            }
            Record::Address(addr) => {
                if !inv.subnets.iter().any(|s| s.record.prefix == addr.prefix) {
                    return Err(StoreError::MissingDependency(format!(
                        "subnet {} does not exist",
                        addr.prefix
                    )));
                }
                if inv
                    .addresses
                    .iter()
                    .any(|a| a.record.address == addr.address && a.record.prefix == addr.prefix)
                {
                    return Err(duplicate(entity));
                }
                inv.addresses.push(Stored::new(addr.clone()));
            }
            Record::Binding(binding) => self.create_binding(binding)?,
        }
        debug!(kind = %entity.kind(), identity = %entity.identity(), "record created");
        Ok(Some(entity.clone()))
    }

    fn update(&mut self, current: &Record, changes: &Attributes) -> Result<Record, StoreError> {
        let mut updated = current.clone();
        updated.set_attributes(changes);
        let inv = &mut self.inventory;
        match &updated {
            Record::Site(site) => {
                let slot = inv
                    .sites
                    .iter_mut()
                    .find(|s| s.name == site.name && s.region == site.region)
                    .ok_or_else(|| missing(current))?;
                *slot = site.clone();
            }
            Record::Device(device) => {
                if let Some(site) = &device.site {
                    if !inv.sites.iter().any(|s| &s.name == site) {
                        return Err(StoreError::MissingDependency(format!(
                            "site {site} does not exist"
                        )));
                    }
                }
                let slot = inv.device_mut(&device.name).ok_or_else(|| missing(current))?;
                slot.device = device.clone();
            }
            Record::Port(port) => {
                let slot = inv
                    .ports
                    .iter_mut()
                    .find(|p| p.record.name == port.name && p.record.device == port.device)
                    .ok_or_else(|| missing(current))?;
                slot.record = port.clone();
            }
            Record::Subnet(subnet) => {
                let slot = inv
                    .subnets
                    .iter_mut()
                    .find(|s| s.record.prefix == subnet.prefix && s.record.namespace == subnet.namespace)
                    .ok_or_else(|| missing(current))?;
                slot.record = subnet.clone();
            }
            Record::Address(addr) => {
                let slot = inv
                    .addresses
                    .iter_mut()
                    .find(|a| a.record.address == addr.address && a.record.prefix == addr.prefix)
                    .ok_or_else(|| missing(current))?;
                slot.record = addr.clone();
            }
            Record::Binding(binding) => {
                if !inv.assignments.iter().any(|a| a.matches(binding)) {
                    return Err(missing(current));
                }
                if binding.primary {
                    self.set_primary(binding);
                } else {
                    self.clear_primary(&binding.device, &binding.address);
                }
            }
        }
        debug!(kind = %updated.kind(), identity = %updated.identity(), "record updated");
        Ok(updated)
    }

    fn delete(&mut self, entity: &Record) -> Result<(), StoreError> {
        let inv = &mut self.inventory;
        match entity {
            Record::Site(site) => {
                if inv
                    .devices
                    .iter()
                    .any(|d| d.device.site.as_deref() == Some(site.name.as_str()))
                {
                    return Err(protected(entity, "devices still reference it"));
                }
                inv.sites
                    .retain(|s| !(s.name == site.name && s.region == site.region));
            }
            Record::Device(device) => {
                if inv.ports.iter().any(|p| p.record.device == device.name) {
                    return Err(protected(entity, "it still has ports"));
                }
                inv.devices.retain(|d| d.device.name != device.name);
            }
            Record::Port(port) => {
                if inv
                    .assignments
                    .iter()
                    .any(|a| a.device == port.device && a.port == port.name)
                {
                    return Err(protected(entity, "addresses are still assigned to it"));
                }
                inv.ports
                    .retain(|p| !(p.record.name == port.name && p.record.device == port.device));
            }
            Record::Subnet(subnet) => {
                if inv.addresses.iter().any(|a| a.record.prefix == subnet.prefix) {
                    return Err(protected(entity, "it still contains addresses"));
                }
                inv.subnets.retain(|s| {
                    !(s.record.prefix == subnet.prefix && s.record.namespace == subnet.namespace)
                });
            }
            Record::Address(addr) => {
                inv.addresses
                    .retain(|a| !(a.record.address == addr.address && a.record.prefix == addr.prefix));
                if !inv.has_address(&addr.address) {
                    inv.assignments.retain(|a| a.address != addr.address);
                    for device in &mut inv.devices {
                        let slot = device.primary_slot(&addr.address);
                        if slot.as_deref() == Some(addr.address.as_str()) {
                            *slot = None;
                        }
                    }
                }
            }
            Record::Binding(binding) => {
                inv.assignments.retain(|a| !a.matches(binding));
                self.clear_primary(&binding.device, &binding.address);
            }
        }
        debug!(kind = %entity.kind(), identity = %entity.identity(), "record deleted");
        Ok(())
    }
}

fn duplicate(entity: &Record) -> StoreError {
    StoreError::Rejected(format!("{} {} already exists", entity.kind(), entity.identity()))
}

fn missing(entity: &Record) -> StoreError {
    StoreError::Rejected(format!("{} {} does not exist", entity.kind(), entity.identity()))
}

fn protected(entity: &Record, reason: &str) -> StoreError {
    StoreError::Protected(format!("{} {}: {reason}", entity.kind(), entity.identity()))
}
