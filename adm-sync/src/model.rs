//! Typed topology records shared by the source and target adapters.

use std::fmt::{self, Display, Formatter};

use graph_diff_core::{Attributes, Entity, Identity, Value};
use serde::{Deserialize, Serialize};

/// Name of the synthetic port that carries a device's management address.
pub const MANAGEMENT_PORT: &str = "Management";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Site,
    Device,
    Port,
    Subnet,
    Address,
    Binding,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Site => "site",
            EntityKind::Device => "device",
            EntityKind::Port => "port",
            EntityKind::Subnet => "subnet",
            EntityKind::Address => "address",
            EntityKind::Binding => "binding",
        };
        f.write_str(name)
    }
}

/// A datacenter. `region` is empty when the datacenter has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    #[serde(default)]
    pub region: String,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl Site {
    pub fn key(name: &str, region: &str) -> Identity {
        Identity::new([name, region])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub model: Option<String>,
    pub role: String,
    pub serial: Option<String>,
    pub site: Option<String>,
    pub status: String,
    pub tenant: Option<String>,
    pub os_version: Option<String>,
    pub ha_peer: Option<String>,
}

impl Device {
    pub fn key(name: &str) -> Identity {
        Identity::new([name])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub device: String,
    pub status: String,
    pub description: Option<String>,
}

impl Port {
    pub fn key(name: &str, device: &str) -> Identity {
        Identity::new([name, device])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub prefix: String,
    pub namespace: String,
    pub tenant: Option<String>,
}

impl Subnet {
    pub fn key(prefix: &str, namespace: &str) -> Identity {
        Identity::new([prefix, namespace])
    }
}

/// An IP address in CIDR form together with its parent prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
    pub prefix: String,
    pub tenant: Option<String>,
    /// Kept sorted.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Address {
    pub fn key(address: &str, prefix: &str) -> Identity {
        Identity::new([address, prefix])
    }
}

/// An address assigned to one port of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub address: String,
    pub device: String,
    pub port: String,
    #[serde(default)]
    pub primary: bool,
}

impl Binding {
    pub fn key(address: &str, device: &str, port: &str) -> Identity {
        Identity::new([address, device, port])
    }
}

/// Any of the six topology records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Site(Site),
    Device(Device),
    Port(Port),
    Subnet(Subnet),
    Address(Address),
    Binding(Binding),
}

impl Entity for Record {
    type Kind = EntityKind;

    const TOP_LEVEL: &'static [EntityKind] = &[
        EntityKind::Site,
        EntityKind::Device,
        EntityKind::Subnet,
        EntityKind::Address,
        EntityKind::Binding,
    ];
    const DELETE_ORDER: &'static [EntityKind] = &[
        EntityKind::Address,
        EntityKind::Binding,
        EntityKind::Subnet,
        EntityKind::Port,
        EntityKind::Device,
        EntityKind::Site,
    ];

    fn kind(&self) -> EntityKind {
        match self {
            Record::Site(_) => EntityKind::Site,
            Record::Device(_) => EntityKind::Device,
            Record::Port(_) => EntityKind::Port,
            Record::Subnet(_) => EntityKind::Subnet,
            Record::Address(_) => EntityKind::Address,
            Record::Binding(_) => EntityKind::Binding,
        }
    }

    fn identity(&self) -> Identity {
        match self {
            Record::Site(site) => Site::key(&site.name, &site.region),
            Record::Device(device) => Device::key(&device.name),
            Record::Port(port) => Port::key(&port.name, &port.device),
            Record::Subnet(subnet) => Subnet::key(&subnet.prefix, &subnet.namespace),
            Record::Address(addr) => Address::key(&addr.address, &addr.prefix),
            Record::Binding(binding) => {
                Binding::key(&binding.address, &binding.device, &binding.port)
            }
        }
    }

    fn attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        match self {
            Record::Site(site) => {
                attrs.insert("latitude", Value::from(site.latitude.clone()));
                attrs.insert("longitude", Value::from(site.longitude.clone()));
            }
            Record::Device(device) => {
                attrs.insert("model", Value::from(device.model.clone()));
                attrs.insert("role", Value::from(device.role.as_str()));
                attrs.insert("serial", Value::from(device.serial.clone()));
                attrs.insert("site", Value::from(device.site.clone()));
                attrs.insert("status", Value::from(device.status.as_str()));
                attrs.insert("tenant", Value::from(device.tenant.clone()));
                attrs.insert("os_version", Value::from(device.os_version.clone()));
                attrs.insert("ha_peer", Value::from(device.ha_peer.clone()));
            }
            Record::Port(port) => {
                attrs.insert("status", Value::from(port.status.as_str()));
                attrs.insert("description", Value::from(port.description.clone()));
            }
            Record::Subnet(subnet) => {
                attrs.insert("tenant", Value::from(subnet.tenant.clone()));
            }
            Record::Address(addr) => {
                attrs.insert("tenant", Value::from(addr.tenant.clone()));
                attrs.insert("tags", Value::from(addr.tags.clone()));
            }
            Record::Binding(binding) => {
                attrs.insert("primary", Value::from(binding.primary));
            }
        }
        attrs
    }

    fn set_attributes(&mut self, changes: &Attributes) {
        for (name, value) in changes {
            match self {
                Record::Site(site) => match *name {
                    "latitude" => site.latitude = value.to_option_string(),
                    "longitude" => site.longitude = value.to_option_string(),
                    _ => {}
                },
                Record::Device(device) => match *name {
                    "model" => device.model = value.to_option_string(),
                    "role" => set_text(&mut device.role, value),
                    "serial" => device.serial = value.to_option_string(),
                    "site" => device.site = value.to_option_string(),
                    "status" => set_text(&mut device.status, value),
                    "tenant" => device.tenant = value.to_option_string(),
                    "os_version" => device.os_version = value.to_option_string(),
                    "ha_peer" => device.ha_peer = value.to_option_string(),
                    _ => {}
                },
                Record::Port(port) => match *name {
                    "status" => set_text(&mut port.status, value),
                    "description" => port.description = value.to_option_string(),
                    _ => {}
                },
                Record::Subnet(subnet) => {
                    if *name == "tenant" {
                        subnet.tenant = value.to_option_string();
                    }
                }
                Record::Address(addr) => match *name {
                    "tenant" => addr.tenant = value.to_option_string(),
                    "tags" => addr.tags = value.as_list().map(<[String]>::to_vec).unwrap_or_default(),
                    _ => {}
                },
                Record::Binding(binding) => {
                    if *name == "primary" {
                        binding.primary = value.as_bool().unwrap_or(false);
                    }
                }
            }
        }
    }
}

fn set_text(field: &mut String, value: &Value) {
    *field = value.as_text().unwrap_or_default().to_string();
}

/// Normalize a coordinate to six decimal places so both sides compare
/// exactly. Unparseable or empty input yields `None`.
pub fn normalize_coordinate(raw: &str) -> Option<String> {
    let parsed: f64 = raw.trim().parse().ok()?;
    Some(format!("{parsed:.6}"))
}

/// Sort and de-duplicate a tag list.
pub fn sorted_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tags: Vec<String> = tags.into_iter().map(Into::into).collect();
    tags.sort();
    tags.dedup();
    tags
}
