//! Raw records reported by the device-management system and the client
//! contract used to fetch them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// A datacenter as reported by the management system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteRecord {
    pub id: String,
    pub name: String,
    pub region: String,
    pub latitude: String,
    pub longitude: String,
}

/// A managed device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRecord {
    pub hostname: String,
    pub display_name: String,
    /// Address the management system proxies per-device calls through.
    pub ip_address: String,
    #[serde(rename = "type")]
    pub model: String,
    pub serialnumber: String,
    pub datacenter_id: String,
    pub instance_state: String,
    pub version: String,
    pub mgmt_ip_address: String,
    pub netmask: String,
    pub ha_ip_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceBinding {
    #[serde(rename = "id")]
    pub vlan_id: String,
    pub ifnum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ipv4Binding {
    #[serde(rename = "id")]
    pub vlan_id: String,
    pub ipaddress: String,
    pub netmask: String,
}

/// `ipaddress` carries `address/prefixlen`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ipv6Binding {
    #[serde(rename = "id")]
    pub vlan_id: String,
    pub ipaddress: String,
}

/// Interfaces and addresses bound to one VLAN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VlanBinding {
    #[serde(rename = "id")]
    pub vlan_id: String,
    #[serde(rename = "vlan_port_binding", alias = "interface_bindings")]
    pub interface_bindings: Vec<InterfaceBinding>,
    #[serde(rename = "vlan_nsip_binding", alias = "ipv4_bindings")]
    pub ipv4_bindings: Vec<Ipv4Binding>,
    #[serde(rename = "vlan_nsip6_binding", alias = "ipv6_bindings")]
    pub ipv6_bindings: Vec<Ipv6Binding>,
}

/// An IPv4 address owned by the device, tagged with its role (`NSIP`,
/// `SNIP`, `MIP`, `VIP`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NsipRecord {
    pub ipaddress: String,
    pub netmask: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// An IPv6 address owned by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nsip6Record {
    /// `address/prefixlen`.
    pub ipv6address: String,
    pub scope: String,
    pub vlan: String,
}

/// Errors returned by feed clients.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse snapshot {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("no {feed} data for device {host}")]
    MissingDevice { feed: &'static str, host: String },
    #[error("not logged in to {0}")]
    NotLoggedIn(String),
}

/// Session-scoped access to one management-system instance.
pub trait FeedClient {
    /// Configured instance name.
    fn instance(&self) -> &str;

    fn login(&mut self) -> Result<(), FeedError>;

    fn logout(&mut self) -> Result<(), FeedError>;

    fn get_sites(&self) -> Result<Vec<SiteRecord>, FeedError>;

    fn get_devices(&self) -> Result<Vec<DeviceRecord>, FeedError>;

    fn get_vlan_bindings(&self, device: &DeviceRecord) -> Result<Vec<VlanBinding>, FeedError>;

    fn get_nsip(&self, device: &DeviceRecord) -> Result<Vec<NsipRecord>, FeedError>;

    fn get_nsip6(&self, device: &DeviceRecord) -> Result<Vec<Nsip6Record>, FeedError>;
}

/// Every feed of one instance captured in a single JSON document. Per-device
/// feeds are keyed by hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub sites: Vec<SiteRecord>,
    pub devices: Vec<DeviceRecord>,
    pub vlan_bindings: BTreeMap<String, Vec<VlanBinding>>,
    pub nsip: BTreeMap<String, Vec<NsipRecord>>,
    pub nsip6: BTreeMap<String, Vec<Nsip6Record>>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self, FeedError> {
        let raw = fs::read_to_string(path).map_err(|source| FeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| FeedError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Feed client that serves records from a [`Snapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    instance: String,
    source: Option<PathBuf>,
    snapshot: Snapshot,
    logged_in: bool,
}

impl SnapshotClient {
    pub fn new(instance: &str, snapshot: Snapshot) -> Self {
        Self {
            instance: instance.to_string(),
            source: None,
            snapshot,
            logged_in: false,
        }
    }

    pub fn open(instance: &str, path: &Path) -> Result<Self, FeedError> {
        let mut client = Self::new(instance, Snapshot::load(path)?);
        client.source = Some(path.to_path_buf());
        Ok(client)
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn session(&self) -> Result<&Snapshot, FeedError> {
        if self.logged_in {
            Ok(&self.snapshot)
        } else {
            Err(FeedError::NotLoggedIn(self.instance.clone()))
        }
    }

    fn per_device<T: Clone>(
        feed: &'static str,
        map: &BTreeMap<String, Vec<T>>,
        device: &DeviceRecord,
    ) -> Result<Vec<T>, FeedError> {
        map.get(&device.hostname)
            .cloned()
            .ok_or_else(|| FeedError::MissingDevice {
                feed,
                host: device.hostname.clone(),
            })
    }
}

impl FeedClient for SnapshotClient {
    fn instance(&self) -> &str {
        &self.instance
    }

    fn login(&mut self) -> Result<(), FeedError> {
        info!(
            instance = %self.instance,
            snapshot = ?self.source,
            "opening feed session"
        );
        self.logged_in = true;
        Ok(())
    }

    fn logout(&mut self) -> Result<(), FeedError> {
        debug!(instance = %self.instance, "closing feed session");
        self.logged_in = false;
        Ok(())
    }

    fn get_sites(&self) -> Result<Vec<SiteRecord>, FeedError> {
        Ok(self.session()?.sites.clone())
    }

    fn get_devices(&self) -> Result<Vec<DeviceRecord>, FeedError> {
        Ok(self.session()?.devices.clone())
    }

    fn get_vlan_bindings(&self, device: &DeviceRecord) -> Result<Vec<VlanBinding>, FeedError> {
        let snapshot = self.session()?;
        Self::per_device("vlan binding", &snapshot.vlan_bindings, device)
    }

    fn get_nsip(&self, device: &DeviceRecord) -> Result<Vec<NsipRecord>, FeedError> {
        let snapshot = self.session()?;
        Self::per_device("nsip", &snapshot.nsip, device)
    }

    fn get_nsip6(&self, device: &DeviceRecord) -> Result<Vec<Nsip6Record>, FeedError> {
        let snapshot = self.session()?;
        Self::per_device("nsip6", &snapshot.nsip6, device)
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceRecord, FeedClient, FeedError, Snapshot, SnapshotClient, VlanBinding};

    const RAW: &str = r#"{
        "devices": [{"hostname": "lb01", "type": "nsvpx", "instance_state": "Up"}],
        "vlan_bindings": {
            "lb01": [{
                "id": "10",
                "vlan_port_binding": [{"id": "10", "ifnum": "1/1"}],
                "vlan_nsip_binding": [{"id": "10", "ipaddress": "10.1.1.5", "netmask": "255.255.255.0"}]
            }]
        }
    }"#;

    fn device(host: &str) -> DeviceRecord {
        DeviceRecord {
            hostname: host.to_string(),
            ..DeviceRecord::default()
        }
    }

    #[test]
    fn snapshot_reads_wire_field_names() {
        let snapshot: Snapshot = serde_json::from_str(RAW).expect("parse");
        assert_eq!(snapshot.devices[0].model, "nsvpx");
        let binding = &snapshot.vlan_bindings["lb01"][0];
        assert_eq!(binding.interface_bindings[0].ifnum, "1/1");
        assert_eq!(binding.ipv4_bindings[0].netmask, "255.255.255.0");
        assert!(binding.ipv6_bindings.is_empty());
    }

    #[test]
    fn semantic_aliases_are_accepted() {
        let binding: VlanBinding = serde_json::from_str(
            r#"{"id": "1", "interface_bindings": [{"ifnum": "0/1"}], "ipv4_bindings": []}"#,
        )
        .expect("parse");
        assert_eq!(binding.interface_bindings[0].ifnum, "0/1");
    }

    #[test]
    fn getters_require_a_session() {
        let mut client = SnapshotClient::new("adm", serde_json::from_str(RAW).expect("parse"));
        assert!(matches!(client.get_devices(), Err(FeedError::NotLoggedIn(_))));

        client.login().expect("login");
        assert_eq!(client.get_devices().expect("devices").len(), 1);
        client.logout().expect("logout");
        assert!(!client.is_logged_in());
    }

    #[test]
    fn unknown_host_is_a_feed_failure() {
        let mut client = SnapshotClient::new("adm", serde_json::from_str(RAW).expect("parse"));
        client.login().expect("login");
        assert_eq!(client.get_vlan_bindings(&device("lb01")).expect("bindings").len(), 1);
        let err = client.get_nsip(&device("lb01")).expect_err("no nsip for lb01");
        assert!(matches!(err, FeedError::MissingDevice { feed: "nsip", .. }));
    }
}
