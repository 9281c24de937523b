//! Source side: builds the topology graph from a management-system feed.

use std::collections::HashMap;

use graph_diff_core::{Adapter, Entity, Graph, Identity, RunError};
use tracing::warn;

use crate::config::SyncSettings;
use crate::feed::{DeviceRecord, FeedClient, SiteRecord};
use crate::model::{
    normalize_coordinate, sorted_tags, Address, Binding, Device, EntityKind, Port, Record, Site,
    Subnet, MANAGEMENT_PORT,
};
use crate::parse::{netmask_to_prefix, parent_prefix, parse_version};
use crate::topology::{is_primary, reconstruct, DeviceFeeds, PortRecord};

/// A device that made it into the graph, with its reconstructed ports.
#[derive(Debug)]
struct LoadedDevice {
    record: DeviceRecord,
    ports: Vec<PortRecord>,
}

impl LoadedDevice {
    fn host(&self) -> &str {
        &self.record.hostname
    }

    fn mgmt_ip(&self) -> Option<&str> {
        let ip = self.record.mgmt_ip_address.trim();
        (!ip.is_empty()).then_some(ip)
    }
}

pub struct AdmAdapter<'a, C: FeedClient> {
    client: &'a C,
    settings: &'a SyncSettings,
    graph: Graph<Record>,
    sites: HashMap<String, SiteRecord>,
    devices: Vec<LoadedDevice>,
}

impl<'a, C: FeedClient> AdmAdapter<'a, C> {
    pub fn new(client: &'a C, settings: &'a SyncSettings) -> Self {
        Self {
            client,
            settings,
            graph: Graph::new(),
            sites: HashMap::new(),
            devices: Vec::new(),
        }
    }

    /// Index the datacenters by id. They enter the graph lazily, when the
    /// first device that references one is loaded.
    fn load_sites(&mut self) -> Result<(), RunError> {
        let sites = self.client.get_sites().map_err(|err| RunError::Load {
            side: self.client.instance().to_string(),
            message: err.to_string(),
        })?;
        for site in sites {
            if self.sites.contains_key(&site.id) {
                warn!(site = %site.name, id = %site.id, "duplicate site attempting to be loaded");
                continue;
            }
            self.sites.insert(site.id.clone(), site);
        }
        Ok(())
    }

    /// Add a datacenter to the graph unless it is already there and return
    /// its name.
    fn load_site(&mut self, site: &SiteRecord) -> String {
        let entity = Site {
            name: site.name.clone(),
            region: site.region.clone(),
            latitude: normalize_coordinate(&site.latitude),
            longitude: normalize_coordinate(&site.longitude),
        };
        if !self
            .graph
            .contains(EntityKind::Site, &Site::key(&entity.name, &entity.region))
        {
            crate::load_event!(self.settings.debug, site = %entity.name, "loading site");
            self.add(Record::Site(entity));
        }
        site.name.clone()
    }

    fn load_devices(&mut self) -> Result<(), RunError> {
        let devices = self.client.get_devices().map_err(|err| RunError::Load {
            side: self.client.instance().to_string(),
            message: err.to_string(),
        })?;

        for mut record in devices {
            let host = record.hostname.trim().to_string();
            if host.is_empty() {
                warn!(display_name = %record.display_name, "device without hostname will not be loaded");
                continue;
            }
            let Some(site) = self.sites.get(&record.datacenter_id).cloned() else {
                warn!(
                    host = %host,
                    datacenter = %record.datacenter_id,
                    "device references an unknown datacenter, skipping"
                );
                continue;
            };
            let site_name = self.load_site(&site);

            let device = Device {
                name: host.clone(),
                model: non_empty(&record.model),
                role: self.settings.roles.role_for(&host),
                serial: non_empty(&record.serialnumber),
                site: Some(site_name),
                status: if record.instance_state == "Up" {
                    "Active".to_string()
                } else {
                    "Offline".to_string()
                },
                tenant: self.settings.tenant.clone(),
                os_version: parse_version(&record.version),
                ha_peer: non_empty(&record.ha_ip_address),
            };
            crate::load_event!(self.settings.debug, host = %host, "loading device");
            if !self.add(Record::Device(device)) {
                continue;
            }

            record.hostname = host;
            let feeds = fetch_feeds(self.client, &record);
            let ports = reconstruct(&record.hostname, &feeds);
            self.devices.push(LoadedDevice { record, ports });
        }
        Ok(())
    }

    /// Ports of every loaded device. The management address gets the
    /// synthetic `Management` port unless a feed places it on a real one.
    fn load_ports(&mut self) {
        let devices = std::mem::take(&mut self.devices);
        for device in &devices {
            let host = device.host();
            let mgmt_ip = device.mgmt_ip();
            if mgmt_ip.is_some() {
                self.add_port(host, MANAGEMENT_PORT, Some(MANAGEMENT_PORT));
            }
            for port in &device.ports {
                if mgmt_ip == Some(port.ipaddress.as_str()) && port.port != MANAGEMENT_PORT {
                    self.retarget_port(host, &port.port);
                    continue;
                }
                self.add_port(host, &port.port, None);
            }
        }
        self.devices = devices;
    }

    fn load_addresses(&mut self) {
        let devices = std::mem::take(&mut self.devices);
        for device in &devices {
            let host = device.host();
            let mut mgmt_cidr = None;
            if let Some(ip) = device.mgmt_ip() {
                match netmask_to_prefix(&device.record.netmask) {
                    Ok(prefix) => {
                        self.add_address(host, ip, prefix, &["MGMT".to_string()], MANAGEMENT_PORT);
                        mgmt_cidr = Some((ip.to_string(), prefix));
                    }
                    Err(err) => warn!(host, %err, "management address not loaded"),
                }
            }

            for port in &device.ports {
                if let Some((ip, prefix)) = &mgmt_cidr {
                    if *ip == port.ipaddress && port.port != MANAGEMENT_PORT {
                        self.retarget_binding(host, ip, *prefix, port);
                        continue;
                    }
                }
                self.add_address(host, &port.ipaddress, port.netmask, &port.tags, &port.port);
            }
        }
        self.devices = devices;
    }

    fn add_port(&mut self, host: &str, name: &str, description: Option<&str>) {
        if self.graph.contains(EntityKind::Port, &Port::key(name, host)) {
            return;
        }
        let port = Record::Port(Port {
            name: name.to_string(),
            device: host.to_string(),
            status: "Active".to_string(),
            description: description.map(str::to_string),
        });
        if self.add(port.clone()) {
            if let Err(err) = self
                .graph
                .add_child(EntityKind::Device, &Device::key(host), &port)
            {
                warn!(host, port = name, %err, "port not attached to device");
            }
        }
    }

    /// Move the synthetic management port onto `port`, or drop it when that
    /// port is already loaded.
    fn retarget_port(&mut self, host: &str, port: &str) {
        let synthetic = Port::key(MANAGEMENT_PORT, host);
        if !self.graph.contains(EntityKind::Port, &synthetic) {
            return;
        }
        crate::load_event!(self.settings.debug, host, port, "retargeting management port");
        if self.graph.contains(EntityKind::Port, &Port::key(port, host)) {
            if let Err(err) = self.graph.remove(EntityKind::Port, &synthetic) {
                warn!(host, port, %err, "management port not dropped");
            }
            return;
        }
        let renamed = Record::Port(Port {
            name: port.to_string(),
            device: host.to_string(),
            status: "Active".to_string(),
            description: Some(MANAGEMENT_PORT.to_string()),
        });
        if let Err(err) = self.graph.rekey(EntityKind::Port, &synthetic, renamed) {
            warn!(host, port, %err, "management port not retargeted");
        }
    }

    fn retarget_binding(&mut self, host: &str, ip: &str, prefix: u8, port: &PortRecord) {
        let cidr = format!("{ip}/{prefix}");
        let synthetic = Binding::key(&cidr, host, MANAGEMENT_PORT);
        if self.graph.contains(EntityKind::Binding, &synthetic) {
            if self
                .graph
                .contains(EntityKind::Binding, &Binding::key(&cidr, host, &port.port))
            {
                if let Err(err) = self.graph.remove(EntityKind::Binding, &synthetic) {
                    warn!(host, address = %cidr, %err, "management binding not dropped");
                }
            } else {
                let moved = Record::Binding(Binding {
                    address: cidr.clone(),
                    device: host.to_string(),
                    port: port.port.clone(),
                    primary: true,
                });
                if let Err(err) = self.graph.rekey(EntityKind::Binding, &synthetic, moved) {
                    warn!(host, address = %cidr, %err, "management binding not retargeted");
                }
            }
        }

        let Ok(parent) = parent_prefix(ip, prefix) else {
            return;
        };
        if let Ok(Record::Address(address)) = self
            .graph
            .get_mut(EntityKind::Address, &Address::key(&cidr, &parent))
        {
            address.tags = sorted_tags(address.tags.iter().chain(&port.tags).cloned());
        }
    }

    /// Keep one primary address per device and IP family: the last one
    /// loaded. Bindings of every other address are demoted.
    fn collapse_primaries(&mut self) {
        let mut chosen: HashMap<(String, bool), String> = HashMap::new();
        for record in self.graph.get_all(EntityKind::Binding) {
            if let Record::Binding(binding) = record {
                if binding.primary {
                    chosen.insert(
                        (binding.device.clone(), binding.address.contains(':')),
                        binding.address.clone(),
                    );
                }
            }
        }

        let demoted: Vec<Identity> = self
            .graph
            .get_all(EntityKind::Binding)
            .filter(|record| match record {
                Record::Binding(binding) => {
                    binding.primary
                        && chosen.get(&(binding.device.clone(), binding.address.contains(':')))
                            != Some(&binding.address)
                }
                _ => false,
            })
            .map(Entity::identity)
            .collect();
        for identity in demoted {
            if let Ok(Record::Binding(binding)) = self.graph.get_mut(EntityKind::Binding, &identity) {
                crate::load_event!(
                    self.settings.debug,
                    host = %binding.device,
                    address = %binding.address,
                    "primary address superseded"
                );
                binding.primary = false;
            }
        }
    }

    /// Add an address, its parent subnet if absent, and its binding to
    /// `port`.
    fn add_address(&mut self, host: &str, ip: &str, prefix: u8, tags: &[String], port: &str) {
        let parent = match parent_prefix(ip, prefix) {
            Ok(parent) => parent,
            Err(err) => {
                warn!(host, %err, "address not loaded");
                return;
            }
        };
        let cidr = format!("{ip}/{prefix}");

        if !self
            .graph
            .contains(EntityKind::Subnet, &Subnet::key(&parent, &self.settings.namespace))
        {
            crate::load_event!(self.settings.debug, prefix = %parent, "loading subnet");
            self.add(Record::Subnet(Subnet {
                prefix: parent.clone(),
                namespace: self.settings.namespace.clone(),
                tenant: self.settings.tenant.clone(),
            }));
        }

        let address = Record::Address(Address {
            address: cidr.clone(),
            prefix: parent,
            tenant: self.settings.tenant.clone(),
            tags: sorted_tags(tags.iter().cloned()),
        });
        if self.graph.contains(EntityKind::Address, &address.identity()) {
            crate::load_event!(self.settings.debug, host, address = %cidr, "address shared with another port");
        } else {
            crate::load_event!(self.settings.debug, host, address = %cidr, "loading address");
            self.add(address);
        }

        self.add(Record::Binding(Binding {
            address: cidr,
            device: host.to_string(),
            port: port.to_string(),
            primary: is_primary(tags),
        }));
    }
}

impl<C: FeedClient> Adapter for AdmAdapter<'_, C> {
    type Entity = Record;

    fn name(&self) -> &str {
        self.client.instance()
    }

    fn graph(&self) -> &Graph<Record> {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut Graph<Record> {
        &mut self.graph
    }

    fn load(&mut self) -> Result<(), RunError> {
        self.load_sites()?;
        self.load_devices()?;
        self.load_ports();
        self.load_addresses();
        self.collapse_primaries();
        Ok(())
    }
}

/// Fetch the three per-device feeds. A failing feed degrades to empty.
pub fn fetch_feeds<C: FeedClient>(client: &C, device: &DeviceRecord) -> DeviceFeeds {
    let host = device.hostname.as_str();
    DeviceFeeds {
        vlan_bindings: client.get_vlan_bindings(device).unwrap_or_else(|err| {
            warn!(host, %err, "VLAN binding feed unavailable");
            Vec::new()
        }),
        nsip: client.get_nsip(device).unwrap_or_else(|err| {
            warn!(host, %err, "NSIP feed unavailable");
            Vec::new()
        }),
        nsip6: client.get_nsip6(device).unwrap_or_else(|err| {
            warn!(host, %err, "NSIP6 feed unavailable");
            Vec::new()
        }),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use graph_diff_core::{Adapter, Identity};
    use pretty_assertions::assert_eq;

    use crate::config::SyncSettings;
    use crate::feed::{
        DeviceRecord, FeedClient, InterfaceBinding, Ipv4Binding, NsipRecord, SiteRecord, Snapshot,
        SnapshotClient, VlanBinding,
    };
    use crate::model::{Binding, Device, EntityKind, Port, Record};
    use crate::parse::RoleMap;

    use super::AdmAdapter;

    fn site(id: &str, name: &str) -> SiteRecord {
        SiteRecord {
            id: id.to_string(),
            name: name.to_string(),
            region: "East".to_string(),
            latitude: "40.7531461".to_string(),
            longitude: "-73.989429".to_string(),
        }
    }

    fn device(host: &str, dc: &str, mgmt: &str) -> DeviceRecord {
        DeviceRecord {
            hostname: host.to_string(),
            model: "nsvpx".to_string(),
            serialnumber: "SN1".to_string(),
            datacenter_id: dc.to_string(),
            instance_state: "Up".to_string(),
            version: "NetScaler NS13.1: Build 37.38.nc, Date: Nov 23 2022".to_string(),
            mgmt_ip_address: mgmt.to_string(),
            netmask: "255.255.255.0".to_string(),
            ..DeviceRecord::default()
        }
    }

    fn bound(host: &str, port: &str, ip: &str) -> (String, Vec<VlanBinding>) {
        (
            host.to_string(),
            vec![VlanBinding {
                vlan_id: "10".to_string(),
                interface_bindings: vec![InterfaceBinding {
                    vlan_id: "10".to_string(),
                    ifnum: port.to_string(),
                }],
                ipv4_bindings: vec![Ipv4Binding {
                    vlan_id: "10".to_string(),
                    ipaddress: ip.to_string(),
                    netmask: "255.255.255.0".to_string(),
                }],
                ipv6_bindings: vec![],
            }],
        )
    }

    fn client(snapshot: Snapshot) -> SnapshotClient {
        let mut client = SnapshotClient::new("adm", snapshot);
        client.login().expect("login");
        client
    }

    fn ids(adapter: &AdmAdapter<'_, SnapshotClient>, kind: EntityKind) -> Vec<String> {
        adapter
            .get_all(kind)
            .map(|r| graph_diff_core::Entity::identity(r).to_string())
            .collect()
    }

    #[test]
    fn loads_device_with_derived_attributes() {
        let snapshot = Snapshot {
            sites: vec![site("dc1", "HQ"), site("dc2", "Unused")],
            devices: vec![device("ARIA-LB-01", "dc1", "")],
            ..Snapshot::default()
        };
        let client = client(snapshot);
        let settings = SyncSettings {
            tenant: Some("Ops".to_string()),
            roles: RoleMap::new([(".+LB.+", "Balancer")]).expect("roles"),
            ..SyncSettings::default()
        };
        let mut adapter = AdmAdapter::new(&client, &settings);
        adapter.load().expect("load");

        assert_eq!(ids(&adapter, EntityKind::Site), vec!["HQ__East"]);
        let Record::Device(dev) = adapter
            .get(EntityKind::Device, &Device::key("ARIA-LB-01"))
            .expect("device")
        else {
            panic!("not a device");
        };
        assert_eq!(dev.role, "Balancer");
        assert_eq!(dev.status, "Active");
        assert_eq!(dev.os_version.as_deref(), Some("NS13.1: Build 37.38.nc"));
        assert_eq!(dev.site.as_deref(), Some("HQ"));
        assert_eq!(dev.tenant.as_deref(), Some("Ops"));
        assert_eq!(dev.ha_peer, None);
    }

    #[test]
    fn skips_hostless_unknown_site_and_duplicate_devices() {
        let snapshot = Snapshot {
            sites: vec![site("dc1", "HQ")],
            devices: vec![
                device("", "dc1", ""),
                device("lb01", "nowhere", ""),
                device("lb02", "dc1", ""),
                device("lb02", "dc1", ""),
            ],
            ..Snapshot::default()
        };
        let client = client(snapshot);
        let settings = SyncSettings::default();
        let mut adapter = AdmAdapter::new(&client, &settings);
        adapter.load().expect("load");

        assert_eq!(ids(&adapter, EntityKind::Device), vec!["lb02"]);
    }

    #[test]
    fn management_address_gets_synthetic_port_and_primary_binding() {
        let snapshot = Snapshot {
            sites: vec![site("dc1", "HQ")],
            devices: vec![device("lb01", "dc1", "192.168.0.10")],
            vlan_bindings: [bound("lb01", "1/1", "10.1.1.5")].into_iter().collect(),
            ..Snapshot::default()
        };
        let client = client(snapshot);
        let settings = SyncSettings::default();
        let mut adapter = AdmAdapter::new(&client, &settings);
        adapter.load().expect("load");

        assert_eq!(ids(&adapter, EntityKind::Port), vec!["Management__lb01", "1/1__lb01"]);
        assert_eq!(
            ids(&adapter, EntityKind::Subnet),
            vec!["192.168.0.0/24__Global", "10.1.1.0/24__Global"]
        );
        let mgmt = adapter
            .get(
                EntityKind::Binding,
                &Binding::key("192.168.0.10/24", "lb01", "Management"),
            )
            .expect("management binding");
        assert!(matches!(mgmt, Record::Binding(b) if b.primary));
        let links = adapter.graph().children_of(EntityKind::Device, &Device::key("lb01"));
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn management_port_is_retargeted_to_the_reporting_port() {
        let mut snapshot = Snapshot {
            sites: vec![site("dc1", "HQ")],
            devices: vec![device("lb01", "dc1", "10.1.1.5")],
            vlan_bindings: [bound("lb01", "0/1", "10.1.1.5")].into_iter().collect(),
            ..Snapshot::default()
        };
        snapshot.nsip.insert(
            "lb01".to_string(),
            vec![NsipRecord {
                ipaddress: "10.1.1.5".to_string(),
                netmask: "255.255.255.0".to_string(),
                kind: "NSIP".to_string(),
            }],
        );
        let client = client(snapshot);
        let settings = SyncSettings::default();
        let mut adapter = AdmAdapter::new(&client, &settings);
        adapter.load().expect("load");

        assert_eq!(ids(&adapter, EntityKind::Port), vec!["0/1__lb01"]);
        assert_eq!(ids(&adapter, EntityKind::Binding), vec!["10.1.1.5/24__lb01__0/1"]);
        let Record::Address(addr) = adapter
            .get(
                EntityKind::Address,
                &Identity::new(["10.1.1.5/24", "10.1.1.0/24"]),
            )
            .expect("address")
        else {
            panic!("not an address");
        };
        assert_eq!(addr.tags, vec!["MGMT", "NSIP"]);
        let port = adapter
            .get(EntityKind::Port, &Port::key("0/1", "lb01"))
            .expect("retargeted port");
        assert!(matches!(port, Record::Port(p) if p.description.as_deref() == Some("Management")));
    }

    #[test]
    fn only_the_last_primary_address_per_family_stays_primary() {
        let mut snapshot = Snapshot {
            sites: vec![site("dc1", "HQ")],
            devices: vec![device("lb01", "dc1", "192.168.0.10")],
            vlan_bindings: [bound("lb01", "1/1", "10.1.1.5")].into_iter().collect(),
            ..Snapshot::default()
        };
        snapshot.nsip.insert(
            "lb01".to_string(),
            vec![NsipRecord {
                ipaddress: "10.1.1.5".to_string(),
                netmask: "255.255.255.0".to_string(),
                kind: "NSIP".to_string(),
            }],
        );
        let client = client(snapshot);
        let settings = SyncSettings::default();
        let mut adapter = AdmAdapter::new(&client, &settings);
        adapter.load().expect("load");

        let primaries: Vec<String> = adapter
            .get_all(EntityKind::Binding)
            .filter(|r| matches!(r, Record::Binding(b) if b.primary))
            .map(|r| graph_diff_core::Entity::identity(r).to_string())
            .collect();
        assert_eq!(primaries, vec!["10.1.1.5/24__lb01__1/1"]);
        let mgmt = adapter
            .get(
                EntityKind::Binding,
                &Binding::key("192.168.0.10/24", "lb01", "Management"),
            )
            .expect("management binding");
        assert!(matches!(mgmt, Record::Binding(b) if !b.primary));
    }

    #[test]
    fn site_feed_failure_aborts_load() {
        let client = SnapshotClient::new("adm", Snapshot::default());
        let settings = SyncSettings::default();
        let mut adapter = AdmAdapter::new(&client, &settings);
        let err = adapter.load().expect_err("not logged in");
        assert!(err.to_string().contains("adm"));
    }
}
