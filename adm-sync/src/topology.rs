//! Merge the three per-device feeds into one port/address list.
//!
//! The binding feed is authoritative for which port an address lives on.
//! The management-IP feed only tags existing records (`NSIP`) or places
//! subnet IPs (`SNIP`) onto the port whose subnet contains them, and the
//! IPv6 feed contributes link-local addresses on a synthetic port.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::feed::{Nsip6Record, NsipRecord, VlanBinding};
use crate::parse::{is_within, netmask_to_prefix, network, split_cidr};

/// Synthetic port that carries link-local IPv6 addresses.
pub const LINK_LOCAL_PORT: &str = "L0/1";

/// Tags that make an address the device's primary address.
pub const PRIMARY_TAGS: &[&str] = &["MGMT", "MIP", "NSIP"];

/// One address on one port of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortRecord {
    pub vlan: String,
    pub ipaddress: String,
    /// Prefix length.
    pub netmask: u8,
    pub port: String,
    pub tags: Vec<String>,
}

impl PortRecord {
    pub fn is_primary(&self) -> bool {
        is_primary(&self.tags)
    }

    /// Address in CIDR form.
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.ipaddress, self.netmask)
    }
}

pub fn is_primary(tags: &[String]) -> bool {
    tags.iter().any(|tag| PRIMARY_TAGS.contains(&tag.as_str()))
}

/// The raw feeds of one device. A feed that could not be fetched is empty.
#[derive(Debug, Clone, Default)]
pub struct DeviceFeeds {
    pub vlan_bindings: Vec<VlanBinding>,
    pub nsip: Vec<NsipRecord>,
    pub nsip6: Vec<Nsip6Record>,
}

/// Records in emission order, de-duplicated on `(ipaddress, netmask, port)`.
#[derive(Default)]
struct Topology {
    records: Vec<PortRecord>,
    seen: HashSet<(String, u8, String)>,
}

impl Topology {
    fn push(&mut self, record: PortRecord) {
        let key = (record.ipaddress.clone(), record.netmask, record.port.clone());
        if self.seen.insert(key) {
            self.records.push(record);
        }
    }

    fn contains_address(&self, address: &str) -> bool {
        self.records.iter().any(|r| r.ipaddress == address)
    }
}

/// Rebuild the canonical port/address list of one device.
pub fn reconstruct(host: &str, feeds: &DeviceFeeds) -> Vec<PortRecord> {
    let mut topology = Topology::default();
    binding_pass(host, &feeds.vlan_bindings, &mut topology);
    nsip_pass(host, &feeds.nsip, &mut topology);
    link_local_pass(host, &feeds.nsip6, &mut topology);

    let mut records = topology.records;
    for record in &mut records {
        if record.tags.len() > 1 {
            record.tags.sort();
        }
    }
    debug!(host, records = records.len(), "topology reconstructed");
    records
}

fn binding_pass(host: &str, bindings: &[VlanBinding], topology: &mut Topology) {
    for binding in bindings {
        let Some(port) = binding.interface_bindings.first().map(|i| i.ifnum.clone()) else {
            warn!(host, vlan = %binding.vlan_id, "VLAN binding has no interfaces, skipping");
            continue;
        };

        for v4 in &binding.ipv4_bindings {
            let prefix = match netmask_to_prefix(&v4.netmask) {
                Ok(prefix) => prefix,
                Err(err) => {
                    warn!(host, address = %v4.ipaddress, %err, "skipping IPv4 binding");
                    continue;
                }
            };
            if let Err(err) = network(&v4.ipaddress, prefix) {
                warn!(host, %err, "skipping IPv4 binding");
                continue;
            }
            topology.push(PortRecord {
                vlan: vlan_of(&v4.vlan_id, &binding.vlan_id),
                ipaddress: v4.ipaddress.clone(),
                netmask: prefix,
                port: port.clone(),
                tags: Vec::new(),
            });
        }

        for v6 in &binding.ipv6_bindings {
            match split_cidr(&v6.ipaddress) {
                Ok((address, prefix)) => topology.push(PortRecord {
                    vlan: vlan_of(&v6.vlan_id, &binding.vlan_id),
                    ipaddress: address,
                    netmask: prefix,
                    port: port.clone(),
                    tags: Vec::new(),
                }),
                Err(err) => warn!(host, %err, "skipping IPv6 binding"),
            }
        }
    }
}

fn nsip_pass(host: &str, nsips: &[NsipRecord], topology: &mut Topology) {
    // Only records from the binding pass may contain a SNIP.
    let candidates = topology.records.len();

    for nsip in nsips {
        match nsip.kind.as_str() {
            "NSIP" => {
                let Some(record) = topology
                    .records
                    .iter_mut()
                    .find(|r| r.ipaddress == nsip.ipaddress)
                else {
                    debug!(host, address = %nsip.ipaddress, "NSIP not bound to any port");
                    continue;
                };
                if !record.tags.iter().any(|t| t == "NSIP") {
                    record.tags.push("NSIP".to_string());
                }
            }
            "SNIP" => {
                if topology.contains_address(&nsip.ipaddress) {
                    continue;
                }
                let prefix = match netmask_to_prefix(&nsip.netmask) {
                    Ok(prefix) => prefix,
                    Err(err) => {
                        warn!(host, address = %nsip.ipaddress, %err, "skipping SNIP");
                        continue;
                    }
                };
                let container = topology.records[..candidates]
                    .iter()
                    .find(|r| is_within(&nsip.ipaddress, &r.ipaddress, r.netmask).unwrap_or(false));
                let Some(container) = container else {
                    debug!(host, address = %nsip.ipaddress, "SNIP outside every bound subnet");
                    continue;
                };
                let record = PortRecord {
                    vlan: container.vlan.clone(),
                    ipaddress: nsip.ipaddress.clone(),
                    netmask: prefix,
                    port: container.port.clone(),
                    tags: Vec::new(),
                };
                topology.push(record);
            }
            _ => {}
        }
    }
}

fn link_local_pass(host: &str, nsip6s: &[Nsip6Record], topology: &mut Topology) {
    for nsip6 in nsip6s.iter().filter(|r| r.scope == "link-local") {
        match split_cidr(&nsip6.ipv6address) {
            Ok((address, prefix)) => topology.push(PortRecord {
                vlan: nsip6.vlan.clone(),
                ipaddress: address,
                netmask: prefix,
                port: LINK_LOCAL_PORT.to_string(),
                tags: Vec::new(),
            }),
            Err(err) => warn!(host, %err, "skipping link-local address"),
        }
    }
}

fn vlan_of(address_vlan: &str, binding_vlan: &str) -> String {
    if address_vlan.is_empty() {
        binding_vlan.to_string()
    } else {
        address_vlan.to_string()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::feed::{InterfaceBinding, Ipv4Binding, Ipv6Binding, Nsip6Record, NsipRecord, VlanBinding};

    use super::{is_primary, reconstruct, DeviceFeeds, PortRecord, LINK_LOCAL_PORT};

    fn vlan(id: &str, port: &str, v4: &[(&str, &str)], v6: &[&str]) -> VlanBinding {
        VlanBinding {
            vlan_id: id.to_string(),
            interface_bindings: vec![InterfaceBinding {
                vlan_id: id.to_string(),
                ifnum: port.to_string(),
            }],
            ipv4_bindings: v4
                .iter()
                .map(|(ip, mask)| Ipv4Binding {
                    vlan_id: id.to_string(),
                    ipaddress: ip.to_string(),
                    netmask: mask.to_string(),
                })
                .collect(),
            ipv6_bindings: v6
                .iter()
                .map(|ip| Ipv6Binding {
                    vlan_id: id.to_string(),
                    ipaddress: ip.to_string(),
                })
                .collect(),
        }
    }

    fn nsip(ip: &str, mask: &str, kind: &str) -> NsipRecord {
        NsipRecord {
            ipaddress: ip.to_string(),
            netmask: mask.to_string(),
            kind: kind.to_string(),
        }
    }

    fn record(vlan: &str, ip: &str, netmask: u8, port: &str, tags: &[&str]) -> PortRecord {
        PortRecord {
            vlan: vlan.to_string(),
            ipaddress: ip.to_string(),
            netmask,
            port: port.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn nsip_tags_the_bound_record_in_place() {
        let feeds = DeviceFeeds {
            vlan_bindings: vec![vlan("10", "1/1", &[("10.1.1.5", "255.255.255.0")], &[])],
            nsip: vec![nsip("10.1.1.5", "255.255.255.0", "NSIP")],
            nsip6: vec![],
        };

        let records = reconstruct("lb01", &feeds);

        assert_eq!(records, vec![record("10", "10.1.1.5", 24, "1/1", &["NSIP"])]);
        assert!(records[0].is_primary());
    }

    #[test]
    fn snip_lands_on_the_port_whose_subnet_contains_it() {
        let feeds = DeviceFeeds {
            vlan_bindings: vec![
                vlan("10", "1/1", &[("192.168.0.1", "255.255.255.0")], &[]),
                vlan("20", "1/2", &[("10.1.1.1", "255.255.255.0")], &[]),
            ],
            nsip: vec![nsip("10.1.1.9", "255.255.255.0", "SNIP")],
            nsip6: vec![],
        };

        let records = reconstruct("lb01", &feeds);

        assert_eq!(records.len(), 3);
        assert_eq!(records[2], record("20", "10.1.1.9", 24, "1/2", &[]));
        assert!(!records[2].is_primary());
    }

    #[test]
    fn snip_already_bound_or_uncontained_adds_nothing() {
        let feeds = DeviceFeeds {
            vlan_bindings: vec![vlan("10", "1/1", &[("10.1.1.1", "255.255.255.0")], &[])],
            nsip: vec![
                nsip("10.1.1.1", "255.255.255.0", "SNIP"),
                nsip("172.16.0.1", "255.255.0.0", "SNIP"),
                nsip("10.1.1.7", "255.255.255.0", "VIP"),
            ],
            nsip6: vec![],
        };

        assert_eq!(reconstruct("lb01", &feeds).len(), 1);
    }

    #[test]
    fn emitted_snips_do_not_place_later_snips() {
        let feeds = DeviceFeeds {
            vlan_bindings: vec![vlan("10", "1/2", &[("10.1.1.1", "255.255.255.0")], &[])],
            nsip: vec![
                nsip("10.1.1.9", "255.0.0.0", "SNIP"),
                nsip("10.200.0.1", "255.0.0.0", "SNIP"),
            ],
            nsip6: vec![],
        };

        let records = reconstruct("lb01", &feeds);

        let addresses: Vec<_> = records.iter().map(|r| r.ipaddress.as_str()).collect();
        assert_eq!(addresses, vec!["10.1.1.1", "10.1.1.9"]);
    }

    #[test]
    fn link_local_addresses_use_the_synthetic_port() {
        let feeds = DeviceFeeds {
            vlan_bindings: vec![vlan("10", "1/1", &[], &["2001:db8::5/64"])],
            nsip: vec![],
            nsip6: vec![
                Nsip6Record {
                    ipv6address: "fe80::1/64".to_string(),
                    scope: "link-local".to_string(),
                    vlan: "1".to_string(),
                },
                Nsip6Record {
                    ipv6address: "2001:db8::9/64".to_string(),
                    scope: "global".to_string(),
                    vlan: "10".to_string(),
                },
            ],
        };

        let records = reconstruct("lb01", &feeds);

        assert_eq!(
            records,
            vec![
                record("10", "2001:db8::5", 64, "1/1", &[]),
                record("1", "fe80::1", 64, LINK_LOCAL_PORT, &[]),
            ]
        );
    }

    #[test]
    fn duplicates_and_portless_vlans_are_dropped() {
        let mut portless = vlan("30", "x", &[("10.3.3.3", "255.255.255.0")], &[]);
        portless.interface_bindings.clear();
        let feeds = DeviceFeeds {
            vlan_bindings: vec![
                vlan("10", "1/1", &[("10.1.1.5", "255.255.255.0")], &[]),
                vlan("10", "1/1", &[("10.1.1.5", "255.255.255.0")], &[]),
                portless,
                vlan("40", "1/4", &[("10.4.4.4", "not-a-mask")], &[]),
            ],
            nsip: vec![],
            nsip6: vec![],
        };

        let records = reconstruct("lb01", &feeds);
        assert_eq!(records, vec![record("10", "10.1.1.5", 24, "1/1", &[])]);
    }

    #[test]
    fn primary_tags_are_management_tags() {
        let tags = |list: &[&str]| list.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        assert!(is_primary(&tags(&["MGMT"])));
        assert!(is_primary(&tags(&["MIP", "SNIP"])));
        assert!(!is_primary(&tags(&["SNIP"])));
        assert!(!is_primary(&[]));
    }
}
