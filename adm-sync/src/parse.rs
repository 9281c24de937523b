use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::{ipv4_mask_to_prefix, IpNetwork};
use regex::Regex;
use thiserror::Error;

/// Role assigned when no hostname pattern matches.
pub const DEFAULT_ROLE: &str = "Load-Balancer";

/// Errors raised while parsing address material from feed records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("invalid IP address {0:?}")]
    Address(String),
    #[error("invalid netmask {0:?}")]
    Netmask(String),
    #[error("invalid prefix length in {0:?}")]
    PrefixLength(String),
}

/// Extract `NSxx.y: Build a.b.c` from a device version banner.
///
/// Returns `None` when the banner does not start with the expected format.
pub fn parse_version(banner: &str) -> Option<String> {
    let pattern = Regex::new(r"^NetScaler\s(?P<version>NS\d+\.\d+: Build\s\d+\.\d+\.\w+)").ok()?;
    pattern
        .captures(banner)
        .and_then(|caps| caps.name("version"))
        .map(|m| m.as_str().to_string())
}

/// Ordered hostname patterns mapped to device roles.
#[derive(Debug, Clone, Default)]
pub struct RoleMap {
    entries: Vec<(Regex, String)>,
}

impl RoleMap {
    /// Compile `(pattern, role)` pairs. Patterns match from the start of the
    /// hostname.
    pub fn new<'a, I>(pairs: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let entries = pairs
            .into_iter()
            .map(|(pattern, role)| Ok((Regex::new(&format!("^(?:{pattern})"))?, role.to_string())))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { entries })
    }

    /// Role for a hostname. The last matching entry wins.
    pub fn role_for(&self, hostname: &str) -> String {
        self.entries
            .iter()
            .filter(|(pattern, _)| pattern.is_match(hostname))
            .last()
            .map_or_else(|| DEFAULT_ROLE.to_string(), |(_, role)| role.clone())
    }
}

/// Convert a dotted IPv4 netmask to a prefix length.
pub fn netmask_to_prefix(netmask: &str) -> Result<u8, TopologyError> {
    let mask: Ipv4Addr = netmask
        .trim()
        .parse()
        .map_err(|_| TopologyError::Netmask(netmask.to_string()))?;
    ipv4_mask_to_prefix(mask).map_err(|_| TopologyError::Netmask(netmask.to_string()))
}

/// Split `address/prefixlen`.
pub fn split_cidr(cidr: &str) -> Result<(String, u8), TopologyError> {
    let (address, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| TopologyError::PrefixLength(cidr.to_string()))?;
    address
        .parse::<IpAddr>()
        .map_err(|_| TopologyError::Address(address.to_string()))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| TopologyError::PrefixLength(cidr.to_string()))?;
    Ok((address.to_string(), prefix))
}

/// Build a network from an address and a prefix length, keeping host bits.
pub fn network(address: &str, prefix: u8) -> Result<IpNetwork, TopologyError> {
    let ip: IpAddr = address
        .parse()
        .map_err(|_| TopologyError::Address(address.to_string()))?;
    IpNetwork::new(ip, prefix).map_err(|_| TopologyError::PrefixLength(format!("{address}/{prefix}")))
}

/// The containing prefix of an address in CIDR form, e.g. `10.1.1.0/24`.
pub fn parent_prefix(address: &str, prefix: u8) -> Result<String, TopologyError> {
    let net = network(address, prefix)?;
    Ok(format!("{}/{}", net.network(), net.prefix()))
}

/// Whether `address` falls inside `network_address/prefix`.
pub fn is_within(address: &str, network_address: &str, prefix: u8) -> Result<bool, TopologyError> {
    let ip: IpAddr = address
        .parse()
        .map_err(|_| TopologyError::Address(address.to_string()))?;
    Ok(network(network_address, prefix)?.contains(ip))
}

#[cfg(test)]
mod tests {
    use super::{
        is_within, netmask_to_prefix, parent_prefix, parse_version, split_cidr, RoleMap,
        DEFAULT_ROLE,
    };

    #[test]
    fn version_is_cut_from_banner() {
        assert_eq!(
            parse_version("NetScaler NS13.1: Build 37.38.nc, Date: Nov 23 2022, 04:42:36 (64-bit)"),
            Some("NS13.1: Build 37.38.nc".to_string())
        );
        assert_eq!(parse_version("Citrix ADC 14"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn last_matching_role_wins() {
        let map = RoleMap::new([(".+LB.+", "Load-Balancer"), (".+EA$", "Edge")]).expect("valid");
        assert_eq!(map.role_for("UYLLBFRCXM55-EA"), "Edge");
        assert_eq!(map.role_for("ARIA-LB-01"), "Load-Balancer");
        assert_eq!(map.role_for("web01"), DEFAULT_ROLE);
    }

    #[test]
    fn role_patterns_anchor_at_start() {
        let map = RoleMap::new([("LB", "Edge")]).expect("valid");
        assert_eq!(map.role_for("XLB"), DEFAULT_ROLE);
        assert_eq!(map.role_for("LB-1"), "Edge");
    }

    #[test]
    fn invalid_role_pattern_is_rejected() {
        assert!(RoleMap::new([("(", "x")]).is_err());
    }

    #[test]
    fn netmask_and_cidr_helpers() {
        assert_eq!(netmask_to_prefix("255.255.255.0"), Ok(24));
        assert!(netmask_to_prefix("255.0.255.0").is_err());
        assert_eq!(split_cidr("fe80::1/64"), Ok(("fe80::1".to_string(), 64)));
        assert!(split_cidr("fe80::1").is_err());
        assert_eq!(parent_prefix("10.1.1.5", 24), Ok("10.1.1.0/24".to_string()));
        assert_eq!(parent_prefix("2001:db8::5", 64), Ok("2001:db8::/64".to_string()));
        assert_eq!(is_within("10.1.1.9", "10.1.1.1", 24), Ok(true));
        assert_eq!(is_within("10.1.2.9", "10.1.1.1", 24), Ok(false));
    }
}
