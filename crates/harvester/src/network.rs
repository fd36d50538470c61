//! Cloud-init network data validation.
//!
//! Harvester programs exactly one default route and one resolver
//! configuration into the guest. Network data that would give a VM more
//! than one of either is rejected here, before it reaches the VM template.
//!
//! ```yaml
//! network:
//!   version: 1
//!   config:
//!     - type: physical
//!       name: enp1s0
//!       subnets:
//!         - type: static
//!           address: 192.168.5.91/24
//!           gateway: 192.168.5.1
//!     - type: nameserver
//!       interface: enp1s0
//!       address:
//!         - 192.168.5.1
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConfigError, NetworkRuleViolation};

/// Top-level cloud-init network data.
///
/// The `network` key is optional; a document without it requests no
/// network customization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkData {
    /// The network section.
    #[serde(default)]
    pub network: Option<NetworkDocument>,
}

impl NetworkData {
    /// Parse raw network data.
    ///
    /// Returns `Ok(None)` for blank input or a document without a `network`
    /// section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] if the input is not valid YAML of
    /// the expected shape.
    pub fn parse(raw: &str) -> Result<Option<NetworkDocument>, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let data: Self = serde_yaml::from_str(raw).map_err(|source| ConfigError::Malformed {
            what: "network data",
            source,
        })?;
        Ok(data.network)
    }
}

/// The `network` section (cloud-init network config version 1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDocument {
    /// Config format version; only `1` is meaningful.
    #[serde(default)]
    pub version: Option<u32>,
    /// Interface and resolver entries.
    #[serde(default)]
    pub config: Vec<ConfigEntry>,
}

/// One entry of the `config` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConfigEntry {
    /// A physical NIC.
    Physical {
        /// Logical interface name (e.g. `enp1s0`).
        name: String,
        /// Address assignments for this interface.
        #[serde(default, deserialize_with = "null_as_empty")]
        subnets: Vec<Subnet>,
    },
    /// DNS resolvers bound to an interface.
    Nameserver {
        /// Name of the physical interface the resolvers belong to.
        interface: String,
        /// Resolver addresses.
        #[serde(default, deserialize_with = "null_as_empty")]
        address: Vec<String>,
    },
}

/// Address assignment mode of a physical interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Subnet {
    /// Address obtained through DHCP.
    Dhcp,
    /// Static address, optionally owning the default route.
    Static {
        /// Interface address in CIDR notation.
        address: String,
        /// Default gateway.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gateway: Option<String>,
    },
    /// Any other cloud-init subnet type (`dhcp4`, `dhcp6`, `static6`, ...).
    /// Never owns the default route.
    #[serde(other)]
    Other,
}

/// Treat an explicit null list (`subnets:`) like a missing one.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Subnet {
    /// The gateway of this subnet, if it owns the default route.
    #[must_use]
    pub fn gateway(&self) -> Option<&str> {
        match self {
            Self::Static {
                gateway: Some(gateway),
                ..
            } if !gateway.trim().is_empty() => Some(gateway.as_str()),
            _ => None,
        }
    }
}

/// Routing facts collected from a [`NetworkDocument`] in a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkPlan<'a> {
    /// Number of subnets carrying a gateway.
    pub gateway_count: usize,
    /// Interface owning the last gateway seen.
    pub gateway_interface: Option<&'a str>,
    /// Interfaces referenced by nameserver entries, in document order.
    pub resolver_interfaces: Vec<&'a str>,
}

impl NetworkDocument {
    /// Collect gateway and resolver facts from the config entries.
    #[must_use]
    pub fn plan(&self) -> NetworkPlan<'_> {
        let mut plan = NetworkPlan::default();

        for entry in &self.config {
            match entry {
                ConfigEntry::Physical { name, subnets } => {
                    let gateways = subnets.iter().filter_map(Subnet::gateway).count();
                    if gateways > 0 {
                        plan.gateway_count += gateways;
                        plan.gateway_interface = Some(name.as_str());
                    }
                }
                ConfigEntry::Nameserver { interface, .. } => {
                    plan.resolver_interfaces.push(interface.as_str());
                }
            }
        }

        plan
    }
}

impl NetworkPlan<'_> {
    /// Apply the default-route and resolver rules.
    ///
    /// # Errors
    ///
    /// Returns the first [`NetworkRuleViolation`] found, in rule order.
    pub fn check(&self) -> Result<(), NetworkRuleViolation> {
        if self.gateway_count > 1 {
            return Err(NetworkRuleViolation::AmbiguousDefaultRoute {
                count: self.gateway_count,
            });
        }

        match (self.gateway_interface, self.resolver_interfaces.as_slice()) {
            (Some(_), []) => Err(NetworkRuleViolation::GatewayWithoutResolver),
            (Some(_), [_, _, ..]) => Err(NetworkRuleViolation::MultipleResolvers {
                count: self.resolver_interfaces.len(),
            }),
            (Some(gateway), [resolver]) if gateway != *resolver => {
                Err(NetworkRuleViolation::ResolverNotBound {
                    resolver_interface: (*resolver).to_string(),
                    gateway_interface: gateway.to_string(),
                })
            }
            (None, [_, ..]) => Err(NetworkRuleViolation::ResolverWithoutGateway),
            _ => Ok(()),
        }
    }
}

/// Validate cloud-init network data for a Harvester VM.
///
/// Blank input and documents without a `network` key are accepted.
///
/// # Errors
///
/// Returns [`ConfigError::Malformed`] for unparsable input and
/// [`ConfigError::Rule`] when the routing rules are broken.
pub fn check_network_data(raw: &str) -> Result<(), ConfigError> {
    match NetworkData::parse(raw)? {
        Some(document) => Ok(document.plan().check()?),
        None => Ok(()),
    }
}
