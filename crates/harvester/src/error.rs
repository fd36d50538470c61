//! Error types for machine configuration checks.

use std::path::PathBuf;

use thiserror::Error;

/// A network plan rule that a parsed cloud-init network document broke.
///
/// Rules are evaluated in declaration order and only the first failure is
/// reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkRuleViolation {
    /// More than one subnet carries a gateway.
    #[error("ambiguous default route: more than one gateway specified ({count} found)")]
    AmbiguousDefaultRoute { count: usize },

    /// A gateway exists but no nameserver entry was given.
    #[error("a default gateway requires a DNS resolver entry")]
    GatewayWithoutResolver,

    /// A gateway exists and several nameserver entries compete for it.
    #[error("a default gateway takes exactly one DNS resolver entry ({count} found)")]
    MultipleResolvers { count: usize },

    /// The nameserver entry points at an interface other than the gateway owner.
    #[error(
        "resolver is not bound to the default-route interface \
         (resolver on {resolver_interface}, gateway on {gateway_interface})"
    )]
    ResolverNotBound {
        resolver_interface: String,
        gateway_interface: String,
    },

    /// A nameserver entry exists but no subnet carries a gateway.
    #[error("DNS resolver specified without a default gateway")]
    ResolverWithoutGateway,
}

/// Errors raised while checking driver input before VM creation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Input is not a well-formed YAML document of the expected shape.
    #[error("malformed {what}: {source}")]
    Malformed {
        what: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    /// Input is not a well-formed JSON document of the expected shape.
    #[error("malformed {what}: {source}")]
    InvalidJson {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Network data parsed but breaks a routing rule.
    #[error("invalid network data: {0}")]
    Rule(#[from] NetworkRuleViolation),

    /// A vGPU descriptor has an empty device name.
    #[error("vGPU request #{index} has an empty deviceName")]
    MissingDeviceName { index: usize },

    /// The Harvester server is too old for this driver.
    #[error("current harvester server version is {0}, only support v0.2.0+")]
    UnsupportedServerVersion(String),

    /// A driver option is missing or out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The config file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Whether the input could not be parsed at all.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::InvalidJson { .. })
    }

    /// Whether the input parsed but broke a semantic rule.
    #[must_use]
    pub fn is_rule_violation(&self) -> bool {
        matches!(self, Self::Rule(_) | Self::MissingDeviceName { .. })
    }

    /// The network rule that failed, if any.
    #[must_use]
    pub fn network_rule(&self) -> Option<&NetworkRuleViolation> {
        match self {
            Self::Rule(rule) => Some(rule),
            _ => None,
        }
    }
}
