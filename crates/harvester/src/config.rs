//! Driver configuration and pre-create checks.
//!
//! A [`DriverConfig`] holds everything the driver needs to describe a
//! Harvester VM. It can be loaded from a YAML file; missing keys take the
//! driver defaults.
//!
//! ```yaml
//! namespace: default
//! machine_name: rancher-node-1
//! image_name: image-ubuntu
//! cpu: 4
//! memory_size: 8Gi
//! network_type: vlan
//! network_name: vlan100
//! vgpu_info: '{"vGPU":[{"name":"","deviceName":"nvidia.com/NVIDIA_A2-2Q"}]}'
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::network::check_network_data;
use crate::vgpu::{parse_vgpu_info, VgpuInfo};

/// Network type that attaches the VM to the pod (management) network.
pub const NETWORK_TYPE_POD: &str = "pod";

/// Server version prefix that predates the supported API.
const UNSUPPORTED_VERSION_PREFIX: &str = "v0.1.0";

/// Harvester machine driver options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Namespace holding the VM, image, key pair and network.
    pub namespace: String,
    /// VM name.
    pub machine_name: String,
    /// Number of vCPUs.
    pub cpu: u32,
    /// Memory size (e.g. `4Gi`).
    pub memory_size: String,
    /// Root disk size (e.g. `40Gi`).
    pub disk_size: String,
    /// Root disk bus.
    pub disk_bus: String,
    /// Image to boot from, in `namespace`.
    pub image_name: String,
    /// Existing Harvester key pair to inject.
    pub keypair_name: Option<String>,
    /// `pod` for the management network, anything else for a bridged VM network.
    pub network_type: String,
    /// VM network name, required unless `network_type` is `pod`.
    pub network_name: Option<String>,
    /// NIC model.
    pub network_model: String,
    /// Cloud-init user data.
    pub user_data: String,
    /// Cloud-init network data.
    pub network_data: String,
    /// vGPU capability document.
    pub vgpu_info: String,
    /// VM template annotations as a JSON object.
    pub annotations: String,
    /// VM template labels as a JSON object.
    pub labels: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            machine_name: String::new(),
            cpu: 2,
            memory_size: "4Gi".to_string(),
            disk_size: "40Gi".to_string(),
            disk_bus: "virtio".to_string(),
            image_name: String::new(),
            keypair_name: None,
            network_type: "vlan".to_string(),
            network_name: None,
            network_model: "virtio".to_string(),
            user_data: String::new(),
            network_data: String::new(),
            vgpu_info: String::new(),
            annotations: "{}".to_string(),
            labels: "{}".to_string(),
        }
    }
}

/// A configuration that passed every local check, with decoded fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMachine {
    /// The checked configuration.
    pub config: DriverConfig,
    /// Decoded vGPU requests.
    pub vgpu: VgpuInfo,
    /// Decoded VM template annotations.
    pub annotations: BTreeMap<String, String>,
    /// Decoded VM template labels.
    pub labels: BTreeMap<String, String>,
}

impl DriverConfig {
    /// Load a configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] if the text is not a valid config.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Malformed {
            what: "driver config",
            source,
        })
    }

    /// Whether the VM uses the management network instead of a VM network.
    #[must_use]
    pub fn is_pod_network(&self) -> bool {
        self.network_type == NETWORK_TYPE_POD
    }

    /// Run every local check that must pass before the VM is created.
    ///
    /// # Errors
    ///
    /// Returns the first failing check: a missing option, invalid network
    /// data, an undecodable vGPU document or malformed annotations/labels.
    pub fn validate(&self) -> Result<PreparedMachine, ConfigError> {
        self.check_required()?;

        check_network_data(&self.network_data)?;
        debug!(
            machine = %self.machine_name,
            customized = !self.network_data.trim().is_empty(),
            "Network data accepted"
        );

        let vgpu = parse_vgpu_info(&self.vgpu_info)?;
        vgpu.require_device_names()?;
        debug!(
            machine = %self.machine_name,
            requests = vgpu.vgpu_requests.len(),
            "vGPU info decoded"
        );

        let annotations = parse_string_map("annotations", &self.annotations)?;
        let labels = parse_string_map("labels", &self.labels)?;

        Ok(PreparedMachine {
            config: self.clone(),
            vgpu,
            annotations,
            labels,
        })
    }

    fn check_required(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace is required".to_string()));
        }
        if self.machine_name.trim().is_empty() {
            return Err(ConfigError::Invalid("machine name is required".to_string()));
        }
        if self.image_name.trim().is_empty() {
            return Err(ConfigError::Invalid("image name is required".to_string()));
        }
        if self.cpu == 0 {
            return Err(ConfigError::Invalid("cpu must be at least 1".to_string()));
        }
        if !self.is_pod_network()
            && !self
                .network_name
                .as_deref()
                .is_some_and(|n| !n.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "network name is required for network type {}",
                self.network_type
            )));
        }
        Ok(())
    }
}

/// Decode a JSON object of string values. Blank input yields an empty map.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidJson`] if the input is not such an object.
pub fn parse_string_map(
    what: &'static str,
    raw: &str,
) -> Result<BTreeMap<String, String>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(raw).map_err(|source| ConfigError::InvalidJson { what, source })
}

/// Reject Harvester servers older than v0.2.0.
///
/// # Errors
///
/// Returns [`ConfigError::UnsupportedServerVersion`] for `v0.1.0*` servers.
pub fn ensure_supported_server_version(version: &str) -> Result<(), ConfigError> {
    if version.starts_with(UNSUPPORTED_VERSION_PREFIX) {
        return Err(ConfigError::UnsupportedServerVersion(version.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::NetworkRuleViolation;

    fn base_config() -> DriverConfig {
        DriverConfig {
            machine_name: "node-1".to_string(),
            image_name: "image-ubuntu".to_string(),
            network_name: Some("vlan100".to_string()),
            ..DriverConfig::default()
        }
    }

    #[test]
    fn test_defaults_from_partial_yaml() {
        let config = DriverConfig::from_yaml_str("machine_name: node-1\ncpu: 8\n").unwrap();

        assert_eq!(config.machine_name, "node-1");
        assert_eq!(config.cpu, 8);
        assert_eq!(config.namespace, "default");
        assert_eq!(config.disk_bus, "virtio");
        assert_eq!(config.annotations, "{}");
    }

    #[test]
    fn test_guest_ssh_keys_in_yaml_are_ignored() {
        let raw = "machine_name: node-1\nssh_user: ubuntu\nssh_port: 2222\n";
        let config = DriverConfig::from_yaml_str(raw).unwrap();
        assert_eq!(
            config,
            DriverConfig {
                machine_name: "node-1".to_string(),
                ..DriverConfig::default()
            }
        );
    }

    #[test]
    fn test_malformed_yaml() {
        let err = DriverConfig::from_yaml_str("cpu: [two]").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_validate_minimal() {
        let prepared = base_config().validate().unwrap();

        assert!(prepared.vgpu.is_empty());
        assert!(prepared.annotations.is_empty());
        assert!(prepared.labels.is_empty());
    }

    #[test]
    fn test_validate_requires_network_name_for_bridge() {
        let config = DriverConfig {
            network_name: None,
            ..base_config()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = DriverConfig {
            network_type: NETWORK_TYPE_POD.to_string(),
            network_name: None,
            ..base_config()
        };
        assert!(config.is_pod_network());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_names() {
        let config = DriverConfig {
            machine_name: String::new(),
            ..base_config()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = DriverConfig {
            image_name: " ".to_string(),
            ..base_config()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_reports_network_rule() {
        let config = DriverConfig {
            network_data: "
network:
  version: 1
  config:
   - type: physical
     name: enp1s0
     subnets:
     - type: dhcp
   - type: nameserver
     interface: enp1s0
     address: [1.1.1.1]
"
            .to_string(),
            ..base_config()
        };

        let err = config.validate().unwrap_err();
        assert_eq!(
            err.network_rule(),
            Some(&NetworkRuleViolation::ResolverWithoutGateway)
        );
    }

    #[test]
    fn test_validate_enforces_device_names() {
        let config = DriverConfig {
            vgpu_info: r#"{"vGPU":[{"name":"","deviceName":""}]}"#.to_string(),
            ..base_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingDeviceName { index: 0 })
        ));
    }

    #[test]
    fn test_validate_decodes_annotations_and_labels() {
        let config = DriverConfig {
            annotations: r#"{"team":"ml"}"#.to_string(),
            labels: r#"{"tier":"gpu","zone":"a"}"#.to_string(),
            ..base_config()
        };
        let prepared = config.validate().unwrap();

        assert_eq!(prepared.annotations.get("team"), Some(&"ml".to_string()));
        assert_eq!(prepared.labels.len(), 2);
    }

    #[test]
    fn test_malformed_labels_are_an_error() {
        let config = DriverConfig {
            labels: "{not json".to_string(),
            ..base_config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().starts_with("malformed labels"));
    }

    #[test]
    fn test_server_version() {
        assert!(ensure_supported_server_version("v1.2.0").is_ok());
        assert!(ensure_supported_server_version("v0.2.0").is_ok());
        assert!(matches!(
            ensure_supported_server_version("v0.1.0-rc1"),
            Err(ConfigError::UnsupportedServerVersion(_))
        ));
    }
}
