//! vGPU capability decoding.
//!
//! The driver receives requested vGPU profiles as a small document keyed by
//! `vGPU`, for example:
//!
//! ```json
//! {"vGPU":[{"name":"","deviceName":"nvidia.com/NVIDIA_A2-2Q"}]}
//! ```
//!
//! Each entry becomes one [`VgpuRequest`] on the VM template. Device names
//! are opaque here; the allocation layer validates them.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Raw capability document.
#[derive(Debug, Clone, Default, Deserialize)]
struct VgpuCapabilities {
    #[serde(rename = "vGPU", default)]
    vgpu: Vec<VgpuDescriptor>,
}

/// Raw device descriptor as supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
struct VgpuDescriptor {
    /// Display name, unused downstream.
    #[serde(default)]
    #[allow(dead_code)]
    name: String,
    #[serde(rename = "deviceName")]
    device_name: String,
}

/// A single vGPU allocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VgpuRequest {
    /// Resource name, e.g. `nvidia.com/NVIDIA_A2-2Q`.
    #[serde(rename = "deviceName")]
    pub device_name: String,
}

/// Decoded vGPU requests, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VgpuInfo {
    /// One request per descriptor.
    #[serde(rename = "vGPURequests")]
    pub vgpu_requests: Vec<VgpuRequest>,
}

impl VgpuInfo {
    /// Whether no vGPU was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vgpu_requests.is_empty()
    }

    /// Reject requests without a device name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDeviceName`] for the first request whose
    /// device name is blank.
    pub fn require_device_names(&self) -> Result<(), ConfigError> {
        match self
            .vgpu_requests
            .iter()
            .position(|r| r.device_name.trim().is_empty())
        {
            Some(index) => Err(ConfigError::MissingDeviceName { index }),
            None => Ok(()),
        }
    }
}

/// Decode a vGPU capability string into typed requests.
///
/// Blank input decodes to an empty request list.
///
/// # Errors
///
/// Returns [`ConfigError::Malformed`] if the input does not parse or has the
/// wrong shape.
pub fn parse_vgpu_info(raw: &str) -> Result<VgpuInfo, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(VgpuInfo::default());
    }

    let capabilities: VgpuCapabilities =
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Malformed {
            what: "vGPU info",
            source,
        })?;

    Ok(VgpuInfo {
        vgpu_requests: capabilities
            .vgpu
            .into_iter()
            .map(|d| VgpuRequest {
                device_name: d.device_name,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_preserves_order() {
        let raw = r#"{"vGPU":[{"name":"","deviceName":"nvidia.com/NVIDIA_A2-2Q"},{"name":"","deviceName":"nvidia.com/NVIDIA_A2-1Q"}]}"#;
        let info = parse_vgpu_info(raw).unwrap();

        assert_eq!(
            info,
            VgpuInfo {
                vgpu_requests: vec![
                    VgpuRequest {
                        device_name: "nvidia.com/NVIDIA_A2-2Q".to_string(),
                    },
                    VgpuRequest {
                        device_name: "nvidia.com/NVIDIA_A2-1Q".to_string(),
                    },
                ],
            }
        );
    }

    #[test]
    fn test_parse_block_yaml() {
        let raw = "
vGPU:
  - name: small
    deviceName: nvidia.com/NVIDIA_A2-1Q
";
        let info = parse_vgpu_info(raw).unwrap();
        assert_eq!(info.vgpu_requests.len(), 1);
        assert_eq!(info.vgpu_requests[0].device_name, "nvidia.com/NVIDIA_A2-1Q");
    }

    #[test]
    fn test_blank_input() {
        assert!(parse_vgpu_info("").unwrap().is_empty());
        assert!(parse_vgpu_info(" \n").unwrap().is_empty());
    }

    #[test]
    fn test_empty_device_name_passes_through() {
        let info = parse_vgpu_info(r#"{"vGPU":[{"name":"a","deviceName":""}]}"#).unwrap();
        assert_eq!(info.vgpu_requests[0].device_name, "");

        let err = info.require_device_names().unwrap_err();
        assert!(matches!(err, ConfigError::MissingDeviceName { index: 0 }));
        assert!(err.is_rule_violation());
    }

    #[test]
    fn test_missing_device_name_is_malformed() {
        let err = parse_vgpu_info(r#"{"vGPU":[{"name":"a"}]}"#).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let err = parse_vgpu_info(r#"{"vGPU":"nvidia.com/NVIDIA_A2-2Q"}"#).unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().starts_with("malformed vGPU info"));
    }

    #[test]
    fn test_parse_is_repeatable() {
        let raw = r#"{"vGPU":[{"name":"","deviceName":"nvidia.com/NVIDIA_A2-2Q"},{"name":"","deviceName":"nvidia.com/NVIDIA_A2-1Q"}]}"#;
        assert_eq!(parse_vgpu_info(raw).unwrap(), parse_vgpu_info(raw).unwrap());

        let bad = r#"{"vGPU":[{"name":"a"}]}"#;
        let first = parse_vgpu_info(bad).unwrap_err().to_string();
        let second = parse_vgpu_info(bad).unwrap_err().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn test_serializes_with_device_name_key() {
        let info = VgpuInfo {
            vgpu_requests: vec![VgpuRequest {
                device_name: "nvidia.com/NVIDIA_A2-2Q".to_string(),
            }],
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"vGPURequests": [{"deviceName": "nvidia.com/NVIDIA_A2-2Q"}]})
        );
    }
}
