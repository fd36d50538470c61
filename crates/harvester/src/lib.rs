//! Harvester machine driver checks.
//!
//! Before a Harvester VM is created the driver validates everything it can
//! locally, so a bad request fails fast with a readable reason instead of
//! producing a VM with a broken guest network:
//!
//! - [`network`] - cloud-init network data must describe at most one default
//!   route, and a resolver bound to the interface that owns it.
//! - [`vgpu`] - the vGPU capability string is decoded into typed device
//!   requests.
//! - [`config`] - driver options, loaded from YAML, checked as a whole.
//! - [`vm`] - the VirtualMachine description handed to the API client.
//!
//! ## Example
//!
//! ```rust
//! use harvester::{check_network_data, parse_vgpu_info};
//!
//! check_network_data("
//! network:
//!   version: 1
//!   config:
//!     - type: physical
//!       name: enp1s0
//!       subnets:
//!         - type: dhcp
//! ").unwrap();
//!
//! let info = parse_vgpu_info(r#"{"vGPU":[{"name":"","deviceName":"nvidia.com/NVIDIA_A2-2Q"}]}"#).unwrap();
//! assert_eq!(info.vgpu_requests[0].device_name, "nvidia.com/NVIDIA_A2-2Q");
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod network;
pub mod vgpu;
pub mod vm;

pub use config::{ensure_supported_server_version, DriverConfig, PreparedMachine};
pub use error::{ConfigError, NetworkRuleViolation};
pub use network::{check_network_data, ConfigEntry, NetworkData, NetworkDocument, Subnet};
pub use vgpu::{parse_vgpu_info, VgpuInfo, VgpuRequest};
pub use vm::{VirtualMachineSpec, VmBuilder};
