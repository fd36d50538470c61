//! VM template assembly.
//!
//! [`VmBuilder`] describes the VirtualMachine the driver submits to
//! Harvester: compute, the image-backed root disk, cloud-init, networking
//! and vGPU devices. Submitting it is left to the API client.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::PreparedMachine;
use crate::error::ConfigError;
use crate::vgpu::{VgpuInfo, VgpuRequest};

/// Creator recorded on VMs built by this driver.
pub const DEFAULT_CREATOR: &str = "docker-machine-driver-harvester";

/// Images are served through a per-image Longhorn storage class.
const STORAGE_CLASS_PREFIX: &str = "longhorn-";

/// Persistent volume mode of the root disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VolumeMode {
    Block,
    Filesystem,
}

/// Persistent volume access mode of the root disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadWriteMany,
}

/// How the root disk volume is provisioned from an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataVolumeOption {
    pub volume_mode: VolumeMode,
    pub access_mode: AccessMode,
    pub storage_class_name: String,
    /// `<namespace>/<image>`.
    pub image_id: String,
}

impl DataVolumeOption {
    /// Block, `ReadWriteMany` volume cloned from `image` through its Longhorn
    /// storage class. This keeps the VM live-migratable.
    #[must_use]
    pub fn for_image(namespace: &str, image: &str) -> Self {
        Self {
            volume_mode: VolumeMode::Block,
            access_mode: AccessMode::ReadWriteMany,
            storage_class_name: format!("{STORAGE_CLASS_PREFIX}{image}"),
            image_id: format!("{namespace}/{image}"),
        }
    }
}

/// Image-backed root disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    pub size: String,
    pub bus: String,
    pub volume: DataVolumeOption,
}

/// Cloud-init payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudInit {
    pub user_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_data: Option<String>,
}

/// How the VM NIC is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NetworkAttachment {
    /// Pod (management) network, masquerade binding.
    Management,
    /// Bridged VM network.
    #[serde(rename_all = "camelCase")]
    Bridge { network_name: String, model: String },
}

/// A VirtualMachine description ready to be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    pub namespace: String,
    pub name: String,
    pub creator: String,
    pub cpu: u32,
    pub memory: String,
    pub disk: DiskSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eviction_strategy: Option<String>,
    pub pod_anti_affinity: bool,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_init: Option<CloudInit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    pub networks: Vec<NetworkAttachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gpus: Vec<VgpuRequest>,
}

/// Builder for [`VirtualMachineSpec`].
#[derive(Debug, Clone, Default)]
pub struct VmBuilder {
    creator: String,
    namespace: String,
    name: String,
    cpu: u32,
    memory: String,
    disk: Option<DiskSpec>,
    eviction_strategy: Option<String>,
    pod_anti_affinity: bool,
    annotations: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
    cloud_init: Option<CloudInit>,
    ssh_keys: Vec<String>,
    networks: Vec<NetworkAttachment>,
    gpus: Vec<VgpuRequest>,
}

impl VmBuilder {
    /// Start a VM description recorded as created by `creator`.
    #[must_use]
    pub fn new(creator: impl Into<String>) -> Self {
        Self {
            creator: creator.into(),
            cpu: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn cpu(mut self, cpu: u32) -> Self {
        self.cpu = cpu;
        self
    }

    #[must_use]
    pub fn memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = memory.into();
        self
    }

    /// Boot from an image-backed root disk.
    #[must_use]
    pub fn image(
        mut self,
        size: impl Into<String>,
        bus: impl Into<String>,
        volume: DataVolumeOption,
    ) -> Self {
        self.disk = Some(DiskSpec {
            size: size.into(),
            bus: bus.into(),
            volume,
        });
        self
    }

    /// Live-migrate the VM on node drain instead of shutting it down.
    #[must_use]
    pub fn eviction_strategy(mut self, live_migrate: bool) -> Self {
        self.eviction_strategy = live_migrate.then(|| "LiveMigrate".to_string());
        self
    }

    /// Prefer spreading VMs across nodes.
    #[must_use]
    pub fn default_pod_anti_affinity(mut self) -> Self {
        self.pod_anti_affinity = true;
        self
    }

    #[must_use]
    pub fn annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations.extend(annotations);
        self
    }

    #[must_use]
    pub fn labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    /// Attach cloud-init data. Blank network data is omitted.
    #[must_use]
    pub fn cloud_init(mut self, user_data: impl Into<String>, network_data: &str) -> Self {
        self.cloud_init = Some(CloudInit {
            user_data: user_data.into(),
            network_data: (!network_data.trim().is_empty()).then(|| network_data.to_string()),
        });
        self
    }

    /// Inject a Harvester key pair.
    #[must_use]
    pub fn ssh_key(mut self, keypair_name: impl Into<String>) -> Self {
        self.ssh_keys.push(keypair_name.into());
        self
    }

    /// Attach a bridged VM network.
    #[must_use]
    pub fn bridge(mut self, network_name: impl Into<String>, model: impl Into<String>) -> Self {
        self.networks.push(NetworkAttachment::Bridge {
            network_name: network_name.into(),
            model: model.into(),
        });
        self
    }

    /// Attach the management network.
    #[must_use]
    pub fn management_network(mut self) -> Self {
        self.networks.push(NetworkAttachment::Management);
        self
    }

    /// Request the given vGPU devices, in order.
    #[must_use]
    pub fn vgpus(mut self, info: &VgpuInfo) -> Self {
        self.gpus.extend(info.vgpu_requests.iter().cloned());
        self
    }

    /// Finish the description.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the name, namespace, root disk or
    /// network attachment is missing.
    pub fn build(self) -> Result<VirtualMachineSpec, ConfigError> {
        if self.namespace.is_empty() || self.name.is_empty() {
            return Err(ConfigError::Invalid(
                "VM namespace and name are required".to_string(),
            ));
        }
        let disk = self.disk.ok_or_else(|| {
            ConfigError::Invalid(format!("VM {} has no root disk", self.name))
        })?;
        if self.networks.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "VM {} has no network attachment",
                self.name
            )));
        }

        Ok(VirtualMachineSpec {
            namespace: self.namespace,
            name: self.name,
            creator: self.creator,
            cpu: self.cpu,
            memory: self.memory,
            disk,
            eviction_strategy: self.eviction_strategy,
            pod_anti_affinity: self.pod_anti_affinity,
            annotations: self.annotations,
            labels: self.labels,
            cloud_init: self.cloud_init,
            ssh_keys: self.ssh_keys,
            networks: self.networks,
            gpus: self.gpus,
        })
    }
}

impl PreparedMachine {
    /// Assemble the VM description for this machine.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder rejects the description.
    pub fn into_spec(self) -> Result<VirtualMachineSpec, ConfigError> {
        let config = &self.config;
        let volume = DataVolumeOption::for_image(&config.namespace, &config.image_name);

        let mut builder = VmBuilder::new(DEFAULT_CREATOR)
            .namespace(&config.namespace)
            .name(&config.machine_name)
            .cpu(config.cpu)
            .memory(&config.memory_size)
            .image(&config.disk_size, &config.disk_bus, volume)
            .eviction_strategy(true)
            .default_pod_anti_affinity()
            .annotations(self.annotations)
            .labels(self.labels)
            .cloud_init(&config.user_data, &config.network_data)
            .vgpus(&self.vgpu);

        if let Some(keypair) = config.keypair_name.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.ssh_key(keypair);
        }

        builder = if config.is_pod_network() {
            builder.management_network()
        } else {
            match config.network_name.as_deref().filter(|n| !n.trim().is_empty()) {
                Some(network) => builder.bridge(network, &config.network_model),
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "network name is required for network type {}",
                        config.network_type
                    )))
                }
            }
        };

        let spec = builder.build()?;
        debug!(
            namespace = %spec.namespace,
            name = %spec.name,
            gpus = spec.gpus.len(),
            "VM spec assembled"
        );
        Ok(spec)
    }
}
