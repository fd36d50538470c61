//! Harvester CLI - check machine driver input before creating a VM.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use harvester::{
    check_network_data, ensure_supported_server_version, parse_vgpu_info, DriverConfig,
};

/// Harvester CLI - validate VM network data, vGPU requests and driver config.
#[derive(Parser)]
#[command(name = "harvester")]
#[command(about = "Validate Harvester machine driver input before VM creation")]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate cloud-init network data.
    CheckNetwork {
        /// Network data file (`-` for stdin).
        path: PathBuf,
    },

    /// Decode a vGPU capability string.
    ParseVgpu {
        /// Capability document, e.g. `{"vGPU":[{"name":"","deviceName":"..."}]}`.
        info: String,
    },

    /// Check that a Harvester server version is supported.
    CheckVersion {
        /// Server version (e.g. `v1.2.0`).
        version: String,
    },

    /// Run every local check on a driver config file.
    Validate {
        /// Driver config file (YAML).
        #[arg(long, env = "HARVESTER_DRIVER_CONFIG")]
        config: PathBuf,
    },

    /// Print the VM description for a driver config file as JSON.
    Render {
        /// Driver config file (YAML).
        #[arg(long, env = "HARVESTER_DRIVER_CONFIG")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckNetwork { path } => {
            let raw = read_input(&path)?;
            check_network_data(&raw)
                .with_context(|| format!("Network data rejected: {}", path.display()))?;
            println!("✅ Network data is valid");
        }

        Commands::ParseVgpu { info } => {
            let vgpu = parse_vgpu_info(&info).context("Failed to decode vGPU info")?;
            info!(requests = vgpu.vgpu_requests.len(), "Decoded vGPU info");
            println!("{}", serde_json::to_string_pretty(&vgpu)?);
        }

        Commands::CheckVersion { version } => {
            ensure_supported_server_version(&version)?;
            println!("✅ Harvester {version} is supported");
        }

        Commands::Validate { config } => {
            let prepared = load_config(&config)?
                .validate()
                .context("Driver config rejected")?;
            println!(
                "✅ {}/{} is valid ({} vGPU request(s))",
                prepared.config.namespace,
                prepared.config.machine_name,
                prepared.vgpu.vgpu_requests.len()
            );
        }

        Commands::Render { config } => {
            let spec = load_config(&config)?
                .validate()
                .context("Driver config rejected")?
                .into_spec()
                .context("Failed to assemble VM spec")?;
            println!("{}", serde_json::to_string_pretty(&spec)?);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<DriverConfig> {
    info!(path = %path.display(), "Loading driver config");
    DriverConfig::from_yaml_file(path)
        .with_context(|| format!("Failed to load driver config: {}", path.display()))
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
