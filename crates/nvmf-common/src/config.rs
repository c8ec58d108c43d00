//! Configuration file support for the NVMf connector
//!
//! Loads and validates host path configuration from TOML files.
//! Default location: /etc/nvmf/nvmfctl.conf
//!
//! Every path is overridable so the connector can run against a scratch
//! directory tree instead of the real devfs/sysfs.

use crate::error::{NvmfError, NvmfResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nvmf/nvmfctl.conf";

/// Kernel and runtime paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Fabrics control device that accepts connect strings
    #[serde(default = "default_fabrics_device")]
    pub fabrics_device: PathBuf,

    /// Directory holding one entry per fabrics controller instance
    #[serde(default = "default_controller_dir")]
    pub controller_dir: PathBuf,

    /// Root of the host session bookkeeping tree
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,

    /// Directory with stable by-id device links
    #[serde(default = "default_device_by_id_dir")]
    pub device_by_id_dir: PathBuf,

    /// File holding this host's NQN
    #[serde(default = "default_host_nqn_file")]
    pub host_nqn_file: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Complete connector configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvmfConfig {
    /// Path configuration
    #[serde(default)]
    pub paths: PathsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_fabrics_device() -> PathBuf {
    PathBuf::from("/dev/nvme-fabrics")
}

fn default_controller_dir() -> PathBuf {
    PathBuf::from("/sys/class/nvme-fabrics/ctl")
}

fn default_run_dir() -> PathBuf {
    PathBuf::from("/run/nvmf")
}

fn default_device_by_id_dir() -> PathBuf {
    PathBuf::from("/dev/disk/by-id")
}

fn default_host_nqn_file() -> PathBuf {
    PathBuf::from("/etc/nvme/hostnqn")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            fabrics_device: default_fabrics_device(),
            controller_dir: default_controller_dir(),
            run_dir: default_run_dir(),
            device_by_id_dir: default_device_by_id_dir(),
            host_nqn_file: default_host_nqn_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PathsConfig {
    /// Builds a path layout rooted under `root`, mirroring the real tree.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let defaults = Self::default();
        let rebase = |p: &Path| root.join(p.strip_prefix("/").unwrap_or(p));
        Self {
            fabrics_device: rebase(&defaults.fabrics_device),
            controller_dir: rebase(&defaults.controller_dir),
            run_dir: rebase(&defaults.run_dir),
            device_by_id_dir: rebase(&defaults.device_by_id_dir),
            host_nqn_file: rebase(&defaults.host_nqn_file),
        }
    }
}

impl NvmfConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> NvmfResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content).map_err(|e| {
                    NvmfError::Config(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(NvmfError::io(path, e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> NvmfResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| NvmfError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content).map_err(|e| NvmfError::io(path, e))
    }

    /// Validate configuration
    pub fn validate(&self) -> NvmfResult<()> {
        let paths = [
            ("fabrics_device", &self.paths.fabrics_device),
            ("controller_dir", &self.paths.controller_dir),
            ("run_dir", &self.paths.run_dir),
            ("device_by_id_dir", &self.paths.device_by_id_dir),
            ("host_nqn_file", &self.paths.host_nqn_file),
        ];
        for (name, path) in paths {
            if !path.is_absolute() {
                return Err(NvmfError::Config(format!(
                    "{} must be an absolute path, got {}",
                    name,
                    path.display()
                )));
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(NvmfError::Config("logging.level must not be empty".to_string()));
        }

        Ok(())
    }
}
