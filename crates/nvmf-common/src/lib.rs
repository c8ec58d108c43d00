//! Common infrastructure for the NVMf connector.
//!
//! - [`error`]: Error types shared by every connector component
//! - [`fileio`]: Line-oriented helpers for sysfs and devfs pseudo-files
//! - [`config`]: TOML configuration for kernel and runtime paths

pub mod config;
pub mod error;
pub mod fileio;

// Re-export commonly used items at crate root
pub use config::{LoggingConfig, NvmfConfig, PathsConfig, DEFAULT_CONFIG_PATH};
pub use error::{NvmfError, NvmfResult};
