//! Error types for NVMf connector operations.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for NVMf operations.
pub type NvmfResult<T> = Result<T, NvmfError>;

/// Errors that can occur while attaching or detaching NVMf devices.
#[derive(Debug, Error)]
pub enum NvmfError {
    /// Transport is neither `tcp` nor `rdma`.
    #[error("Unsupported transport '{transport}': only tcp and rdma are supported")]
    InvalidTransport {
        /// The rejected transport value.
        transport: String,
    },

    /// Negative RetryCount or CheckInterval.
    #[error(
        "Invalid RetryCount and CheckInterval combination \
         (RetryCount: {retry_count}, CheckInterval: {check_interval})"
    )]
    InvalidRetryParams {
        /// The requested retry count.
        retry_count: i32,
        /// The requested check interval in seconds.
        check_interval: i32,
    },

    /// Subsystem NQN exceeds the kernel limit.
    #[error("NQN '{nqn}' is {len} bytes long, maximum is {max}")]
    NqnTooLong {
        /// The rejected NQN.
        nqn: String,
        /// Its length in bytes.
        len: usize,
        /// The maximum accepted length.
        max: usize,
    },

    /// NQN cannot be used as a bookkeeping directory name.
    #[error("Invalid NQN '{nqn}': {reason}")]
    InvalidNqn {
        /// The rejected NQN.
        nqn: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required connector field is empty.
    #[error("Missing required field {field}")]
    MissingField {
        /// Field name as it appears in the persisted record.
        field: &'static str,
    },

    /// I/O against a kernel or bookkeeping file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The expected block device never appeared.
    #[error("Device {} did not appear after {attempts} attempt(s): {detail}", path.display())]
    DeviceTimeout {
        /// The expected device path.
        path: PathBuf,
        /// Number of probes performed.
        attempts: u32,
        /// Last error observed by the poller.
        detail: String,
    },

    /// Teardown was expected but no controller instance was removed.
    #[error("Failed to disconnect by nqn: {nqn}")]
    NothingDisconnected {
        /// The subsystem NQN.
        nqn: String,
    },

    /// Persisted connector record could not be written or read.
    #[error("Connector record {}: {message}", path.display())]
    Persist {
        /// The record path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NvmfError {
    /// Creates an I/O error bound to a path.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates an invalid transport error.
    pub fn invalid_transport(transport: impl Into<String>) -> Self {
        Self::InvalidTransport {
            transport: transport.into(),
        }
    }

    /// Creates an invalid NQN error.
    pub fn invalid_nqn(nqn: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNqn {
            nqn: nqn.into(),
            reason: reason.into(),
        }
    }

    /// Creates a persistence error.
    pub fn persist(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Persist {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Returns true if the request was rejected before any side effect.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            NvmfError::InvalidTransport { .. }
                | NvmfError::InvalidRetryParams { .. }
                | NvmfError::NqnTooLong { .. }
                | NvmfError::InvalidNqn { .. }
                | NvmfError::MissingField { .. }
        )
    }

    /// Returns true if the underlying error is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NvmfError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
