//! Fabrics control device.

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use nvmf_common::{fileio, NvmfError, NvmfResult};

use crate::types::ConnectResponse;

/// Issues fabric connect requests to the kernel.
#[cfg_attr(test, mockall::automock)]
pub trait FabricsPort {
    /// Writes a connect argument string.
    ///
    /// A returned error means no session was created. The parsed reply is
    /// informational only; `None` means the kernel answer was absent or
    /// unreadable.
    fn connect(&self, args: &str) -> NvmfResult<Option<ConnectResponse>>;
}

/// [`FabricsPort`] backed by `/dev/nvme-fabrics`.
#[derive(Debug, Clone)]
pub struct FabricsDevice {
    path: PathBuf,
}

impl FabricsDevice {
    /// Creates a port writing to the control device at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FabricsPort for FabricsDevice {
    fn connect(&self, args: &str) -> NvmfResult<Option<ConnectResponse>> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| {
                error!(path = %self.path.display(), error = %e, "Connect: open NVMf fabrics error");
                NvmfError::io(&self.path, e)
            })?;

        debug!(args, "Connect: writing fabrics arguments");
        fileio::write_string_to(&mut file, args).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "Connect: write arg to connect file error");
            NvmfError::io(&self.path, e)
        })?;

        let lines = match fileio::read_lines_from(&mut file) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Connect: cannot read fabrics reply");
                return Ok(None);
            }
        };
        let Some(reply) = lines.first() else {
            return Ok(None);
        };
        match reply.parse::<ConnectResponse>() {
            Ok(response) => {
                info!(
                    controller = %response.controller_name(),
                    cntlid = response.cntlid,
                    "Connect: kernel created controller"
                );
                Ok(Some(response))
            }
            Err(e) => {
                warn!(reply = %reply, error = %e, "Connect: unexpected fabrics reply");
                Ok(None)
            }
        }
    }
}
