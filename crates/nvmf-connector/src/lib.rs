//! # nvmf-connector - NVMe-over-Fabrics attach/detach for one host
//!
//! Turns a volume request into a kernel NVMf session and a stable device
//! path, and releases it again without disturbing other local consumers of
//! the same subsystem.
//!
//! ## Responsibilities
//! - Connect: validate, write `/dev/nvme-fabrics`, wait for the device,
//!   record the host session; roll everything back on failure
//! - Disconnect: drop the host session and, once no local session is left,
//!   delete the subsystem's kernel controllers
//! - Persist connector records so a later process can disconnect
//!
//! ## Kernel and runtime files
//!
//! | Path | Purpose |
//! |------|---------|
//! | `/dev/nvme-fabrics` | Connect requests |
//! | `/sys/class/nvme-fabrics/ctl/<ctrl>/subsysnqn` | Controller subsystem |
//! | `/sys/class/nvme-fabrics/ctl/<ctrl>/hostnqn` | Controller host (optional) |
//! | `/sys/class/nvme-fabrics/ctl/<ctrl>/delete_controller` | Controller removal |
//! | `/dev/disk/by-id/nvme-uuid.<uuid>` | Device handed to the caller |
//! | `/run/nvmf/<nqn>/<base64 hostnqn>` | Host session markers |
//!
//! ## Example
//!
//! ```ignore
//! use nvmf_common::{NvmfConfig, DEFAULT_CONFIG_PATH};
//! use nvmf_connector::{Connector, ConnectorMgr};
//!
//! let config = NvmfConfig::load_or_default(DEFAULT_CONFIG_PATH)?;
//! let mgr = ConnectorMgr::new(&config.paths);
//! let mut connector = Connector { /* ... */ ..Default::default() };
//! let device = mgr.connect(&mut connector)?;
//! // ...
//! mgr.disconnect(&connector)?;
//! ```

pub mod bookkeeping;
mod connector_mgr;
pub mod fabrics;
mod locks;
pub mod matcher;
pub mod persist;
pub mod poller;
mod sysfs;
mod types;

pub use bookkeeping::{FsSessionStore, SessionStore};
pub use connector_mgr::ConnectorMgr;
pub use fabrics::{FabricsDevice, FabricsPort};
pub use locks::{SubsystemGuard, SubsystemLocks};
pub use matcher::{ControllerAttr, ControllerTable, MatchScope, SysfsControllerTable};
pub use persist::{
    connector_file_path, load_connector, persist_connector, read_host_nqn, remove_connector_file,
};
pub use poller::{PathWaiter, PollingPathWaiter, WaitOutcome};
pub use sysfs::*;
pub use types::*;
