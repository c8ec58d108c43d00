//! ConnectorMgr - attach and detach of NVMf namespaces on this host.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use nvmf_common::{NvmfError, NvmfResult, PathsConfig};

use crate::bookkeeping::{FsSessionStore, SessionStore};
use crate::fabrics::{FabricsDevice, FabricsPort};
use crate::locks::SubsystemLocks;
use crate::matcher::{ControllerTable, MatchScope, SysfsControllerTable};
use crate::poller::{PathWaiter, PollingPathWaiter};
use crate::types::{validate_nqn, Connector};

/// ConnectorMgr drives the connect/disconnect protocol.
///
/// Connect flow:
/// 1. Validate the connector (no side effects before this)
/// 2. Write the connect string to the fabrics control device
/// 3. Wait for `/dev/disk/by-id/nvme-uuid.<uuid>` to appear
/// 4. Record the host session in the bookkeeping tree
///
/// Any failure after step 2 tears the subsystem down again through the same
/// routine Disconnect uses.
pub struct ConnectorMgr<
    S = FsSessionStore,
    C = SysfsControllerTable,
    W = PollingPathWaiter,
    F = FabricsDevice,
> {
    sessions: S,
    controllers: C,
    waiter: W,
    fabrics: F,
    device_by_id_dir: PathBuf,
    locks: SubsystemLocks,
    cancel: Arc<AtomicBool>,
}

impl ConnectorMgr {
    /// Creates a manager operating on the real (or rebased) host paths.
    pub fn new(paths: &PathsConfig) -> Self {
        Self::with_parts(
            FsSessionStore::new(&paths.run_dir),
            SysfsControllerTable::new(&paths.controller_dir),
            PollingPathWaiter,
            FabricsDevice::new(&paths.fabrics_device),
            &paths.device_by_id_dir,
        )
    }
}

impl<S, C, W, F> ConnectorMgr<S, C, W, F>
where
    S: SessionStore,
    C: ControllerTable,
    W: PathWaiter,
    F: FabricsPort,
{
    /// Assembles a manager from explicit components.
    pub fn with_parts(
        sessions: S,
        controllers: C,
        waiter: W,
        fabrics: F,
        device_by_id_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            sessions,
            controllers,
            waiter,
            fabrics,
            device_by_id_dir: device_by_id_dir.as_ref().to_path_buf(),
            locks: SubsystemLocks::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Session bookkeeping in use.
    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    /// Controller table in use.
    pub fn controllers(&self) -> &C {
        &self.controllers
    }

    /// Flag that aborts a pending device wait when set.
    ///
    /// Each `connect` clears it on entry, so a cancellation only affects
    /// waits already in progress.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Connects `connector` and returns the device path.
    ///
    /// Retry defaults are written back into `connector`, so a record
    /// persisted afterwards carries the effective values.
    #[instrument(
        skip(self, connector),
        fields(volume = %connector.volume_id, nqn = %connector.target_nqn, host_nqn = %connector.host_nqn)
    )]
    pub fn connect(&self, connector: &mut Connector) -> NvmfResult<PathBuf> {
        self.cancel.store(false, Ordering::Relaxed);
        let transport = connector.normalize()?;
        let args = connector.connect_args(transport);
        let device_path = connector.device_path(&self.device_by_id_dir);

        let _guard = self.locks.lock(&connector.target_nqn);

        self.fabrics.connect(&args)?;
        info!(
            "Connect volume {} success nqn: {}, hostnqn: {}",
            connector.volume_id, connector.target_nqn, connector.host_nqn
        );

        let outcome = self.waiter.wait_for_path(
            &device_path,
            connector.poll_attempts(),
            connector.poll_interval(),
            transport,
            &self.cancel,
        );
        if !outcome.found {
            error!(
                device = %device_path.display(),
                error = %outcome.detail(),
                "Device did not appear, rollback"
            );
            self.rollback(&connector.target_nqn, &connector.host_nqn);
            return Err(NvmfError::DeviceTimeout {
                path: device_path,
                attempts: outcome.probes,
                detail: outcome.detail(),
            });
        }

        if let Err(e) = self
            .sessions
            .record_session(&connector.target_nqn, &connector.host_nqn)
        {
            error!(error = %e, "Cannot record host session, rollback");
            self.rollback(&connector.target_nqn, &connector.host_nqn);
            return Err(e);
        }

        info!(device = %device_path.display(), "After connect returning device path");
        Ok(device_path)
    }

    /// Releases this host's session to the connector's subsystem.
    ///
    /// Only `TargetNqn` and `HostNqn` are used. Calling it again after a
    /// successful run is a no-op.
    #[instrument(
        skip(self, connector),
        fields(volume = %connector.volume_id, nqn = %connector.target_nqn, host_nqn = %connector.host_nqn)
    )]
    pub fn disconnect(&self, connector: &Connector) -> NvmfResult<()> {
        validate_nqn(&connector.target_nqn)?;
        if connector.host_nqn.is_empty() {
            return Err(NvmfError::MissingField { field: "HostNqn" });
        }

        let _guard = self.locks.lock(&connector.target_nqn);
        let removed = self.teardown(&connector.target_nqn, &connector.host_nqn)?;
        info!(removed, "Disconnect complete");
        Ok(())
    }

    /// Drops `host_nqn`'s session and, if it was the last one, the
    /// subsystem's kernel controllers. Returns the number of controllers
    /// removed.
    ///
    /// The caller must hold the subsystem lock.
    fn teardown(&self, nqn: &str, host_nqn: &str) -> NvmfResult<usize> {
        let had_sessions = !self.sessions.is_empty(nqn)?;
        self.sessions.remove_session(nqn, host_nqn)?;

        let mut removed = self.delete_matching(MatchScope::host(nqn, host_nqn))?;

        if !self.sessions.is_empty(nqn)? {
            info!(nqn, removed, "Other host sessions remain, keeping subsystem");
            return Ok(removed);
        }

        if removed == 0 {
            info!(nqn, "No controller exposes a matching hostnqn, falling back to subsystem match");
            removed = self.delete_matching(MatchScope::subsystem(nqn))?;
        }

        self.sessions.remove_all(nqn)?;

        if removed == 0 && had_sessions {
            return Err(NvmfError::NothingDisconnected {
                nqn: nqn.to_string(),
            });
        }
        Ok(removed)
    }

    /// Deletes every controller in `scope`; per-instance failures are logged.
    fn delete_matching(&self, scope: MatchScope<'_>) -> NvmfResult<usize> {
        let mut removed = 0;
        for instance in self.controllers.instances()? {
            if !scope.accepts(&self.controllers, &instance) {
                continue;
            }
            match self.controllers.delete(&instance) {
                Ok(()) => {
                    info!(instance = %instance, ?scope, "Deleted controller");
                    removed += 1;
                }
                Err(e) => {
                    error!(instance = %instance, error = %e, "Disconnect: delete controller error");
                }
            }
        }
        debug!(?scope, removed, "Controller scan finished");
        Ok(removed)
    }

    fn rollback(&self, nqn: &str, host_nqn: &str) {
        match self.teardown(nqn, host_nqn) {
            Ok(removed) => info!(nqn, removed, "Rollback complete"),
            Err(e) => error!(nqn, error = %e, "Rollback error"),
        }
    }
}
