//! End-to-end connect/disconnect against a fake kernel tree.
//!
//! The fabrics device, controller class directory and by-id directory are
//! plain files under a temporary root. Controllers the "kernel" would create
//! are staged up front; a delete request shows up as "1" in
//! `delete_controller`.

use std::fs;
use std::path::Path;
use std::thread;

use nvmf_common::{NvmfError, PathsConfig};
use nvmf_connector::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const NQN: &str = "nqn.2014-08.org.nvmexpress:uuid:5b9a8f3c-target";
const HOST_A: &str = "nqn.2014-08.org.nvmexpress:uuid:host-a";
const HOST_B: &str = "nqn.2014-08.org.nvmexpress:uuid:host-b";
const UUID: &str = "58668891-c3e4-45d0-b90e-824525c16080";

// ============================================================================
// FAKE HOST
// ============================================================================

struct FakeHost {
    _root: TempDir,
    paths: PathsConfig,
}

impl FakeHost {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let paths = PathsConfig::rooted_at(root.path());
        fs::create_dir_all(paths.fabrics_device.parent().unwrap()).unwrap();
        fs::write(&paths.fabrics_device, "").unwrap();
        fs::create_dir_all(&paths.controller_dir).unwrap();
        fs::create_dir_all(&paths.device_by_id_dir).unwrap();
        Self { _root: root, paths }
    }

    fn mgr(&self) -> ConnectorMgr {
        ConnectorMgr::new(&self.paths)
    }

    fn store(&self) -> FsSessionStore {
        FsSessionStore::new(&self.paths.run_dir)
    }

    fn add_controller(&self, name: &str, subsysnqn: &str, hostnqn: Option<&str>) {
        let dir = self.paths.controller_dir.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(attrs::SUBSYSNQN), format!("{}\n", subsysnqn)).unwrap();
        if let Some(hostnqn) = hostnqn {
            fs::write(dir.join(attrs::HOSTNQN), format!("{}\n", hostnqn)).unwrap();
        }
        fs::write(dir.join(attrs::DELETE_CONTROLLER), "").unwrap();
    }

    fn add_device(&self, uuid: &str) {
        fs::write(
            self.paths
                .device_by_id_dir
                .join(format!("{}.{}", DEVICE_UUID_PREFIX, uuid)),
            "",
        )
        .unwrap();
    }

    fn delete_requested(&self, name: &str) -> bool {
        let trigger = self
            .paths
            .controller_dir
            .join(name)
            .join(attrs::DELETE_CONTROLLER);
        fs::read_to_string(trigger).unwrap() == DELETE_TRIGGER
    }

    fn fabrics_written(&self) -> String {
        fs::read_to_string(&self.paths.fabrics_device).unwrap()
    }
}

fn connector(host_nqn: &str) -> Connector {
    Connector {
        volume_id: "pvc-7f1c".to_string(),
        device_uuid: UUID.to_string(),
        target_nqn: NQN.to_string(),
        target_addr: "192.168.10.4".to_string(),
        target_port: "4420".to_string(),
        transport: "tcp".to_string(),
        host_nqn: host_nqn.to_string(),
        retry_count: 1,
        check_interval: 1,
    }
}

// ============================================================================
// CONNECT
// ============================================================================

#[test]
fn test_connect_then_disconnect() {
    let host = FakeHost::new();
    host.add_controller("nvme0", NQN, Some(HOST_A));
    host.add_device(UUID);
    let mgr = host.mgr();

    let mut c = connector(HOST_A);
    let device = mgr.connect(&mut c).unwrap();

    assert_eq!(
        device,
        host.paths
            .device_by_id_dir
            .join(format!("nvme-uuid.{}", UUID))
    );
    assert_eq!(
        host.fabrics_written(),
        format!(
            "nqn={},transport=tcp,traddr=192.168.10.4,trsvcid=4420,hostnqn={}",
            NQN, HOST_A
        )
    );
    assert!(host.store().has_session(NQN, HOST_A).unwrap());

    mgr.disconnect(&c).unwrap();

    assert!(host.delete_requested("nvme0"));
    assert!(!host.store().subsystem_dir(NQN).exists());
}

#[test]
fn test_connect_validation_has_no_side_effects() {
    let host = FakeHost::new();
    let mgr = host.mgr();

    let mut bad_transport = connector(HOST_A);
    bad_transport.transport = "fc".to_string();
    let err = mgr.connect(&mut bad_transport).unwrap_err();
    assert!(matches!(err, NvmfError::InvalidTransport { .. }));

    let mut long_nqn = connector(HOST_A);
    long_nqn.target_nqn = "n".repeat(NVMF_NQN_SIZE + 1);
    let err = mgr.connect(&mut long_nqn).unwrap_err();
    assert!(err.is_validation());

    assert_eq!(host.fabrics_written(), "");
    assert!(!host.paths.run_dir.exists());
}

#[test]
fn test_connect_timeout_rolls_back() {
    let host = FakeHost::new();
    // Kernel created the controller but the namespace never showed up
    host.add_controller("nvme0", NQN, Some(HOST_A));
    let mgr = host.mgr();

    let mut c = connector(HOST_A);
    let err = mgr.connect(&mut c).unwrap_err();

    match err {
        NvmfError::DeviceTimeout { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(host.delete_requested("nvme0"));
    assert!(!host.store().has_session(NQN, HOST_A).unwrap());
}

#[test]
fn test_earlier_cancel_does_not_cut_later_wait() {
    let host = FakeHost::new();
    let mgr = host.mgr();
    mgr.cancel_handle()
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let mut c = connector(HOST_A);
    c.retry_count = 2;
    let err = mgr.connect(&mut c).unwrap_err();

    match err {
        NvmfError::DeviceTimeout { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("unexpected error {:?}", other),
    }

    host.add_device(UUID);
    mgr.connect(&mut connector(HOST_A)).unwrap();
}

#[test]
fn test_connect_without_fabrics_device() {
    let host = FakeHost::new();
    fs::remove_file(&host.paths.fabrics_device).unwrap();
    let mgr = host.mgr();

    let err = mgr.connect(&mut connector(HOST_A)).unwrap_err();
    assert!(err.is_not_found());
    assert!(!host.paths.run_dir.exists());
}

#[test]
fn test_connect_fills_retry_defaults() {
    let host = FakeHost::new();
    host.add_device(UUID);
    let mgr = host.mgr();

    let mut c = connector(HOST_A);
    c.retry_count = 0;
    c.check_interval = 0;
    c.transport = "TCP".to_string();
    mgr.connect(&mut c).unwrap();

    assert_eq!(c.retry_count, DEFAULT_RETRY_COUNT);
    assert_eq!(c.check_interval, DEFAULT_CHECK_INTERVAL);
    assert!(host.fabrics_written().contains("transport=tcp"));
}

// ============================================================================
// DISCONNECT
// ============================================================================

#[test]
fn test_shared_subsystem_without_hostnqn_attribute() {
    let host = FakeHost::new();
    // Older kernels do not expose hostnqn
    host.add_controller("nvme0", NQN, None);
    host.add_device(UUID);
    let mgr = host.mgr();

    let mut a = connector(HOST_A);
    let mut b = connector(HOST_B);
    mgr.connect(&mut a).unwrap();
    mgr.connect(&mut b).unwrap();

    mgr.disconnect(&a).unwrap();
    assert!(!host.delete_requested("nvme0"));
    assert!(host.store().has_session(NQN, HOST_B).unwrap());

    mgr.disconnect(&b).unwrap();
    assert!(host.delete_requested("nvme0"));
    assert!(!host.store().subsystem_dir(NQN).exists());
}

#[test]
fn test_disconnect_only_touches_own_controllers() {
    let host = FakeHost::new();
    host.add_controller("nvme0", NQN, Some(HOST_A));
    host.add_controller("nvme1", NQN, Some(HOST_B));
    host.add_controller("nvme2", "nqn.2014-08.org.nvmexpress:uuid:other", Some(HOST_A));
    host.add_device(UUID);
    let mgr = host.mgr();

    let mut a = connector(HOST_A);
    let mut b = connector(HOST_B);
    mgr.connect(&mut a).unwrap();
    mgr.connect(&mut b).unwrap();

    mgr.disconnect(&a).unwrap();
    assert!(host.delete_requested("nvme0"));
    assert!(!host.delete_requested("nvme1"));
    assert!(!host.delete_requested("nvme2"));
    assert_eq!(host.store().sessions(NQN).unwrap(), vec![HOST_B.to_string()]);
}

#[test]
fn test_disconnect_twice() {
    let host = FakeHost::new();
    host.add_controller("nvme0", NQN, Some(HOST_A));
    host.add_device(UUID);
    let mgr = host.mgr();

    let mut c = connector(HOST_A);
    mgr.connect(&mut c).unwrap();
    mgr.disconnect(&c).unwrap();

    // Kernel removed the controller
    fs::remove_dir_all(host.paths.controller_dir.join("nvme0")).unwrap();
    mgr.disconnect(&c).unwrap();
}

#[test]
fn test_disconnect_with_no_controllers_clears_bookkeeping() {
    let host = FakeHost::new();
    host.add_device(UUID);
    let mgr = host.mgr();

    let mut c = connector(HOST_A);
    mgr.connect(&mut c).unwrap();

    let err = mgr.disconnect(&c).unwrap_err();
    assert!(matches!(err, NvmfError::NothingDisconnected { .. }));
    assert!(!host.store().subsystem_dir(NQN).exists());

    // Bookkeeping is already gone, so a retry succeeds
    mgr.disconnect(&c).unwrap();
}

#[test]
fn test_disconnect_requires_host_nqn() {
    let host = FakeHost::new();
    let mgr = host.mgr();

    let err = mgr.disconnect(&connector("")).unwrap_err();
    assert!(matches!(err, NvmfError::MissingField { field: "HostNqn" }));
}

// ============================================================================
// PERSISTED RECORDS AND CONCURRENCY
// ============================================================================

#[test]
fn test_persisted_record_drives_disconnect() {
    let host = FakeHost::new();
    host.add_controller("nvme0", NQN, Some(HOST_A));
    host.add_device(UUID);

    let target = host.paths.run_dir.parent().unwrap().join("staging/pvc-7f1c");
    fs::create_dir_all(&target).unwrap();

    let mut c = connector(HOST_A);
    host.mgr().connect(&mut c).unwrap();
    persist_connector(&c, connector_file_path(&target)).unwrap();

    // A new process picks the record up
    let loaded = load_connector(connector_file_path(&target)).unwrap();
    assert_eq!(loaded, c);
    host.mgr().disconnect(&loaded).unwrap();
    remove_connector_file(&target);

    assert!(host.delete_requested("nvme0"));
    assert!(!target.exists());
    assert!(!connector_file_path(&target).exists());
}

#[test]
fn test_concurrent_connects_to_one_subsystem() {
    let host = FakeHost::new();
    host.add_device(UUID);
    let mgr = host.mgr();

    let hosts: Vec<String> = (0..8)
        .map(|i| format!("nqn.2014-08.org.nvmexpress:uuid:host-{}", i))
        .collect();
    thread::scope(|s| {
        for host_nqn in &hosts {
            let mgr = &mgr;
            s.spawn(move || {
                let mut c = connector(host_nqn);
                mgr.connect(&mut c).unwrap();
            });
        }
    });

    let mut recorded = host.store().sessions(NQN).unwrap();
    recorded.sort();
    let mut expected = hosts.clone();
    expected.sort();
    assert_eq!(recorded, expected);
}

#[test]
fn test_host_nqn_file() {
    let host = FakeHost::new();
    let path: &Path = &host.paths.host_nqn_file;
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("{}\n", HOST_A)).unwrap();

    assert_eq!(read_host_nqn(path).unwrap(), HOST_A);
}
