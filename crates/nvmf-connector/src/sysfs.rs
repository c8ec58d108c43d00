//! Kernel interface constants for nvmf-connector

/// Maximum subsystem NQN length accepted by the connector
pub const NVMF_NQN_SIZE: usize = 256;

/// Prefix of stable by-id links created for NVMe namespaces
pub const DEVICE_UUID_PREFIX: &str = "nvme-uuid";

/// Value written to `delete_controller` to drop a controller
pub const DELETE_TRIGGER: &str = "1";

/// Default RetryCount applied when the connector leaves it at zero
pub const DEFAULT_RETRY_COUNT: i32 = 10;

/// Default CheckInterval (seconds) applied when the connector leaves it at zero
pub const DEFAULT_CHECK_INTERVAL: i32 = 1;

/// Per-controller attribute file names
pub mod attrs {
    /// Subsystem NQN the controller is connected to
    pub const SUBSYSNQN: &str = "subsysnqn";

    /// Host NQN used for the connection (absent on older kernels)
    pub const HOSTNQN: &str = "hostnqn";

    /// Write-only action that removes the controller
    pub const DELETE_CONTROLLER: &str = "delete_controller";
}

/// Keys of the fabrics connect argument string
pub mod connect_keys {
    pub const NQN: &str = "nqn";
    pub const TRANSPORT: &str = "transport";
    pub const TRADDR: &str = "traddr";
    pub const TRSVCID: &str = "trsvcid";
    pub const HOSTNQN: &str = "hostnqn";

    // Keys of the control device response
    pub const INSTANCE: &str = "instance";
    pub const CNTLID: &str = "cntlid";
}
