//! Connector record and related request types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nvmf_common::{NvmfError, NvmfResult};

use crate::sysfs::{
    connect_keys, DEFAULT_CHECK_INTERVAL, DEFAULT_RETRY_COUNT, DEVICE_UUID_PREFIX, NVMF_NQN_SIZE,
};

/// Fabric transport accepted by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// NVMe/TCP.
    Tcp,
    /// NVMe/RDMA.
    Rdma,
}

impl Transport {
    /// Returns the name the kernel expects in connect strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Rdma => "rdma",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = NvmfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "rdma" => Ok(Transport::Rdma),
            _ => Err(NvmfError::invalid_transport(s)),
        }
    }
}

/// Checks that a subsystem NQN is non-empty, within the kernel limit and
/// usable as a single path component.
pub fn validate_nqn(nqn: &str) -> NvmfResult<()> {
    if nqn.is_empty() {
        return Err(NvmfError::MissingField { field: "TargetNqn" });
    }
    if nqn.len() > NVMF_NQN_SIZE {
        return Err(NvmfError::NqnTooLong {
            nqn: nqn.to_string(),
            len: nqn.len(),
            max: NVMF_NQN_SIZE,
        });
    }
    if nqn == "." || nqn == ".." || nqn.contains(['/', '\0']) {
        return Err(NvmfError::invalid_nqn(
            nqn,
            "must be a single path component",
        ));
    }
    Ok(())
}

/// Attach request as handed over by the volume publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NvmfDiskInfo {
    /// Volume name
    pub vol_name: String,
    /// Subsystem NQN
    pub nqn: String,
    /// Target address
    pub addr: String,
    /// Target service id
    pub port: String,
    /// Namespace UUID
    pub device_uuid: String,
    /// Fabric transport
    pub transport: String,
}

/// One logical NVMf attachment.
///
/// The serialized field names are part of the on-disk record format and
/// must stay stable across releases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Connector {
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    #[serde(rename = "DeviceUUID")]
    pub device_uuid: String,
    #[serde(rename = "TargetNqn")]
    pub target_nqn: String,
    #[serde(rename = "TargetAddr")]
    pub target_addr: String,
    #[serde(rename = "TargetPort")]
    pub target_port: String,
    #[serde(rename = "Transport")]
    pub transport: String,
    #[serde(rename = "HostNqn")]
    pub host_nqn: String,
    #[serde(rename = "RetryCount")]
    pub retry_count: i32,
    #[serde(rename = "CheckInterval")]
    pub check_interval: i32,
}

impl Connector {
    /// Builds a connector for `info` on behalf of `host_nqn`.
    ///
    /// Retry parameters are left at zero so [`Connector::normalize`] picks
    /// the defaults.
    pub fn from_disk_info(info: &NvmfDiskInfo, host_nqn: impl Into<String>) -> Self {
        Self {
            volume_id: info.vol_name.clone(),
            device_uuid: info.device_uuid.clone(),
            target_nqn: info.nqn.clone(),
            target_addr: info.addr.clone(),
            target_port: info.port.clone(),
            transport: info.transport.clone(),
            host_nqn: host_nqn.into(),
            retry_count: 0,
            check_interval: 0,
        }
    }

    /// Applies retry defaults and validates the record.
    ///
    /// Must run before any side effect; returns the parsed transport.
    pub fn normalize(&mut self) -> NvmfResult<Transport> {
        if self.retry_count == 0 {
            self.retry_count = DEFAULT_RETRY_COUNT;
        }
        if self.check_interval == 0 {
            self.check_interval = DEFAULT_CHECK_INTERVAL;
        }
        if self.retry_count < 0 || self.check_interval < 0 {
            return Err(NvmfError::InvalidRetryParams {
                retry_count: self.retry_count,
                check_interval: self.check_interval,
            });
        }

        let transport = self.transport.parse::<Transport>()?;
        validate_nqn(&self.target_nqn)?;
        if self.host_nqn.is_empty() {
            return Err(NvmfError::MissingField { field: "HostNqn" });
        }
        Ok(transport)
    }

    /// Builds the string written to the fabrics control device.
    pub fn connect_args(&self, transport: Transport) -> String {
        format!(
            "{}={},{}={},{}={},{}={},{}={}",
            connect_keys::NQN,
            self.target_nqn,
            connect_keys::TRANSPORT,
            transport,
            connect_keys::TRADDR,
            self.target_addr,
            connect_keys::TRSVCID,
            self.target_port,
            connect_keys::HOSTNQN,
            self.host_nqn
        )
    }

    /// Path where the namespace is expected to show up.
    pub fn device_path(&self, by_id_dir: &Path) -> PathBuf {
        by_id_dir.join(format!("{}.{}", DEVICE_UUID_PREFIX, self.device_uuid))
    }

    /// Number of probes for the device path, never less than one.
    pub fn poll_attempts(&self) -> u32 {
        if self.check_interval <= 0 {
            return 1;
        }
        u32::try_from(self.retry_count / self.check_interval)
            .unwrap_or(0)
            .max(1)
    }

    /// Delay between probes.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.check_interval).unwrap_or(0))
    }
}

/// Reply of the fabrics control device after a successful connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Controller instance number (`nvme<instance>`).
    pub instance: u32,
    /// Controller id assigned by the target.
    pub cntlid: u32,
}

impl ConnectResponse {
    /// Name of the controller entry under the fabrics class directory.
    pub fn controller_name(&self) -> String {
        format!("nvme{}", self.instance)
    }
}

impl FromStr for ConnectResponse {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut instance = None;
        let mut cntlid = None;
        for pair in s.trim().split(',') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("malformed pair '{}'", pair))?;
            let value = value
                .parse::<u32>()
                .map_err(|e| format!("bad value for {}: {}", key, e))?;
            match key {
                connect_keys::INSTANCE => instance = Some(value),
                connect_keys::CNTLID => cntlid = Some(value),
                _ => {}
            }
        }
        match (instance, cntlid) {
            (Some(instance), Some(cntlid)) => Ok(Self { instance, cntlid }),
            _ => Err(format!("missing instance or cntlid in '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Connector {
        Connector {
            volume_id: "pvc-1".to_string(),
            device_uuid: "58668891-c3e4-45d0-b90e-824525c16080".to_string(),
            target_nqn: "nqn.2014-08.org.nvmexpress:uuid:target".to_string(),
            target_addr: "10.0.0.5".to_string(),
            target_port: "4420".to_string(),
            transport: "tcp".to_string(),
            host_nqn: "nqn.2014-08.org.nvmexpress:uuid:host".to_string(),
            retry_count: 0,
            check_interval: 0,
        }
    }

    #[test]
    fn test_transport_case_insensitive() {
        for t in ["tcp", "TCP", "Tcp", "rdma", "RDMA", "rDmA"] {
            assert!(t.parse::<Transport>().is_ok(), "{} should parse", t);
        }
        assert_eq!("RDMA".parse::<Transport>().unwrap(), Transport::Rdma);
        assert!(matches!(
            "fc".parse::<Transport>(),
            Err(NvmfError::InvalidTransport { .. })
        ));
        assert!("".parse::<Transport>().is_err());
    }

    #[test]
    fn test_normalize_defaults() {
        let mut c = sample();
        let transport = c.normalize().unwrap();
        assert_eq!(transport, Transport::Tcp);
        assert_eq!(c.retry_count, 10);
        assert_eq!(c.check_interval, 1);
        assert_eq!(c.poll_attempts(), 10);
        assert_eq!(c.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_normalize_keeps_explicit_values() {
        let mut c = sample();
        c.retry_count = 30;
        c.check_interval = 3;
        c.normalize().unwrap();
        assert_eq!(c.retry_count, 30);
        assert_eq!(c.check_interval, 3);
        assert_eq!(c.poll_attempts(), 10);
    }

    #[test]
    fn test_normalize_negative() {
        let mut c = sample();
        c.retry_count = -1;
        assert!(matches!(
            c.normalize(),
            Err(NvmfError::InvalidRetryParams { retry_count: -1, .. })
        ));

        let mut c = sample();
        c.check_interval = -5;
        assert!(matches!(
            c.normalize(),
            Err(NvmfError::InvalidRetryParams { .. })
        ));
    }

    #[test]
    fn test_normalize_rejects_bad_transport() {
        let mut c = sample();
        c.transport = "fc".to_string();
        assert!(matches!(
            c.normalize(),
            Err(NvmfError::InvalidTransport { .. })
        ));
    }

    #[test]
    fn test_normalize_rejects_missing_nqns() {
        let mut c = sample();
        c.target_nqn.clear();
        assert!(matches!(
            c.normalize(),
            Err(NvmfError::MissingField { field: "TargetNqn" })
        ));

        let mut c = sample();
        c.host_nqn.clear();
        assert!(matches!(
            c.normalize(),
            Err(NvmfError::MissingField { field: "HostNqn" })
        ));
    }

    #[test]
    fn test_validate_nqn() {
        assert!(validate_nqn(&"n".repeat(NVMF_NQN_SIZE)).is_ok());
        assert!(matches!(
            validate_nqn(&"n".repeat(NVMF_NQN_SIZE + 1)),
            Err(NvmfError::NqnTooLong { len: 257, max: 256, .. })
        ));
        assert!(matches!(
            validate_nqn("../etc"),
            Err(NvmfError::InvalidNqn { .. })
        ));
        assert!(validate_nqn("..").is_err());
    }

    #[test]
    fn test_poll_attempts_never_zero() {
        let mut c = sample();
        c.retry_count = 1;
        c.check_interval = 5;
        assert_eq!(c.poll_attempts(), 1);
    }

    #[test]
    fn test_connect_args() {
        let mut c = sample();
        c.transport = "TCP".to_string();
        let transport = c.normalize().unwrap();
        assert_eq!(
            c.connect_args(transport),
            "nqn=nqn.2014-08.org.nvmexpress:uuid:target,transport=tcp,traddr=10.0.0.5,\
             trsvcid=4420,hostnqn=nqn.2014-08.org.nvmexpress:uuid:host"
        );
    }

    #[test]
    fn test_device_path() {
        let c = sample();
        assert_eq!(
            c.device_path(Path::new("/dev/disk/by-id")),
            PathBuf::from("/dev/disk/by-id/nvme-uuid.58668891-c3e4-45d0-b90e-824525c16080")
        );
    }

    #[test]
    fn test_from_disk_info() {
        let info = NvmfDiskInfo {
            vol_name: "pvc-1".to_string(),
            nqn: "nqn.a".to_string(),
            addr: "10.0.0.5".to_string(),
            port: "4420".to_string(),
            device_uuid: "uuid-1".to_string(),
            transport: "rdma".to_string(),
        };
        let c = Connector::from_disk_info(&info, "nqn.host");
        assert_eq!(c.volume_id, "pvc-1");
        assert_eq!(c.target_nqn, "nqn.a");
        assert_eq!(c.host_nqn, "nqn.host");
        assert_eq!(c.retry_count, 0);
    }

    #[test]
    fn test_record_field_names() {
        let mut c = sample();
        c.retry_count = 10;
        c.check_interval = 1;
        let value = serde_json::to_value(&c).unwrap();
        for key in [
            "VolumeID",
            "DeviceUUID",
            "TargetNqn",
            "TargetAddr",
            "TargetPort",
            "Transport",
            "HostNqn",
            "RetryCount",
            "CheckInterval",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["RetryCount"], 10);
    }

    #[test]
    fn test_connect_response() {
        let r: ConnectResponse = "instance=3,cntlid=17\n".parse().unwrap();
        assert_eq!(r, ConnectResponse { instance: 3, cntlid: 17 });
        assert_eq!(r.controller_name(), "nvme3");
        assert!("instance=3".parse::<ConnectResponse>().is_err());
        assert!("garbage".parse::<ConnectResponse>().is_err());
    }
}
