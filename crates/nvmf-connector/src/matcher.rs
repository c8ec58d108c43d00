//! Kernel controller enumeration and subsystem matching.
//!
//! Every fabrics controller shows up as a directory under
//! `/sys/class/nvme-fabrics/ctl`. Matching reads its `subsysnqn` and
//! `hostnqn` attributes and compares them verbatim against the target.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, warn};

use nvmf_common::{fileio, NvmfError, NvmfResult};

use crate::sysfs::{attrs, DELETE_TRIGGER};

/// Read-only controller attributes used for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerAttr {
    /// Subsystem NQN.
    SubsysNqn,
    /// Host NQN.
    HostNqn,
}

impl ControllerAttr {
    /// Attribute file name.
    pub fn file_name(&self) -> &'static str {
        match self {
            ControllerAttr::SubsysNqn => attrs::SUBSYSNQN,
            ControllerAttr::HostNqn => attrs::HOSTNQN,
        }
    }
}

/// Iterator over controller instance names.
pub type Instances = Box<dyn Iterator<Item = String>>;

/// Access to the kernel's fabrics controller table.
pub trait ControllerTable {
    /// Lazily enumerates controller instance names.
    fn instances(&self) -> NvmfResult<Instances>;

    /// Reads the first line of an instance attribute.
    fn read_attr(&self, instance: &str, attr: ControllerAttr) -> NvmfResult<String>;

    /// Requests deletion of an instance.
    fn delete(&self, instance: &str) -> NvmfResult<()>;
}

/// [`ControllerTable`] backed by the sysfs class directory.
#[derive(Debug, Clone)]
pub struct SysfsControllerTable {
    root: PathBuf,
}

impl SysfsControllerTable {
    /// Creates a table reading from `root` (usually `/sys/class/nvme-fabrics/ctl`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn attr_path(&self, instance: &str, file: &str) -> PathBuf {
        self.root.join(instance).join(file)
    }
}

impl ControllerTable for SysfsControllerTable {
    fn instances(&self) -> NvmfResult<Instances> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.root.display(), "No fabrics controller directory");
                return Ok(Box::new(std::iter::empty()));
            }
            Err(e) => return Err(NvmfError::io(&self.root, e)),
        };

        let root = self.root.clone();
        Ok(Box::new(entries.filter_map(move |entry| match entry {
            Ok(entry) => Some(entry.file_name().to_string_lossy().into_owned()),
            Err(e) => {
                warn!(dir = %root.display(), error = %e, "Skipping unreadable controller entry");
                None
            }
        })))
    }

    fn read_attr(&self, instance: &str, attr: ControllerAttr) -> NvmfResult<String> {
        fileio::read_first_line(self.attr_path(instance, attr.file_name()))
    }

    fn delete(&self, instance: &str) -> NvmfResult<()> {
        fileio::write_str(
            self.attr_path(instance, attrs::DELETE_CONTROLLER),
            DELETE_TRIGGER,
        )
    }
}

/// Which controllers a teardown pass may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope<'a> {
    /// Subsystem and host NQN must both match.
    Host {
        /// Subsystem NQN.
        nqn: &'a str,
        /// Host NQN.
        host_nqn: &'a str,
    },
    /// Subsystem NQN alone, for kernels without a `hostnqn` attribute.
    Subsystem {
        /// Subsystem NQN.
        nqn: &'a str,
    },
}

impl<'a> MatchScope<'a> {
    /// Matches controllers of `nqn` connected as `host_nqn`.
    pub fn host(nqn: &'a str, host_nqn: &'a str) -> Self {
        MatchScope::Host { nqn, host_nqn }
    }

    /// Matches every controller of `nqn`.
    pub fn subsystem(nqn: &'a str) -> Self {
        MatchScope::Subsystem { nqn }
    }

    /// Tests whether `instance` falls in this scope.
    ///
    /// Read errors are returned as-is and never retried.
    pub fn matches<T>(&self, table: &T, instance: &str) -> NvmfResult<bool>
    where
        T: ControllerTable + ?Sized,
    {
        let nqn = match self {
            MatchScope::Host { nqn, .. } | MatchScope::Subsystem { nqn } => *nqn,
        };
        if !attr_equals(table, instance, ControllerAttr::SubsysNqn, nqn)? {
            debug!(instance, nqn, "Not this subsystem, skip");
            return Ok(false);
        }

        if let MatchScope::Host { host_nqn, .. } = self {
            if !attr_equals(table, instance, ControllerAttr::HostNqn, host_nqn)? {
                debug!(instance, host_nqn, "Controller belongs to another host, skip");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Like [`MatchScope::matches`], logging read errors as a non-match.
    pub fn accepts<T>(&self, table: &T, instance: &str) -> bool
    where
        T: ControllerTable + ?Sized,
    {
        match self.matches(table, instance) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(instance, error = %e, "Cannot read controller attributes, skip");
                false
            }
        }
    }
}

/// Compares an attribute against `expected` with exact string equality.
pub fn attr_equals<T>(
    table: &T,
    instance: &str,
    attr: ControllerAttr,
    expected: &str,
) -> NvmfResult<bool>
where
    T: ControllerTable + ?Sized,
{
    Ok(table.read_attr(instance, attr)? == expected)
}
