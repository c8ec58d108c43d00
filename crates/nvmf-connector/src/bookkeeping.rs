//! Host session bookkeeping.
//!
//! Records which local host NQNs hold a logical session to each target
//! subsystem. The tree looks like
//!
//! ```text
//! /run/nvmf/
//!   nqn.2014-08.org.nvmexpress:uuid:target/
//!     bnFuLjIwMTQtMDguaG9zdA==      <- one marker per host NQN
//! ```
//!
//! An empty (or missing) subsystem directory means no local consumer is left
//! and the kernel controller can be released.

use std::fs::{self, DirBuilder, File};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;

use base64::engine::general_purpose::URL_SAFE as MARKER_ENGINE;
use base64::Engine as _;
use tracing::debug;

use nvmf_common::{NvmfError, NvmfResult};

/// Mode of per-subsystem bookkeeping directories.
pub const SUBSYSTEM_DIR_MODE: u32 = 0o750;

/// Registry of local host sessions per subsystem.
pub trait SessionStore {
    /// Records that `host_nqn` holds a session to `nqn`.
    fn record_session(&self, nqn: &str, host_nqn: &str) -> NvmfResult<()>;

    /// Forgets `host_nqn`'s session to `nqn`; a missing entry is not an error.
    fn remove_session(&self, nqn: &str, host_nqn: &str) -> NvmfResult<()>;

    /// Returns true if no host holds a session to `nqn`.
    fn is_empty(&self, nqn: &str) -> NvmfResult<bool>;

    /// Drops every entry recorded for `nqn`.
    fn remove_all(&self, nqn: &str) -> NvmfResult<()>;

    /// Returns true if `host_nqn` holds a session to `nqn`.
    fn has_session(&self, nqn: &str, host_nqn: &str) -> NvmfResult<bool>;
}

/// Encodes a host NQN into a file name.
pub fn encode_marker(host_nqn: &str) -> String {
    MARKER_ENGINE.encode(host_nqn.as_bytes())
}

/// Decodes a marker file name back into the host NQN.
pub fn decode_marker(name: &str) -> Option<String> {
    let bytes = MARKER_ENGINE.decode(name).ok()?;
    String::from_utf8(bytes).ok()
}

/// Filesystem-backed [`SessionStore`].
#[derive(Debug, Clone)]
pub struct FsSessionStore {
    root: PathBuf,
}

impl FsSessionStore {
    /// Creates a store rooted at `root` (usually `/run/nvmf`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the markers for `nqn`.
    pub fn subsystem_dir(&self, nqn: &str) -> PathBuf {
        self.root.join(nqn)
    }

    /// Marker file for `(nqn, host_nqn)`.
    pub fn marker_path(&self, nqn: &str, host_nqn: &str) -> PathBuf {
        self.subsystem_dir(nqn).join(encode_marker(host_nqn))
    }

    /// Lists host NQNs with a recorded session to `nqn`.
    ///
    /// Entries whose name does not decode are skipped.
    pub fn sessions(&self, nqn: &str) -> NvmfResult<Vec<String>> {
        let dir = self.subsystem_dir(nqn);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(NvmfError::io(&dir, e)),
        };

        let mut hosts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| NvmfError::io(&dir, e))?;
            let name = entry.file_name();
            match name.to_str().and_then(decode_marker) {
                Some(host) => hosts.push(host),
                None => debug!(dir = %dir.display(), entry = ?name, "Skipping foreign entry"),
            }
        }
        hosts.sort();
        Ok(hosts)
    }
}

impl SessionStore for FsSessionStore {
    fn record_session(&self, nqn: &str, host_nqn: &str) -> NvmfResult<()> {
        let dir = self.subsystem_dir(nqn);
        DirBuilder::new()
            .recursive(true)
            .mode(SUBSYSTEM_DIR_MODE)
            .create(&dir)
            .map_err(|e| NvmfError::io(&dir, e))?;

        let marker = self.marker_path(nqn, host_nqn);
        File::create(&marker).map_err(|e| NvmfError::io(&marker, e))?;
        debug!(nqn, host_nqn, marker = %marker.display(), "Recorded host session");
        Ok(())
    }

    fn remove_session(&self, nqn: &str, host_nqn: &str) -> NvmfResult<()> {
        let marker = self.marker_path(nqn, host_nqn);
        match fs::remove_file(&marker) {
            Ok(()) => {
                debug!(nqn, host_nqn, "Removed host session");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NvmfError::io(&marker, e)),
        }
    }

    fn is_empty(&self, nqn: &str) -> NvmfResult<bool> {
        let dir = self.subsystem_dir(nqn);
        match fs::read_dir(&dir) {
            Ok(mut entries) => Ok(entries.next().is_none()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(NvmfError::io(&dir, e)),
        }
    }

    fn remove_all(&self, nqn: &str) -> NvmfResult<()> {
        let dir = self.subsystem_dir(nqn);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NvmfError::io(&dir, e)),
        }
    }

    fn has_session(&self, nqn: &str, host_nqn: &str) -> NvmfResult<bool> {
        let marker = self.marker_path(nqn, host_nqn);
        match fs::symlink_metadata(&marker) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(NvmfError::io(&marker, e)),
        }
    }
}
