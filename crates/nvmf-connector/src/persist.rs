//! Connector record persistence.
//!
//! The node plugin stores the connector next to the staging path
//! (`<target>.json`) after a successful connect so that a later unstage,
//! possibly in a new process, can rebuild it and disconnect.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use nvmf_common::{fileio, NvmfError, NvmfResult};

use crate::types::Connector;

/// Writes `connector` as JSON to `path`, replacing any previous record.
pub fn persist_connector(connector: &Connector, path: impl AsRef<Path>) -> NvmfResult<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| {
        NvmfError::persist(path, format!("error creating nvmf persistence file: {}", e))
    })?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, connector)
        .map_err(|e| NvmfError::persist(path, format!("error encoding connector: {}", e)))?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|e| NvmfError::persist(path, format!("error writing connector: {}", e)))?;

    debug!(path = %path.display(), volume = %connector.volume_id, "Persisted connector");
    Ok(())
}

/// Reads a connector previously written by [`persist_connector`].
pub fn load_connector(path: impl AsRef<Path>) -> NvmfResult<Connector> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|e| NvmfError::io(path, e))?;
    serde_json::from_slice(&data)
        .map_err(|e| NvmfError::persist(path, format!("error decoding connector: {}", e)))
}

/// Record path belonging to a staging target path.
pub fn connector_file_path(target_path: impl AsRef<Path>) -> PathBuf {
    let mut path = target_path.as_ref().as_os_str().to_owned();
    path.push(".json");
    PathBuf::from(path)
}

/// Removes `<target_path>.json` and the `target_path` tree.
///
/// Failures are logged only; a missing file or directory is ignored.
pub fn remove_connector_file(target_path: impl AsRef<Path>) {
    let target_path = target_path.as_ref();
    let record = connector_file_path(target_path);

    match fs::remove_file(&record) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!(path = %record.display(), error = %e, "Can't remove connector file"),
    }
    match fs::remove_dir_all(target_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!(path = %target_path.display(), error = %e, "Failed to remove mount path"),
    }
}

/// Reads this host's NQN, the first non-empty line of `path`.
pub fn read_host_nqn(path: impl AsRef<Path>) -> NvmfResult<String> {
    let path = path.as_ref();
    fileio::read_lines(path)?
        .into_iter()
        .map(|line| line.trim().to_string())
        .find(|line| !line.is_empty())
        .ok_or(NvmfError::MissingField { field: "HostNqn" })
}
