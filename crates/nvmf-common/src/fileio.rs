//! Line-oriented file helpers for kernel pseudo-files.
//!
//! sysfs attributes and the fabrics control device are plain text files that
//! expect a single write and answer with newline separated lines. These
//! helpers keep the path attached to every error.
//!
//! # Example
//!
//! ```ignore
//! use nvmf_common::fileio;
//!
//! let nqn = fileio::read_first_line("/sys/class/nvme-fabrics/ctl/nvme0/subsysnqn")?;
//! fileio::write_str("/sys/class/nvme-fabrics/ctl/nvme0/delete_controller", "1")?;
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::error::{NvmfError, NvmfResult};

/// Writes `s` to an already opened file in one call.
pub fn write_string_to<W: Write>(writer: &mut W, s: &str) -> io::Result<()> {
    writer.write_all(s.as_bytes())?;
    writer.flush()
}

/// Reads every line from a reader, without trailing newlines.
pub fn read_lines_from<R: Read>(reader: R) -> io::Result<Vec<String>> {
    BufReader::new(reader).lines().collect()
}

/// Opens an existing file write-only and writes `s` to it.
///
/// The file is never created or truncated, matching how sysfs action
/// attributes behave.
pub fn write_str(path: impl AsRef<Path>, s: &str) -> NvmfResult<()> {
    let path = path.as_ref();
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| NvmfError::io(path, e))?;
    write_string_to(&mut file, s).map_err(|e| NvmfError::io(path, e))
}

/// Reads a file as lines.
pub fn read_lines(path: impl AsRef<Path>) -> NvmfResult<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| NvmfError::io(path, e))?;
    read_lines_from(file).map_err(|e| NvmfError::io(path, e))
}

/// Reads the first line of a single-line attribute file.
///
/// An empty file is reported as `UnexpectedEof`.
pub fn read_first_line(path: impl AsRef<Path>) -> NvmfResult<String> {
    let path = path.as_ref();
    read_lines(path)?.into_iter().next().ok_or_else(|| {
        NvmfError::io(
            path,
            io::Error::new(io::ErrorKind::UnexpectedEof, "attribute file is empty"),
        )
    })
}
