//! Device path polling.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use crate::types::Transport;

/// Result of waiting for a device path.
#[derive(Debug, Default)]
pub struct WaitOutcome {
    /// Whether the path appeared.
    pub found: bool,
    /// Number of probes that ran.
    pub probes: u32,
    /// Last error observed while probing.
    pub last_error: Option<io::Error>,
}

impl WaitOutcome {
    /// The path was found by probe number `probes`.
    pub fn found(probes: u32) -> Self {
        Self {
            found: true,
            probes,
            last_error: None,
        }
    }

    /// The path did not appear within `probes` probes.
    pub fn missing(probes: u32, last_error: Option<io::Error>) -> Self {
        Self {
            found: false,
            probes,
            last_error,
        }
    }

    /// Human readable reason for a miss.
    pub fn detail(&self) -> String {
        match &self.last_error {
            Some(e) => e.to_string(),
            None => "device not present".to_string(),
        }
    }
}

/// Waits for a block device special file to show up.
#[cfg_attr(test, mockall::automock)]
pub trait PathWaiter {
    /// Probes `path` up to `attempts` times, `interval` apart.
    ///
    /// Returns early once `cancel` is set, so the worst case stays bounded by
    /// `attempts * interval`.
    fn wait_for_path(
        &self,
        path: &Path,
        attempts: u32,
        interval: Duration,
        transport: Transport,
        cancel: &AtomicBool,
    ) -> WaitOutcome;
}

/// [`PathWaiter`] that polls the filesystem with a fixed interval.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollingPathWaiter;

impl PollingPathWaiter {
    fn probe(path: &Path, transport: Transport) -> io::Result<()> {
        match transport {
            Transport::Tcp => fs::metadata(path).map(|_| ()),
            // Path is a glob pattern for RDMA
            Transport::Rdma => glob_probe(path),
        }
    }
}

fn glob_probe(path: &Path) -> io::Result<()> {
    let pattern = path.to_str().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "device path is not valid UTF-8")
    })?;
    let mut matches =
        glob::glob(pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    match matches.next() {
        Some(Ok(_)) => Ok(()),
        Some(Err(e)) => Err(e.into()),
        None => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no device matches {}", pattern),
        )),
    }
}

impl PathWaiter for PollingPathWaiter {
    fn wait_for_path(
        &self,
        path: &Path,
        attempts: u32,
        interval: Duration,
        transport: Transport,
        cancel: &AtomicBool,
    ) -> WaitOutcome {
        let mut last_error = None;
        let mut probes = 0;
        for attempt in 1..=attempts {
            probes = attempt;
            match Self::probe(path, transport) {
                Ok(()) => {
                    debug!(path = %path.display(), attempt, "Device path present");
                    return WaitOutcome::found(attempt);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    trace!(path = %path.display(), attempt, "Device path not present yet");
                    last_error = Some(e);
                }
                Err(e) => {
                    debug!(path = %path.display(), attempt, error = %e, "Device probe failed");
                    return WaitOutcome::missing(attempt, Some(e));
                }
            }

            if attempt == attempts {
                break;
            }
            if cancel.load(Ordering::Relaxed) {
                debug!(path = %path.display(), attempt, "Wait for device cancelled");
                break;
            }
            thread::sleep(interval);
        }
        WaitOutcome::missing(probes, last_error)
    }
}
