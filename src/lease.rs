//! Single-instance lease backed by a PID marker file.
//!
//! The marker records the holder's PID and start time. A marker whose PID
//! is no longer alive is stale and may be taken over. Removing the marker
//! (or overwriting it with another PID) asks the holder to stop.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LeaseError;
use crate::poll_loop::LivenessProbe;

pub const DEFAULT_PID_FILE: &str = "carousell_scraper.pid";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub pid: u32,
    /// Absent for markers that only hold a bare PID
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstanceStatus {
    Running {
        record: LeaseRecord,
        process_name: Option<String>,
    },
    /// Marker present but its process is gone
    Stale(LeaseRecord),
    NotRunning,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    Terminated(u32),
    /// Marker pointed at a dead process; it was cleared
    StaleCleared(u32),
    NotRunning,
}

/// Held by the running scraper; the marker is removed on release or drop
#[derive(Debug)]
pub struct InstanceLease {
    path: PathBuf,
    record: LeaseRecord,
    released: bool,
}

impl InstanceLease {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LeaseError> {
        let path = path.into();
        let own_pid = std::process::id();

        match read_marker(&path) {
            Ok(Some(existing)) if existing.pid != own_pid && process_alive(existing.pid) => {
                return Err(LeaseError::AlreadyRunning { pid: existing.pid });
            }
            Ok(Some(existing)) if existing.pid != own_pid => {
                warn!(pid = existing.pid, path = %path.display(), "Taking over stale instance marker");
            }
            Ok(_) => {}
            Err(LeaseError::Corrupt { reason, .. }) => {
                warn!(path = %path.display(), reason = %reason, "Overwriting unreadable instance marker");
            }
            Err(e) => return Err(e),
        }

        let record = LeaseRecord {
            pid: own_pid,
            started_at: Some(Utc::now()),
        };
        write_marker(&path, &record)?;
        info!(pid = own_pid, path = %path.display(), "Instance lease acquired");

        Ok(Self {
            path,
            record,
            released: false,
        })
    }

    pub fn record(&self) -> &LeaseRecord {
        &self.record
    }

    /// True while the marker still names this process
    pub fn is_held(&self) -> bool {
        matches!(read_marker(&self.path), Ok(Some(record)) if record.pid == self.record.pid)
    }

    pub fn release(mut self) {
        self.release_marker();
    }

    fn release_marker(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if !self.is_held() {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Instance lease released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove instance marker"),
        }
    }
}

impl Drop for InstanceLease {
    fn drop(&mut self) {
        self.release_marker();
    }
}

impl LivenessProbe for InstanceLease {
    fn is_live(&self) -> bool {
        self.is_held()
    }
}

pub fn status(path: &Path) -> Result<InstanceStatus, LeaseError> {
    Ok(match read_marker(path)? {
        None => InstanceStatus::NotRunning,
        Some(record) if process_alive(record.pid) => InstanceStatus::Running {
            process_name: process_name(record.pid),
            record,
        },
        Some(record) => InstanceStatus::Stale(record),
    })
}

/// Terminate the recorded process and clear the marker.
pub fn stop(path: &Path) -> Result<StopOutcome, LeaseError> {
    let record = match read_marker(path)? {
        Some(record) => record,
        None => return Ok(StopOutcome::NotRunning),
    };

    let outcome = if process_alive(record.pid) {
        terminate(record.pid)?;
        info!(pid = record.pid, "Stopped scraper process");
        StopOutcome::Terminated(record.pid)
    } else {
        warn!(pid = record.pid, "No process found with recorded PID");
        StopOutcome::StaleCleared(record.pid)
    };

    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(source) => {
            return Err(LeaseError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }
    Ok(outcome)
}

fn read_marker(path: &Path) -> Result<Option<LeaseRecord>, LeaseError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LeaseError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let corrupt = |reason: String| LeaseError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };
    let raw = raw.trim();
    let record = match serde_json::from_str::<LeaseRecord>(raw) {
        Ok(record) => record,
        Err(json_err) => match raw.parse::<u32>() {
            Ok(pid) => LeaseRecord {
                pid,
                started_at: None,
            },
            Err(_) => return Err(corrupt(json_err.to_string())),
        },
    };

    // 0 and values past i32::MAX address process groups, never one process
    if record.pid == 0 || record.pid > i32::MAX as u32 {
        return Err(corrupt(format!("invalid pid {}", record.pid)));
    }
    Ok(Some(record))
}

fn write_marker(path: &Path, record: &LeaseRecord) -> Result<(), LeaseError> {
    let body = serde_json::to_string(record).map_err(|e| LeaseError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, body).map_err(|source| LeaseError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let proc_dir = Path::new("/proc");
    if proc_dir.is_dir() {
        return proc_dir.join(pid.to_string()).exists();
    }
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(windows)]
pub fn process_alive(pid: u32) -> bool {
    Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH"])
        .stderr(Stdio::null())
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

#[cfg(unix)]
fn process_name(pid: u32) -> Option<String> {
    let out = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "comm="])
        .stderr(Stdio::null())
        .output()
        .ok()?;
    let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!name.is_empty()).then_some(name)
}

#[cfg(windows)]
fn process_name(_pid: u32) -> Option<String> {
    None
}

fn terminate(pid: u32) -> Result<(), LeaseError> {
    if pid == std::process::id() {
        return Err(LeaseError::Terminate {
            pid,
            reason: "refusing to terminate the current process".into(),
        });
    }

    #[cfg(unix)]
    let mut command = {
        let mut command = Command::new("kill");
        command.args(["-TERM", &pid.to_string()]);
        command
    };
    #[cfg(windows)]
    let mut command = {
        let mut command = Command::new("taskkill");
        command.args(["/PID", &pid.to_string()]);
        command
    };

    let status = command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| LeaseError::Terminate {
            pid,
            reason: e.to_string(),
        })?;
    if !status.success() {
        return Err(LeaseError::Terminate {
            pid,
            reason: format!("signal command exited with {status}"),
        });
    }
    Ok(())
}
