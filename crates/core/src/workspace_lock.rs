//! Per-workspace exclusive lock for mutating operations (up/start/stop/delete).
//!
//! Two CLI invocations against the same workspace must not race each other.
//! Before a mutating operation begins, it takes an exclusive lock on a
//! marker file under the workspace's state directory and holds it for the
//! duration of the operation. A concurrent invocation that finds the lock
//! held retries once a second for up to five minutes before giving up.
//!
//! The lock is a plain file created with [`std::fs::OpenOptions::create_new`],
//! which is atomic on every platform this crate targets; this avoids the
//! unsafe `flock(2)` FFI call that advisory file locking would otherwise
//! need (see `docker::CliDocker` for the same avoid-unsafe-libc preference).
//! The file's contents are this process's PID, so a lock left behind by a
//! process that has since died is recognized as stale and reclaimed rather
//! than blocking forever.

use crate::errors::{DeaconError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

const LOCK_FILE_NAME: &str = "lock";
const RETRY_INTERVAL: Duration = Duration::from_secs(1);
const RETRY_BUDGET: Duration = Duration::from_secs(5 * 60);

/// An exclusive lock on a workspace's state directory, held for as long as
/// this value is alive. The lock file is removed when it is dropped.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
}

impl WorkspaceLock {
    /// Acquire the lock for `state_dir`, retrying once a second for up to
    /// five minutes if another live process currently holds it.
    #[instrument(skip(state_dir))]
    pub async fn acquire(state_dir: &Path) -> Result<Self> {
        fs::create_dir_all(state_dir).map_err(|e| {
            DeaconError::Runtime(format!(
                "failed to create state directory {}: {}",
                state_dir.display(),
                e
            ))
        })?;
        let path = state_dir.join(LOCK_FILE_NAME);

        let start = Instant::now();
        let mut warned = false;
        loop {
            match try_create_lock(&path)? {
                true => {
                    debug!("acquired workspace lock at {}", path.display());
                    return Ok(Self { path });
                }
                false => {
                    if start.elapsed() >= RETRY_BUDGET {
                        return Err(DeaconError::Runtime(format!(
                            "blocked by another process holding the lock at {}",
                            path.display()
                        )));
                    }
                    if !warned {
                        warn!(
                            "workspace lock at {} is held by another process, retrying for up to {:?}",
                            path.display(),
                            RETRY_BUDGET
                        );
                        warned = true;
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
            }
        }
    }

    /// Path of the lock file this guard holds.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(
                "failed to remove workspace lock at {}: {}",
                self.path.display(),
                e
            );
        } else {
            debug!("released workspace lock at {}", self.path.display());
        }
    }
}

/// Try to atomically create the lock file. Returns `Ok(true)` on success,
/// `Ok(false)` if a live process already holds it (reclaiming it first if
/// the owning PID is no longer running).
fn try_create_lock(path: &Path) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let _ = write!(file, "{}", std::process::id());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            if lock_owner_is_dead(path) {
                debug!(
                    "lock at {} belongs to a dead process, reclaiming",
                    path.display()
                );
                fs::remove_file(path).ok();
                return try_create_lock(path);
            }
            Ok(false)
        }
        Err(e) => Err(DeaconError::Runtime(format!(
            "failed to create lock file {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Best-effort liveness check for the process named in an existing lock
/// file. Unparseable or unreadable contents are treated as live (fail
/// closed) so a merely-racy read never causes an incorrect reclaim.
#[cfg(unix)]
fn lock_owner_is_dead(path: &Path) -> bool {
    let Ok(contents) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(pid) = contents.trim().parse::<u32>() else {
        return false;
    };
    // Sending signal 0 checks for process existence without side effects;
    // `kill` is the only portable POSIX way to probe this and is exposed by
    // `std::process` via a plain shell round-trip to avoid libc FFI.
    !std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|status| status.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn lock_owner_is_dead(_path: &Path) -> bool {
    false
}
