//! In-container agent support: daemon configuration, idle-timeout monitor,
//! activity marker, and the final result document (§6, §10).
//!
//! This is ambient context for the long-lived agent process that runs
//! inside the dev container after `up` completes; it is not the CLI's own
//! request/response loop. Loading the config and writing results are
//! synchronous and cheap enough to call directly; the idle monitor runs as
//! a background task for the lifetime of the agent process.

use crate::errors::{DeaconError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, instrument, warn};

const DAEMON_CONFIG_PATH: &str = "/var/run/secrets/devpod/daemon_config";
const DAEMON_CONFIG_ENV: &str = "DEVPOD_WORKSPACE_DAEMON_CONFIG";
const RESULT_PATH: &str = "/var/run/devpod/result.json";
const ACTIVITY_MARKER_PATH: &str = "/var/run/devpod/last_activity";

/// Configuration for the in-container agent, loaded from a mounted secret
/// or an environment variable fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonConfig {
    /// Workspace identifier, used for logging/labeling.
    #[serde(default)]
    pub workspace_id: Option<String>,
    /// Terminate the workspace after this many seconds without a tunnel
    /// request touching the activity marker. `None` disables the monitor.
    #[serde(default)]
    pub idle_timeout_seconds: Option<u64>,
}

impl DaemonConfig {
    /// Load the daemon config from `/var/run/secrets/devpod/daemon_config`
    /// (base64-encoded JSON) if present, otherwise from the
    /// `DEVPOD_WORKSPACE_DAEMON_CONFIG` environment variable. Returns
    /// `Ok(None)` when neither source is present.
    #[instrument]
    pub fn load() -> Result<Option<Self>> {
        let path = Path::new(DAEMON_CONFIG_PATH);
        if path.exists() {
            debug!("loading daemon config from {}", path.display());
            let raw = std::fs::read_to_string(path).map_err(|e| {
                DeaconError::Runtime(format!(
                    "failed to read daemon config at {}: {}",
                    path.display(),
                    e
                ))
            })?;
            return Self::decode(raw.trim()).map(Some);
        }

        if let Ok(encoded) = std::env::var(DAEMON_CONFIG_ENV) {
            debug!("loading daemon config from {}", DAEMON_CONFIG_ENV);
            return Self::decode(encoded.trim()).map(Some);
        }

        Ok(None)
    }

    fn decode(encoded: &str) -> Result<Self> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DeaconError::Runtime(format!("invalid daemon config base64: {}", e)))?;
        serde_json::from_slice(&decoded)
            .map_err(|e| DeaconError::Runtime(format!("invalid daemon config JSON: {}", e)))
    }

    /// Idle timeout as a [`Duration`], if configured.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_seconds.map(Duration::from_secs)
    }
}

/// Record agent activity by touching the activity marker file. Call this on
/// every tunnel request so the idle monitor can see the workspace is in use.
#[instrument]
pub fn touch_activity_marker() -> Result<()> {
    touch_activity_marker_at(Path::new(ACTIVITY_MARKER_PATH))
}

fn touch_activity_marker_at(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            DeaconError::Runtime(format!(
                "failed to create activity marker directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }
    std::fs::write(path, b"").map_err(|e| {
        DeaconError::Runtime(format!(
            "failed to touch activity marker {}: {}",
            path.display(),
            e
        ))
    })
}

fn marker_age(path: &Path) -> Result<Duration> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| DeaconError::Runtime(format!("failed to stat activity marker: {}", e)))?;
    let modified = metadata
        .modified()
        .map_err(|e| DeaconError::Runtime(format!("activity marker has no mtime: {}", e)))?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default())
}

/// Spawn a task that terminates the process once the activity marker has
/// been untouched for longer than `timeout`. Polls every 30s; intended to
/// run for the lifetime of the in-container agent.
pub fn spawn_idle_monitor(timeout: Duration) -> tokio::task::JoinHandle<()> {
    spawn_idle_monitor_at(PathBuf::from(ACTIVITY_MARKER_PATH), timeout)
}

fn spawn_idle_monitor_at(
    marker_path: PathBuf,
    timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let poll_interval = Duration::from_secs(30).min(timeout);
        loop {
            tokio::time::sleep(poll_interval).await;
            match marker_age(&marker_path) {
                Ok(age) if age >= timeout => {
                    warn!(
                        "workspace idle for {:?} (timeout {:?}); terminating",
                        age, timeout
                    );
                    std::process::exit(0);
                }
                Ok(age) => {
                    debug!("workspace idle for {:?} (timeout {:?})", age, timeout);
                }
                Err(e) => {
                    debug!("idle monitor could not read activity marker: {}", e);
                }
            }
        }
    })
}

/// The final status document written for external consumers to observe
/// completion of the in-container setup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Write the result document to `/var/run/devpod/result.json`, but only if
/// its content actually changed (avoids needless mtime churn for watchers).
#[instrument(skip(result))]
pub fn write_result(result: &AgentResult) -> Result<()> {
    write_result_to(Path::new(RESULT_PATH), result)
}

fn write_result_to(path: &Path, result: &AgentResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result)
        .map_err(|e| DeaconError::Runtime(format!("failed to serialize agent result: {}", e)))?;

    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == json {
            debug!("result document at {} unchanged, skipping write", path.display());
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            DeaconError::Runtime(format!(
                "failed to create result directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    std::fs::write(path, json).map_err(|e| {
        DeaconError::Runtime(format!("failed to write result to {}: {}", path.display(), e))
    })?;
    info!("wrote agent result to {}", path.display());
    Ok(())
}
