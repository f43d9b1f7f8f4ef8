//! State management for tracking running containers and compose projects
//!
//! This module provides state persistence to track which containers and compose projects
//! are running, enabling the down command to stop them according to shutdown actions.

use crate::cache::{Cache, DiskCache};
use crate::lifecycle::{LifecyclePhase, LifecyclePhaseState};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// State information for a running container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerState {
    /// Container ID
    pub container_id: String,
    /// Container name (if any)
    pub container_name: Option<String>,
    /// Image ID used
    pub image_id: String,
    /// Shutdown action from config
    pub shutdown_action: Option<String>,
}

/// State information for a running compose project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComposeState {
    /// Compose project name
    pub project_name: String,
    /// Service name (primary service)
    pub service_name: String,
    /// Base directory containing compose files
    pub base_path: String,
    /// Compose file paths (relative to base_path)
    pub compose_files: Vec<String>,
    /// Shutdown action from config
    pub shutdown_action: Option<String>,
}

/// Overall state for a workspace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WorkspaceState {
    /// Single container workspace
    Container(ContainerState),
    /// Docker Compose workspace
    Compose(ComposeState),
}

/// State manager for tracking workspace states
pub struct StateManager {
    cache: DiskCache<String, WorkspaceState>,
}

impl StateManager {
    /// Create a new state manager with default cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::default_cache_dir()?;
        Self::new_with_cache_dir(cache_dir)
    }

    /// Create a new state manager with custom cache directory
    pub fn new_with_cache_dir<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let state_cache_dir = cache_dir.as_ref().join("state");
        let cache = DiskCache::new(&state_cache_dir)
            .with_context(|| format!("Failed to create state cache in {:?}", state_cache_dir))?;

        Ok(Self { cache })
    }

    /// Get the default cache directory for state management
    fn default_cache_dir() -> Result<PathBuf> {
        // Use the same pattern as features cache
        let cache_dir = std::env::temp_dir().join("deacon-state");
        if !cache_dir.exists() {
            std::fs::create_dir_all(&cache_dir).with_context(|| {
                format!("Failed to create state cache directory: {:?}", cache_dir)
            })?;
        }
        Ok(cache_dir)
    }

    /// Save container state for a workspace
    #[instrument(skip(self))]
    pub fn save_container_state(
        &mut self,
        workspace_hash: &str,
        container_state: ContainerState,
    ) -> Result<()> {
        debug!(
            workspace_hash = %workspace_hash,
            container_id = %container_state.container_id,
            "Saving container state"
        );

        let state = WorkspaceState::Container(container_state);
        self.cache
            .set(workspace_hash.to_string(), state)
            .with_context(|| {
                format!(
                    "Failed to save container state for workspace {}",
                    workspace_hash
                )
            })?;

        info!(
            workspace_hash = %workspace_hash,
            "Container state saved successfully"
        );

        Ok(())
    }

    /// Save compose state for a workspace
    #[instrument(skip(self))]
    pub fn save_compose_state(
        &mut self,
        workspace_hash: &str,
        compose_state: ComposeState,
    ) -> Result<()> {
        debug!(
            workspace_hash = %workspace_hash,
            project_name = %compose_state.project_name,
            "Saving compose state"
        );

        let state = WorkspaceState::Compose(compose_state);
        self.cache
            .set(workspace_hash.to_string(), state)
            .with_context(|| {
                format!(
                    "Failed to save compose state for workspace {}",
                    workspace_hash
                )
            })?;

        info!(
            workspace_hash = %workspace_hash,
            "Compose state saved successfully"
        );

        Ok(())
    }

    /// Get workspace state by workspace hash
    #[instrument(skip(self))]
    pub fn get_workspace_state(&mut self, workspace_hash: &str) -> Option<WorkspaceState> {
        debug!(workspace_hash = %workspace_hash, "Getting workspace state");

        let state = self.cache.get(&workspace_hash.to_string());

        if state.is_some() {
            debug!(workspace_hash = %workspace_hash, "Found workspace state");
        } else {
            debug!(workspace_hash = %workspace_hash, "No workspace state found");
        }

        state
    }

    /// Remove workspace state (called after successful shutdown)
    #[instrument(skip(self))]
    pub fn remove_workspace_state(&mut self, workspace_hash: &str) -> Option<WorkspaceState> {
        debug!(workspace_hash = %workspace_hash, "Removing workspace state");

        let removed = self.cache.remove(&workspace_hash.to_string());

        if removed.is_some() {
            info!(workspace_hash = %workspace_hash, "Workspace state removed");
        } else {
            debug!(workspace_hash = %workspace_hash, "No workspace state to remove");
        }

        removed
    }

    /// List all tracked workspace hashes
    pub fn list_workspace_hashes(&self) -> Vec<String> {
        // Note: This would require extending the Cache trait to support listing keys
        // For now, we can implement a simpler approach by scanning the cache directory
        // This is acceptable since the cache is file-based

        let cache_dir = std::env::temp_dir().join("deacon-state").join("state");
        if !cache_dir.exists() {
            return Vec::new();
        }

        let mut workspace_hashes = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&cache_dir) {
            for entry in entries.flatten() {
                if let Some(file_name) = entry.file_name().to_str() {
                    // Remove the file extension to get the workspace hash
                    if let Some(hash) = file_name.strip_suffix(".bin") {
                        workspace_hashes.push(hash.to_string());
                    }
                }
            }
        }

        workspace_hashes
    }

    /// Clear all workspace states (for testing/cleanup)
    pub fn clear_all(&mut self) {
        self.cache.clear();
    }

    /// Get cache statistics
    pub fn stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new().expect("Failed to create default StateManager")
    }
}

// ---------------------------------------------------------------------------
// Lifecycle phase markers
//
// Per FR-002/FR-008: each lifecycle phase records a completion marker on
// disk, keyed by workspace and prebuild-vs-run mode, so that a later `up`
// invocation can detect what already executed and resume accordingly.
// ---------------------------------------------------------------------------

fn workspace_marker_hash(workspace_folder: &Path) -> String {
    let canonical_path = crate::workspace::resolve_workspace_root(workspace_folder)
        .unwrap_or_else(|_| {
            workspace_folder
                .canonicalize()
                .unwrap_or_else(|_| workspace_folder.to_path_buf())
        });

    let mut hasher = DefaultHasher::new();
    canonical_path.hash(&mut hasher);
    format!("{:016x}", hasher.finish())[..8].to_string()
}

/// Directory holding phase markers for a workspace, separated by prebuild vs. run mode.
fn markers_dir(workspace_folder: &Path, is_prebuild: bool) -> PathBuf {
    let hash = workspace_marker_hash(workspace_folder);
    let mode_dir = if is_prebuild { "prebuild" } else { "run" };
    std::env::temp_dir()
        .join("deacon-state")
        .join("markers")
        .join(hash)
        .join(mode_dir)
}

/// Path of the marker file for a single phase.
pub fn marker_path_for_phase(workspace_folder: &Path, phase: LifecyclePhase) -> PathBuf {
    markers_dir(workspace_folder, false).join(format!("{}.json", phase.as_str()))
}

/// Read a single phase marker from disk. A missing or corrupted marker is
/// treated as "not recorded" rather than an error.
pub fn read_phase_marker(marker_path: &Path) -> Result<Option<LifecyclePhaseState>> {
    if !marker_path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(marker_path)
        .with_context(|| format!("Failed to read marker file {:?}", marker_path))?;
    Ok(serde_json::from_str(&contents).ok())
}

/// Write a phase marker to disk, creating parent directories as needed.
pub fn write_phase_marker(marker_path: &Path, state: &LifecyclePhaseState) -> Result<()> {
    if let Some(parent) = marker_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create marker directory {:?}", parent))?;
    }
    let contents = serde_json::to_string_pretty(state)
        .context("Failed to serialize lifecycle phase marker")?;
    std::fs::write(marker_path, contents)
        .with_context(|| format!("Failed to write marker file {:?}", marker_path))?;
    Ok(())
}

/// Record that `phase` completed successfully for `workspace_folder`.
#[instrument(skip(workspace_folder))]
pub fn record_phase_executed(
    workspace_folder: &Path,
    phase: LifecyclePhase,
    is_prebuild: bool,
) -> Result<()> {
    let marker_path = markers_dir(workspace_folder, is_prebuild).join(format!("{}.json", phase.as_str()));
    let state = LifecyclePhaseState::new_executed(phase, marker_path.clone());
    write_phase_marker(&marker_path, &state)
}

/// Whether a completion marker exists for `phase` in `workspace_folder`.
pub fn marker_exists(workspace_folder: &Path, phase: LifecyclePhase, is_prebuild: bool) -> bool {
    let marker_path =
        markers_dir(workspace_folder, is_prebuild).join(format!("{}.json", phase.as_str()));
    matches!(read_phase_marker(&marker_path), Ok(Some(state)) if state.phase == phase)
}

/// Read all recorded phase markers for a workspace, in spec order. Missing
/// or corrupted markers are simply absent from the result.
pub fn read_all_markers(workspace_folder: &Path, is_prebuild: bool) -> Result<Vec<LifecyclePhaseState>> {
    let mut markers = Vec::new();
    for phase in LifecyclePhase::spec_order() {
        let marker_path =
            markers_dir(workspace_folder, is_prebuild).join(format!("{}.json", phase.as_str()));
        if let Some(state) = read_phase_marker(&marker_path)? {
            if state.phase == *phase {
                markers.push(state);
            }
        }
    }
    Ok(markers)
}

/// Find the earliest phase (in spec order) that has not been recorded as executed.
pub fn find_earliest_incomplete_phase(markers: &[LifecyclePhaseState]) -> Option<LifecyclePhase> {
    LifecyclePhase::spec_order()
        .iter()
        .find(|phase| {
            !markers.iter().any(|m| {
                m.phase == **phase && m.status == crate::lifecycle::PhaseStatus::Executed
            })
        })
        .copied()
}

/// Remove all recorded markers for a workspace (e.g. on `down` or explicit reset).
pub fn clear_markers(workspace_folder: &Path, is_prebuild: bool) -> Result<()> {
    let dir = markers_dir(workspace_folder, is_prebuild);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to clear marker directory {:?}", dir))?;
    }
    Ok(())
}
