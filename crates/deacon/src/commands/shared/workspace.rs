//! Workspace folder derivation helpers.

use std::path::Path;

/// Derive the container workspace folder from configuration or the host workspace path.
///
/// If `config.workspace_folder` is set, returns that value directly.
/// Otherwise, derives it as `/workspaces/{dir_name}` where `dir_name` is the
/// last component of the host `workspace_folder` path (falling back to `"workspace"`
/// if the path has no final component).
pub fn derive_container_workspace_folder(
    config: &deacon_core::config::DevContainerConfig,
    workspace_folder: &Path,
) -> String {
    if let Some(ref folder) = config.workspace_folder {
        folder.clone()
    } else {
        let dir_name = workspace_folder
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("workspace");
        format!("/workspaces/{}", dir_name)
    }
}
