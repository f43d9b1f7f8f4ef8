//! Dotfiles integration module
//!
//! This module provides functionality to clone dotfiles repositories and
//! execute their installation scripts, following the DevContainer CLI specification.

use crate::errors::{GitError, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Configuration for dotfiles integration
#[derive(Debug, Clone)]
pub struct DotfilesConfiguration {
    /// Git repository URL to clone
    pub repository: String,
    /// Optional custom install command (overrides auto-detected scripts)
    pub install_command: Option<String>,
    /// Target path where dotfiles should be cloned
    pub target_path: String,
}

/// Options for dotfiles application (placeholder for future container user context)
#[derive(Debug, Clone, Default)]
pub struct DotfilesOptions {
    // Future fields for container user mapping, permissions, etc.
    // Currently a placeholder as noted in the issue
}

/// Result of dotfiles application
#[derive(Debug)]
pub struct DotfilesResult {
    /// Path where dotfiles were cloned
    pub target_path: String,
    /// Whether an install script was found and executed
    pub script_executed: bool,
    /// Name of the script that was executed (if any)
    pub script_name: Option<String>,
}

/// Check if git is available on the system
#[instrument]
async fn check_git_available() -> Result<()> {
    debug!("Checking git availability");
    
    let output = Command::new("git")
        .arg("--version")
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            debug!("Git is available");
            Ok(())
        }
        _ => {
            debug!("Git is not available or not installed");
            Err(GitError::NotInstalled.into())
        }
    }
}

/// Clone a git repository to the target directory
#[instrument]
async fn clone_repository(repo_url: &str, target: &Path, _options: &DotfilesOptions) -> Result<()> {
    info!("Starting to clone dotfiles repository: {}", repo_url);
    
    let output = Command::new("git")
        .arg("clone")
        .arg(repo_url)
        .arg(target)
        .output()
        .await
        .map_err(|e| GitError::CLIError(format!("Failed to execute git clone: {}", e)))?;

    if output.status.success() {
        info!("Successfully cloned dotfiles repository to: {}", target.display());
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(GitError::CloneFailed(stderr.to_string()).into())
    }
}

/// Detect install script in the cloned repository
#[instrument]
async fn detect_install_script(target: &Path) -> Option<String> {
    let script_names = ["install.sh", "setup.sh"];
    
    for script_name in &script_names {
        let script_path = target.join(script_name);
        debug!("Checking for install script: {}", script_path.display());
        
        if script_path.exists() && script_path.is_file() {
            debug!("Found install script: {}", script_name);
            return Some(script_name.to_string());
        }
    }
    
    debug!("No install script found");
    None
}

/// Execute install script using bash
#[instrument]
async fn execute_install_script(target: &Path, script_name: &str) -> Result<()> {
    let script_path = target.join(script_name);
    info!("Executing install script: {}", script_path.display());
    
    let output = Command::new("bash")
        .arg(&script_path)
        .current_dir(target)
        .output()
        .await
        .map_err(|e| GitError::CLIError(format!("Failed to execute install script: {}", e)))?;

    if output.status.success() {
        info!("Install script executed successfully");
        
        // Log stdout and stderr for debugging
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        
        if !stdout.is_empty() {
            for line in stdout.lines() {
                debug!("[{}] stdout: {}", script_name, line);
            }
        }
        
        if !stderr.is_empty() {
            for line in stderr.lines() {
                debug!("[{}] stderr: {}", script_name, line);
            }
        }
        
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(GitError::CLIError(format!("Install script failed: {}", stderr)).into())
    }
}

/// Apply dotfiles from a repository to a target directory
///
/// This function clones a dotfiles repository and optionally runs an installation script.
/// It follows the DevContainer CLI specification for dotfiles integration.
///
/// # Arguments
///
/// * `repo_url` - Git repository URL to clone
/// * `target` - Target directory where dotfiles should be cloned
/// * `options` - Configuration options (placeholder for future container user context)
///
/// # Returns
///
/// Returns a `DotfilesResult` containing information about the operation.
///
/// # Errors
///
/// Returns an error if:
/// - Git is not installed or not accessible
/// - Repository cloning fails
/// - Install script execution fails
#[instrument]
pub async fn apply_dotfiles(
    repo_url: &str,
    target: &Path,
    options: &DotfilesOptions,
) -> Result<DotfilesResult> {
    info!("Applying dotfiles from {} to {}", repo_url, target.display());
    
    // Check if git is available
    check_git_available().await?;
    
    // Clone the repository
    clone_repository(repo_url, target, options).await?;
    
    // Detect and execute install script
    let script_name = detect_install_script(target).await;
    let script_executed = if let Some(ref script) = script_name {
        execute_install_script(target, script).await?;
        true
    } else {
        info!("No install script found, dotfiles cloned without setup");
        false
    };
    
    info!("Dotfiles application completed");
    
    Ok(DotfilesResult {
        target_path: target.to_string_lossy().to_string(),
        script_executed,
        script_name,
    })
}
