//! DevContainer templates system
//!
//! This module handles template metadata parsing and application with variable substitution.
//! It supports the core template workflow defined in the CLI specification:
//! - Template metadata parsing from devcontainer-template.json
//! - File copying with variable substitution
//! - Dry-run mode for previewing changes
//! - Overwrite protection

use crate::errors::{Result, TemplateError};
use crate::features::{FeatureOption, OptionValue};
use crate::variable::{SubstitutionContext, SubstitutionReport, VariableSubstitution};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Template metadata structure representing devcontainer-template.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    /// Template identifier (required)
    pub id: String,

    /// Template version
    #[serde(default)]
    pub version: Option<String>,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Template description
    #[serde(default)]
    pub description: Option<String>,

    /// Documentation URL
    #[serde(default, rename = "documentationURL")]
    pub documentation_url: Option<String>,

    /// License URL
    #[serde(default, rename = "licenseURL")]
    pub license_url: Option<String>,

    /// Template options (reusing FeatureOption for consistency)
    #[serde(default)]
    pub options: HashMap<String, FeatureOption>,

    /// Recommended features (raw, as specified in issue)
    #[serde(default)]
    pub recommended_features: Option<serde_json::Value>,

    /// File list (optional, added during packaging)
    #[serde(default)]
    pub files: Option<Vec<String>>,

    /// Supported platforms
    #[serde(default)]
    pub platforms: Option<Vec<String>>,

    /// Template publisher
    #[serde(default)]
    pub publisher: Option<String>,

    /// Search keywords
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

impl TemplateMetadata {
    /// Validate the template metadata
    pub fn validate(&self) -> std::result::Result<(), TemplateError> {
        // Required field validation
        if self.id.is_empty() {
            return Err(TemplateError::Validation {
                message: "Template id is required and cannot be empty".to_string(),
            });
        }

        // Validate option defaults
        for (option_name, option_def) in &self.options {
            if let Some(default_value) = option_def.default_value() {
                if let Err(err) = option_def.validate_value(&default_value) {
                    return Err(TemplateError::Validation {
                        message: format!(
                            "Default value for option '{}' is invalid: {}",
                            option_name, err
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Template application options
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Template option values
    pub options: HashMap<String, OptionValue>,
    /// Allow overwriting existing files (default: false)
    pub overwrite: bool,
    /// Dry run mode - plan actions without executing (default: false)
    pub dry_run: bool,
}

/// Planned action for template application
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedAction {
    /// Copy a file from source to destination
    CopyFile {
        src: PathBuf,
        dest: PathBuf,
        has_substitutions: bool,
    },
    /// Skip copying file because it already exists
    SkipExistingFile { dest: PathBuf },
    /// Overwrite existing file
    OverwriteFile {
        src: PathBuf,
        dest: PathBuf,
        has_substitutions: bool,
    },
}

/// Template application result
#[derive(Debug)]
pub struct ApplyResult {
    /// Actions that were planned/executed
    pub actions: Vec<PlannedAction>,
    /// Variable substitution report
    pub substitution_report: SubstitutionReport,
    /// Number of files processed
    pub files_processed: usize,
    /// Number of files skipped
    pub files_skipped: usize,
}

/// Parse template metadata from a devcontainer-template.json file
#[instrument(level = "debug")]
pub fn parse_template_metadata(path: &Path) -> Result<TemplateMetadata> {
    debug!("Parsing template metadata from: {}", path.display());

    // Check if file exists
    if !path.exists() {
        return Err(TemplateError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    // Read file content
    let content = fs::read_to_string(path).map_err(TemplateError::Io)?;

    // Parse JSON
    let metadata: TemplateMetadata =
        serde_json::from_str(&content).map_err(|e| TemplateError::Parsing {
            message: e.to_string(),
        })?;

    debug!(
        "Parsed template: id={}, name={:?}",
        metadata.id, metadata.name
    );

    // Log options
    for (option_name, option_def) in &metadata.options {
        debug!("Option '{}': {:?}", option_name, option_def);
    }

    // Validate metadata
    metadata.validate()?;

    Ok(metadata)
}

/// Apply template from source directory to destination workspace
#[instrument(level = "info", skip(apply_options))]
pub fn apply_template(
    src_dir: &Path,
    dest_workspace: &Path,
    apply_options: &ApplyOptions,
) -> Result<ApplyResult> {
    info!(
        "Applying template from {} to {}",
        src_dir.display(),
        dest_workspace.display()
    );

    // Validate source directory exists
    if !src_dir.exists() {
        return Err(TemplateError::NotFound {
            path: src_dir.display().to_string(),
        }
        .into());
    }

    // Create substitution context for the destination workspace
    let mut context = SubstitutionContext::new(dest_workspace)?;

    // Add template options to substitution context
    if !apply_options.options.is_empty() {
        let template_options: HashMap<String, String> = apply_options
            .options
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect();
        context.template_options = Some(template_options);
    }

    let mut substitution_report = SubstitutionReport::new();

    // Plan actions by walking source directory
    let mut actions = Vec::new();
    let mut files_processed = 0;
    let mut files_skipped = 0;

    plan_template_application(
        src_dir,
        dest_workspace,
        src_dir,
        apply_options,
        &mut actions,
        &mut files_processed,
        &mut files_skipped,
    )?;

    info!(
        "Planned {} actions ({} files to process, {} files to skip)",
        actions.len(),
        files_processed,
        files_skipped
    );

    // Execute actions if not in dry run mode
    if !apply_options.dry_run {
        execute_planned_actions(&actions, &context, &mut substitution_report)?;
        info!("Template application completed successfully");
    } else {
        info!("Dry run completed - no files were modified");
    }

    Ok(ApplyResult {
        actions,
        substitution_report,
        files_processed,
        files_skipped,
    })
}

/// Recursively plan template application actions
#[instrument(level = "debug", skip_all)]
fn plan_template_application(
    current_src: &Path,
    dest_workspace: &Path,
    src_root: &Path,
    apply_options: &ApplyOptions,
    actions: &mut Vec<PlannedAction>,
    files_processed: &mut usize,
    files_skipped: &mut usize,
) -> Result<()> {
    let entries = fs::read_dir(current_src).map_err(TemplateError::Io)?;

    for entry in entries {
        let entry = entry.map_err(TemplateError::Io)?;
        let src_path = entry.path();

        // Calculate relative path from source root
        let relative_path =
            src_path
                .strip_prefix(src_root)
                .map_err(|_| TemplateError::Validation {
                    message: format!(
                        "Failed to calculate relative path for {}",
                        src_path.display()
                    ),
                })?;

        // Skip template metadata file
        if src_path.file_name() == Some(std::ffi::OsStr::new("devcontainer-template.json")) {
            debug!("Skipping template metadata file: {}", src_path.display());
            continue;
        }

        let dest_path = dest_workspace.join(relative_path);

        if src_path.is_dir() {
            // Recursively process subdirectory
            if !dest_path.exists() && !apply_options.dry_run {
                fs::create_dir_all(&dest_path).map_err(TemplateError::Io)?;
                debug!("Created directory: {}", dest_path.display());
            }

            plan_template_application(
                &src_path,
                dest_workspace,
                src_root,
                apply_options,
                actions,
                files_processed,
                files_skipped,
            )?;
        } else {
            // Plan file copy action
            let action = if dest_path.exists() {
                if apply_options.overwrite {
                    *files_processed += 1;
                    PlannedAction::OverwriteFile {
                        src: src_path.clone(),
                        dest: dest_path,
                        has_substitutions: should_apply_substitution(&src_path),
                    }
                } else {
                    *files_skipped += 1;
                    PlannedAction::SkipExistingFile { dest: dest_path }
                }
            } else {
                *files_processed += 1;
                PlannedAction::CopyFile {
                    src: src_path.clone(),
                    dest: dest_path,
                    has_substitutions: should_apply_substitution(&src_path),
                }
            };

            actions.push(action);
        }
    }

    Ok(())
}

/// Execute planned actions
#[instrument(level = "debug", skip_all)]
fn execute_planned_actions(
    actions: &[PlannedAction],
    context: &SubstitutionContext,
    substitution_report: &mut SubstitutionReport,
) -> Result<()> {
    for action in actions {
        match action {
            PlannedAction::CopyFile {
                src,
                dest,
                has_substitutions,
            }
            | PlannedAction::OverwriteFile {
                src,
                dest,
                has_substitutions,
            } => {
                // Ensure destination directory exists
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(TemplateError::Io)?;
                }

                if *has_substitutions {
                    copy_file_with_substitution(src, dest, context, substitution_report)?;
                } else {
                    fs::copy(src, dest).map_err(TemplateError::Io)?;
                }

                debug!("Copied file: {} -> {}", src.display(), dest.display());
            }
            PlannedAction::SkipExistingFile { dest } => {
                debug!("Skipped existing file: {}", dest.display());
            }
        }
    }

    Ok(())
}

/// Copy file with variable substitution applied to text content
#[instrument(level = "debug", skip_all)]
fn copy_file_with_substitution(
    src: &Path,
    dest: &Path,
    context: &SubstitutionContext,
    substitution_report: &mut SubstitutionReport,
) -> Result<()> {
    // Read source file as string (assume text file for substitution)
    let content = fs::read_to_string(src).map_err(|e| {
        warn!(
            "Failed to read file as text for substitution: {} - {}",
            src.display(),
            e
        );
        TemplateError::Io(e)
    })?;

    // Apply variable substitution
    let substituted_content =
        VariableSubstitution::substitute_string(content.as_str(), context, substitution_report);

    // Write substituted content to destination
    fs::write(dest, substituted_content).map_err(TemplateError::Io)?;

    Ok(())
}

/// Determine if variable substitution should be applied to a file
/// For now, we apply substitution to common text file extensions
fn should_apply_substitution(path: &Path) -> bool {
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        matches!(
            extension.to_lowercase().as_str(),
            "json"
                | "yaml"
                | "yml"
                | "sh"
                | "bash"
                | "zsh"
                | "txt"
                | "md"
                | "dockerfile"
                | "conf"
                | "config"
                | "rs"
                | "py"
                | "js"
                | "ts"
        )
    } else {
        // Files without extension - check if they have common names that should be substituted
        if let Some(filename) = path.file_name().and_then(|name| name.to_str()) {
            matches!(
                filename.to_lowercase().as_str(),
                "dockerfile" | "makefile" | "readme" | ".gitignore" | ".dockerignore"
            )
        } else {
            false
        }
    }
}
