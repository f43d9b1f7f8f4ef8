//! Lifecycle phase summary rendering for the up command.
//!
//! This module provides UI rendering for lifecycle phase summaries showing which
//! phases executed vs skipped, maintaining the spec-defined ordering:
//! onCreate -> updateContent -> postCreate -> dotfiles -> postStart -> postAttach
//!
//! Per FR-007: The command MUST present a summary indicating which phases executed
//! or were skipped (including dotfiles) so users can verify lifecycle behavior.
//!
//! Output contracts:
//! - JSON mode: Structured results to stdout, logs to stderr
//! - Text mode: Human-readable results to stdout, logs to stderr

// TODO: T030/T031 - These types will be used once lifecycle summary rendering is integrated
// into the up command flow. For now, allow dead_code to enable incremental development.
#![allow(dead_code)]

use console::style;
use deacon_core::lifecycle::{LifecyclePhase, LifecyclePhaseState, OutputMode, PhaseStatus};
use serde::{Deserialize, Serialize};

/// Summary of lifecycle phase execution for output rendering.
///
/// This structure represents the final state of all lifecycle phases after
/// execution, formatted for either JSON or text output. Phases are always
/// presented in spec-defined order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleSummary {
    /// The invocation mode (fresh, resume, prebuild, skip_post_create)
    pub mode: String,

    /// Ordered list of phase execution results in spec order
    pub phases: Vec<PhaseExecutionResult>,

    /// Summary information
    pub summary: SummaryInfo,
}

/// Result of a single phase execution for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseExecutionResult {
    /// Phase name (e.g., "onCreate", "updateContent", "dotfiles")
    pub phase: String,

    /// Execution status: "executed", "skipped", or "failed"
    pub status: String,

    /// Optional reason for skip/failure (e.g., "prebuild mode", "--skip-post-create flag")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Whether a completion marker was persisted for this phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_persisted: Option<bool>,

    /// Whether this phase was resumed (executed after being incomplete in a prior run)
    ///
    /// This is true when:
    /// - The mode is "resume"
    /// - The phase was executed (not skipped)
    /// - The phase would normally have been skipped if markers were complete
    #[serde(default, skip_serializing_if = "is_false")]
    pub resumed: bool,
}

/// Helper function for serde skip_serializing_if
fn is_false(b: &bool) -> bool {
    !*b
}

/// Summary information for the lifecycle run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryInfo {
    /// Whether resume is required due to failure/interruption
    pub resume_required: bool,

    /// Number of phases that were resumed from an earlier incomplete run
    ///
    /// This indicates phases that were executed after being incomplete in a prior run
    /// (e.g., when markers were missing or corrupted).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub resumed_count: usize,

    /// Human-readable summary message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Helper function for serde skip_serializing_if
fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl LifecycleSummary {
    /// Create a new lifecycle summary from phase states.
    ///
    /// # Arguments
    ///
    /// * `mode` - The invocation mode string (e.g., "fresh", "resume", "prebuild")
    /// * `phases` - List of phase states from the orchestrator (may be in any order)
    /// * `resume_required` - Whether resume is needed due to failure
    ///
    /// The phases will be reordered to match the spec-defined lifecycle order.
    pub fn from_phase_states(
        mode: &str,
        phases: &[LifecyclePhaseState],
        resume_required: bool,
    ) -> Self {
        Self::from_phase_states_with_context(mode, phases, resume_required, &[])
    }

    /// Create a new lifecycle summary from phase states with prior marker context.
    ///
    /// This variant allows tracking which phases were "resumed" - executed after
    /// being incomplete in a prior run due to missing or corrupted markers.
    ///
    /// # Arguments
    ///
    /// * `mode` - The invocation mode string (e.g., "fresh", "resume", "prebuild")
    /// * `phases` - List of phase states from the orchestrator (may be in any order)
    /// * `resume_required` - Whether resume is needed due to failure
    /// * `prior_markers` - List of phase states from prior markers (for resume tracking)
    ///
    /// The phases will be reordered to match the spec-defined lifecycle order.
    pub fn from_phase_states_with_context(
        mode: &str,
        phases: &[LifecyclePhaseState],
        resume_required: bool,
        prior_markers: &[LifecyclePhaseState],
    ) -> Self {
        // Build phase results in spec-defined order
        let mut phase_results = Vec::new();
        let is_resume_mode = mode == "resume";

        for spec_phase in LifecyclePhase::spec_order() {
            // Find this phase in the input states
            let phase_state = phases.iter().find(|p| p.phase == *spec_phase);

            // Check if this phase had a prior marker (for resume detection)
            let had_prior_marker = prior_markers
                .iter()
                .any(|m| m.phase == *spec_phase && m.status == PhaseStatus::Executed);

            let result = if let Some(state) = phase_state {
                // Determine if this phase was "resumed" - executed when in resume mode
                // but the marker was missing or corrupted (not in prior_markers)
                let is_resumed = is_resume_mode
                    && state.status == PhaseStatus::Executed
                    && !had_prior_marker
                    && !spec_phase.is_runtime_hook();

                PhaseExecutionResult {
                    phase: spec_phase.as_str().to_string(),
                    status: state.status.as_str().to_string(),
                    reason: state.reason.clone(),
                    marker_persisted: Some(state.status == PhaseStatus::Executed),
                    resumed: is_resumed,
                }
            } else {
                // Phase not in results - mark as pending/not run
                PhaseExecutionResult {
                    phase: spec_phase.as_str().to_string(),
                    status: "pending".to_string(),
                    reason: None,
                    marker_persisted: None,
                    resumed: false,
                }
            };

            phase_results.push(result);
        }

        // Generate counts for summary message
        let executed_count = phase_results
            .iter()
            .filter(|p| p.status == "executed")
            .count();
        let skipped_count = phase_results
            .iter()
            .filter(|p| p.status == "skipped")
            .count();
        let failed_count = phase_results
            .iter()
            .filter(|p| p.status == "failed")
            .count();
        let resumed_count = phase_results.iter().filter(|p| p.resumed).count();

        // Generate human-readable summary message
        // Per SC-003/SC-004: Include mode context for limited execution modes
        let message = if failed_count > 0 {
            Some(format!(
                "Lifecycle incomplete: {} executed, {} skipped, {} failed",
                executed_count, skipped_count, failed_count
            ))
        } else if resume_required {
            Some(format!(
                "Lifecycle interrupted: {} executed, {} skipped. Resume required.",
                executed_count, skipped_count
            ))
        } else if resumed_count > 0 {
            Some(format!(
                "Lifecycle resumed: {} executed ({} resumed from earlier), {} skipped",
                executed_count, resumed_count, skipped_count
            ))
        } else {
            // Mode-specific messages for limited execution modes
            match mode {
                "prebuild" => Some(format!(
                    "Prebuild complete: {} executed, {} skipped (post* hooks and dotfiles skipped by design)",
                    executed_count, skipped_count
                )),
                "skip_post_create" => Some(format!(
                    "Limited lifecycle complete: {} executed, {} skipped (--skip-post-create flag active)",
                    executed_count, skipped_count
                )),
                _ => Some(format!(
                    "Lifecycle complete: {} executed, {} skipped",
                    executed_count, skipped_count
                )),
            }
        };

        Self {
            mode: mode.to_string(),
            phases: phase_results,
            summary: SummaryInfo {
                resume_required,
                resumed_count,
                message,
            },
        }
    }

    /// Render the summary as JSON to stdout.
    ///
    /// Per the output contract, JSON mode writes exactly one JSON document to
    /// stdout. All logs and diagnostics go to stderr via tracing.
    pub fn render_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Render the summary as human-readable text.
    ///
    /// Per the output contract, text mode writes human-readable results to stdout.
    /// Uses color styling when the terminal supports it.
    ///
    /// Output format:
    /// ```text
    /// Lifecycle Summary (mode: fresh)
    ///   [checkmark] onCreate: executed
    ///   [checkmark] updateContent: executed
    ///   [checkmark] postCreate: executed
    ///   [checkmark] dotfiles: executed
    ///   [checkmark] postStart: executed
    ///   [checkmark] postAttach: executed
    /// ```
    ///
    /// For prebuild and skip_post_create modes, the header is styled differently
    /// to indicate limited execution scope per SC-003 and SC-004.
    pub fn render_text(&self) -> String {
        let mut output = String::new();

        // Header with mode - style differently for limited execution modes
        // Per SC-003/SC-004: prebuild and skip_post_create skip phases by design
        let header = format!("Lifecycle Summary (mode: {})", self.mode);
        let styled_header = match self.mode.as_str() {
            "prebuild" | "skip_post_create" => style(header).yellow().bold(),
            _ => style(header).bold(),
        };
        output.push_str(&format!("{}\n", styled_header));

        // Phase status lines in spec order
        for phase_result in &self.phases {
            let (icon, styled_status) = match phase_result.status.as_str() {
                "executed" if phase_result.resumed => (
                    // Resumed phases get a special indicator
                    style("[>>]").cyan().to_string(),
                    style("executed (resumed)").cyan().to_string(),
                ),
                "executed" => (
                    style("[OK]").green().to_string(),
                    style("executed").green().to_string(),
                ),
                "skipped" => (
                    style("[--]").yellow().to_string(),
                    style("skipped").yellow().to_string(),
                ),
                "failed" => (
                    style("[X]").red().to_string(),
                    style("FAILED").red().bold().to_string(),
                ),
                "pending" => (
                    style("[..]").dim().to_string(),
                    style("pending").dim().to_string(),
                ),
                _ => (
                    style("[?]").dim().to_string(),
                    style(&phase_result.status).dim().to_string(),
                ),
            };

            let reason_suffix = if let Some(ref reason) = phase_result.reason {
                format!(" ({})", style(reason).italic())
            } else {
                String::new()
            };

            output.push_str(&format!(
                "  {} {}: {}{}\n",
                icon, phase_result.phase, styled_status, reason_suffix
            ));
        }

        // Summary line
        if let Some(ref message) = self.summary.message {
            let styled_message = if self.summary.resume_required {
                style(message).yellow().to_string()
            } else {
                style(message).green().to_string()
            };
            output.push_str(&format!("\n{}\n", styled_message));
        }

        output
    }
}

/// Render a lifecycle summary to the appropriate output stream.
///
/// This function dispatches to either JSON or text rendering based on the
/// output mode, maintaining stdout/stderr separation per the output contract.
///
/// # Arguments
///
/// * `summary` - The lifecycle summary to render
/// * `output_mode` - Whether to use JSON or text output
///
/// # Returns
///
/// The formatted string. The caller is responsible for printing to stdout.
/// In JSON mode, the result should be the only output to stdout.
/// In text mode, the result is human-readable status information.
pub fn render_lifecycle_summary(summary: &LifecycleSummary, output_mode: OutputMode) -> String {
    match output_mode {
        OutputMode::Json => summary.render_json(),
        OutputMode::Text => summary.render_text(),
    }
}

/// Helper to create a lifecycle summary from a RunSummary.
///
/// This bridges the gap between the core RunSummary type and the UI-focused
/// LifecycleSummary type, handling the conversion of phase states and mode.
pub fn lifecycle_summary_from_run_summary(
    run_summary: &deacon_core::lifecycle::RunSummary,
    mode: &str,
) -> LifecycleSummary {
    LifecycleSummary::from_phase_states(mode, &run_summary.phases, run_summary.resume_required)
}

/// Helper to create a lifecycle summary from a RunSummary with prior marker context.
///
/// This variant includes prior marker information to properly track which phases
/// were "resumed" (executed after being incomplete in a prior run due to missing
/// or corrupted markers).
///
/// # Arguments
///
/// * `run_summary` - The run summary from the lifecycle orchestrator
/// * `mode` - The invocation mode string
/// * `prior_markers` - Prior marker states loaded from disk before this run
pub fn lifecycle_summary_from_run_summary_with_context(
    run_summary: &deacon_core::lifecycle::RunSummary,
    mode: &str,
    prior_markers: &[LifecyclePhaseState],
) -> LifecycleSummary {
    LifecycleSummary::from_phase_states_with_context(
        mode,
        &run_summary.phases,
        run_summary.resume_required,
        prior_markers,
    )
}
