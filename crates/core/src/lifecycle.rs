//! Lifecycle phase model and host-side command execution.
//!
//! This module defines the ordered set of devcontainer lifecycle phases
//! (`onCreate`, `updateContent`, `postCreate`, `dotfiles`, `postStart`,
//! `postAttach`, plus the host-only `initialize` phase), the per-phase
//! execution record used for resume/idempotency decisions, and a small
//! process-execution harness (`run_phase`) used by callers that need to
//! run lifecycle commands directly on the host rather than inside a
//! container (see `container_lifecycle` for the container-side runner).

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::Instant;

/// A phase in the devcontainer lifecycle.
///
/// `Initialize` runs on the host before the container exists; the rest
/// run inside (or, for `Dotfiles`, alongside) the container. `spec_order`
/// omits `Initialize` since it is never subject to resume/skip decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Initialize,
    OnCreate,
    UpdateContent,
    PostCreate,
    Dotfiles,
    PostStart,
    PostAttach,
}

impl LifecyclePhase {
    /// Short camelCase identifier used in logs, marker file names, and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Initialize => "initialize",
            LifecyclePhase::OnCreate => "onCreate",
            LifecyclePhase::UpdateContent => "updateContent",
            LifecyclePhase::PostCreate => "postCreate",
            LifecyclePhase::Dotfiles => "dotfiles",
            LifecyclePhase::PostStart => "postStart",
            LifecyclePhase::PostAttach => "postAttach",
        }
    }

    /// The phases subject to marker-based resume/skip decisions, in execution order.
    pub fn spec_order() -> &'static [LifecyclePhase] {
        &[
            LifecyclePhase::OnCreate,
            LifecyclePhase::UpdateContent,
            LifecyclePhase::PostCreate,
            LifecyclePhase::Dotfiles,
            LifecyclePhase::PostStart,
            LifecyclePhase::PostAttach,
        ]
    }

    /// Runtime hooks (`postStart`, `postAttach`) rerun on every invocation regardless
    /// of prior completion markers; all other phases run at most once per workspace.
    pub fn is_runtime_hook(&self) -> bool {
        matches!(self, LifecyclePhase::PostStart | LifecyclePhase::PostAttach)
    }

    /// True for phases at or after the postCreate boundary, which is where
    /// `--skip-post-create` and `--prebuild` both cut off execution.
    fn is_post_create_or_later(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::PostCreate
                | LifecyclePhase::Dotfiles
                | LifecyclePhase::PostStart
                | LifecyclePhase::PostAttach
        )
    }
}

/// Outcome recorded for a single phase of a single invocation, used both for
/// marker persistence and for human/JSON run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    Executed,
    Skipped,
    Failed,
    Pending,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Executed => "executed",
            PhaseStatus::Skipped => "skipped",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Pending => "pending",
        }
    }
}

/// Recorded state of one phase for one invocation: whether it ran, was
/// skipped (and why), or failed, plus the marker file path it corresponds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePhaseState {
    pub phase: LifecyclePhase,
    pub status: PhaseStatus,
    pub reason: Option<String>,
    pub marker_path: PathBuf,
}

impl LifecyclePhaseState {
    pub fn new_executed(phase: LifecyclePhase, marker_path: PathBuf) -> Self {
        Self {
            phase,
            status: PhaseStatus::Executed,
            reason: None,
            marker_path,
        }
    }

    pub fn new_skipped(phase: LifecyclePhase, marker_path: PathBuf, reason: &str) -> Self {
        Self {
            phase,
            status: PhaseStatus::Skipped,
            reason: Some(reason.to_string()),
            marker_path,
        }
    }

    pub fn new_failed(phase: LifecyclePhase, marker_path: PathBuf, reason: &str) -> Self {
        Self {
            phase,
            status: PhaseStatus::Failed,
            reason: Some(reason.to_string()),
            marker_path,
        }
    }

    pub fn new_pending(phase: LifecyclePhase, marker_path: PathBuf) -> Self {
        Self {
            phase,
            status: PhaseStatus::Pending,
            reason: None,
            marker_path,
        }
    }
}

/// Output rendering mode for a run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Json,
    Text,
}

/// Accumulated record of an `up` invocation's lifecycle execution, used to
/// render the post-run summary (see `deacon`'s lifecycle summary UI).
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub phases: Vec<LifecyclePhaseState>,
    pub resume_required: bool,
    pub output_mode: OutputMode,
}

impl RunSummary {
    pub fn new(output_mode: OutputMode) -> Self {
        Self {
            phases: Vec::new(),
            resume_required: false,
            output_mode,
        }
    }

    pub fn add_phase(&mut self, state: LifecyclePhaseState) {
        self.phases.push(state);
    }

    pub fn all_complete(&self) -> bool {
        self.phases
            .iter()
            .all(|p| p.status == PhaseStatus::Executed || p.status == PhaseStatus::Skipped)
    }

    pub fn executed_phases(&self) -> Vec<&LifecyclePhaseState> {
        self.phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Executed)
            .collect()
    }

    pub fn skipped_phases(&self) -> Vec<&LifecyclePhaseState> {
        self.phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Skipped)
            .collect()
    }
}

/// CLI flags that affect which lifecycle phases run on a given invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationFlags {
    pub skip_post_create: bool,
    pub prebuild: bool,
}

/// The mode an `up` invocation runs in, derived from CLI flags and prior
/// completion markers. `Prebuild` and `SkipPostCreate` are set explicitly by
/// flags and take precedence over marker-derived `Resume`/`Fresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    Fresh,
    Resume,
    Prebuild,
    SkipPostCreate,
}

/// Resolved context for one `up` invocation: its mode, the flags that
/// produced it, the workspace it applies to, and any phase markers found
/// from a prior run.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub mode: InvocationMode,
    pub flags: InvocationFlags,
    pub workspace_root: PathBuf,
    pub prior_markers: Vec<LifecyclePhaseState>,
}

impl InvocationContext {
    /// Determine invocation mode from CLI flags and prior markers.
    ///
    /// Precedence: `--prebuild` > `--skip-post-create` > resume (all
    /// non-runtime phases previously executed) > fresh (markers, if any,
    /// are kept so individual completed phases can still be skipped).
    pub fn from_markers_with_flags(
        workspace_root: PathBuf,
        prior_markers: Vec<LifecyclePhaseState>,
        flags: InvocationFlags,
    ) -> Self {
        let mode = if flags.prebuild {
            InvocationMode::Prebuild
        } else if flags.skip_post_create {
            InvocationMode::SkipPostCreate
        } else {
            let non_runtime: Vec<LifecyclePhase> = LifecyclePhase::spec_order()
                .iter()
                .copied()
                .filter(|p| !p.is_runtime_hook())
                .collect();
            let all_complete = non_runtime.iter().all(|phase| {
                prior_markers
                    .iter()
                    .any(|m| m.phase == *phase && m.status == PhaseStatus::Executed)
            });
            if all_complete {
                InvocationMode::Resume
            } else {
                InvocationMode::Fresh
            }
        };

        Self {
            mode,
            flags,
            workspace_root,
            prior_markers,
        }
    }

    /// Build a resume-mode context directly from a set of markers, bypassing
    /// flag-based mode determination. Used by recovery flows that already
    /// know the invocation is a resume.
    pub fn new_resume(workspace_root: PathBuf, prior_markers: Vec<LifecyclePhaseState>) -> Self {
        Self {
            mode: InvocationMode::Resume,
            flags: InvocationFlags::default(),
            workspace_root,
            prior_markers,
        }
    }

    /// Returns the reason a phase should be skipped, or `None` if it should run.
    pub fn should_skip_phase(&self, phase: LifecyclePhase) -> Option<&'static str> {
        match self.mode {
            InvocationMode::Prebuild if phase.is_post_create_or_later() => Some("prebuild mode"),
            InvocationMode::SkipPostCreate if phase.is_post_create_or_later() => {
                Some("--skip-post-create flag")
            }
            InvocationMode::Prebuild | InvocationMode::SkipPostCreate => None,
            InvocationMode::Resume | InvocationMode::Fresh => {
                if !phase.is_runtime_hook()
                    && self
                        .prior_markers
                        .iter()
                        .any(|m| m.phase == phase && m.status == PhaseStatus::Executed)
                {
                    Some("prior completion marker")
                } else {
                    None
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Host-side command execution harness
// ---------------------------------------------------------------------------

/// A single normalized lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleCommand {
    pub command: String,
}

/// A set of lifecycle commands for one phase, normalized from the
/// string/array/object forms a devcontainer.json command field may take.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleCommands {
    pub commands: Vec<LifecycleCommand>,
}

impl LifecycleCommands {
    /// Parse a devcontainer.json lifecycle command value (string, array of
    /// strings, or object of named parallel commands) into a flat command
    /// list, substituting `${env:VAR}` references from `env`.
    pub fn from_json_value(
        value: &serde_json::Value,
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let commands = match value {
            serde_json::Value::String(s) => vec![LifecycleCommand {
                command: substitute_env(s, env),
            }],
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(LifecycleCommand {
                        command: substitute_env(s, env),
                    }),
                    other => bail!("Expected string command in array, found {}", other),
                })
                .collect::<Result<Vec<_>>>()?,
            serde_json::Value::Object(map) => map
                .values()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(LifecycleCommand {
                        command: substitute_env(s, env),
                    }),
                    other => bail!("Expected string command in object, found {}", other),
                })
                .collect::<Result<Vec<_>>>()?,
            other => bail!(
                "Invalid lifecycle command format: expected string, array, or object, found {}",
                other
            ),
        };

        Ok(Self { commands })
    }
}

fn substitute_env(command: &str, env: &HashMap<String, String>) -> String {
    let mut result = command.to_string();
    for (key, value) in env {
        result = result.replace(&format!("${{env:{}}}", key), value);
        result = result.replace(&format!("${key}"), value);
    }
    result
}

/// Host execution environment for `run_phase`: extra environment variables
/// and an optional working directory override.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub env: HashMap<String, String>,
    pub working_directory: Option<PathBuf>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env.insert(key, value);
        self
    }

    pub fn with_working_directory(mut self, dir: PathBuf) -> Self {
        self.working_directory = Some(dir);
        self
    }
}

/// Result of running one phase's commands on the host.
#[derive(Debug, Clone)]
pub struct RunPhaseResult {
    pub success: bool,
    pub exit_codes: Vec<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Execute `commands` on the host for `phase`, halting at the first failing
/// command. Used for host-only phases (`initializeCommand`) and by tests
/// exercising the lifecycle harness directly, independent of any container.
pub fn run_phase(
    phase: LifecyclePhase,
    commands: &LifecycleCommands,
    ctx: &ExecutionContext,
) -> Result<RunPhaseResult> {
    let mut exit_codes = Vec::new();
    let mut stdout = String::new();
    let mut stderr = String::new();

    for cmd in &commands.commands {
        let start = Instant::now();

        #[cfg(unix)]
        let mut command = {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&cmd.command);
            c
        };
        #[cfg(windows)]
        let mut command = {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&cmd.command);
            c
        };

        for (key, value) in &ctx.env {
            command.env(key, value);
        }
        if let Some(dir) = &ctx.working_directory {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .with_context(|| format!("Failed to spawn command `{}`", cmd.command))?;

        stdout.push_str(&String::from_utf8_lossy(&output.stdout));
        stderr.push_str(&String::from_utf8_lossy(&output.stderr));
        let exit_code = output.status.code().unwrap_or(-1);
        exit_codes.push(exit_code);

        tracing::debug!(
            phase = phase.as_str(),
            command = %cmd.command,
            exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "Lifecycle command completed"
        );

        if exit_code != 0 {
            return Err(anyhow!(
                "Command failed in phase {} (`{}`, exit code {}): {}",
                phase.as_str(),
                cmd.command,
                exit_code,
                stderr.trim()
            ));
        }
    }

    Ok(RunPhaseResult {
        success: true,
        exit_codes,
        stdout,
        stderr,
    })
}
