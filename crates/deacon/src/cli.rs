//! Top-level CLI argument parsing and dispatch.
//!
//! This defines the `deacon` command surface and wires each subcommand to
//! its implementation in `commands::*`. Global, command-independent flags
//! (logging, progress, workspace discovery, secrets/redaction) live on
//! [`CliContext`]; anything specific to a single subcommand lives on that
//! subcommand's own args struct, converted here from the parsed clap args.

use crate::commands::down::DownArgs;
use crate::commands::exec::ExecArgs;
#[cfg(feature = "full")]
use crate::commands::outdated::OutdatedArgs;
use crate::commands::read_configuration::ReadConfigurationArgs;
#[cfg(feature = "full")]
use crate::commands::run_user_commands::RunUserCommandsArgs;
use crate::commands::up::UpArgs;
use anyhow::Result;
use clap::{Parser, Subcommand};
use deacon_core::redaction::{RedactionConfig, SecretRegistry};
use deacon_core::runtime::RuntimeKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Progress reporting format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProgressFormat {
    Auto,
    Text,
    Json,
    None,
}

/// Output format shared by several result-bearing subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// BuildKit usage mode for the up/build commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BuildKitOption {
    Auto,
    Always,
    Never,
}

/// Global options that apply across subcommands, gathered into a single
/// struct so command implementations don't each re-declare them.
#[derive(Debug, Clone, Parser)]
pub struct CliContext {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Log verbosity
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Progress reporting format
    #[arg(long, global = true, value_enum, default_value_t = ProgressFormat::Auto)]
    pub progress_format: ProgressFormat,

    /// Write progress events to this file instead of stderr
    #[arg(long, global = true)]
    pub progress_file: Option<PathBuf>,

    /// Workspace folder (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace_folder: Option<PathBuf>,

    /// Explicit devcontainer.json path, overriding auto-discovery
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override configuration file, merged on top of the primary config
    #[arg(long, global = true)]
    pub override_config: Option<PathBuf>,

    /// Secrets file(s) to load (KEY=VALUE per line) and redact from output
    #[arg(long = "secrets-file", global = true)]
    pub secrets_files: Vec<PathBuf>,

    /// Disable secret redaction in logs and output
    #[arg(long, global = true)]
    pub no_redact: bool,

    /// Plugin identifiers to load
    #[arg(long, global = true)]
    pub plugins: Vec<String>,

    /// Force a specific container runtime instead of auto-detecting
    #[arg(long, global = true)]
    pub runtime: Option<RuntimeKind>,
}

impl CliContext {
    fn redaction_config(&self) -> RedactionConfig {
        if self.no_redact {
            RedactionConfig {
                enabled: false,
                ..RedactionConfig::default()
            }
        } else {
            RedactionConfig::default()
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommands {
    /// Preview variable substitution against the resolved configuration
    Substitute {
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        strict_substitution: bool,
        #[arg(long, default_value_t = 10)]
        max_depth: usize,
        #[arg(long)]
        nested: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum FeatureCommands {
    /// Run a feature's test suite against a built image
    Test {
        path: String,
        #[arg(long)]
        json: bool,
    },
    /// Package a feature (or collection of features) into an archive
    Package {
        path: String,
        #[arg(long, default_value = ".")]
        output: String,
        #[arg(long)]
        json: bool,
    },
    /// Pull a feature from an OCI registry into the local cache
    Pull {
        registry_ref: String,
        #[arg(long)]
        json: bool,
    },
    /// Publish a feature (or collection) to an OCI registry
    Publish {
        path: String,
        registry: String,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password_stdin: bool,
    },
    /// Query metadata for a published or local feature
    Info {
        mode: String,
        feature: String,
        #[arg(long)]
        json: bool,
    },
    /// Compute the dependency-resolved installation order for the workspace
    Plan {
        #[arg(long)]
        json: bool,
        #[arg(long)]
        additional_features: Option<String>,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum TemplateCommands {
    /// Print a template's metadata
    Metadata { path: String },
    /// Publish a template to an OCI registry
    Publish {
        path: String,
        registry: String,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password_stdin: bool,
    },
    /// Generate documentation for a template
    GenerateDocs {
        path: String,
        #[arg(long, default_value = ".")]
        output: String,
    },
    /// Apply a template into the current workspace
    Apply {
        template: String,
        #[arg(long)]
        force: bool,
    },
}

/// `deacon up` flags. Maps onto [`UpArgs`]; anything not exposed here keeps
/// `UpArgs`'s default.
#[derive(Debug, Clone, Parser)]
pub struct UpCli {
    #[arg(long = "id-label")]
    id_label: Vec<String>,
    #[arg(long)]
    remove_existing_container: bool,
    #[arg(long)]
    expect_existing_container: bool,
    #[arg(long)]
    prebuild: bool,
    #[arg(long)]
    skip_post_create: bool,
    #[arg(long)]
    skip_post_attach: bool,
    #[arg(long)]
    skip_non_blocking_commands: bool,
    #[arg(long)]
    mount: Vec<String>,
    #[arg(long = "remote-env")]
    remote_env: Vec<String>,
    #[arg(long)]
    build_no_cache: bool,
    #[arg(long = "cache-from")]
    cache_from: Vec<String>,
    #[arg(long)]
    cache_to: Option<String>,
    #[arg(long, value_enum)]
    buildkit: Option<BuildKitOption>,
    #[arg(long)]
    additional_features: Option<String>,
    #[arg(long)]
    prefer_cli_features: bool,
    #[arg(long)]
    skip_feature_auto_mapping: bool,
    #[arg(long)]
    gpu: Option<deacon_core::gpu::GpuMode>,
    #[arg(long)]
    forward_ports: Vec<String>,
    #[arg(long)]
    container_name: Option<String>,
    #[arg(long)]
    ignore_host_requirements: bool,
}

impl UpCli {
    fn into_args(self, ctx: &CliContext) -> UpArgs {
        let ports_events = !self.forward_ports.is_empty();
        UpArgs {
            id_label: self.id_label,
            remove_existing_container: self.remove_existing_container,
            expect_existing_container: self.expect_existing_container,
            prebuild: self.prebuild,
            skip_post_create: self.skip_post_create,
            skip_post_attach: self.skip_post_attach,
            skip_non_blocking_commands: self.skip_non_blocking_commands,
            mount: self.mount,
            remote_env: self.remote_env,
            build_no_cache: self.build_no_cache,
            cache_from: self.cache_from,
            cache_to: self.cache_to,
            buildkit: self.buildkit,
            additional_features: self.additional_features,
            prefer_cli_features: self.prefer_cli_features,
            skip_feature_auto_mapping: self.skip_feature_auto_mapping,
            gpu_mode: self.gpu.unwrap_or_default(),
            forward_ports: self.forward_ports,
            ports_events,
            container_name: self.container_name,
            ignore_host_requirements: self.ignore_host_requirements,
            workspace_folder: ctx.workspace_folder.clone(),
            config_path: ctx.config.clone(),
            override_config_path: ctx.override_config.clone(),
            secrets_files: ctx.secrets_files.clone(),
            redaction_config: ctx.redaction_config(),
            secret_registry: SecretRegistry::new(),
            runtime: ctx.runtime,
            ..UpArgs::default()
        }
    }
}

/// `deacon down` flags. Maps onto [`DownArgs`].
#[derive(Debug, Clone, Parser)]
pub struct DownCli {
    #[arg(long)]
    remove: bool,
    #[arg(long)]
    all: bool,
    #[arg(long)]
    volumes: bool,
    #[arg(long)]
    force: bool,
    #[arg(long)]
    timeout: Option<u32>,
}

impl DownCli {
    fn into_args(self, ctx: &CliContext) -> DownArgs {
        DownArgs {
            remove: self.remove,
            all: self.all,
            volumes: self.volumes,
            force: self.force,
            timeout: self.timeout,
            workspace_folder: ctx.workspace_folder.clone(),
            config_path: ctx.config.clone(),
            docker_path: "docker".to_string(),
            docker_compose_path: "docker-compose".to_string(),
        }
    }
}

/// `deacon exec` flags. Maps onto [`ExecArgs`].
#[derive(Debug, Clone, Parser)]
pub struct ExecCli {
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    no_tty: bool,
    #[arg(long = "env")]
    env: Vec<String>,
    #[arg(long)]
    workdir: Option<String>,
    #[arg(long = "id-label")]
    id_label: Vec<String>,
    /// Command and arguments to run inside the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl ExecCli {
    fn into_args(self, ctx: &CliContext) -> ExecArgs {
        ExecArgs {
            user: self.user,
            no_tty: self.no_tty,
            env: self.env,
            workdir: self.workdir,
            id_label: self.id_label,
            command: self.command,
            workspace_folder: ctx.workspace_folder.clone(),
            config_path: ctx.config.clone(),
        }
    }
}

/// `deacon read-configuration` flags. Maps onto [`ReadConfigurationArgs`].
#[derive(Debug, Clone, Parser)]
pub struct ReadConfigurationCli {
    #[arg(long)]
    include_merged_configuration: bool,
    #[arg(long)]
    include_features_configuration: bool,
    #[arg(long = "id-label")]
    id_label: Vec<String>,
    #[arg(long)]
    mount_workspace_git_root: bool,
    #[arg(long)]
    additional_features: Option<String>,
    #[arg(long)]
    skip_feature_auto_mapping: bool,
}

impl ReadConfigurationCli {
    fn into_args(self, ctx: &CliContext) -> ReadConfigurationArgs {
        ReadConfigurationArgs {
            include_merged_configuration: self.include_merged_configuration,
            include_features_configuration: self.include_features_configuration,
            container_id: None,
            id_label: self.id_label,
            mount_workspace_git_root: self.mount_workspace_git_root,
            additional_features: self.additional_features,
            skip_feature_auto_mapping: self.skip_feature_auto_mapping,
            workspace_folder: ctx.workspace_folder.clone(),
            config_path: ctx.config.clone(),
            override_config_path: ctx.override_config.clone(),
            secrets_files: ctx.secrets_files.clone(),
            redaction_config: ctx.redaction_config(),
            secret_registry: SecretRegistry::new(),
        }
    }
}

#[cfg(feature = "full")]
#[derive(Debug, Clone, Parser)]
pub struct BuildCli {
    #[arg(long)]
    no_cache: bool,
    #[arg(long)]
    platform: Option<String>,
    #[arg(long = "build-arg")]
    build_arg: Vec<String>,
    #[arg(long)]
    force: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output_format: OutputFormat,
    #[arg(long, value_enum)]
    buildkit: Option<BuildKitOption>,
}

#[cfg(feature = "full")]
impl BuildCli {
    fn into_args(self, ctx: &CliContext) -> crate::commands::build::BuildArgs {
        crate::commands::build::BuildArgs {
            no_cache: self.no_cache,
            platform: self.platform,
            build_arg: self.build_arg,
            force: self.force,
            output_format: self.output_format,
            buildkit: self.buildkit,
            workspace_folder: ctx.workspace_folder.clone(),
            config_path: ctx.config.clone(),
            ..Default::default()
        }
    }
}

#[cfg(feature = "full")]
#[derive(Debug, Clone, Parser)]
pub struct RunUserCommandsCli {
    #[arg(long)]
    skip_post_create: bool,
    #[arg(long)]
    skip_post_attach: bool,
    #[arg(long)]
    skip_non_blocking_commands: bool,
}

#[cfg(feature = "full")]
impl RunUserCommandsCli {
    fn into_args(self, ctx: &CliContext) -> RunUserCommandsArgs {
        RunUserCommandsArgs {
            skip_post_create: self.skip_post_create,
            skip_post_attach: self.skip_post_attach,
            skip_non_blocking_commands: self.skip_non_blocking_commands,
            prebuild: false,
            stop_for_personalization: false,
            workspace_folder: ctx.workspace_folder.clone(),
            config_path: ctx.config.clone(),
            progress_tracker: Arc::new(Mutex::new(None)),
        }
    }
}

#[cfg(feature = "full")]
#[derive(Debug, Clone, Parser)]
pub struct OutdatedCli {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
    #[arg(long)]
    fail_on_outdated: bool,
}

#[cfg(feature = "full")]
impl OutdatedCli {
    fn into_args(self, ctx: &CliContext) -> OutdatedArgs {
        OutdatedArgs {
            workspace_folder: ctx
                .workspace_folder
                .clone()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|| ".".to_string()),
            config: ctx.config.clone(),
            override_config: ctx.override_config.clone(),
            output: self.output,
            fail_on_outdated: self.fail_on_outdated,
        }
    }
}

#[cfg(feature = "full")]
#[derive(Debug, Clone, Parser)]
pub struct ConfigCli {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[cfg(feature = "full")]
#[derive(Debug, Clone, Parser)]
pub struct FeaturesCli {
    #[command(subcommand)]
    command: FeatureCommands,
}

#[cfg(feature = "full")]
#[derive(Debug, Clone, Parser)]
pub struct TemplatesCli {
    #[command(subcommand)]
    command: TemplateCommands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Create and start a development container for the current workspace
    Up(UpCli),
    /// Stop (and optionally remove) development containers
    Down(DownCli),
    /// Run a command inside the workspace's running container
    Exec(ExecCli),
    /// Print the resolved devcontainer configuration
    ReadConfiguration(ReadConfigurationCli),
    /// Build the devcontainer image without starting a container
    #[cfg(feature = "full")]
    Build(BuildCli),
    /// Re-run post-create/post-attach lifecycle commands
    #[cfg(feature = "full")]
    RunUserCommands(RunUserCommandsCli),
    /// Check installed features against their registries for newer versions
    #[cfg(feature = "full")]
    Outdated(OutdatedCli),
    /// Configuration inspection and variable-substitution preview
    #[cfg(feature = "full")]
    Config(ConfigCli),
    /// Feature authoring workflow: test, package, pull, publish, plan
    #[cfg(feature = "full")]
    Features(FeaturesCli),
    /// Template authoring workflow: metadata, publish, docs, apply
    #[cfg(feature = "full")]
    Templates(TemplatesCli),
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Development container CLI",
    long_about = "Development container CLI (Rust reimplementation)\n\nImplements the Development Containers specification: creating, building, and running containers from a devcontainer.json configuration."
)]
pub struct Cli {
    #[command(flatten)]
    pub context: CliContext,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn dispatch(self) -> Result<()> {
        let Some(command) = self.command else {
            println!("Development container CLI (Rust reimplementation)");
            println!("Run 'deacon --help' to see available commands.");
            return Ok(());
        };

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let ctx = self.context;

        match command {
            Commands::Up(args) => {
                let up_args = args.into_args(&ctx);
                match rt.block_on(crate::commands::up::execute_up(up_args)) {
                    Ok(info) => {
                        let up_result = crate::commands::up::UpResult::success(
                            info.container_id,
                            info.remote_user,
                            info.remote_workspace_folder,
                        );
                        let exit_code = up_result.emit()?;
                        if exit_code != 0 {
                            std::process::exit(exit_code);
                        }
                    }
                    Err(e) => {
                        let up_result =
                            crate::commands::up::UpResult::error(e.to_string(), e.to_string());
                        let exit_code = up_result.emit()?;
                        std::process::exit(exit_code.max(1));
                    }
                }
            }
            Commands::Down(args) => rt.block_on(crate::commands::down::execute_down(
                args.into_args(&ctx),
            ))?,
            Commands::Exec(args) => rt.block_on(crate::commands::exec::execute_exec(
                args.into_args(&ctx),
            ))?,
            Commands::ReadConfiguration(args) => rt.block_on(
                crate::commands::read_configuration::execute_read_configuration(
                    args.into_args(&ctx),
                ),
            )?,
            #[cfg(feature = "full")]
            Commands::Build(args) => rt.block_on(crate::commands::build::execute_build(
                args.into_args(&ctx),
            ))?,
            #[cfg(feature = "full")]
            Commands::RunUserCommands(args) => rt.block_on(
                crate::commands::run_user_commands::execute_run_user_commands(
                    args.into_args(&ctx),
                ),
            )?,
            #[cfg(feature = "full")]
            Commands::Outdated(args) => {
                match rt.block_on(crate::commands::outdated::run(args.into_args(&ctx))) {
                    Ok(()) => {}
                    Err(e) => {
                        if let Some(code) =
                            e.downcast_ref::<crate::commands::outdated::OutdatedExitCode>()
                        {
                            std::process::exit(code.0);
                        }
                        return Err(e);
                    }
                }
            }
            #[cfg(feature = "full")]
            Commands::Config(cli) => {
                let args = crate::commands::config::ConfigArgs {
                    command: cli.command,
                    workspace_folder: ctx.workspace_folder.clone(),
                    config_path: ctx.config.clone(),
                    override_config_path: ctx.override_config.clone(),
                    secrets_files: ctx.secrets_files.clone(),
                    redaction_config: ctx.redaction_config(),
                };
                rt.block_on(crate::commands::config::execute_config(args))?
            }
            #[cfg(feature = "full")]
            Commands::Features(cli) => {
                let args = crate::commands::features_monolith::FeaturesArgs {
                    command: cli.command,
                    workspace_folder: ctx.workspace_folder.clone(),
                    config_path: ctx.config.clone(),
                };
                rt.block_on(crate::commands::features_monolith::execute_features(
                    args,
                ))?
            }
            #[cfg(feature = "full")]
            Commands::Templates(cli) => {
                let args = crate::commands::templates::TemplatesArgs {
                    command: cli.command,
                    workspace_folder: ctx.workspace_folder.clone(),
                    config_path: ctx.config.clone(),
                };
                rt.block_on(crate::commands::templates::execute_templates(args))?
            }
        }

        Ok(())
    }
}
