//! Shared helpers for command implementations.

pub mod config_loader;
pub mod env_user;
pub mod progress;
pub mod remote_env;
pub mod terminal;
pub mod workspace;

pub use config_loader::{load_config, ConfigLoadArgs, ConfigLoadResult};
pub use env_user::resolve_env_and_user;
pub use remote_env::NormalizedRemoteEnv;
pub use terminal::TerminalDimensions;
pub use workspace::derive_container_workspace_folder;
