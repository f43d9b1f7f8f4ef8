//! Recipe assembly: rewriting a user-supplied Dockerfile (or a synthesized
//! `FROM <image>` recipe) into one that installs a resolved feature set.
//!
//! For each feature in the installation plan this materializes a per-feature
//! env file plus an install wrapper script, then appends a build layer that
//! sources them and runs `install.sh`. The assembled recipe gains a
//! `dev_containers_target_stage` multi-stage target so the build orchestrator
//! can target the feature-augmented image without disturbing a user's own
//! multi-stage layout.

use crate::errors::{FeatureError, Result};
use crate::features::{InstallationPlan, OptionValue, ResolvedFeature};
use std::fmt::Write as _;
use tracing::{debug, instrument};

/// Name of the synthesized multi-stage target that carries the feature
/// installation layer. The build orchestrator targets this stage.
pub const TARGET_STAGE: &str = "dev_containers_target_stage";

const BASE_IMAGE_ARG: &str = "_DEV_CONTAINERS_BASE_IMAGE";
const FEATURE_BUILD_ROOT: &str = "/tmp/build-features";

/// A per-feature directory to materialize on the host before the build: its
/// env file, its install wrapper, and (by reference) the feature's already
/// extracted content directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBuildMaterial {
    /// Index in the installation plan; also the directory suffix under
    /// `/tmp/build-features`.
    pub index: usize,
    pub feature_id: String,
    /// Contents of `devcontainer-features.env`.
    pub env_file: String,
    /// Contents of `devcontainer-features-install.sh`.
    pub install_script: String,
}

/// Inputs that do not come from the feature plan itself.
#[derive(Debug, Clone, Default)]
pub struct RecipeContext {
    /// Base image to substitute for `ARG _DEV_CONTAINERS_BASE_IMAGE`.
    pub base_image: String,
    /// The `#syntax=` directive to use; defaults to the BuildKit Dockerfile
    /// frontend if not supplied.
    pub syntax_directive: Option<String>,
    /// Effective container user, used to populate the builtin env and the
    /// `/etc/passwd`-derived home directory lookups.
    pub container_user: Option<String>,
    pub remote_user: Option<String>,
}

const DEFAULT_SYNTAX: &str = "#syntax=docker/dockerfile:1.4";

/// Assembles recipes (Dockerfile text plus host-side per-feature build
/// material) from a resolved feature installation plan.
#[derive(Debug)]
pub struct DockerfileGenerator {
    ctx: RecipeContext,
}

impl DockerfileGenerator {
    pub fn new(ctx: RecipeContext) -> Self {
        Self { ctx }
    }

    /// Derive the safe environment-variable identifier for an option key:
    /// non-word characters become `_`, and a leading digit gets an `_`
    /// prefix so the result is a valid shell identifier.
    pub fn safe_option_id(key: &str) -> String {
        let mut out: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        if out.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            out.insert(0, '_');
        }
        out.to_uppercase()
    }

    fn option_value_to_shell(value: &OptionValue) -> String {
        match value {
            OptionValue::Boolean(b) => b.to_string(),
            OptionValue::String(s) => s.clone(),
        }
    }

    /// Builtin env shared by every feature: `_CONTAINER_USER` / `_REMOTE_USER`.
    /// `_CONTAINER_USER_HOME` / `_REMOTE_USER_HOME` are appended at build time
    /// by the recipe fragment (they depend on `/etc/passwd` inside the image,
    /// which isn't known on the host).
    pub fn builtin_env(&self) -> String {
        let container_user = self.ctx.container_user.as_deref().unwrap_or("");
        let remote_user = self.ctx.remote_user.as_deref().unwrap_or("");
        format!(
            "_CONTAINER_USER=\"{container_user}\"\n_REMOTE_USER=\"{remote_user}\"\n",
        )
    }

    /// Build the per-feature host materials (env file + install wrapper) for
    /// every feature in the plan, in installation order.
    pub fn build_materials(&self, plan: &InstallationPlan) -> Result<Vec<FeatureBuildMaterial>> {
        let mut materials = Vec::with_capacity(plan.len());
        for (index, feature_id) in plan.feature_ids().iter().enumerate() {
            let feature = plan
                .get_feature(feature_id)
                .ok_or_else(|| FeatureError::NotFound {
                    path: format!("feature {} missing from installation plan", feature_id),
                })?;
            materials.push(self.build_material(index, feature));
        }
        Ok(materials)
    }

    fn build_material(&self, index: usize, feature: &ResolvedFeature) -> FeatureBuildMaterial {
        let mut env_file = String::new();
        let mut keys: Vec<&String> = feature.options.keys().collect();
        keys.sort();
        for key in keys {
            let value = &feature.options[key];
            let safe_id = Self::safe_option_id(key);
            let shell_value = Self::option_value_to_shell(value).replace('"', "\\\"");
            let _ = writeln!(env_file, "{}=\"{}\"", safe_id, shell_value);
        }

        let banner = feature
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| feature.id.clone());
        let deprecation_notice = feature
            .metadata
            .description
            .as_deref()
            .filter(|d| d.to_lowercase().contains("deprecated"))
            .map(|d| format!("echo 'WARNING: feature {} is deprecated: {}'\n", feature.id, d))
            .unwrap_or_default();
        let doc_trap = match &feature.metadata.documentation_url {
            Some(url) => format!(
                "echo \"Feature '{}' failed to install. See {} for troubleshooting.\" >&2",
                feature.id, url
            ),
            None => format!("echo \"Feature '{}' failed to install.\" >&2", feature.id),
        };

        let install_script = format!(
            "#!/bin/sh\nset -e\nSCRIPT_DIR=$(cd \"$(dirname \"$0\")\" && pwd)\n\
. \"$SCRIPT_DIR\"/devcontainer-features.builtin.env\n\
. \"$SCRIPT_DIR\"/devcontainer-features.env\n\
echo '===== Installing feature: {banner} ====='\n\
{deprecation_notice}\
trap '{doc_trap}' EXIT\n\
chmod +x \"$SCRIPT_DIR\"/install.sh\n\
\"$SCRIPT_DIR\"/install.sh\n\
trap - EXIT\n",
            banner = banner,
            deprecation_notice = deprecation_notice,
            doc_trap = doc_trap,
        );

        FeatureBuildMaterial {
            index,
            feature_id: feature.id.clone(),
            env_file,
            install_script,
        }
    }

    /// Assemble the final recipe text: the supplied syntax directive, the
    /// base image ARG, the trimmed user recipe (any existing `#syntax=` line
    /// stripped), and a generated feature installation layer that builds a
    /// new stage named [`TARGET_STAGE`] on top of it.
    #[instrument(skip(self, user_recipe, plan))]
    pub fn assemble(&self, user_recipe: &str, plan: &InstallationPlan) -> Result<String> {
        debug!(
            "Assembling recipe for {} features across {} levels",
            plan.len(),
            plan.levels.len()
        );

        let syntax = self
            .ctx
            .syntax_directive
            .clone()
            .unwrap_or_else(|| DEFAULT_SYNTAX.to_string());

        let trimmed_user_recipe: String = user_recipe
            .lines()
            .filter(|line| !line.trim_start().starts_with("#syntax="))
            .collect::<Vec<_>>()
            .join("\n");

        let mut recipe = String::new();
        let _ = writeln!(recipe, "{}", syntax);
        let _ = writeln!(recipe, "ARG {}=placeholder", BASE_IMAGE_ARG);
        recipe.push_str(&trimmed_user_recipe);
        recipe.push('\n');

        let _ = writeln!(recipe, "\nFROM ${{{}}} AS {}", BASE_IMAGE_ARG, TARGET_STAGE);
        let _ = writeln!(recipe, "RUN mkdir -p {}", FEATURE_BUILD_ROOT);
        let _ = writeln!(
            recipe,
            "RUN {{ echo '{0} . \"$(cd \"$(dirname \"$0\")\" && pwd)\"/etc_passwd_home_lookup; }} > /dev/null 2>&1 || true",
            "#"
        );

        for (index, feature_id) in plan.feature_ids().iter().enumerate() {
            let feature = plan
                .get_feature(feature_id)
                .ok_or_else(|| FeatureError::NotFound {
                    path: format!("feature {} missing from installation plan", feature_id),
                })?;
            let feature_dir = format!("{}/{}", FEATURE_BUILD_ROOT, index);

            for (key, value) in &feature.metadata.container_env {
                let _ = writeln!(recipe, "ENV {}={}", key, value);
            }

            let _ = writeln!(
                recipe,
                "RUN cd {} && ./devcontainer-features-install.sh",
                feature_dir
            );
        }

        // _CONTAINER_USER_HOME / _REMOTE_USER_HOME are resolved in-container
        // because they depend on /etc/passwd entries that only exist once the
        // base image layer has been built.
        let _ = writeln!(
            recipe,
            "RUN _CONTAINER_USER_HOME=$(getent passwd \"${{_CONTAINER_USER:-root}}\" | cut -d: -f6) \
&& _REMOTE_USER_HOME=$(getent passwd \"${{_REMOTE_USER:-root}}\" | cut -d: -f6) \
&& echo \"_CONTAINER_USER_HOME=$_CONTAINER_USER_HOME\" >> {0}/devcontainer-features.builtin.env \
&& echo \"_REMOTE_USER_HOME=$_REMOTE_USER_HOME\" >> {0}/devcontainer-features.builtin.env",
            FEATURE_BUILD_ROOT
        );

        Ok(recipe)
    }
}
