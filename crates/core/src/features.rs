//! DevContainer features system
//!
//! This module handles feature discovery, installation, and lifecycle management.

use crate::errors::{FeatureError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, instrument};

/// Processed option value supporting different types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Boolean(bool),
    String(String),
}

impl OptionValue {
    /// Get as boolean if it's a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as string if it's a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Feature option definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeatureOption {
    #[serde(rename = "boolean")]
    Boolean {
        #[serde(default)]
        default: Option<bool>,
        #[serde(default)]
        description: Option<String>,
    },
    #[serde(rename = "string")]
    String {
        #[serde(default)]
        default: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        r#enum: Option<Vec<String>>,
        #[serde(default)]
        proposals: Option<Vec<String>>,
    },
}

impl FeatureOption {
    /// Get the default value for this option
    pub fn default_value(&self) -> Option<OptionValue> {
        match self {
            FeatureOption::Boolean { default, .. } => default.map(OptionValue::Boolean),
            FeatureOption::String { default, .. } => {
                default.as_ref().map(|s| OptionValue::String(s.clone()))
            }
        }
    }

    /// Validate a value against this option definition
    pub fn validate_value(&self, value: &OptionValue) -> std::result::Result<(), String> {
        match (self, value) {
            (FeatureOption::Boolean { .. }, OptionValue::Boolean(_)) => Ok(()),
            (FeatureOption::String { r#enum, .. }, OptionValue::String(s)) => {
                if let Some(allowed_values) = r#enum {
                    if allowed_values.contains(s) {
                        Ok(())
                    } else {
                        Err(format!(
                            "Value '{}' is not one of the allowed values: {:?}",
                            s, allowed_values
                        ))
                    }
                } else {
                    Ok(())
                }
            }
            _ => Err("Type mismatch between option definition and provided value".to_string()),
        }
    }
}

/// Feature metadata structure representing devcontainer-feature.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMetadata {
    /// Feature identifier (required)
    pub id: String,

    /// Feature version
    #[serde(default)]
    pub version: Option<String>,

    /// Human-readable name
    #[serde(default)]
    pub name: Option<String>,

    /// Feature description
    #[serde(default)]
    pub description: Option<String>,

    /// Documentation URL
    #[serde(default)]
    pub documentation_url: Option<String>,

    /// License URL
    #[serde(default)]
    pub license_url: Option<String>,

    /// Feature options
    #[serde(default)]
    pub options: HashMap<String, FeatureOption>,

    /// Container environment variables
    #[serde(default)]
    pub container_env: HashMap<String, String>,

    /// Container mounts
    #[serde(default)]
    pub mounts: Vec<String>,

    /// Whether to use init
    #[serde(default)]
    pub init: Option<bool>,

    /// Whether to run privileged
    #[serde(default)]
    pub privileged: Option<bool>,

    /// Capabilities to add
    #[serde(default)]
    pub cap_add: Vec<String>,

    /// Security options
    #[serde(default)]
    pub security_opt: Vec<String>,

    /// Features to install after
    #[serde(default)]
    pub installs_after: Vec<String>,

    /// Feature dependencies
    #[serde(default)]
    pub depends_on: HashMap<String, serde_json::Value>,

    /// onCreate lifecycle command
    #[serde(default)]
    pub on_create_command: Option<serde_json::Value>,

    /// updateContent lifecycle command
    #[serde(default)]
    pub update_content_command: Option<serde_json::Value>,

    /// postCreate lifecycle command
    #[serde(default)]
    pub post_create_command: Option<serde_json::Value>,

    /// postStart lifecycle command
    #[serde(default)]
    pub post_start_command: Option<serde_json::Value>,

    /// postAttach lifecycle command
    #[serde(default)]
    pub post_attach_command: Option<serde_json::Value>,

    /// Optional entrypoint script this feature wants wrapped around the
    /// container/compose-service entrypoint (see [`crate::entrypoint`]).
    #[serde(default)]
    pub entrypoint: Option<String>,
}

impl FeatureMetadata {
    /// Check if any lifecycle commands are present
    pub fn has_lifecycle_commands(&self) -> bool {
        self.on_create_command.is_some()
            || self.update_content_command.is_some()
            || self.post_create_command.is_some()
            || self.post_start_command.is_some()
            || self.post_attach_command.is_some()
    }

    /// Validate the feature metadata
    pub fn validate(&self) -> std::result::Result<(), FeatureError> {
        // Required field validation
        if self.id.is_empty() {
            return Err(FeatureError::Validation {
                message: "Feature id is required and cannot be empty".to_string(),
            });
        }

        // Validate option defaults
        for (option_name, option_def) in &self.options {
            if let Some(default_value) = option_def.default_value() {
                if let Err(err) = option_def.validate_value(&default_value) {
                    return Err(FeatureError::Validation {
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

/// Parse feature metadata from a devcontainer-feature.json file
#[instrument(level = "debug")]
pub fn parse_feature_metadata(path: &Path) -> Result<FeatureMetadata> {
    debug!("Parsing feature metadata from: {}", path.display());

    // Check if file exists
    if !path.exists() {
        return Err(FeatureError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    // Read file content
    let content = std::fs::read_to_string(path).map_err(FeatureError::Io)?;

    // Parse JSON
    let metadata: FeatureMetadata =
        serde_json::from_str(&content).map_err(|e| FeatureError::Parsing {
            message: e.to_string(),
        })?;

    debug!(
        "Parsed feature: id={}, name={:?}",
        metadata.id, metadata.name
    );

    // Log options
    for (option_name, option_def) in &metadata.options {
        debug!("Option '{}': {:?}", option_name, option_def);
    }

    // Log lifecycle presence
    if metadata.has_lifecycle_commands() {
        debug!("Feature has lifecycle commands");
    }

    // Validate metadata
    metadata.validate()?;

    Ok(metadata)
}

/// A feature that has been fetched and had its options merged with schema
/// defaults, but not yet ordered or installed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFeature {
    /// Normalized feature id (see `normalize_feature_id`)
    pub id: String,
    /// The raw reference it was fetched from (OCI ref, path, or URL)
    pub source: String,
    /// User-supplied + defaulted option values
    pub options: HashMap<String, OptionValue>,
    /// Parsed `devcontainer-feature.json`
    pub metadata: FeatureMetadata,
}

/// Strip a tag or digest from an OCI-style feature reference, retaining the
/// repository path. Local paths (`./`, `../`) and `https://` tarball URLs are
/// returned unchanged: they are not OCI references and have no tag to strip.
pub fn normalize_feature_id(id: &str) -> String {
    if id.starts_with("./") || id.starts_with("../") || id.starts_with("https://") {
        return id.to_string();
    }
    match id.rfind(':') {
        // Guard against stripping a registry port (e.g. localhost:5000/foo)
        Some(idx) if !id[idx + 1..].contains('/') && id[..idx].contains('/') => {
            id[..idx].to_string()
        }
        _ => id.to_string(),
    }
}

/// The result of ordering a set of [`ResolvedFeature`]s: a flat installation
/// order plus a grouping into concurrency-safe levels (see
/// [`crate::graph::Graph::levels`]).
#[derive(Debug, Clone, Default)]
pub struct InstallationPlan {
    order: Vec<String>,
    pub levels: Vec<Vec<String>>,
    features: HashMap<String, ResolvedFeature>,
}

impl InstallationPlan {
    /// Build a plan directly from a feature list in the given order, with one
    /// feature per level. Bypasses dependency resolution; intended for tests
    /// and callers that already know there are no inter-feature dependencies.
    pub fn new(features: Vec<ResolvedFeature>) -> Self {
        let mut order = Vec::with_capacity(features.len());
        let mut levels = Vec::with_capacity(features.len());
        let mut map = HashMap::with_capacity(features.len());
        for feature in features {
            let id = normalize_feature_id(&feature.id);
            order.push(id.clone());
            levels.push(vec![id.clone()]);
            map.insert(id, feature);
        }
        Self {
            order,
            levels,
            features: map,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Flat installation order (post dependsOn/installsAfter/override
    /// projection).
    pub fn feature_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn get_feature(&self, id: &str) -> Option<&ResolvedFeature> {
        self.features.get(id)
    }

    /// All resolved features, in no particular order. Use [`Self::feature_ids`]
    /// or [`Self::levels`] when order matters.
    pub fn resolved_features(&self) -> impl Iterator<Item = &ResolvedFeature> {
        self.features.values()
    }
}

/// Orders a set of already-fetched features per the dependency graph rules
/// in the feature resolver (hard deps from `dependsOn`, soft deps from
/// `installsAfter`, then a stable `overrideFeatureInstallOrder` projection).
pub struct FeatureDependencyResolver {
    override_order: Vec<String>,
}

impl FeatureDependencyResolver {
    pub fn new(override_order: Option<Vec<String>>) -> Self {
        Self {
            override_order: override_order.unwrap_or_default(),
        }
    }

    /// Build the dependency graph and produce an [`InstallationPlan`].
    ///
    /// `features` is assumed to already be the full transitive closure of
    /// declared dependencies (auto-fetched by the caller); this only orders
    /// what it is given.
    pub fn resolve(&self, features: &[ResolvedFeature]) -> Result<InstallationPlan> {
        use crate::graph::Graph;

        let mut graph: Graph<()> = Graph::new();
        let mut by_id: HashMap<String, ResolvedFeature> = HashMap::new();

        for feature in features {
            let id = normalize_feature_id(&feature.id);
            if by_id.contains_key(&id) {
                continue;
            }
            graph
                .add_node(id.clone(), ())
                .map_err(|_| FeatureError::DependencyResolution {
                    message: format!("duplicate feature id after normalization: {}", id),
                })?;
            by_id.insert(id, feature.clone());
        }

        // Hard dependencies: dep -> feature
        for feature in features {
            let id = normalize_feature_id(&feature.id);
            for dep in feature.metadata.depends_on.keys() {
                let dep_id = normalize_feature_id(dep);
                if !graph.contains_node(&dep_id) {
                    continue; // dependency wasn't selected; resolver's caller should have fetched it
                }
                graph
                    .add_edge(&dep_id, &id)
                    .map_err(|_| FeatureError::InvalidDependency {
                        feature_id: id.clone(),
                        dependency: dep_id.clone(),
                    })?;
            }
        }

        // Soft dependencies: dep -> feature, but only if not already a hard dep,
        // tolerating duplicate hard+soft declarations of the same id.
        for feature in features {
            let id = normalize_feature_id(&feature.id);
            let hard_deps: std::collections::HashSet<String> = feature
                .metadata
                .depends_on
                .keys()
                .map(|d| normalize_feature_id(d))
                .collect();

            for dep in &feature.metadata.installs_after {
                let dep_id = normalize_feature_id(dep);
                if hard_deps.contains(&dep_id) || hard_deps.contains(dep) {
                    continue;
                }
                if !graph.contains_node(&dep_id) {
                    continue; // soft deps on features that weren't selected are ignored
                }
                let _ = graph.add_edge(&dep_id, &id);
            }
        }

        let base_order = graph
            .sort()
            .map_err(|e| FeatureError::DependencyCycle(e.to_string()))?;

        let order = self.apply_override(&base_order, &by_id);

        let levels = if self.override_order.is_empty() {
            graph
                .levels()
                .map_err(|e| FeatureError::DependencyCycle(e.to_string()))?
        } else {
            // An explicit override may reorder across what would otherwise be
            // independent levels; once applied we can no longer claim the
            // parallel-safety invariant, so every feature becomes its own level.
            order.iter().map(|id| vec![id.clone()]).collect()
        };

        Ok(InstallationPlan {
            order,
            levels,
            features: by_id,
        })
    }

    /// Stable projection: for each id in `override_order` (resolved by raw
    /// then normalized id), move it to the head if not yet seen, then append
    /// the remaining base-ordered features. Per the source's documented
    /// behavior (see design notes), this can place a feature ahead of its own
    /// hard dependency if the override says so; that violates `dependsOn`
    /// ordering but is preserved intentionally rather than silently corrected.
    fn apply_override(
        &self,
        base_order: &[String],
        by_id: &HashMap<String, ResolvedFeature>,
    ) -> Vec<String> {
        if self.override_order.is_empty() {
            return base_order.to_vec();
        }

        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::with_capacity(base_order.len());

        for raw in &self.override_order {
            let id = if by_id.contains_key(raw) {
                raw.clone()
            } else {
                normalize_feature_id(raw)
            };
            if by_id.contains_key(&id) && seen.insert(id.clone()) {
                result.push(id);
            }
        }

        for id in base_order {
            if seen.insert(id.clone()) {
                result.push(id.clone());
            }
        }

        self.warn_on_dependency_violations(&result, by_id);

        result
    }

    /// Emit a warning for every hard `dependsOn` edge that the override
    /// projection places out of order (dependent before its dependency).
    /// The projected order is preserved as-is; this only surfaces the
    /// contradiction so it isn't silently installed wrong.
    fn warn_on_dependency_violations(
        &self,
        order: &[String],
        by_id: &HashMap<String, ResolvedFeature>,
    ) {
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();

        for id in order {
            let Some(feature) = by_id.get(id) else {
                continue;
            };
            for dep in feature.metadata.depends_on.keys() {
                let dep_id = normalize_feature_id(dep);
                if let (Some(&dep_pos), Some(&feature_pos)) =
                    (position.get(dep_id.as_str()), position.get(id.as_str()))
                {
                    if dep_pos > feature_pos {
                        tracing::warn!(
                            feature = %id,
                            depends_on = %dep_id,
                            "installOrder override places {} before its hard dependency {}; \
                             preserving the override but this violates dependsOn",
                            id,
                            dep_id
                        );
                    }
                }
            }
        }
    }
}

/// How a container's entrypoint should be assembled from feature and
/// configuration entrypoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrypointChain {
    /// No entrypoint override; use the image default.
    None,
    /// Exactly one entrypoint is in play; run it directly.
    Single(String),
    /// Multiple entrypoints must run in sequence via a generated wrapper
    /// script, invoked in place of the image entrypoint.
    Chained {
        wrapper_path: String,
        entrypoints: Vec<String>,
    },
}

/// Determine the entrypoint chain for a container from the resolved
/// feature installation order and an optional `entrypoint` from the
/// devcontainer configuration.
///
/// Feature entrypoints are collected in the order the features appear
/// (installation order), then the configuration entrypoint, if any, is
/// appended last so it runs after all feature entrypoints.
pub fn build_entrypoint_chain(
    features: &[ResolvedFeature],
    config_entrypoint: Option<&str>,
) -> EntrypointChain {
    let mut entrypoints: Vec<String> = features
        .iter()
        .filter_map(|f| f.metadata.entrypoint.clone())
        .filter(|e| !e.trim().is_empty())
        .collect();

    if let Some(config_entrypoint) = config_entrypoint {
        if !config_entrypoint.trim().is_empty() {
            entrypoints.push(config_entrypoint.to_string());
        }
    }

    match entrypoints.len() {
        0 => EntrypointChain::None,
        1 => EntrypointChain::Single(entrypoints.remove(0)),
        _ => EntrypointChain::Chained {
            wrapper_path: "/usr/local/share/devcontainer-entrypoint-wrapper.sh".to_string(),
            entrypoints,
        },
    }
}

/// Generate a shell wrapper script that execs each entrypoint in sequence,
/// with the final entrypoint replacing the shell process via `exec` so
/// signals and exit codes propagate to the container runtime.
pub fn generate_wrapper_script(entrypoints: &[String]) -> String {
    let mut script = String::from("#!/bin/sh\nset -e\n");

    for entrypoint in entrypoints.iter().take(entrypoints.len().saturating_sub(1)) {
        script.push_str(entrypoint);
        script.push('\n');
    }

    if let Some(last) = entrypoints.last() {
        script.push_str("exec ");
        script.push_str(last);
        script.push('\n');
    }

    script
}

/// Security options merged from config and features, as consumed by the
/// container runtime layer.
pub type MergedSecurityOptions = crate::security::SecurityOptions;

/// Merge security settings (privileged, init, cap-add, security-opt) from
/// the devcontainer configuration and resolved features.
pub fn merge_security_options(
    config: &crate::config::DevContainerConfig,
    features: &[ResolvedFeature],
) -> crate::security::SecurityOptions {
    crate::security::SecurityOptions::merge_from_config_and_features(config, features)
}
