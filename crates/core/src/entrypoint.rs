//! Entrypoint merge semantics for compose-based devcontainers with features
//!
//! This module implements deterministic entrypoint merge logic that handles:
//! - Explicit compose service entrypoints (highest precedence)
//! - Feature-provided entrypoint augmentations (wrapping)
//! - Base image/Dockerfile entrypoints (lowest precedence)

use crate::features::FeatureMetadata;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Strategy for merging entrypoints when conflicts occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntrypointMergeStrategy {
    /// Wrap the original entrypoint with feature hooks (default)
    #[default]
    Wrap,
    /// Ignore feature entrypoints, use only compose/image entrypoint
    Ignore,
    /// Replace with feature entrypoint completely
    Replace,
}

impl std::fmt::Display for EntrypointMergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wrap => write!(f, "wrap"),
            Self::Ignore => write!(f, "ignore"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

impl std::str::FromStr for EntrypointMergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wrap" => Ok(Self::Wrap),
            "ignore" => Ok(Self::Ignore),
            "replace" => Ok(Self::Replace),
            _ => Err(format!(
                "Invalid entrypoint merge strategy '{}'. Valid options: wrap, ignore, replace",
                s
            )),
        }
    }
}

/// Sources of entrypoints in order of precedence
#[derive(Debug, Clone, PartialEq)]
pub enum EntrypointSource {
    /// Explicit compose service entrypoint (highest precedence)
    ComposeService(String),
    /// Feature-provided entrypoint
    Feature {
        feature_id: String,
        entrypoint: String,
    },
    /// Base image or Dockerfile entrypoint (lowest precedence)
    BaseImage(Option<String>),
}

/// Result of entrypoint merging
#[derive(Debug, Clone, PartialEq)]
pub struct MergedEntrypoint {
    /// The final entrypoint to use
    pub entrypoint: Option<String>,
    /// Path to wrapper script if generated (for wrap strategy)
    pub wrapper_script_path: Option<PathBuf>,
    /// Description of the merge decision
    pub description: String,
}

/// Entrypoint merger that computes merged entrypoints
pub struct EntrypointMerger;

impl EntrypointMerger {
    /// Merge entrypoints from various sources with the given strategy
    ///
    /// ## Precedence Order
    /// 1. Explicit compose service entrypoint (highest)
    /// 2. Feature-provided entrypoints (middle, can wrap or replace)
    /// 3. Base image/Dockerfile entrypoint (lowest)
    ///
    /// ## Arguments
    /// * `compose_entrypoint` - Entrypoint from compose service definition
    /// * `features` - List of features with their metadata
    /// * `base_entrypoint` - Entrypoint from base image or Dockerfile
    /// * `strategy` - Merge strategy to use
    ///
    /// ## Returns
    /// Returns the merged entrypoint result with optional wrapper script path
    #[instrument(level = "debug", skip(features))]
    pub fn merge_entrypoints(
        compose_entrypoint: Option<&str>,
        features: &[&FeatureMetadata],
        base_entrypoint: Option<&str>,
        strategy: EntrypointMergeStrategy,
    ) -> MergedEntrypoint {
        debug!(
            "Merging entrypoints with strategy: {}, compose={:?}, features_count={}, base={:?}",
            strategy,
            compose_entrypoint,
            features.len(),
            base_entrypoint
        );

        // Explicit compose entrypoint always takes precedence
        if let Some(compose_ep) = compose_entrypoint {
            debug!("Using explicit compose service entrypoint (highest precedence)");
            return MergedEntrypoint {
                entrypoint: Some(compose_ep.to_string()),
                wrapper_script_path: None,
                description: "Compose service entrypoint (explicit)".to_string(),
            };
        }

        // Collect feature entrypoints
        let feature_entrypoints: Vec<_> = features
            .iter()
            .filter_map(|f| {
                f.entrypoint.as_ref().map(|ep| EntrypointSource::Feature {
                    feature_id: f.id.clone(),
                    entrypoint: ep.clone(),
                })
            })
            .collect();

        if feature_entrypoints.is_empty() {
            // No feature entrypoints, use base
            debug!("No feature entrypoints, using base entrypoint");
            return MergedEntrypoint {
                entrypoint: base_entrypoint.map(|s| s.to_string()),
                wrapper_script_path: None,
                description: "Base image/Dockerfile entrypoint".to_string(),
            };
        }

        // Apply strategy when feature entrypoints are present
        match strategy {
            EntrypointMergeStrategy::Ignore => {
                debug!("Ignoring feature entrypoints per strategy");
                MergedEntrypoint {
                    entrypoint: base_entrypoint.map(|s| s.to_string()),
                    wrapper_script_path: None,
                    description: format!(
                        "Base entrypoint (ignored {} feature entrypoint(s))",
                        feature_entrypoints.len()
                    ),
                }
            }
            EntrypointMergeStrategy::Replace => {
                // Use the last feature entrypoint (order matters)
                if let Some(EntrypointSource::Feature {
                    feature_id,
                    entrypoint,
                }) = feature_entrypoints.last()
                {
                    debug!("Replacing with feature '{}' entrypoint", feature_id);
                    MergedEntrypoint {
                        entrypoint: Some(entrypoint.clone()),
                        wrapper_script_path: None,
                        description: format!("Feature '{}' entrypoint (replaced)", feature_id),
                    }
                } else {
                    unreachable!("feature_entrypoints is not empty")
                }
            }
            EntrypointMergeStrategy::Wrap => {
                // Generate wrapper that invokes feature hooks then original
                debug!(
                    "Generating wrapper for {} feature entrypoint(s)",
                    feature_entrypoints.len()
                );
                Self::generate_wrapper(
                    &feature_entrypoints,
                    base_entrypoint,
                    base_entrypoint.is_some(),
                )
            }
        }
    }

    /// Generate a wrapper script that invokes feature entrypoints then the original
    fn generate_wrapper(
        feature_entrypoints: &[EntrypointSource],
        _base_entrypoint: Option<&str>,
        has_original: bool,
    ) -> MergedEntrypoint {
        // For now, we'll generate a conceptual wrapper
        // In a full implementation, this would write a shell script to a temp location
        let wrapper_path = PathBuf::from("/tmp/devcontainer-entrypoint-wrapper.sh");

        let feature_ids: Vec<String> = feature_entrypoints
            .iter()
            .filter_map(|src| {
                if let EntrypointSource::Feature { feature_id, .. } = src {
                    Some(feature_id.clone())
                } else {
                    None
                }
            })
            .collect();

        let description = if has_original {
            format!(
                "Wrapper: {} feature(s) [{}] + base entrypoint",
                feature_ids.len(),
                feature_ids.join(", ")
            )
        } else {
            format!(
                "Wrapper: {} feature(s) [{}]",
                feature_ids.len(),
                feature_ids.join(", ")
            )
        };

        debug!("Wrapper description: {}", description);

        MergedEntrypoint {
            entrypoint: Some(wrapper_path.display().to_string()),
            wrapper_script_path: Some(wrapper_path),
            description,
        }
    }

    /// Generate the actual wrapper script content
    ///
    /// This creates a shell script that:
    /// 1. Runs feature entrypoints in order
    /// 2. Invokes the original entrypoint if present
    /// 3. Passes through all arguments
    pub fn generate_wrapper_script(
        feature_entrypoints: &[&FeatureMetadata],
        base_entrypoint: Option<&str>,
    ) -> String {
        let mut script = String::from("#!/bin/sh\n");
        script.push_str("# DevContainer entrypoint wrapper\n");
        script.push_str("# Generated by deacon entrypoint merger\n\n");
        script.push_str("set -e\n\n");

        // Execute feature entrypoints in order
        for feature in feature_entrypoints {
            if let Some(ref ep) = feature.entrypoint {
                script.push_str(&format!(
                    "# Feature: {}\n",
                    feature.name.as_deref().unwrap_or(&feature.id)
                ));
                script.push_str(&format!(
                    "echo \"Running feature '{}' entrypoint...\"\n",
                    feature.id
                ));
                script.push_str(&format!("{}\n\n", ep));
            }
        }

        // Invoke original entrypoint if present
        if let Some(original) = base_entrypoint {
            script.push_str("# Original entrypoint\n");
            script.push_str("echo \"Invoking original entrypoint...\"\n");
            script.push_str(&format!("exec {} \"$@\"\n", original));
        } else {
            script.push_str("# No original entrypoint to invoke\n");
            script.push_str("exec \"$@\"\n");
        }

        script
    }

    /// Validate entrypoint merge for conflicting directives
    ///
    /// Returns an error message if there are conflicts that cannot be safely merged
    pub fn validate_merge(
        compose_entrypoint: Option<&str>,
        features: &[&FeatureMetadata],
        _base_entrypoint: Option<&str>,
    ) -> Result<(), String> {
        // If compose entrypoint is set, no validation needed (it wins)
        if compose_entrypoint.is_some() {
            return Ok(());
        }

        // Check if multiple features have conflicting entrypoints
        let feature_entrypoints: Vec<_> = features
            .iter()
            .filter_map(|f| f.entrypoint.as_ref().map(|ep| (&f.id, ep)))
            .collect();

        if feature_entrypoints.len() > 1 {
            // Multiple features want to set entrypoints - this is a potential conflict
            // We allow this but user should be aware
            debug!(
                "Multiple features define entrypoints: {:?}",
                feature_entrypoints
                    .iter()
                    .map(|(id, _)| id)
                    .collect::<Vec<_>>()
            );
        }

        Ok(())
    }
}
