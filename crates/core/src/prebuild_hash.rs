//! Prebuild hasher (component C): produces a stable 32-character image
//! identifier from build-relevant configuration, the effective architecture,
//! the assembled recipe, and a filtered hash of the build context directory.
//!
//! Two builds on different machines with the same inputs land on the same
//! hash, which lets prebuilt images be shared across a team via a container
//! registry rather than rebuilt locally every time.

use crate::config::DevContainerConfig;
use crate::errors::HashLimitExceeded;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Files beyond this count in the context directory yield a partial hash and
/// a wrapped [`HashLimitExceeded`] error instead of a silent truncation.
pub const CONTEXT_FILE_LIMIT: usize = 5000;

/// A single `.dockerignore`-style pattern. Later patterns in the file take
/// precedence, matching standard gitignore semantics.
#[derive(Debug, Clone)]
struct IgnorePattern {
    negated: bool,
    regex: regex::Regex,
}

fn glob_to_regex(pattern: &str) -> regex::Regex {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '.' | '+' | '(' | ')' | '|' | '^' | '$' | '{' | '}' | '[' | ']' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    regex::Regex::new(&out).unwrap_or_else(|_| regex::Regex::new("$^").unwrap())
}

fn parse_ignore_patterns(content: &str) -> Vec<IgnorePattern> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let (negated, pat) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let pat = pat.trim_start_matches('/');
            IgnorePattern {
                negated,
                regex: glob_to_regex(pat),
            }
        })
        .collect()
}

/// Load ignore patterns from `<dockerfile>.dockerignore` if present, falling
/// back to `.dockerignore` in the context root.
fn load_ignore_patterns(context_dir: &Path, dockerfile_name: Option<&str>) -> Vec<IgnorePattern> {
    let candidates: Vec<PathBuf> = match dockerfile_name {
        Some(name) => vec![
            context_dir.join(format!("{}.dockerignore", name)),
            context_dir.join(".dockerignore"),
        ],
        None => vec![context_dir.join(".dockerignore")],
    };

    for candidate in candidates {
        if let Ok(content) = std::fs::read_to_string(&candidate) {
            return parse_ignore_patterns(&content);
        }
    }
    Vec::new()
}

/// True if `relpath` (forward-slash, relative to the context root) should be
/// excluded under gitignore-style last-match-wins semantics.
fn is_excluded(relpath: &str, patterns: &[IgnorePattern]) -> bool {
    let mut excluded = false;
    for pattern in patterns {
        if pattern.regex.is_match(relpath) {
            excluded = !pattern.negated;
        }
    }
    excluded
}

fn collect_files(dir: &Path, base: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&path, base, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn to_relative_forward_slash(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Computes the `h1:`-prefixed order-independent directory hash described in
/// the prebuild hasher spec: base64(SHA-256 over a sorted `name\thash\n`
/// listing). `forced_retain` entries (e.g. the recipe file, the ignore file
/// itself) are kept even if a non-negated pattern would otherwise drop them.
///
/// Returns `Ok((hash, None))` when under [`CONTEXT_FILE_LIMIT`], or
/// `Ok((partial_hash, Some(err)))` when the file count exceeds it — callers
/// decide whether to treat that as fatal.
pub fn directory_hash(
    context_dir: &Path,
    dockerfile_name: Option<&str>,
    include_filter: Option<&[String]>,
    forced_retain: &[String],
) -> std::io::Result<(String, Option<HashLimitExceeded>)> {
    let patterns = load_ignore_patterns(context_dir, dockerfile_name);

    let mut files = Vec::new();
    collect_files(context_dir, context_dir, &mut files)?;

    let mut relative_paths: BTreeSet<String> = BTreeSet::new();
    for path in &files {
        let rel = to_relative_forward_slash(path, context_dir);
        let retained = forced_retain.iter().any(|f| f == &rel);
        let included = match include_filter {
            Some(filter) => filter.iter().any(|f| f == &rel),
            None => true,
        };
        if !included {
            continue;
        }
        if retained || !is_excluded(&rel, &patterns) {
            relative_paths.insert(rel);
        }
    }

    let total = relative_paths.len();
    let limited: Vec<String> = relative_paths.into_iter().take(CONTEXT_FILE_LIMIT).collect();

    let mut listing = String::new();
    for rel in &limited {
        let file_path = context_dir.join(rel);
        let contents = std::fs::read(&file_path)?;
        let mut hasher = Sha256::new();
        hasher.update(&contents);
        let file_hash = format!("{:x}", hasher.finalize());
        listing.push_str(rel);
        listing.push('\t');
        listing.push_str(&file_hash);
        listing.push('\n');
    }

    let mut hasher = Sha256::new();
    hasher.update(listing.as_bytes());
    let digest = hasher.finalize();
    let hash = format!("h1:{}", base64::engine::general_purpose::STANDARD.encode(digest));

    if total > CONTEXT_FILE_LIMIT {
        Ok((
            hash,
            Some(HashLimitExceeded {
                limit: CONTEXT_FILE_LIMIT,
                counted: total,
            }),
        ))
    } else {
        Ok((hash, None))
    }
}

/// Config fields preserved for the purpose of the prebuild hash: everything
/// else (origin, compose fields, lifecycle commands, run args, per-IDE
/// customizations) is cleared before serialization so it doesn't perturb the
/// hash.
#[derive(Debug, Serialize)]
struct NormalizedConfig {
    name: Option<String>,
    features: serde_json::Value,
    override_feature_install_order: Option<Vec<String>>,
    image: Option<String>,
    dockerfile: Option<String>,
    build: Option<serde_json::Value>,
}

/// Clears everything not relevant to image contents from `config` and
/// serializes the result with stable (sorted) key order.
pub fn normalize_config_json(config: &DevContainerConfig) -> serde_json::Result<String> {
    let normalized = NormalizedConfig {
        name: config.name.clone(),
        features: config.features.clone(),
        override_feature_install_order: config
            .override_feature_install_order
            .clone()
            .map(|mut ids| {
                ids.sort();
                ids
            }),
        image: config.image.clone(),
        dockerfile: config.dockerfile.clone(),
        build: config.build.clone(),
    };
    // serde_json's `preserve_order` feature is enabled crate-wide, but this
    // struct has a fixed field order already, so plain serialization is
    // already stable across runs.
    serde_json::to_string(&normalized)
}

/// `linux/<arch>` becomes `<arch>`; any other platform string passes through
/// unchanged.
pub fn normalize_architecture(platform: &str) -> String {
    platform
        .strip_prefix("linux/")
        .map(str::to_string)
        .unwrap_or_else(|| platform.to_string())
}

/// Computes the final `devpod-<32 hex chars>` prebuild identifier.
pub fn compute_prebuild_hash(
    architecture: &str,
    config_json: &str,
    recipe_content: &str,
    context_hash: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(architecture.as_bytes());
    hasher.update(config_json.as_bytes());
    hasher.update(recipe_content.as_bytes());
    hasher.update(context_hash.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    format!("devpod-{}", &hex[..32])
}
