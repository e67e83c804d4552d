//! Plugin discovery for DevTerm
//!
//! This module scans a discovery root for candidate files and turns each
//! candidate into plugin definitions through a [`CandidateLoader`]. It also
//! provides the JSON manifest loader and its validation rules.
//!
//! Candidates are regular files directly inside the root whose name does not
//! start with `_` and whose extension some loader accepts. They are returned
//! sorted by file name so that name collisions resolve the same way on every
//! platform.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{PluginError, Result};

use super::command::{CommandPlugin, CommandPluginDef};
use super::types::{PluginDescriptor, PluginOrigin, ToolPlugin};

/// Turns one candidate file into the plugin definitions it declares.
///
/// Loaders may fail (or panic); the manager skips such candidates and keeps
/// going.
pub trait CandidateLoader: Send + Sync {
    /// Short label used in log records.
    fn kind(&self) -> &str;

    /// Whether this loader handles `path`.
    fn accepts(&self, path: &Path) -> bool;

    /// Load every definition declared by `path`.
    fn load(&self, path: &Path) -> Result<Vec<PluginDescriptor>>;
}

/// A file selected for loading and the index of the loader that accepts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub loader: usize,
}

/// List the candidates in `dir`, sorted by file name.
///
/// # Errors
/// `PluginError::Io` if the directory or one of its entries cannot be read.
pub fn scan_candidates(dir: &Path, loaders: &[Box<dyn CandidateLoader>]) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(true, |n| n.starts_with('_'));
        if hidden {
            continue;
        }

        if let Some(loader) = loaders.iter().position(|l| l.accepts(&path)) {
            candidates.push(Candidate { path, loader });
        }
    }

    candidates.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(candidates)
}

/// The loaders a manager uses unless told otherwise.
pub fn default_loaders() -> Vec<Box<dyn CandidateLoader>> {
    #[allow(unused_mut)]
    let mut loaders: Vec<Box<dyn CandidateLoader>> = vec![Box::new(ManifestLoader)];
    #[cfg(feature = "native")]
    loaders.push(Box::new(super::native::NativeLoader));
    loaders
}

/// Loads command plugins from `*.json` manifests.
///
/// A manifest holds either a single plugin object or `{"plugins": [...]}`.
/// One invalid plugin rejects the whole file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestLoader;

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    Many { plugins: Vec<CommandPluginDef> },
    One(CommandPluginDef),
}

impl CandidateLoader for ManifestLoader {
    fn kind(&self) -> &str {
        "manifest"
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "json")
    }

    fn load(&self, path: &Path) -> Result<Vec<PluginDescriptor>> {
        let content = fs::read_to_string(path).map_err(|e| {
            PluginError::Load(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let manifest: ManifestFile = serde_json::from_str(&content)?;
        let defs = match manifest {
            ManifestFile::Many { plugins } => plugins,
            ManifestFile::One(def) => vec![def],
        };

        if defs.is_empty() {
            return Err(PluginError::Load(format!(
                "{} must declare at least one plugin",
                path.display()
            )));
        }

        for def in &defs {
            validate_manifest(def)?;
        }

        Ok(defs
            .into_iter()
            .map(|def| {
                let name = def.name.clone();
                PluginDescriptor::new(name, move || {
                    Ok(Box::new(CommandPlugin::new(def.clone())) as Box<dyn ToolPlugin>)
                })
                .with_origin(PluginOrigin::File(path.to_path_buf()))
            })
            .collect())
    }
}

/// Validate a command plugin definition for correctness and safety.
///
/// Performs the following checks:
/// - Name must be 1-64 characters: alphanumerics, hyphens and underscores,
///   starting with an alphanumeric
/// - Command must be non-empty
/// - Command template must not contain dangerous shell operators
///   (`&&`, `||`, `;`, `|`, backticks)
pub fn validate_manifest(def: &CommandPluginDef) -> Result<()> {
    if !name_re().is_match(&def.name) {
        return Err(PluginError::Load(format!(
            "Invalid plugin name '{}': must be 1-64 alphanumeric characters, hyphens or underscores, starting with alphanumeric",
            def.name
        )));
    }

    if def.command.trim().is_empty() {
        return Err(PluginError::Load(format!(
            "Plugin '{}' has an empty command",
            def.name
        )));
    }

    validate_command_safety(&def.command, &def.name)
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_\-]{0,63}$").expect("name pattern is valid")
    })
}

/// Check a command template for dangerous shell operators.
///
/// Values substituted into placeholders are quoted; this only guards the
/// template itself.
fn validate_command_safety(command: &str, plugin_name: &str) -> Result<()> {
    let dangerous_patterns: &[(&str, &str)] = &[
        ("&&", "command chaining (&&)"),
        ("||", "conditional chaining (||)"),
        (";", "command separator (;)"),
        ("`", "backtick execution"),
    ];

    for (pattern, description) in dangerous_patterns {
        if command.contains(pattern) {
            return Err(PluginError::SecurityViolation(format!(
                "Plugin '{}' contains dangerous pattern: {}",
                plugin_name, description
            )));
        }
    }

    // `||` is caught above, so any `|` left is a pipe.
    if command.contains('|') {
        return Err(PluginError::SecurityViolation(format!(
            "Plugin '{}' contains dangerous pattern: pipe operator (|)",
            plugin_name
        )));
    }

    Ok(())
}
