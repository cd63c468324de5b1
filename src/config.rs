//! TOML configuration for `ssync`.
//!
//! See `config/sync.example.toml` for a complete file. [`load_config`]
//! parses and validates; [`Config::ignore_patterns`] merges the inline
//! `ignore` list with the optional ignore file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    /// PROV documents keyed by subproject name.
    #[serde(default)]
    pub provenance: BTreeMap<String, ProvenanceConfig>,
    /// Directory the config was loaded from; relative paths resolve here.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Gdrive,
    Filesystem,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub project: String,
    #[serde(default)]
    pub subprojects: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub ignore_file: Option<PathBuf>,
    #[serde(default)]
    pub keep: Vec<String>,
    #[serde(default)]
    pub filesystem: Option<FilesystemSourceConfig>,
    #[serde(default)]
    pub gdrive: GDriveSourceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemSourceConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GDriveSourceConfig {
    #[serde(default = "default_gdrive_api_base")]
    pub api_base: String,
    #[serde(default = "default_gdrive_token_env")]
    pub token_env: String,
}

impl Default for GDriveSourceConfig {
    fn default() -> Self {
        Self {
            api_base: default_gdrive_api_base(),
            token_env: default_gdrive_token_env(),
        }
    }
}

fn default_gdrive_api_base() -> String {
    "https://www.googleapis.com".to_string()
}
fn default_gdrive_token_env() -> String {
    "GOOGLE_DRIVE_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DestinationConfig {
    pub project: String,
    #[serde(default = "default_synapse_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_synapse_token_env")]
    pub token_env: String,
}

fn default_synapse_endpoint() -> String {
    "https://repo-prod.prod.sagebase.org".to_string()
}
fn default_synapse_token_env() -> String {
    "SYNAPSE_AUTH_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvenanceConfig {
    /// PROV-JSON document.
    pub path: PathBuf,
    /// Local working copy of the subproject, for `ssync check`.
    #[serde(default)]
    pub home_dir: Option<PathBuf>,
}

impl Config {
    /// Resolve a possibly relative path against the config's directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// The full ignore set: inline `ignore` plus the ignore file's patterns
    /// minus `keep`.
    pub fn ignore_patterns(&self) -> Result<Vec<String>> {
        let mut patterns = self.source.ignore.clone();
        if let Some(file) = &self.source.ignore_file {
            let path = self.resolve_path(file);
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read ignore file: {}", path.display()))?;
            patterns.extend(parse_ignore_file(&content, &self.source.keep));
        }
        Ok(patterns)
    }
}

/// Patterns from an ignore file: trimmed, without blanks, comments, or any
/// entry listed in `keep`.
pub fn parse_ignore_file(content: &str, keep: &[String]) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| !keep.iter().any(|k| k == line))
        .map(str::to_string)
        .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    if config.source.project.trim().is_empty() {
        bail!("source.project must not be empty");
    }
    if config.destination.project.trim().is_empty() {
        bail!("destination.project must not be empty");
    }

    if config.source.kind == SourceKind::Filesystem && config.source.filesystem.is_none() {
        bail!("[source.filesystem] root is required when source.kind is 'filesystem'");
    }

    for name in config.provenance.keys() {
        if !config.source.subprojects.contains(name) {
            bail!(
                "provenance.{} does not name a configured subproject. Available: {}",
                name,
                config.source.subprojects.join(", ")
            );
        }
    }

    Ok(config)
}
