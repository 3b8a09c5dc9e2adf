//! Effective configuration.
//!
//! Built-in defaults, overridden by the TOML config file, overridden by CLI
//! flags. A missing default config file is fine; a missing file passed with
//! `--config` is an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::GlobalArgs;
use crate::error::{AuditError, Result};
use crate::store::diff::DetectOptions;
use crate::store::{self, RetentionPolicy};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Config {
    pub db_path: PathBuf,
    pub timeout: Duration,
    pub kube_context: Option<String>,
    /// Empty means all namespaces in a single helm call
    pub namespaces: Vec<String>,
    pub detect: DetectOptions,
    pub retention: RetentionPolicy,
    pub verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    timeout: Option<String>,
    kube_context: Option<String>,
    namespaces: Option<Vec<String>>,
    detect_values_changes: Option<bool>,
    retention: RetentionSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RetentionSection {
    keep_last: Option<usize>,
    max_age: Option<String>,
}

/// ~/.config/helmaudit/config.toml or platform equivalent
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "helmaudit").map(|d| d.config_dir().join("config.toml"))
}

pub fn parse_duration(value: &str, field: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| AuditError::Config(format!("invalid {field} '{value}': {e}")))
}

impl Config {
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => read_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => FileConfig::default(),
            },
        };

        Self::merge(file, args)
    }

    /// Build from config file text plus CLI flags, without touching disk.
    pub fn from_toml(raw: &str, args: &GlobalArgs) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(raw).map_err(|e| AuditError::Config(format!("invalid config: {e}")))?;
        Self::merge(file, args)
    }

    fn merge(file: FileConfig, args: &GlobalArgs) -> Result<Self> {
        let db_path = match args.db.clone().or(file.db_path) {
            Some(path) => path,
            None => store::default_db_path()?,
        };

        let timeout = match args.timeout.as_deref().or(file.timeout.as_deref()) {
            Some(value) => parse_duration(value, "timeout")?,
            None => DEFAULT_TIMEOUT,
        };
        if timeout.is_zero() {
            return Err(AuditError::Config("timeout must be greater than zero".to_string()));
        }

        let max_age = file
            .retention
            .max_age
            .as_deref()
            .map(|v| parse_duration(v, "retention.max_age"))
            .transpose()?;

        Ok(Config {
            db_path,
            timeout,
            kube_context: args.kube_context.clone().or(file.kube_context),
            namespaces: args.namespace.clone().or(file.namespaces).unwrap_or_default(),
            detect: DetectOptions {
                detect_values_changes: file.detect_values_changes.unwrap_or(true),
            },
            retention: RetentionPolicy {
                keep_last: file.retention.keep_last,
                max_age,
            },
            verbose: args.verbose,
        })
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AuditError::Config(format!("cannot read {}: {e}", path.display())))?;
    toml::from_str(&raw).map_err(|e| AuditError::Config(format!("{}: {e}", path.display())))
}
