//! Daemon configuration: TOML file, include files and environment overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{BodewellError, Result};
use crate::monitor::types::MonitorOptions;

/// Default config location when neither `--config` nor the env var is set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bodewell/config.toml";
/// Env var naming the config file.
pub const CONFIG_ENV: &str = "BODEWELL_CONFIG";
/// Env var overriding the `report` list.
pub const REPORT_ENV: &str = "BODEWELL_REPORT";

/// Per-contact extra fields. `use` names the dispatcher route.
pub type ContactFields = BTreeMap<String, String>;

/// The reconfigurable part of the config, consumed by `Server::configure`.
///
/// Absent sections leave the running state untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Monitors keyed by name.
    pub monitor: Option<BTreeMap<String, MonitorOptions>>,
    /// Comma-separated contact addresses to notify.
    pub report: Option<String>,
    /// Contact fields keyed by address.
    pub contact: BTreeMap<String, ContactFields>,
}

impl Settings {
    /// Split the `report` list into trimmed, non-empty addresses.
    #[must_use]
    pub fn report_addresses(&self) -> Option<Vec<String>> {
        self.report.as_deref().map(split_addresses)
    }
}

/// Split a comma-separated address list.
#[must_use]
pub fn split_addresses(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Logging and journal settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `bodewell=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Optional JSONL event journal.
    pub journal: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            journal: None,
        }
    }
}

/// Settings for the `mail` dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Register the `mail` route.
    pub enabled: bool,
    /// Sendmail-compatible program.
    pub program: PathBuf,
    /// Arguments passed to `program`.
    pub args: Vec<String>,
    /// `From:` header; defaults to `bodewell@<host>`.
    pub from: Option<String>,
    /// Seconds the transport may run before it is killed.
    pub timeout: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: PathBuf::from("/usr/sbin/sendmail"),
            args: vec!["-t".to_string(), "-i".to_string()],
            from: None,
            timeout: 30,
        }
    }
}

/// Full daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extra TOML files merged over this one (monitor and contact tables).
    pub include: Vec<PathBuf>,
    /// `[logging]` table.
    pub logging: LoggingConfig,
    /// `[mail]` table.
    pub mail: MailConfig,
    /// Report, monitor and contact settings.
    #[serde(flatten)]
    pub settings: Settings,
}

impl Config {
    /// Resolve and load the config.
    ///
    /// Precedence: `explicit`, then `$BODEWELL_CONFIG`, then
    /// [`DEFAULT_CONFIG_PATH`]. Only a missing default path is tolerated.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let (path, required) = match (explicit, env_path) {
            (Some(path), _) => (path.to_path_buf(), true),
            (None, Some(path)) => (path, true),
            (None, None) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let mut config = if path.exists() {
            Self::load_file(&path)?
        } else if required {
            return Err(BodewellError::MissingConfig { path });
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load one file and merge its includes.
    pub fn load_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| BodewellError::io(path, err))?;
        let mut config = Self::from_toml_str(&text)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for include in config.include.clone() {
            let include = if include.is_relative() {
                base.join(include)
            } else {
                include
            };
            let text =
                fs::read_to_string(&include).map_err(|err| BodewellError::io(&include, err))?;
            config.merge(Self::from_toml_str(&text)?);
        }
        Ok(config)
    }

    /// Parse config text without resolving includes.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Merge an included file. Monitor and contact entries from `other` win;
    /// `report` is replaced when `other` sets it.
    fn merge(&mut self, other: Self) {
        if let Some(monitors) = other.settings.monitor {
            self.settings
                .monitor
                .get_or_insert_with(BTreeMap::new)
                .extend(monitors);
        }
        self.settings.contact.extend(other.settings.contact);
        if other.settings.report.is_some() {
            self.settings.report = other.settings.report;
        }
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(report) = lookup(REPORT_ENV) {
            self.settings.report = Some(report);
        }
    }
}
