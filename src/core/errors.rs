//! BW-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, BodewellError>;

/// Top-level error type for bodewell.
#[derive(Debug, Error)]
pub enum BodewellError {
    #[error("[BW-1001] monitor '{name}' is missing a type")]
    MissingMonitorType { name: String },

    #[error("[BW-1002] monitor '{name}' has unrecognized type '{kind}'")]
    UnknownMonitorType { name: String, kind: String },

    #[error("[BW-1003] {kind} monitor requires a threshold")]
    MissingThreshold { kind: &'static str },

    #[error("[BW-1004] invalid threshold '{value}': {details}")]
    InvalidThreshold { value: String, details: String },

    #[error("[BW-1005] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[BW-1006] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[BW-1007] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[BW-1101] cannot redefine monitor type '{kind}'")]
    MonitorTypeConflict { kind: String },

    #[error("[BW-1102] dispatcher '{id}' is already bound to a different implementation")]
    DispatcherConflict { id: String },

    #[error("[BW-1103] entity '{id}' has been purged and is frozen")]
    Frozen { id: String },

    #[error("[BW-2001] {probe} sample failed: {details}")]
    Sample {
        probe: &'static str,
        details: String,
    },

    #[error("[BW-2101] no dispatcher for contact {contact} (route {route:?})")]
    NoRoute {
        contact: String,
        route: Option<String>,
    },

    #[error("[BW-2102] dispatcher '{dispatcher}' failed for {contact}: {details}")]
    Delivery {
        dispatcher: String,
        contact: String,
        details: String,
    },

    #[error("[BW-2201] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[BW-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[BW-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[BW-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl BodewellError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingMonitorType { .. } => "BW-1001",
            Self::UnknownMonitorType { .. } => "BW-1002",
            Self::MissingThreshold { .. } => "BW-1003",
            Self::InvalidThreshold { .. } => "BW-1004",
            Self::InvalidConfig { .. } => "BW-1005",
            Self::MissingConfig { .. } => "BW-1006",
            Self::ConfigParse { .. } => "BW-1007",
            Self::MonitorTypeConflict { .. } => "BW-1101",
            Self::DispatcherConflict { .. } => "BW-1102",
            Self::Frozen { .. } => "BW-1103",
            Self::Sample { .. } => "BW-2001",
            Self::NoRoute { .. } => "BW-2101",
            Self::Delivery { .. } => "BW-2102",
            Self::Serialization { .. } => "BW-2201",
            Self::Io { .. } => "BW-3002",
            Self::ChannelClosed { .. } => "BW-3003",
            Self::Runtime { .. } => "BW-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Sample { .. }
                | Self::Delivery { .. }
                | Self::ChannelClosed { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether this is a configuration error that should be reported to
    /// whoever issued the reconfiguration.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::MissingMonitorType { .. }
                | Self::UnknownMonitorType { .. }
                | Self::MissingThreshold { .. }
                | Self::InvalidThreshold { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for BodewellError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for BodewellError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BodewellError;

    #[test]
    fn codes_match_message_prefix() {
        let err = BodewellError::UnknownMonitorType {
            name: "root".to_string(),
            kind: "cpu".to_string(),
        };
        assert_eq!(err.code(), "BW-1002");
        assert!(err.to_string().starts_with("[BW-1002]"));
        assert!(err.is_config());
        assert!(!err.is_retryable());
    }

    #[test]
    fn sample_errors_are_retryable() {
        let err = BodewellError::Sample {
            probe: "disk",
            details: "statvfs failed".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_config());
    }

    #[test]
    fn toml_errors_map_to_config_parse() {
        let parse: std::result::Result<toml::Table, _> = toml::from_str("report = [");
        let err = BodewellError::from(parse.expect_err("invalid toml"));
        assert_eq!(err.code(), "BW-1007");
    }
}
