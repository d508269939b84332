//! LRH-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, LrhError>;

/// Top-level error type for the log retention helper.
///
/// The retention calculator itself is total and never produces one of these;
/// every variant belongs to the prober, the configurator, or the plumbing
/// around them.
#[derive(Debug, Error)]
pub enum LrhError {
    #[error("[LRH-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[LRH-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[LRH-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[LRH-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[LRH-2001] disk probe failure for {path}: {details}")]
    Probe { path: PathBuf, details: String },

    #[error("[LRH-2002] mount table parse failure: {details}")]
    MountParse { details: String },

    #[error("[LRH-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[LRH-2201] failed to write {subsystem} config {path}: {details}")]
    ConfigWrite {
        subsystem: &'static str,
        path: PathBuf,
        details: String,
    },

    #[error("[LRH-2202] failed to restart {unit}: {details}")]
    ServiceRestart { unit: String, details: String },

    #[error("[LRH-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LrhError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "LRH-1001",
            Self::MissingConfig { .. } => "LRH-1002",
            Self::ConfigParse { .. } => "LRH-1003",
            Self::UnsupportedPlatform { .. } => "LRH-1101",
            Self::Probe { .. } => "LRH-2001",
            Self::MountParse { .. } => "LRH-2002",
            Self::Serialization { .. } => "LRH-2101",
            Self::ConfigWrite { .. } => "LRH-2201",
            Self::ServiceRestart { .. } => "LRH-2202",
            Self::Io { .. } => "LRH-3002",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for configurator write failures.
    #[must_use]
    pub fn config_write(
        subsystem: &'static str,
        path: impl AsRef<Path>,
        details: impl Into<String>,
    ) -> Self {
        Self::ConfigWrite {
            subsystem,
            path: path.as_ref().to_path_buf(),
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for LrhError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for LrhError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_variant() -> Vec<LrhError> {
        vec![
            LrhError::InvalidConfig {
                details: String::new(),
            },
            LrhError::MissingConfig {
                path: PathBuf::new(),
            },
            LrhError::ConfigParse {
                context: "",
                details: String::new(),
            },
            LrhError::UnsupportedPlatform {
                details: String::new(),
            },
            LrhError::Probe {
                path: PathBuf::new(),
                details: String::new(),
            },
            LrhError::MountParse {
                details: String::new(),
            },
            LrhError::Serialization {
                context: "",
                details: String::new(),
            },
            LrhError::config_write("docker", "/etc/docker/daemon.json", "denied"),
            LrhError::ServiceRestart {
                unit: "docker".to_string(),
                details: String::new(),
            },
            LrhError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = every_variant();
        let codes: Vec<&str> = errors.iter().map(LrhError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_lrh_prefix_and_appear_in_display() {
        for err in every_variant() {
            assert!(err.code().starts_with("LRH-"), "bad code {}", err.code());
            assert!(
                err.to_string().contains(err.code()),
                "display should contain code: {err}"
            );
        }
    }

    #[test]
    fn config_write_names_subsystem_and_path() {
        let err = LrhError::config_write("docker", "/etc/docker/daemon.json", "root is not an object");
        let msg = err.to_string();
        assert_eq!(err.code(), "LRH-2201");
        assert!(msg.contains("docker"));
        assert!(msg.contains("/etc/docker/daemon.json"));
        assert!(msg.contains("root is not an object"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: LrhError = json_err.into();
        assert_eq!(err.code(), "LRH-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: LrhError = toml_err.into();
        assert_eq!(err.code(), "LRH-1003");
    }
}
