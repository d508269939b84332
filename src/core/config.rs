//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{LrhError, Result};

/// Full LRH configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub probe: ProbeConfig,
    pub container: ContainerConfig,
    pub journal: JournalConfig,
    pub apply: ApplyConfig,
    pub paths: PathsConfig,
}

/// Which filesystem the free-space sample is taken from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProbeConfig {
    pub path: PathBuf,
}

/// Container-log subsystem (Docker json-file driver).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContainerConfig {
    pub enabled: bool,
    pub daemon_config: PathBuf,
    pub service: String,
    pub restart: bool,
}

/// System-journal subsystem (systemd-journald).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    pub config_file: PathBuf,
    pub service: String,
    pub restart: bool,
}

/// Behavior of `apply`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApplyConfig {
    /// Copy each config file aside before rewriting it.
    pub backup: bool,
    /// Where backups go; `None` keeps them next to the original.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
}

/// Filesystem paths used by lrh itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/"),
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daemon_config: PathBuf::from("/etc/docker/daemon.json"),
            service: "docker".to_string(),
            restart: true,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            config_file: PathBuf::from("/etc/systemd/journald.conf"),
            service: "systemd-journald".to_string(),
            restart: true,
        }
    }
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            backup: true,
            backup_dir: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[LRH-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("lrh").join("config.toml"),
            activity_log: home_dir
                .join(".local")
                .join("share")
                .join("lrh")
                .join("activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| LrhError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(LrhError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config (FNV-1a over canonical JSON).
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("LRH_PROBE_PATH") {
            self.probe.path = PathBuf::from(raw);
        }

        if let Some(raw) = lookup("LRH_CONTAINER_ENABLED") {
            self.container.enabled = parse_env_bool("LRH_CONTAINER_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("LRH_CONTAINER_DAEMON_CONFIG") {
            self.container.daemon_config = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("LRH_CONTAINER_SERVICE") {
            self.container.service = raw;
        }
        if let Some(raw) = lookup("LRH_CONTAINER_RESTART") {
            self.container.restart = parse_env_bool("LRH_CONTAINER_RESTART", &raw)?;
        }

        if let Some(raw) = lookup("LRH_JOURNAL_ENABLED") {
            self.journal.enabled = parse_env_bool("LRH_JOURNAL_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("LRH_JOURNAL_CONFIG_FILE") {
            self.journal.config_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("LRH_JOURNAL_SERVICE") {
            self.journal.service = raw;
        }
        if let Some(raw) = lookup("LRH_JOURNAL_RESTART") {
            self.journal.restart = parse_env_bool("LRH_JOURNAL_RESTART", &raw)?;
        }

        if let Some(raw) = lookup("LRH_APPLY_BACKUP") {
            self.apply.backup = parse_env_bool("LRH_APPLY_BACKUP", &raw)?;
        }
        if let Some(raw) = lookup("LRH_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Trim service names and treat an empty backup dir as unset.
    fn normalize(&mut self) {
        self.container.service = self.container.service.trim().to_string();
        self.journal.service = self.journal.service.trim().to_string();
        if self
            .apply
            .backup_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            self.apply.backup_dir = None;
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.probe.path.is_absolute() {
            return Err(LrhError::InvalidConfig {
                details: format!(
                    "probe.path must be absolute, got {}",
                    self.probe.path.display()
                ),
            });
        }

        for (name, path) in [
            ("container.daemon_config", &self.container.daemon_config),
            ("journal.config_file", &self.journal.config_file),
        ] {
            if !path.is_absolute() {
                return Err(LrhError::InvalidConfig {
                    details: format!("{name} must be absolute, got {}", path.display()),
                });
            }
            if path.file_name().is_none() {
                return Err(LrhError::InvalidConfig {
                    details: format!("{name} must name a file, got {}", path.display()),
                });
            }
        }

        if self.container.restart && self.container.service.is_empty() {
            return Err(LrhError::InvalidConfig {
                details: "container.service must be set when container.restart=true".to_string(),
            });
        }
        if self.journal.restart && self.journal.service.is_empty() {
            return Err(LrhError::InvalidConfig {
                details: "journal.service must be set when journal.restart=true".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<bool>()
        .map_err(|error| LrhError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
