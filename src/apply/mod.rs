//! Subsystem configurator: writes retention limits into the container-log and
//! system-journal configs, then restarts the owning services.
//!
//! Every mutation is backup-first and atomic. A failed write restores the
//! backup; a failed restart leaves the new config in place and is reported,
//! never fed back into the policy.

#![allow(missing_docs)]

pub mod backup;
pub mod docker;
pub mod journald;
pub mod service;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{LrhError, Result};
use crate::policy::retention::RetentionParameters;

use self::docker::ContainerLogSettings;
use self::journald::JournalSettings;
use self::service::ServiceController;

/// New file contents and whether they differ from what is on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub contents: String,
    pub changed: bool,
}

/// The two log subsystems under management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    /// Docker json-file container logs.
    Container,
    /// systemd-journald.
    Journal,
}

impl Subsystem {
    pub const ALL: [Self; 2] = [Self::Container, Self::Journal];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Journal => "journal",
        }
    }

    fn render(
        self,
        current: Option<&str>,
        params: &RetentionParameters,
    ) -> std::result::Result<Rendered, String> {
        match self {
            Self::Container => docker::render(current, params),
            Self::Journal => journald::render(current, params),
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one subsystem in an apply run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyStatus {
    /// Config rewritten (and restarted if requested).
    Updated,
    /// Config already carried the limits; nothing touched.
    Unchanged,
    /// Disabled in config or not installed.
    Skipped,
    /// Dry run: would have rewritten the config.
    DryRun,
    /// Config written but the service restart failed.
    RestartFailed,
    /// Config could not be read or written; original left in place.
    Failed,
}

impl ApplyStatus {
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::RestartFailed | Self::Failed)
    }
}

impl fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
            Self::DryRun => "dry-run",
            Self::RestartFailed => "restart-failed",
            Self::Failed => "failed",
        })
    }
}

/// Per-subsystem result, structured for CLI output and the activity log.
#[derive(Debug, Clone, Serialize)]
pub struct SubsystemOutcome {
    pub subsystem: Subsystem,
    pub status: ApplyStatus,
    pub config_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    pub restarted: bool,
    /// Whether a failed write was restored from its backup; `None` when no
    /// restore was attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    pub message: String,
    /// Rendered file for dry runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl SubsystemOutcome {
    fn new(subsystem: Subsystem, status: ApplyStatus, path: &Path, message: String) -> Self {
        Self {
            subsystem,
            status,
            config_path: path.to_path_buf(),
            backup_path: None,
            restarted: false,
            rolled_back: None,
            error_code: None,
            message,
            preview: None,
        }
    }

    fn failed(subsystem: Subsystem, path: &Path, err: &LrhError) -> Self {
        let mut outcome = Self::new(subsystem, ApplyStatus::Failed, path, err.to_string());
        outcome.error_code = Some(err.code());
        outcome
    }
}

/// Results for every subsystem from one apply run.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub outcomes: Vec<SubsystemOutcome>,
}

impl ApplyReport {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_failure()).count()
    }

    #[must_use]
    pub fn updated_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ApplyStatus::Updated | ApplyStatus::RestartFailed))
            .count()
    }

    #[must_use]
    pub fn outcome(&self, subsystem: Subsystem) -> Option<&SubsystemOutcome> {
        self.outcomes.iter().find(|o| o.subsystem == subsystem)
    }
}

/// Knobs for a single apply run, layered over [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    pub dry_run: bool,
    pub restart: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            restart: true,
        }
    }
}

/// Values currently on disk; `None` where the config file does not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurrentSettings {
    pub container: Option<ContainerLogSettings>,
    pub journal: Option<JournalSettings>,
}

struct Target<'a> {
    subsystem: Subsystem,
    enabled: bool,
    path: &'a Path,
    service: &'a str,
    restart: bool,
}

/// Drives both subsystem writers from one [`Config`].
pub struct Configurator<'a> {
    config: &'a Config,
    services: &'a dyn ServiceController,
}

impl<'a> Configurator<'a> {
    #[must_use]
    pub fn new(config: &'a Config, services: &'a dyn ServiceController) -> Self {
        Self { config, services }
    }

    fn target(&self, subsystem: Subsystem) -> Target<'a> {
        let config = self.config;
        match subsystem {
            Subsystem::Container => Target {
                subsystem,
                enabled: config.container.enabled,
                path: &config.container.daemon_config,
                service: &config.container.service,
                restart: config.container.restart,
            },
            Subsystem::Journal => Target {
                subsystem,
                enabled: config.journal.enabled,
                path: &config.journal.config_file,
                service: &config.journal.service,
                restart: config.journal.restart,
            },
        }
    }

    /// Write `params` into every enabled subsystem.
    pub fn apply(&self, params: &RetentionParameters, opts: ApplyOptions) -> ApplyReport {
        let outcomes = Subsystem::ALL
            .into_iter()
            .map(|subsystem| self.apply_one(&self.target(subsystem), params, opts))
            .collect();
        ApplyReport { outcomes }
    }

    fn apply_one(
        &self,
        target: &Target<'_>,
        params: &RetentionParameters,
        opts: ApplyOptions,
    ) -> SubsystemOutcome {
        let subsystem = target.subsystem;
        let path = target.path;

        if !target.enabled {
            return SubsystemOutcome::new(
                subsystem,
                ApplyStatus::Skipped,
                path,
                "disabled in config".to_string(),
            );
        }
        if !path.parent().is_some_and(Path::is_dir) {
            return SubsystemOutcome::new(
                subsystem,
                ApplyStatus::Skipped,
                path,
                format!("{} not found; subsystem not installed", parent_display(path)),
            );
        }

        let current = match backup::read_or_empty(path) {
            Ok(current) => current,
            Err(err) => return SubsystemOutcome::failed(subsystem, path, &err),
        };
        let rendered = match subsystem.render(current.as_deref(), params) {
            Ok(rendered) => rendered,
            Err(details) => {
                let err = LrhError::config_write(subsystem.as_str(), path, details);
                return SubsystemOutcome::failed(subsystem, path, &err);
            }
        };

        if !rendered.changed {
            return SubsystemOutcome::new(
                subsystem,
                ApplyStatus::Unchanged,
                path,
                "already up to date".to_string(),
            );
        }

        if opts.dry_run {
            let mut outcome = SubsystemOutcome::new(
                subsystem,
                ApplyStatus::DryRun,
                path,
                format!("would update {}", path.display()),
            );
            outcome.preview = Some(rendered.contents);
            return outcome;
        }

        let backup_path = if self.config.apply.backup && current.is_some() {
            match backup::create_timestamped_backup(path, self.config.apply.backup_dir.as_deref())
            {
                Ok(p) => Some(p),
                Err(err) => {
                    let err = LrhError::config_write(
                        subsystem.as_str(),
                        path,
                        format!("backup failed: {err}"),
                    );
                    return SubsystemOutcome::failed(subsystem, path, &err);
                }
            }
        } else {
            None
        };

        if let Err(err) = backup::write_atomic(path, &rendered.contents) {
            let restored = backup_path
                .as_deref()
                .map(|backup| backup::restore_backup(backup, path));
            let note = match &restored {
                Some(Ok(())) => " (rolled back)".to_string(),
                Some(Err(restore_err)) => format!(" (rollback failed: {restore_err})"),
                None => String::new(),
            };
            let err = LrhError::config_write(subsystem.as_str(), path, format!("{err}{note}"));
            let mut outcome = SubsystemOutcome::failed(subsystem, path, &err);
            outcome.backup_path = backup_path;
            outcome.rolled_back = restored.map(|r| r.is_ok());
            return outcome;
        }

        let mut outcome = SubsystemOutcome::new(
            subsystem,
            ApplyStatus::Updated,
            path,
            format!("wrote {}", path.display()),
        );
        outcome.backup_path = backup_path;

        if opts.restart && target.restart {
            match self.services.restart(target.service) {
                Ok(()) => {
                    outcome.restarted = true;
                    outcome.message.push_str(&format!("; restarted {}", target.service));
                }
                Err(err) => {
                    outcome.status = ApplyStatus::RestartFailed;
                    outcome.error_code = Some(err.code());
                    outcome.message.push_str(&format!("; {err}"));
                }
            }
        }
        outcome
    }

    /// Read the limits currently configured for both subsystems.
    pub fn inspect(&self) -> Result<CurrentSettings> {
        let container = backup::read_or_empty(&self.config.container.daemon_config)?
            .map(|raw| docker::read_settings(&raw));
        let journal = backup::read_or_empty(&self.config.journal.config_file)?
            .map(|raw| journald::read_settings(&raw));
        Ok(CurrentSettings { container, journal })
    }

    /// `systemctl is-active` for a subsystem's service.
    pub fn service_state(&self, subsystem: Subsystem) -> Result<String> {
        self.services.is_active(self.target(subsystem).service)
    }
}

fn parent_display(path: &Path) -> String {
    path.parent()
        .map_or_else(|| path.display().to_string(), |p| p.display().to_string())
}
