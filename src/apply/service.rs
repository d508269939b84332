//! Service restarts after a config rewrite, driven through `systemctl`.

use std::path::PathBuf;
use std::process::{Command, Output};

use parking_lot::Mutex;

use crate::core::errors::{LrhError, Result};

/// Restart/status surface for the services owning each log subsystem.
pub trait ServiceController: Send + Sync {
    fn restart(&self, unit: &str) -> Result<()>;
    fn is_active(&self, unit: &str) -> Result<String>;
}

/// [`ServiceController`] backed by `systemctl`.
#[derive(Debug, Clone)]
pub struct SystemdController {
    program: PathBuf,
}

impl Default for SystemdController {
    fn default() -> Self {
        Self {
            program: PathBuf::from("systemctl"),
        }
    }
}

impl SystemdController {
    fn run(&self, args: &[&str]) -> std::io::Result<Output> {
        Command::new(&self.program).args(args).output()
    }
}

impl ServiceController for SystemdController {
    fn restart(&self, unit: &str) -> Result<()> {
        let output = self
            .run(&["restart", unit])
            .map_err(|err| LrhError::ServiceRestart {
                unit: unit.to_string(),
                details: format!("cannot run {}: {err}", self.program.display()),
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(LrhError::ServiceRestart {
            unit: unit.to_string(),
            details: format!(
                "{} restart {unit} failed (exit {}): {}",
                self.program.display(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        })
    }

    fn is_active(&self, unit: &str) -> Result<String> {
        // is-active exits non-zero for inactive units; only stdout matters.
        let output = self
            .run(&["is-active", unit])
            .map_err(|source| LrhError::io(&self.program, source))?;
        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if state.is_empty() {
            return Ok("unknown".to_string());
        }
        Ok(state)
    }
}

/// Records restart requests instead of running them.
///
/// Units listed in `failing` report a restart error.
#[derive(Debug, Default)]
pub struct NoopController {
    restarted: Mutex<Vec<String>>,
    failing: Vec<String>,
}

impl NoopController {
    #[must_use]
    pub fn failing(units: &[&str]) -> Self {
        Self {
            restarted: Mutex::new(Vec::new()),
            failing: units.iter().map(|u| (*u).to_string()).collect(),
        }
    }

    /// Units restarted so far, in call order.
    #[must_use]
    pub fn restarted(&self) -> Vec<String> {
        self.restarted.lock().clone()
    }
}

impl ServiceController for NoopController {
    fn restart(&self, unit: &str) -> Result<()> {
        if self.failing.iter().any(|u| u == unit) {
            return Err(LrhError::ServiceRestart {
                unit: unit.to_string(),
                details: "simulated failure".to_string(),
            });
        }
        self.restarted.lock().push(unit.to_string());
        Ok(())
    }

    fn is_active(&self, unit: &str) -> Result<String> {
        if self.restarted.lock().iter().any(|u| u == unit) {
            Ok("active".to_string())
        } else {
            Ok("unknown".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_systemctl_reports_restart_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = SystemdController {
            program: dir.path().join("no-such-systemctl"),
        };
        let err = ctl.restart("docker").unwrap_err();
        assert_eq!(err.code(), "LRH-2202");
        assert!(err.to_string().contains("docker"));
    }

    #[test]
    fn missing_systemctl_is_an_io_error_for_status() {
        let dir = tempfile::tempdir().unwrap();
        let ctl = SystemdController {
            program: dir.path().join("no-such-systemctl"),
        };
        assert_eq!(ctl.is_active("docker").unwrap_err().code(), "LRH-3002");
    }

    #[test]
    fn noop_controller_records_and_fails_on_request() {
        let ctl = NoopController::failing(&["docker"]);
        ctl.restart("systemd-journald").unwrap();
        let err = ctl.restart("docker").unwrap_err();
        assert_eq!(err.code(), "LRH-2202");
        assert_eq!(ctl.restarted(), vec!["systemd-journald".to_string()]);
        assert_eq!(ctl.is_active("systemd-journald").unwrap(), "active");
        assert_eq!(ctl.is_active("docker").unwrap(), "unknown");
    }
}
