//! JSONL activity log: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! concurrent `tail -f` never sees a partial record.
//!
//! Fallback chain:
//! 1. Primary file path
//! 2. Fallback path (e.g. `/dev/shm/lrh.jsonl`)
//! 3. stderr with `[LRH-JSONL]` prefix
//! 4. Silent discard (a command must never fail because logging did)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::apply::{ApplyStatus, SubsystemOutcome};
use crate::core::errors::{LrhError, Result};
use crate::policy::retention::Recommendation;

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Things lrh does that are worth an audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Recommendation,
    ConfigWrite,
    ConfigUnchanged,
    Rollback,
    ServiceRestart,
    Error,
}

/// A single JSONL log entry; only `ts`, `event` and `severity` are always set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Retention mode in effect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_gb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_gb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_percent: Option<u8>,
    /// `container` or `journal`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
    /// Config file touched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            mode: None,
            available_gb: None,
            total_gb: None,
            used_percent: None,
            subsystem: None,
            path: None,
            backup_path: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    /// Entry recording which mode a sample mapped to.
    ///
    /// Disk figures are left out when no sample was taken.
    pub fn recommendation(rec: &Recommendation) -> Self {
        let mut entry = Self::new(EventType::Recommendation, Severity::Info);
        entry.mode = Some(rec.mode.to_string());
        if let Some(sample) = rec.sample {
            entry.available_gb = Some(sample.available_gb);
            entry.total_gb = Some(sample.total_gb);
            entry.used_percent = Some(sample.used_percent);
        }
        entry
    }

    /// Entries for one subsystem of an apply run.
    ///
    /// A write that failed and was restored from its backup also yields a
    /// `rollback` entry; a restart attempt yields a `service_restart` entry. Skipped and
    /// dry-run outcomes produce nothing.
    pub fn from_outcome(outcome: &SubsystemOutcome, mode: &str) -> Vec<Self> {
        let base = |event: EventType, severity: Severity| {
            let mut entry = Self::new(event, severity);
            entry.mode = Some(mode.to_string());
            entry.subsystem = Some(outcome.subsystem.to_string());
            entry.path = Some(outcome.config_path.display().to_string());
            entry.backup_path = outcome
                .backup_path
                .as_ref()
                .map(|p| p.display().to_string());
            entry
        };

        let mut entries = Vec::new();
        match outcome.status {
            ApplyStatus::Skipped | ApplyStatus::DryRun => {}
            ApplyStatus::Unchanged => {
                let mut entry = base(EventType::ConfigUnchanged, Severity::Info);
                entry.ok = Some(true);
                entries.push(entry);
            }
            ApplyStatus::Updated | ApplyStatus::RestartFailed => {
                let mut write = base(EventType::ConfigWrite, Severity::Info);
                write.ok = Some(true);
                entries.push(write);

                if outcome.restarted || outcome.status == ApplyStatus::RestartFailed {
                    let failed = outcome.status == ApplyStatus::RestartFailed;
                    let severity = if failed {
                        Severity::Warning
                    } else {
                        Severity::Info
                    };
                    let mut restart = base(EventType::ServiceRestart, severity);
                    restart.ok = Some(!failed);
                    if failed {
                        restart.error_code = outcome.error_code.map(str::to_string);
                        restart.error_message = Some(outcome.message.clone());
                    }
                    entries.push(restart);
                }
            }
            ApplyStatus::Failed => {
                let mut write = base(EventType::ConfigWrite, Severity::Critical);
                write.ok = Some(false);
                write.error_code = outcome.error_code.map(str::to_string);
                write.error_message = Some(outcome.message.clone());
                entries.push(write);

                if let Some(restored) = outcome.rolled_back {
                    let severity = if restored {
                        Severity::Warning
                    } else {
                        Severity::Critical
                    };
                    let mut rollback = base(EventType::Rollback, severity);
                    rollback.ok = Some(restored);
                    entries.push(rollback);
                }
            }
        }
        entries
    }

    /// Entry for a command that aborted with an error.
    pub fn error(err: &LrhError) -> Self {
        let mut entry = Self::new(EventType::Error, Severity::Critical);
        entry.ok = Some(false);
        entry.error_code = Some(err.code().to_string());
        entry.error_message = Some(err.to_string());
        entry
    }
}

/// Degradation state of the JSONL writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Fallback,
    Stderr,
    Discard,
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Optional fallback path (e.g. on a different filesystem).
    pub fallback_path: Option<PathBuf>,
    /// Maximum file size before rotation (bytes). Default: 10 MiB.
    pub max_size_bytes: u64,
    /// Number of rotated files to keep. Default: 3.
    pub max_rotated_files: u32,
}

impl JsonlConfig {
    /// Defaults with a specific primary path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/log/lrh/activity.jsonl"),
            fallback_path: Some(PathBuf::from("/dev/shm/lrh.jsonl")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

/// Append-only JSONL log writer with rotation and multi-level fallback.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open the JSONL log file. Falls through the degradation chain on failure.
    pub fn open(config: JsonlConfig) -> Self {
        let mut w = Self {
            config,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
        };
        w.try_open_primary();
        w
    }

    /// Write a single log entry as one JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[LRH-JSONL] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    /// Write several entries, then flush.
    pub fn write_all(&mut self, entries: &[LogEntry]) {
        for entry in entries {
            self.write_entry(entry);
        }
        self.flush();
    }

    /// Flush buffered lines and sync them to disk.
    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
        }
    }

    /// Current degradation state.
    pub fn state(&self) -> &str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Fallback => "fallback",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    /// Bytes in the current file, including what was there at open.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn write_line(&mut self, line: &str) {
        if self.bytes_written + line.len() as u64 > self.config.max_size_bytes
            && matches!(self.state, WriterState::Normal | WriterState::Fallback)
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal | WriterState::Fallback => {
                if let Some(w) = self.writer.as_mut() {
                    if w.write_all(line.as_bytes()).is_err() {
                        self.degrade();
                        self.write_line(line);
                        return;
                    }
                    self.bytes_written += line.len() as u64;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[LRH-JSONL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn try_open_primary(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => {
                self.writer = Some(BufWriter::new(file));
                self.state = WriterState::Normal;
                self.bytes_written = size;
            }
            Err(_) => self.try_open_fallback(),
        }
    }

    fn try_open_fallback(&mut self) {
        let Some(fb) = &self.config.fallback_path else {
            self.state = WriterState::Stderr;
            let _ = writeln!(
                io::stderr(),
                "[LRH-JSONL] primary path failed and no fallback configured, using stderr"
            );
            return;
        };
        match open_append(fb) {
            Ok((file, size)) => {
                let _ = writeln!(
                    io::stderr(),
                    "[LRH-JSONL] primary path failed, using fallback: {}",
                    fb.display()
                );
                self.writer = Some(BufWriter::new(file));
                self.state = WriterState::Fallback;
                self.bytes_written = size;
            }
            Err(_) => {
                self.state = WriterState::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[LRH-JSONL] both primary and fallback paths failed, using stderr"
                );
            }
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        match self.state {
            WriterState::Normal => self.try_open_fallback(),
            WriterState::Fallback => {
                self.state = WriterState::Stderr;
                let _ = writeln!(io::stderr(), "[LRH-JSONL] fallback write failed, using stderr");
            }
            WriterState::Stderr => self.state = WriterState::Discard,
            WriterState::Discard => {}
        }
    }

    fn rotate(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
        self.writer = None;

        let base = match (self.state, &self.config.fallback_path) {
            (WriterState::Normal, _) => self.config.path.clone(),
            (WriterState::Fallback, Some(p)) => p.clone(),
            _ => return,
        };

        // .N-1 -> .N, ..., .1 -> .2, then current -> .1
        for i in (1..self.config.max_rotated_files).rev() {
            let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        let _ = fs::remove_file(rotated_name(&base, self.config.max_rotated_files));
        let _ = rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                self.writer = Some(BufWriter::new(file));
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| LrhError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LrhError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `activity.jsonl` -> `activity.jsonl.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
