//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use log_retention_helper::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{LrhError, Result};

// Policy
pub use crate::policy::retention::{
    DiskSpaceSample, Recommendation, RetentionMode, RetentionParameters, classify,
    parameters_for, recommend,
};

// Platform + probe
pub use crate::monitor::probe::DiskProbe;
pub use crate::platform::pal::{FsStats, MountPoint, Platform, detect_platform};

// Apply
pub use crate::apply::service::{ServiceController, SystemdController};
pub use crate::apply::{ApplyOptions, ApplyReport, ApplyStatus, Configurator, Subsystem};

// Logging
pub use crate::logger::jsonl::{JsonlConfig, JsonlWriter, LogEntry};
