#![forbid(unsafe_code)]

//! Log Retention Helper (lrh): picks container-log and journal rotation
//! limits from the free space on the host's root filesystem.
//!
//! The pipeline has three stages:
//! 1. **Probe**: read filesystem statistics and reduce them to a
//!    [`policy::retention::DiskSpaceSample`]
//! 2. **Classify**: map available GiB to a [`policy::retention::RetentionMode`]
//!    and its fixed [`policy::retention::RetentionParameters`]
//! 3. **Apply**: merge the limits into Docker's `daemon.json` and
//!    `journald.conf`, then restart the owning services
//!
//! Only stage 2 is pure; it is usable on its own:
//!
//! ```rust
//! use log_retention_helper::prelude::*;
//!
//! let (mode, params) = recommend(&DiskSpaceSample::with_available(7));
//! assert_eq!(mode, RetentionMode::Normal);
//! assert_eq!(params.container_log_max_size, "10m");
//! ```

pub mod prelude;

pub mod apply;
pub mod core;
pub mod logger;
pub mod monitor;
pub mod platform;
pub mod policy;
