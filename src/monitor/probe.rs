//! Disk-space prober: turns raw filesystem statistics into a [`DiskSpaceSample`].

#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;

use crate::core::errors::{LrhError, Result};
use crate::platform::pal::{FsStats, Platform};
use crate::policy::retention::DiskSpaceSample;

const GIB: u64 = 1024 * 1024 * 1024;

/// Samples free space through a [`Platform`].
pub struct DiskProbe {
    platform: Arc<dyn Platform>,
}

impl DiskProbe {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Sample the filesystem holding `path`.
    ///
    /// Errors propagate as [`LrhError::Probe`]; no fallback sample is made up.
    pub fn sample(&self, path: &Path) -> Result<DiskSpaceSample> {
        let stats = self.platform.fs_stats(path).map_err(|err| match err {
            probe @ LrhError::Probe { .. } => probe,
            other => LrhError::Probe {
                path: path.to_path_buf(),
                details: other.to_string(),
            },
        })?;
        Ok(sample_from_stats(&stats))
    }
}

/// Whole-GiB figures, floored, with `df`-style used percentage.
#[must_use]
pub fn sample_from_stats(stats: &FsStats) -> DiskSpaceSample {
    DiskSpaceSample {
        available_gb: stats.available_bytes / GIB,
        total_gb: stats.total_bytes / GIB,
        used_percent: used_percent(stats),
    }
}

/// `used / (used + available)` rounded up, the way `df` computes `Use%`.
///
/// Reserved root blocks are excluded from the denominator, so a full disk
/// reads 100 even while root can still write.
fn used_percent(stats: &FsStats) -> u8 {
    let used = stats.total_bytes.saturating_sub(stats.free_bytes);
    let denom = u128::from(used) + u128::from(stats.available_bytes);
    if denom == 0 {
        return 0;
    }
    let pct = (u128::from(used) * 100).div_ceil(denom);
    u8::try_from(pct.min(100)).unwrap_or(100)
}
