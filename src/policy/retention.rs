//! Disk-space-tiered log retention policy.
//!
//! Available space on the root filesystem selects one of four
//! [`RetentionMode`]s, and each mode maps to a fixed set of rotation limits
//! for the container-log subsystem (Docker json-file log-opts) and the
//! system-journal subsystem (journald disk caps).
//!
//! Everything here is pure: no I/O, no state, no failure modes. The probe
//! that produces a [`DiskSpaceSample`] and the configurator that consumes
//! [`RetentionParameters`] live in [`crate::monitor::probe`] and
//! [`crate::apply`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lower bound (inclusive) of [`RetentionMode::Normal`], in GiB.
pub const NORMAL_MIN_GB: u64 = 5;
/// Lower bound (inclusive) of [`RetentionMode::Relaxed`], in GiB.
pub const RELAXED_MIN_GB: u64 = 10;
/// Lower bound (inclusive) of [`RetentionMode::Ample`], in GiB.
pub const AMPLE_MIN_GB: u64 = 30;

/// Point-in-time free-space reading for the probed filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpaceSample {
    /// Space available to unprivileged writers, whole GiB.
    pub available_gb: u64,
    /// Filesystem size, whole GiB.
    pub total_gb: u64,
    /// Used share of the filesystem, 0..=100.
    pub used_percent: u8,
}

impl DiskSpaceSample {
    #[must_use]
    pub const fn new(available_gb: u64, total_gb: u64, used_percent: u8) -> Self {
        Self {
            available_gb,
            total_gb,
            used_percent,
        }
    }

    /// Sample carrying only an available-space figure (manual overrides).
    #[must_use]
    pub const fn with_available(available_gb: u64) -> Self {
        Self::new(available_gb, 0, 0)
    }
}

/// How aggressively logs are rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionMode {
    /// Under 5 GiB free.
    Strict,
    /// 5 to 10 GiB free.
    Normal,
    /// 10 to 30 GiB free.
    Relaxed,
    /// 30 GiB free or more.
    Ample,
}

impl RetentionMode {
    /// Every mode, most aggressive first.
    pub const ALL: [Self; 4] = [Self::Strict, Self::Normal, Self::Relaxed, Self::Ample];

    /// Inclusive lower bound of the free-space interval selecting this mode.
    #[must_use]
    pub const fn lower_bound_gb(self) -> u64 {
        match self {
            Self::Strict => 0,
            Self::Normal => NORMAL_MIN_GB,
            Self::Relaxed => RELAXED_MIN_GB,
            Self::Ample => AMPLE_MIN_GB,
        }
    }

    /// Exclusive upper bound, `None` for the open-ended top tier.
    #[must_use]
    pub const fn upper_bound_gb(self) -> Option<u64> {
        match self {
            Self::Strict => Some(NORMAL_MIN_GB),
            Self::Normal => Some(RELAXED_MIN_GB),
            Self::Relaxed => Some(AMPLE_MIN_GB),
            Self::Ample => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Normal => "normal",
            Self::Relaxed => "relaxed",
            Self::Ample => "ample",
        }
    }

    /// One-line operator-facing summary.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Strict => "disk nearly full; keep logs to a minimum",
            Self::Normal => "limited headroom; conservative rotation",
            Self::Relaxed => "comfortable headroom; moderate retention",
            Self::Ample => "plenty of space; generous retention",
        }
    }
}

impl fmt::Display for RetentionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no retention mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown retention mode {0:?} (expected strict, normal, relaxed or ample)")]
pub struct ParseModeError(String);

impl FromStr for RetentionMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "normal" => Ok(Self::Normal),
            "relaxed" => Ok(Self::Relaxed),
            "ample" => Ok(Self::Ample),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Rotation limits for both log subsystems.
///
/// Size strings are in each subsystem's native notation: Docker takes
/// lowercase suffixes (`5m`), journald uppercase (`100M`, `1G`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RetentionParameters {
    /// Docker `log-opts.max-size`.
    pub container_log_max_size: &'static str,
    /// Docker `log-opts.max-file`.
    pub container_log_max_file: u32,
    /// journald `SystemMaxUse=`.
    pub journal_max_use: &'static str,
    /// journald `SystemKeepFree=`.
    pub journal_keep_free: &'static str,
    /// journald `SystemMaxFileSize=`.
    pub journal_max_file_size: &'static str,
}

/// Classify available space into a mode.
///
/// Intervals are half-open with an inclusive lower bound, so exactly 5, 10
/// and 30 GiB fall into the more relaxed tier.
#[must_use]
pub const fn classify(available_gb: u64) -> RetentionMode {
    if available_gb < NORMAL_MIN_GB {
        RetentionMode::Strict
    } else if available_gb < RELAXED_MIN_GB {
        RetentionMode::Normal
    } else if available_gb < AMPLE_MIN_GB {
        RetentionMode::Relaxed
    } else {
        RetentionMode::Ample
    }
}

/// Fixed lookup from mode to rotation limits.
#[must_use]
pub const fn parameters_for(mode: RetentionMode) -> RetentionParameters {
    match mode {
        RetentionMode::Strict => RetentionParameters {
            container_log_max_size: "5m",
            container_log_max_file: 2,
            journal_max_use: "100M",
            journal_keep_free: "500M",
            journal_max_file_size: "10M",
        },
        RetentionMode::Normal => RetentionParameters {
            container_log_max_size: "10m",
            container_log_max_file: 3,
            journal_max_use: "200M",
            journal_keep_free: "1G",
            journal_max_file_size: "20M",
        },
        RetentionMode::Relaxed => RetentionParameters {
            container_log_max_size: "20m",
            container_log_max_file: 5,
            journal_max_use: "500M",
            journal_keep_free: "2G",
            journal_max_file_size: "50M",
        },
        RetentionMode::Ample => RetentionParameters {
            container_log_max_size: "50m",
            container_log_max_file: 10,
            journal_max_use: "1G",
            journal_keep_free: "3G",
            journal_max_file_size: "100M",
        },
    }
}

/// Mode and limits for a live sample.
#[must_use]
pub const fn recommend(sample: &DiskSpaceSample) -> (RetentionMode, RetentionParameters) {
    let mode = classify(sample.available_gb);
    (mode, parameters_for(mode))
}

/// A single evaluation bundled for reporting.
///
/// `sample` is `None` only for a forced mode whose disk probe failed; no
/// stand-in figures are ever recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub sample: Option<DiskSpaceSample>,
    pub mode: RetentionMode,
    pub parameters: RetentionParameters,
}

impl Recommendation {
    #[must_use]
    pub const fn from_sample(sample: DiskSpaceSample) -> Self {
        let (mode, parameters) = recommend(&sample);
        Self {
            sample: Some(sample),
            mode,
            parameters,
        }
    }

    /// Recommendation for an operator-forced mode; the sample, if one was
    /// taken, is kept for reporting only.
    #[must_use]
    pub const fn forced(sample: Option<DiskSpaceSample>, mode: RetentionMode) -> Self {
        Self {
            sample,
            mode,
            parameters: parameters_for(mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn boundaries_are_lower_inclusive() {
        assert_eq!(classify(0), RetentionMode::Strict);
        assert_eq!(classify(4), RetentionMode::Strict);
        assert_eq!(classify(5), RetentionMode::Normal);
        assert_eq!(classify(9), RetentionMode::Normal);
        assert_eq!(classify(10), RetentionMode::Relaxed);
        assert_eq!(classify(29), RetentionMode::Relaxed);
        assert_eq!(classify(30), RetentionMode::Ample);
        assert_eq!(classify(u64::MAX), RetentionMode::Ample);
    }

    #[test]
    fn table_matches_documented_values() {
        let rows = [
            (RetentionMode::Strict, ("5m", 2, "100M", "500M", "10M")),
            (RetentionMode::Normal, ("10m", 3, "200M", "1G", "20M")),
            (RetentionMode::Relaxed, ("20m", 5, "500M", "2G", "50M")),
            (RetentionMode::Ample, ("50m", 10, "1G", "3G", "100M")),
        ];
        for (mode, (size, files, max_use, keep_free, max_file)) in rows {
            let p = parameters_for(mode);
            assert_eq!(p.container_log_max_size, size, "{mode}");
            assert_eq!(p.container_log_max_file, files, "{mode}");
            assert_eq!(p.journal_max_use, max_use, "{mode}");
            assert_eq!(p.journal_keep_free, keep_free, "{mode}");
            assert_eq!(p.journal_max_file_size, max_file, "{mode}");
        }
    }

    #[test]
    fn parameters_are_distinct_per_mode() {
        let distinct: HashSet<RetentionParameters> =
            RetentionMode::ALL.into_iter().map(parameters_for).collect();
        assert_eq!(distinct.len(), RetentionMode::ALL.len());
    }

    #[test]
    fn end_to_end_scenarios() {
        let cases = [
            (3, RetentionMode::Strict, "5m", 2),
            (7, RetentionMode::Normal, "10m", 3),
            (15, RetentionMode::Relaxed, "20m", 5),
            (100, RetentionMode::Ample, "50m", 10),
            (0, RetentionMode::Strict, "5m", 2),
        ];
        for (gb, expected_mode, size, files) in cases {
            let (mode, params) = recommend(&DiskSpaceSample::new(gb, 200, 50));
            assert_eq!(mode, expected_mode, "available_gb={gb}");
            assert_eq!(params, parameters_for(expected_mode));
            assert_eq!(params.container_log_max_size, size);
            assert_eq!(params.container_log_max_file, files);
        }
    }

    #[test]
    fn recommend_ignores_total_and_used_percent() {
        let a = recommend(&DiskSpaceSample::new(12, 20, 40));
        let b = recommend(&DiskSpaceSample::new(12, 4_000, 99));
        assert_eq!(a, b);
    }

    #[test]
    fn bounds_tile_the_axis() {
        for pair in RetentionMode::ALL.windows(2) {
            assert_eq!(pair[0].upper_bound_gb(), Some(pair[1].lower_bound_gb()));
        }
        assert_eq!(RetentionMode::Strict.lower_bound_gb(), 0);
        assert_eq!(RetentionMode::Ample.upper_bound_gb(), None);
    }

    #[test]
    fn mode_round_trips_through_str() {
        for mode in RetentionMode::ALL {
            assert_eq!(mode.to_string().parse::<RetentionMode>(), Ok(mode));
        }
        assert_eq!(" AMPLE ".parse::<RetentionMode>(), Ok(RetentionMode::Ample));
        assert!("lenient".parse::<RetentionMode>().is_err());
    }

    #[test]
    fn mode_serializes_lowercase() {
        let json = serde_json::to_string(&RetentionMode::Relaxed).unwrap();
        assert_eq!(json, "\"relaxed\"");
    }

    #[test]
    fn forced_recommendation_keeps_sample() {
        let sample = DiskSpaceSample::new(2, 50, 96);
        let rec = Recommendation::forced(Some(sample), RetentionMode::Ample);
        assert_eq!(rec.sample, Some(sample));
        assert_eq!(rec.parameters, parameters_for(RetentionMode::Ample));
        assert_eq!(Recommendation::from_sample(sample).mode, RetentionMode::Strict);
    }

    #[test]
    fn forced_recommendation_without_sample_serializes_null() {
        let rec = Recommendation::forced(None, RetentionMode::Strict);
        assert_eq!(rec.parameters, parameters_for(RetentionMode::Strict));
        let json = serde_json::to_value(rec).unwrap();
        assert!(json["sample"].is_null());
        assert_eq!(json["mode"], "strict");
    }

    proptest! {
        #[test]
        fn classify_lands_inside_its_interval(gb in any::<u64>()) {
            let mode = classify(gb);
            prop_assert!(gb >= mode.lower_bound_gb());
            if let Some(upper) = mode.upper_bound_gb() {
                prop_assert!(gb < upper);
            }
            let containing = RetentionMode::ALL
                .iter()
                .filter(|m| gb >= m.lower_bound_gb() && m.upper_bound_gb().is_none_or(|u| gb < u))
                .count();
            prop_assert_eq!(containing, 1);
        }

        #[test]
        fn classify_is_monotonic(a in 0u64..1_000, b in 0u64..1_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(classify(lo) <= classify(hi));
        }

        #[test]
        fn recommend_is_idempotent(gb in any::<u64>(), total in any::<u64>(), used in 0u8..=100) {
            let sample = DiskSpaceSample::new(gb, total, used);
            prop_assert_eq!(recommend(&sample), recommend(&sample));
        }
    }
}
