//! PAL trait and the Linux implementation backing the disk probe.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::{LrhError, Result};

const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Filesystem statistics for a path/mount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsStats {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
}

/// Mount-point metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountPoint {
    pub path: PathBuf,
}

/// OS abstraction used by the disk probe.
pub trait Platform: Send + Sync {
    fn fs_stats(&self, path: &Path) -> Result<FsStats>;
    fn mount_points(&self) -> Result<Vec<MountPoint>>;
}

/// Linux platform implementation using `/proc` + `statvfs`.
#[derive(Debug, Default)]
pub struct LinuxPlatform;

impl LinuxPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Platform for LinuxPlatform {
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        let mounts = self.mount_points()?;
        if find_mount(path, &mounts).is_none() {
            return Err(LrhError::Probe {
                path: path.to_path_buf(),
                details: "could not map path to mount point".to_string(),
            });
        }
        let stat = nix::sys::statvfs::statvfs(path).map_err(|error| LrhError::Probe {
            path: path.to_path_buf(),
            details: error.to_string(),
        })?;
        let fragment = stat.fragment_size();
        Ok(FsStats {
            total_bytes: stat.blocks().saturating_mul(fragment),
            free_bytes: stat.blocks_free().saturating_mul(fragment),
            available_bytes: stat.blocks_available().saturating_mul(fragment),
        })
    }

    fn mount_points(&self) -> Result<Vec<MountPoint>> {
        let raw = fs::read_to_string(PROC_MOUNTS).map_err(|source| LrhError::Io {
            path: PathBuf::from(PROC_MOUNTS),
            source,
        })?;
        let mounts = parse_proc_mounts(&raw);
        if mounts.is_empty() {
            return Err(LrhError::MountParse {
                details: format!("{PROC_MOUNTS} listed no mounts"),
            });
        }
        Ok(mounts)
    }
}

/// In-memory mock implementation for deterministic tests.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    mounts: Vec<MountPoint>,
    stats_by_mount: HashMap<PathBuf, FsStats>,
}

impl MockPlatform {
    #[must_use]
    pub fn new(mounts: Vec<MountPoint>, stats_by_mount: HashMap<PathBuf, FsStats>) -> Self {
        Self {
            mounts,
            stats_by_mount,
        }
    }

    /// Single root mount reporting the given byte counts.
    #[must_use]
    pub fn root(total_bytes: u64, free_bytes: u64, available_bytes: u64) -> Self {
        let root = PathBuf::from("/");
        Self::new(
            vec![MountPoint {
                path: root.clone(),
            }],
            HashMap::from([(
                root,
                FsStats {
                    total_bytes,
                    free_bytes,
                    available_bytes,
                },
            )]),
        )
    }
}

impl Platform for MockPlatform {
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        let mount = find_mount(path, &self.mounts).ok_or_else(|| LrhError::Probe {
            path: path.to_path_buf(),
            details: "mock mount not found".to_string(),
        })?;
        self.stats_by_mount
            .get(&mount.path)
            .cloned()
            .ok_or_else(|| LrhError::Probe {
                path: mount.path.clone(),
                details: "mock stats not found".to_string(),
            })
    }

    fn mount_points(&self) -> Result<Vec<MountPoint>> {
        Ok(self.mounts.clone())
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(LrhError::UnsupportedPlatform {
            details: "only Linux is currently implemented".to_string(),
        })
    }
}

fn parse_proc_mounts(raw: &str) -> Vec<MountPoint> {
    let mut mounts = Vec::new();
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            eprintln!("[lrh] warning: skipping malformed mount table line: {line}");
            continue;
        }
        mounts.push(MountPoint {
            path: unescape_mount_path(fields[1]),
        });
    }
    mounts
}

fn find_mount<'a>(path: &Path, mounts: &'a [MountPoint]) -> Option<&'a MountPoint> {
    mounts
        .iter()
        .filter(|mount| path.starts_with(&mount.path))
        .max_by_key(|mount| mount.path.as_os_str().len())
}

/// Decode the kernel's octal escapes (`\040` for space and friends).
fn unescape_mount_path(raw: &str) -> PathBuf {
    let mut bytes = Vec::with_capacity(raw.len());
    let raw_bytes = raw.as_bytes();
    let mut i = 0;
    while i < raw_bytes.len() {
        if raw_bytes[i] == b'\\' && i + 3 < raw_bytes.len() {
            let digits = &raw_bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let val = digits
                    .iter()
                    .fold(0_u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(val) {
                    bytes.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        bytes.push(raw_bytes[i]);
        i += 1;
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{MockPlatform, MountPoint, Platform, find_mount, parse_proc_mounts, unescape_mount_path};
    use std::path::Path;

    #[test]
    fn parses_mount_table() {
        let sample = "/dev/sda1 / ext4 rw,relatime 0 0\n\
                      overlay /var/lib/docker/overlay2/x/merged overlay rw 0 0\n";
        let mounts = parse_proc_mounts(sample);
        assert_eq!(mounts.len(), 2);
        assert!(mounts.iter().any(|entry| entry.path == Path::new("/")));
        assert!(
            mounts
                .iter()
                .any(|entry| entry.path == Path::new("/var/lib/docker/overlay2/x/merged"))
        );
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mounts = parse_proc_mounts("garbage\n/dev/sda1 / ext4 rw 0 0\n");
        assert_eq!(mounts.len(), 1);
    }

    #[test]
    fn find_mount_prefers_longest_prefix() {
        let mounts = vec![
            MountPoint {
                path: "/".into(),
            },
            MountPoint {
                path: "/var".into(),
            },
        ];
        let mount = find_mount(Path::new("/var/lib/docker"), &mounts).expect("mount expected");
        assert_eq!(mount.path, Path::new("/var"));
        let mount = find_mount(Path::new("/etc"), &mounts).expect("mount expected");
        assert_eq!(mount.path, Path::new("/"));
    }

    #[test]
    fn unescape_handles_octal_sequences() {
        assert_eq!(
            unescape_mount_path("/mnt/my\\040dir").to_string_lossy(),
            "/mnt/my dir"
        );
        assert_eq!(
            unescape_mount_path("/mnt/a\\04").to_string_lossy(),
            "/mnt/a\\04"
        );
    }

    #[test]
    fn mock_root_serves_any_absolute_path() {
        let platform = MockPlatform::root(100, 50, 40);
        let stats = platform.fs_stats(Path::new("/var/log")).expect("stats");
        assert_eq!(stats.available_bytes, 40);
        assert!(platform.fs_stats(Path::new("relative")).is_err());
    }
}
