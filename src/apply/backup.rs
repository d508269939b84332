//! Backup-first file mutation helpers shared by the subsystem writers.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::core::errors::{LrhError, Result};

/// Copy `path` to `<name>.lrh-backup-<unix-ms>`, beside the original or in
/// `backup_dir`.
///
/// An existing backup is never overwritten; a name collision gets a `-N`
/// suffix.
pub fn create_timestamped_backup(path: &Path, backup_dir: Option<&Path>) -> Result<PathBuf> {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let file_name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let base_name = format!("{file_name}.lrh-backup-{timestamp}");

    let dir = if let Some(dir) = backup_dir {
        fs::create_dir_all(dir).map_err(|source| LrhError::io(dir, source))?;
        dir.to_path_buf()
    } else {
        path.parent().map_or_else(PathBuf::new, Path::to_path_buf)
    };

    let mut original = File::open(path).map_err(|source| LrhError::io(path, source))?;
    let permissions = original
        .metadata()
        .map_err(|source| LrhError::io(path, source))?
        .permissions();

    let mut attempt = 0_u32;
    let (backup_path, mut backup) = loop {
        let name = if attempt == 0 {
            base_name.clone()
        } else {
            format!("{base_name}-{attempt}")
        };
        let candidate = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => break (candidate, file),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(err) => return Err(LrhError::io(&candidate, err)),
        }
    };

    io::copy(&mut original, &mut backup).map_err(|source| LrhError::io(&backup_path, source))?;
    backup
        .sync_all()
        .map_err(|source| LrhError::io(&backup_path, source))?;
    fs::set_permissions(&backup_path, permissions)
        .map_err(|source| LrhError::io(&backup_path, source))?;
    Ok(backup_path)
}

/// Put a backup back in place of a half-written original.
pub fn restore_backup(backup: &Path, original: &Path) -> Result<()> {
    fs::copy(backup, original).map_err(|source| LrhError::io(original, source))?;
    Ok(())
}

/// Replace `path` with `contents` via a sibling temp file and `rename`.
///
/// Readers never see a truncated file. Existing permissions are carried over
/// to the replacement.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|source| LrhError::io(parent, source))?;

    let file_name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let tmp_path = parent.join(format!(".{file_name}.lrh-tmp-{}", std::process::id()));

    let write_tmp = || -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(&tmp_path, meta.permissions())?;
        }
        Ok(())
    };

    if let Err(source) = write_tmp() {
        let _ = fs::remove_file(&tmp_path);
        return Err(LrhError::io(&tmp_path, source));
    }
    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        LrhError::io(path, source)
    })
}

/// Read a config file, treating a missing file as empty.
pub fn read_or_empty(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LrhError::io(path, source)),
    }
}
