//! Shared SQLite and secure-filesystem helpers for the session log.
//!
//! - Owner-only creation of missing data directories
//! - Secure SQLite database file creation with permission hardening
//! - SQLite WAL/SHM sidecar path computation
//! - The wall clock used for stored timestamps

use rusqlite::Connection;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::error::{MemoryError, Result};

/// Open a SQLite database at `path` with secure directory and file permissions.
///
/// 1. Creates the parent directory if it doesn't exist
/// 2. Makes a newly created directory owner-only (Unix: 0o700)
/// 3. Creates the DB file with secure permissions (Unix: 0o600)
/// 4. Opens the SQLite connection
pub(crate) fn open_secure_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_secure_dir(parent)?;
    }
    ensure_secure_db_files(path)?;

    Connection::open(path).map_err(MemoryError::storage(format!(
        "Failed to open database at {}",
        path.display()
    )))
}

/// Ensure a directory exists, creating it owner-only (Unix: 0o700) if missing.
///
/// Pre-existing directories are left as they are: the default data directory
/// is the caller's working directory, which this crate does not own.
pub(crate) fn ensure_secure_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(MemoryError::io("Failed to create directory", path))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .map_err(MemoryError::io("Failed to set directory permissions", path))?;
    }
    Ok(())
}

/// Ensure a SQLite database file (and its WAL/SHM sidecars) has secure permissions.
pub(crate) fn ensure_secure_db_files(path: &Path) -> Result<()> {
    if !path.exists() {
        let mut options = OpenOptions::new();
        options.create(true).truncate(false).read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let _file = options
            .open(path)
            .map_err(MemoryError::io("Failed to create database file", path))?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(MemoryError::io("Failed to set database permissions", path))?;
        for suffix in ["-wal", "-shm"] {
            let sidecar = sqlite_sidecar_path(path, suffix);
            if sidecar.exists()
                && let Err(err) =
                    std::fs::set_permissions(&sidecar, std::fs::Permissions::from_mode(0o600))
            {
                tracing::debug!(
                    path = %sidecar.display(),
                    error = %err,
                    "Failed to tighten SQLite sidecar permissions"
                );
            }
        }
    }
    Ok(())
}

/// Compute the path to a SQLite sidecar file (e.g. `-wal`, `-shm`).
#[cfg_attr(not(unix), allow(dead_code))]
fn sqlite_sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path.file_name().map(|name| name.to_string_lossy());
    match file_name {
        Some(name) => path.with_file_name(format!("{name}{suffix}")),
        None => PathBuf::from(format!("{}{suffix}", path.display())),
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_path_appends_suffix() {
        let path = Path::new("/tmp/data/chat-memory.sqlite");
        assert_eq!(
            sqlite_sidecar_path(path, "-wal"),
            PathBuf::from("/tmp/data/chat-memory.sqlite-wal")
        );
    }

    #[test]
    fn open_secure_db_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("memory.sqlite");

        let conn = open_secure_db(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER);").unwrap();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn existing_directory_permissions_are_kept() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
        let _conn = open_secure_db(&dir.path().join("memory.sqlite")).unwrap();

        let mode = std::fs::metadata(dir.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn open_secure_db_tightens_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.sqlite");
        let _conn = open_secure_db(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn existing_sidecars_are_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.sqlite");
        let wal = sqlite_sidecar_path(&path, "-wal");
        std::fs::write(&path, b"").unwrap();
        std::fs::write(&wal, b"").unwrap();
        std::fs::set_permissions(&wal, std::fs::Permissions::from_mode(0o644)).unwrap();

        ensure_secure_db_files(&path).unwrap();

        let mode = std::fs::metadata(&wal).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        assert!(!sqlite_sidecar_path(&path, "-shm").exists());
    }

    #[test]
    fn now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
