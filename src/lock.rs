//! File-based locking to prevent concurrent execution.
//!
//! Uses flock-style advisory locking so two timer-triggered runs can never
//! interleave their apply steps.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::TrustwallError;

/// A guard that holds an exclusive lock on the lock file.
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Attempt to acquire an exclusive lock on `lock_path` without blocking.
    ///
    /// Fails with [`TrustwallError::Locked`] if another run holds it.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock directory: {:?}", parent))?;
        }

        // create+read+write without truncate: no window between create and lock
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {:?}", lock_path))?;

        fs::set_permissions(lock_path, fs::Permissions::from_mode(0o600))
            .context("Failed to set lock file permissions")?;

        file.try_lock_exclusive().map_err(|_| {
            TrustwallError::Locked(lock_path.display().to_string())
        })?;

        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_acquire_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trustwall.lock");

        let guard = LockGuard::acquire(&path).unwrap();
        drop(guard);
        assert!(LockGuard::acquire(&path).is_ok());
    }

    #[test]
    fn test_lock_contention() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run/trustwall.lock");

        let _held = LockGuard::acquire(&path).unwrap();
        let err = LockGuard::acquire(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrustwallError>(),
            Some(TrustwallError::Locked(_))
        ));
        assert_eq!(
            err.to_string(),
            format!("Another trustwall run holds the lock: {}", path.display())
        );
    }

    #[test]
    fn test_lock_file_permissions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trustwall.lock");

        let _guard = LockGuard::acquire(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
