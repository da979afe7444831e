use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use dashwatch_common::DashwatchError;

/// File-based mutual exclusion between overlapping scheduled runs.
/// Locks older than `stale_after` are assumed to belong to a killed run.
#[derive(Debug, Clone)]
pub struct ExecutionGuard {
    path: PathBuf,
    stale_after: Duration,
}

/// Held for the duration of a run. Dropping it removes the lock file.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    acquired_at: DateTime<Utc>,
    released: bool,
}

fn lock_error(path: &Path, e: std::io::Error) -> DashwatchError {
    DashwatchError::PersistenceUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

impl ExecutionGuard {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
        }
    }

    pub fn from_minutes(path: impl Into<PathBuf>, minutes: u64) -> Self {
        Self::new(path, Duration::from_secs(minutes * 60))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Age of the current lock file, if there is one.
    fn lock_age(&self) -> Option<Duration> {
        let modified = fs::metadata(&self.path).ok()?.modified().ok()?;
        Some(SystemTime::now().duration_since(modified).unwrap_or_default())
    }

    pub fn acquire(&self) -> Result<LockGuard, DashwatchError> {
        if let Some(age) = self.lock_age() {
            if age < self.stale_after {
                return Err(DashwatchError::LockHeld {
                    age_secs: age.as_secs(),
                });
            }
            warn!(
                path = %self.path.display(),
                age_secs = age.as_secs(),
                "recovered stale lock"
            );
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(lock_error(&self.path, e)),
            }
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| lock_error(&self.path, e))?;
        }

        // create_new fails if a concurrent run got there first.
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(DashwatchError::LockHeld { age_secs: 0 });
            }
            Err(e) => return Err(lock_error(&self.path, e)),
        };

        let acquired_at = Utc::now();
        writeln!(file, "{} {}", std::process::id(), acquired_at.to_rfc3339())
            .map_err(|e| lock_error(&self.path, e))?;

        info!(path = %self.path.display(), "Acquired run lock");
        Ok(LockGuard {
            path: self.path.clone(),
            acquired_at,
            released: false,
        })
    }
}

impl LockGuard {
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => info!(
                path = %self.path.display(),
                held_secs = (Utc::now() - self.acquired_at).num_seconds(),
                "Released run lock"
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to release run lock"),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let guard = ExecutionGuard::from_minutes(dir.path().join("run.lock"), 20);

        let lock = guard.acquire().unwrap();
        assert!(guard.path().exists());
        assert!(matches!(
            guard.acquire(),
            Err(DashwatchError::LockHeld { .. })
        ));

        lock.release();
        assert!(!guard.path().exists());
        guard.acquire().unwrap();
    }

    #[test]
    fn drop_removes_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let guard = ExecutionGuard::from_minutes(dir.path().join("nested/run.lock"), 20);
        {
            let _lock = guard.acquire().unwrap();
            assert!(guard.path().exists());
        }
        assert!(!guard.path().exists());
    }

    #[test]
    fn stale_lock_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        let file = fs::File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(21 * 60))
            .unwrap();
        drop(file);

        let guard = ExecutionGuard::from_minutes(&path, 20);
        let lock = guard.acquire().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(&std::process::id().to_string()));
        drop(lock);
    }

    #[test]
    fn fresh_foreign_lock_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.lock");
        fs::write(&path, "4242").unwrap();

        let err = ExecutionGuard::from_minutes(&path, 20).acquire().unwrap_err();
        assert!(matches!(err, DashwatchError::LockHeld { age_secs } if age_secs < 60));
        assert!(path.exists());
    }
}
