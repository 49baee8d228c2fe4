//! Removal of on-disk plaintext when the process is interrupted.
//!
//! Files holding decrypted content are tracked while they exist under a
//! temporary name. On SIGINT, SIGTERM or SIGHUP every tracked file is
//! deleted before the process exits; `Drop` alone never runs in that case.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use tracing::warn;

/// Exit status used after an interrupt, as a shell reports SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

static PENDING: PendingFiles = PendingFiles::new();
static HANDLER: Once = Once::new();

/// A set of files to delete on interrupt.
#[derive(Debug, Default)]
pub struct PendingFiles {
    paths: Mutex<Vec<PathBuf>>,
}

impl PendingFiles {
    pub const fn new() -> Self {
        Self {
            paths: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `path` until the returned guard is dropped.
    pub fn track(&self, path: &Path) -> Tracked<'_> {
        self.lock().push(path.to_path_buf());
        Tracked {
            files: self,
            path: path.to_path_buf(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Delete every tracked file that still exists. Returns how many were
    /// removed.
    pub fn remove_all(&self) -> usize {
        self.lock()
            .drain(..)
            .filter(|path| fs::remove_file(path).is_ok())
            .count()
    }
}

/// Stops tracking its path on drop. The file itself is left alone, since by
/// then it has either been persisted or removed by its owner.
#[derive(Debug)]
pub struct Tracked<'a> {
    files: &'a PendingFiles,
    path: PathBuf,
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        let mut paths = self.files.lock();
        if let Some(position) = paths.iter().position(|p| *p == self.path) {
            paths.swap_remove(position);
        }
    }
}

/// Track `path` in the process-wide set, installing the interrupt handler on
/// first use.
pub fn track(path: &Path) -> Tracked<'static> {
    HANDLER.call_once(|| {
        let result = ctrlc::set_handler(|| {
            PENDING.remove_all();
            std::process::exit(INTERRUPTED_EXIT_CODE);
        });
        if let Err(err) = result {
            warn!("failed to install interrupt handler, temporary files may survive a signal: {}", err);
        }
    });
    PENDING.track(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_all_deletes_tracked_files() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join(".tmp1");
        let second = temp_dir.path().join(".tmp2");
        fs::write(&first, "SECRET=1").unwrap();
        fs::write(&second, "SECRET=2").unwrap();

        let files = PendingFiles::new();
        let _a = files.track(&first);
        let _b = files.track(&second);
        assert_eq!(files.len(), 2);

        assert_eq!(files.remove_all(), 2);
        assert!(!first.exists());
        assert!(!second.exists());
        assert!(files.is_empty());
    }

    #[test]
    fn test_dropped_guard_stops_tracking() {
        let temp_dir = TempDir::new().unwrap();
        let kept = temp_dir.path().join("kept.env");
        fs::write(&kept, "A=1").unwrap();

        let files = PendingFiles::new();
        drop(files.track(&kept));
        assert!(files.is_empty());

        assert_eq!(files.remove_all(), 0);
        assert!(kept.exists());
    }

    #[test]
    fn test_missing_files_are_not_counted() {
        let temp_dir = TempDir::new().unwrap();
        let files = PendingFiles::new();
        let _gone = files.track(&temp_dir.path().join("never-written"));

        assert_eq!(files.remove_all(), 0);
    }
}
