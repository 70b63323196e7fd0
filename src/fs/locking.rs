//! File locking and atomic replacement
//!
//! Advisory `fs2` locks serialize access between processes touching the same
//! instance or queue. They are cooperative: every participant must go through
//! these functions for the locking to be effective.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{EngineError, EngineResult};

/// Exclusive lock held for the lifetime of the guard.
///
/// Used to apply directives to one instance strictly one at a time.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Block until the exclusive lock on `path` is acquired, creating the
    /// lock file if needed.
    pub fn acquire(path: &Path) -> EngineResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| EngineError::io(path, e))?;
        FileExt::lock_exclusive(&file).map_err(|e| EngineError::io(path, e))?;
        tracing::trace!(path = %path.display(), "acquired lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Read file contents with a shared (read) lock.
pub fn locked_read(path: &Path) -> EngineResult<String> {
    let mut file = File::open(path).map_err(|e| EngineError::io(path, e))?;
    FileExt::lock_shared(&file).map_err(|e| EngineError::io(path, e))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| EngineError::io(path, e))?;
    Ok(content)
}

/// Replace `path` with `content` all-or-nothing.
///
/// The content goes to a temp file in the same directory, is synced, then
/// renamed over the target. Readers see either the old or the new document,
/// never a truncated one.
pub fn atomic_write(path: &Path, content: &str) -> EngineResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;

    let mut staging = NamedTempFile::new_in(parent).map_err(|e| EngineError::io(parent, e))?;
    staging
        .write_all(content.as_bytes())
        .map_err(|e| EngineError::io(staging.path(), e))?;
    staging
        .as_file()
        .sync_all()
        .map_err(|e| EngineError::io(staging.path(), e))?;
    staging
        .persist(path)
        .map_err(|e| EngineError::io(path, e.error))?;
    Ok(())
}

/// Read, transform and rewrite a file under one exclusive lock.
///
/// The closure receives the current content (empty if the file does not
/// exist) and returns the new content plus a value handed back to the
/// caller. Returning `None` as content leaves the file untouched. The lock
/// lives on a sibling `.lock` file so the atomic rename does not drop it.
pub fn with_exclusive_lock<T, F>(path: &Path, update: F) -> EngineResult<T>
where
    F: FnOnce(&str) -> EngineResult<(Option<String>, T)>,
{
    let lock_path = lock_path_for(path);
    let guard = LockGuard::acquire(&lock_path)?;

    let current = match File::open(path) {
        Ok(mut file) => {
            let mut content = String::new();
            file.seek(SeekFrom::Start(0))
                .and_then(|_| file.read_to_string(&mut content))
                .map_err(|e| EngineError::io(path, e))?;
            content
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(EngineError::io(path, e)),
    };

    let (next, value) = update(&current)?;
    if let Some(next) = next {
        atomic_write(path, &next)?;
    }

    drop(guard);
    Ok(value)
}

/// `<file>.lock` next to the guarded file.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_atomic_write_and_read() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("state.md");

        atomic_write(&path, "first").unwrap();
        atomic_write(&path, "second").unwrap();
        assert_eq!(locked_read(&path).unwrap(), "second");

        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != path)
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn test_atomic_write_creates_parent() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("dir").join("doc.toml");
        atomic_write(&path, "x = 1").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x = 1");
    }

    #[test]
    fn test_lock_path_for() {
        assert_eq!(
            lock_path_for(Path::new("/tmp/queue.toml")),
            PathBuf::from("/tmp/queue.toml.lock")
        );
    }

    #[test]
    fn test_with_exclusive_lock_serializes_counters() {
        let temp = tempfile::tempdir().unwrap();
        let path = Arc::new(temp.path().join("counter.txt"));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = Arc::clone(&path);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..10 {
                        with_exclusive_lock(&path, |current| {
                            let n: u32 = current.trim().parse().unwrap_or(0);
                            Ok((Some((n + 1).to_string()), ()))
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fs::read_to_string(&*path).unwrap(), "80");
    }

    #[test]
    fn test_with_exclusive_lock_can_skip_write() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("absent.toml");
        let seen = with_exclusive_lock(&path, |current| Ok((None, current.to_string()))).unwrap();
        assert_eq!(seen, "");
        assert!(!path.exists());
    }
}
