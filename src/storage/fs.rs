//! Filesystem storage sink

use crate::storage::traits::{StorageError, StorageResult, StorageSink};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// [`StorageSink`] writing below a root directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Creates a sink rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a relative path below the root
    ///
    /// Absolute paths and `..` components are rejected.
    pub fn path_of(&self, rel_path: &str) -> StorageResult<PathBuf> {
        let rel = Path::new(rel_path);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if rel_path.is_empty() || escapes {
            return Err(StorageError::InvalidPath(rel_path.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl StorageSink for FsStorage {
    fn write(&self, rel_path: &str, bytes: &[u8]) -> StorageResult<()> {
        let path = self.path_of(rel_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        tracing::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    fn move_into(&self, location: &str, destination: &Path) -> StorageResult<Option<PathBuf>> {
        let source = self.path_of(location)?;
        if !source.exists() || is_empty_dir(&source)? {
            return Ok(None);
        }

        let Some(name) = source.file_name() else {
            return Err(StorageError::InvalidPath(location.to_string()));
        };
        fs::create_dir_all(destination)?;
        let target = destination.join(name);
        if target.exists() {
            remove_path(&target)?;
        }

        // rename fails across filesystems; fall back to copy + remove
        if fs::rename(&source, &target).is_err() {
            copy_recursive(&source, &target)?;
            remove_path(&source)?;
        }
        Ok(Some(target))
    }

    fn release(&self, location: &str) -> StorageResult<()> {
        let path = self.path_of(location)?;
        if path.exists() {
            remove_path(&path)?;
            tracing::debug!("Released {}", path.display());
        }
        Ok(())
    }

    fn exists(&self, rel_path: &str) -> bool {
        self.path_of(rel_path).map(|p| p.exists()).unwrap_or(false)
    }
}

fn is_empty_dir(path: &Path) -> StorageResult<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}

fn remove_path(path: &Path) -> StorageResult<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn copy_recursive(source: &Path, target: &Path) -> StorageResult<()> {
    if source.is_dir() {
        fs::create_dir_all(target)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &target.join(entry.file_name()))?;
        }
    } else {
        fs::copy(source, target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_directories() {
        let dir = TempDir::new().unwrap();
        let sink = FsStorage::new(dir.path());

        sink.write("loc/sub/file.txt", b"hello").unwrap();

        assert!(sink.exists("loc/sub/file.txt"));
        assert_eq!(fs::read(dir.path().join("loc/sub/file.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_write_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let sink = FsStorage::new(dir.path());

        sink.write("loc/a.txt", b"one").unwrap();
        sink.write("loc/a.txt", b"two").unwrap();

        assert_eq!(fs::read(dir.path().join("loc/a.txt")).unwrap(), b"two");
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let sink = FsStorage::new("/tmp/whatever");
        assert!(sink.path_of("../etc/passwd").is_err());
        assert!(sink.path_of("/etc/passwd").is_err());
        assert!(sink.path_of("").is_err());
        assert!(!sink.exists("../x"));
    }

    #[test]
    fn test_move_into() {
        let work = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let sink = FsStorage::new(work.path());
        sink.write("loc/index.json", b"{}").unwrap();

        let moved = sink.move_into("loc", &dest.path().join("run")).unwrap();

        assert_eq!(moved, Some(dest.path().join("run/loc")));
        assert!(dest.path().join("run/loc/index.json").exists());
        assert!(!sink.exists("loc"));
    }

    #[test]
    fn test_move_skips_missing_and_empty() {
        let work = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let sink = FsStorage::new(work.path());
        fs::create_dir_all(work.path().join("empty")).unwrap();

        assert_eq!(sink.move_into("missing", dest.path()).unwrap(), None);
        assert_eq!(sink.move_into("empty", dest.path()).unwrap(), None);
    }

    #[test]
    fn test_release() {
        let dir = TempDir::new().unwrap();
        let sink = FsStorage::new(dir.path());
        sink.write("loc/file.bin", b"x").unwrap();

        sink.release("loc").unwrap();
        assert!(!sink.exists("loc"));

        // releasing again is fine
        sink.release("loc").unwrap();
    }
}
