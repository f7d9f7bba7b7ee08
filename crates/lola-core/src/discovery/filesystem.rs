//! Filesystem façade consumed by the discovery crawler.
//!
//! The dependency-injected real/fake split mirrors `groblegark-oddjobs`'
//! `oj-adapters` pattern of putting OS-facing watchers behind a trait so
//! tests can drive deterministic fakes instead of a real directory tree.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The filesystem entry kind discovery cares about distinguishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    RegularFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStatus {
    pub kind: EntryKind,
}

/// Façade over directory/file operations the crawler needs. Errors from
/// `status` propagate as `BindingFailure`.
pub trait Filesystem: Send + Sync {
    fn create_directories(&self, path: &Path) -> Result<()>;
    fn create_regular_file(&self, path: &Path) -> Result<()>;
    fn status(&self, path: &Path) -> Result<Option<FileStatus>>;
    fn remove(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool {
        matches!(self.status(path), Ok(Some(_)))
    }
    /// Lists the immediate children of a directory; empty if it does not
    /// exist or is not a directory.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Real filesystem, backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn create_directories(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::BindingFailure(format!("create_directories({}): {e}", path.display())))
    }

    fn create_regular_file(&self, path: &Path) -> Result<()> {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map(|_| ())
            .map_err(|e| Error::BindingFailure(format!("create_regular_file({}): {e}", path.display())))
    }

    fn status(&self, path: &Path) -> Result<Option<FileStatus>> {
        match std::fs::metadata(path) {
            Ok(meta) => {
                let kind = if meta.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::RegularFile
                };
                Ok(Some(FileStatus { kind }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::BindingFailure(format!("status({}): {e}", path.display()))),
        }
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match self.status(path)? {
            Some(FileStatus { kind: EntryKind::Directory }) => std::fs::remove_dir_all(path),
            _ => std::fs::remove_file(path),
        }
        .map_err(|e| Error::BindingFailure(format!("remove({}): {e}", path.display())))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match std::fs::read_dir(path) {
            Ok(entries) => entries
                .map(|e| e.map(|e| e.path()))
                .collect::<std::io::Result<Vec<_>>>()
                .map_err(|e| Error::BindingFailure(format!("read_dir({}): {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::BindingFailure(format!("read_dir({}): {e}", path.display()))),
        }
    }
}

/// In-memory fake filesystem for discovery tests. Stored as a flat map of
/// path -> kind; directory membership is derived from path prefixes.
#[derive(Debug, Default)]
pub struct FakeFilesystem {
    entries: parking_lot::Mutex<BTreeMap<PathBuf, EntryKind>>,
}

impl FakeFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_directory(self, path: impl Into<PathBuf>) -> Self {
        self.entries.lock().insert(path.into(), EntryKind::Directory);
        self
    }

    pub fn with_file(self, path: impl Into<PathBuf>) -> Self {
        self.entries.lock().insert(path.into(), EntryKind::RegularFile);
        self
    }
}

impl Filesystem for FakeFilesystem {
    fn create_directories(&self, path: &Path) -> Result<()> {
        let mut entries = self.entries.lock();
        let mut ancestor = PathBuf::new();
        for component in path.components() {
            ancestor.push(component);
            entries.entry(ancestor.clone()).or_insert(EntryKind::Directory);
        }
        Ok(())
    }

    fn create_regular_file(&self, path: &Path) -> Result<()> {
        self.entries.lock().insert(path.to_path_buf(), EntryKind::RegularFile);
        Ok(())
    }

    fn status(&self, path: &Path) -> Result<Option<FileStatus>> {
        Ok(self.entries.lock().get(path).map(|kind| FileStatus { kind: *kind }))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.entries.lock().retain(|p, _| p != path && !p.starts_with(path));
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = self.entries.lock();
        Ok(entries
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_filesystem_lists_only_immediate_children() {
        let fs = FakeFilesystem::new()
            .with_directory("/root/a")
            .with_directory("/root/a/b")
            .with_file("/root/a/flag");

        let mut children = fs.read_dir(Path::new("/root/a")).unwrap();
        children.sort();
        assert_eq!(children, vec![PathBuf::from("/root/a/b"), PathBuf::from("/root/a/flag")]);
    }

    #[test]
    fn fake_filesystem_status_distinguishes_kinds() {
        let fs = FakeFilesystem::new().with_directory("/d").with_file("/d/f");
        assert_eq!(
            fs.status(Path::new("/d")).unwrap().unwrap().kind,
            EntryKind::Directory
        );
        assert_eq!(
            fs.status(Path::new("/d/f")).unwrap().unwrap().kind,
            EntryKind::RegularFile
        );
        assert!(fs.status(Path::new("/missing")).unwrap().is_none());
    }
}
