//! Advisory file locking for the existence/usage marker files.
//!
//! Grounded on `original_source/.../bindings/lola/skeleton.cpp`'s
//! `CreateOrOpenServiceInstanceExistenceMarkerFile` /
//! `CreateOrOpenServiceInstanceUsageMarkerFile` (non-blocking try-flock
//! only) and confirmed against `groblegark-oddjobs`'s `oj-daemon` use
//! of the same "detect another live process via advisory lock" idiom —
//! `nix::fcntl::flock` is used in place of `fs2` since the binding already
//! depends on `nix` for shared-memory access.

use crate::error::{Error, Result};
use nix::fcntl::{flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Advisory lock over a single open file descriptor. All operations are
/// non-blocking try-locks — file locks never block the caller.
pub trait FileLock: Send {
    fn try_lock_exclusive_nonblocking(&self) -> Result<bool>;
    fn try_lock_shared_nonblocking(&self) -> Result<bool>;
    fn unlock(&self) -> Result<()>;
}

/// Real flock-backed lock over an open file.
pub struct OsFileLock {
    file: File,
}

impl OsFileLock {
    /// Opens (creating if absent) the file at `path` for locking.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::ErroneousFileHandle(format!("open {}: {e}", path.display())))?;
        Ok(Self { file })
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

impl FileLock for OsFileLock {
    fn try_lock_exclusive_nonblocking(&self) -> Result<bool> {
        match flock(self.file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => Ok(true),
            Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
            Err(e) => Err(Error::BindingFailure(format!("flock exclusive: {e}"))),
        }
    }

    fn try_lock_shared_nonblocking(&self) -> Result<bool> {
        match flock(self.file.as_raw_fd(), FlockArg::LockSharedNonblock) {
            Ok(()) => Ok(true),
            Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
            Err(e) => Err(Error::BindingFailure(format!("flock shared: {e}"))),
        }
    }

    fn unlock(&self) -> Result<()> {
        flock(self.file.as_raw_fd(), FlockArg::UnlockNonblock)
            .map_err(|e| Error::BindingFailure(format!("funlock: {e}")))
    }
}

/// Opens-or-creates the existence marker at `path` and returns a lock
/// handle over it. The caller acquires the non-blocking exclusive lock;
/// failure to acquire means another live skeleton owns the instance.
pub fn open_existence_marker(path: &Path) -> Result<OsFileLock> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::BindingFailure(format!("create_directories({}): {e}", parent.display())))?;
    }
    OsFileLock::open_or_create(path)
}

/// Opens-or-creates the usage marker at `path`. Unlike the existence
/// marker this file is never deleted — proxies may race to take a shared
/// lock on it at any time.
pub fn open_usage_marker(path: &Path) -> Result<OsFileLock> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::BindingFailure(format!("create_directories({}): {e}", parent.display())))?;
    }
    OsFileLock::open_or_create(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn exclusive_lock_on_existence_marker_blocks_second_skeleton() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("existence-a-b");

        let first = open_existence_marker(&path).unwrap();
        assert!(first.try_lock_exclusive_nonblocking().unwrap());

        let second = open_existence_marker(&path).unwrap();
        assert!(!second.try_lock_exclusive_nonblocking().unwrap());

        first.unlock().unwrap();
        assert!(second.try_lock_exclusive_nonblocking().unwrap());
    }

    #[test]
    fn shared_lock_on_usage_marker_allows_concurrent_proxies() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage-a-b");

        let proxy1 = open_usage_marker(&path).unwrap();
        let proxy2 = open_usage_marker(&path).unwrap();

        assert!(proxy1.try_lock_shared_nonblocking().unwrap());
        assert!(proxy2.try_lock_shared_nonblocking().unwrap());
    }

    #[test]
    fn exclusive_try_lock_fails_while_shared_lock_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usage-a-b");

        let proxy = open_usage_marker(&path).unwrap();
        assert!(proxy.try_lock_shared_nonblocking().unwrap());

        let skeleton = open_usage_marker(&path).unwrap();
        assert!(!skeleton.try_lock_exclusive_nonblocking().unwrap());
    }
}
