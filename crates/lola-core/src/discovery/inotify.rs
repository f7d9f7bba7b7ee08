//! Filesystem watch instance abstraction.
//!
//! The real implementation wraps `nix::sys::inotify`.
//! Inotify reads run on a dedicated worker thread; reads block until events
//! or shutdown.

use crate::error::{Error, Result};
use dashmap::DashMap;
use nix::sys::inotify::{AddWatchFlags, Inotify, InitFlags, WatchDescriptor as NixWatchDescriptor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};

/// Opaque watch handle exposed across the `InotifyInstance` trait boundary.
/// `OsInotify` maps this onto the real (non-constructible outside the nix
/// crate) `nix::sys::inotify::WatchDescriptor`; `FakeInotify` uses it
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchDescriptor(pub i32);

/// A single filesystem-change notification.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub watch_descriptor: WatchDescriptor,
    pub name: Option<PathBuf>,
}

/// Dependency-injected watch source. `add_watch` places a watch on a
/// directory; `read` blocks until at least one event is available or the
/// instance is closed.
pub trait InotifyInstance: Send {
    fn add_watch(&mut self, path: &Path) -> Result<WatchDescriptor>;
    fn read(&mut self) -> Result<Vec<WatchEvent>>;
    fn close(&mut self);
}

/// Real inotify-backed watcher. Assigns its own sequential `WatchDescriptor`
/// handles and keeps a two-way map onto the opaque nix watch descriptors so
/// `read_events` can translate events back to callers' handles.
pub struct OsInotify {
    inner: Inotify,
    next_id: AtomicI32,
    by_id: DashMap<i32, NixWatchDescriptor>,
    by_nix: DashMap<NixWatchDescriptor, i32>,
}

impl OsInotify {
    pub fn new() -> Result<Self> {
        let inner = Inotify::init(InitFlags::empty())
            .map_err(|e| Error::BindingFailure(format!("inotify_init failed: {e}")))?;
        Ok(Self {
            inner,
            next_id: AtomicI32::new(1),
            by_id: DashMap::new(),
            by_nix: DashMap::new(),
        })
    }
}

impl InotifyInstance for OsInotify {
    fn add_watch(&mut self, path: &Path) -> Result<WatchDescriptor> {
        let flags = AddWatchFlags::IN_CREATE
            | AddWatchFlags::IN_DELETE
            | AddWatchFlags::IN_MOVED_FROM
            | AddWatchFlags::IN_MOVED_TO;

        let nix_wd = self.inner.add_watch(path, flags).map_err(|e| {
            if let Ok(meta) = std::fs::metadata(path) {
                tracing::error!(
                    path = %path.display(),
                    mode = format!("{:o}", permissions_octal(&meta)),
                    "add_watch failed, logging current permissions before returning BindingFailure"
                );
            }
            Error::BindingFailure(format!("add_watch({}): {e}", path.display()))
        })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.by_id.insert(id, nix_wd);
        self.by_nix.insert(nix_wd, id);
        Ok(WatchDescriptor(id))
    }

    fn read(&mut self) -> Result<Vec<WatchEvent>> {
        let events = self
            .inner
            .read_events()
            .map_err(|e| Error::BindingFailure(format!("inotify read failed: {e}")))?;
        Ok(events
            .into_iter()
            .filter_map(|event| {
                let id = *self.by_nix.get(&event.wd)?;
                Some(WatchEvent {
                    watch_descriptor: WatchDescriptor(id),
                    name: event.name.map(PathBuf::from),
                })
            })
            .collect())
    }

    fn close(&mut self) {
        self.by_id.clear();
        self.by_nix.clear();
    }
}

#[cfg(target_os = "linux")]
fn permissions_octal(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(target_os = "linux"))]
fn permissions_octal(_meta: &std::fs::Metadata) -> u32 {
    0
}

/// Deterministic fake watcher for discovery tests: `add_watch` hands out
/// sequential descriptors, `push_event` lets tests enqueue synthetic
/// events for `read` to return.
pub struct FakeInotify {
    next_wd: AtomicI32,
    pending: Vec<WatchEvent>,
}

impl FakeInotify {
    pub fn new() -> Self {
        Self {
            next_wd: AtomicI32::new(1),
            pending: Vec::new(),
        }
    }

    pub fn push_event(&mut self, watch_descriptor: WatchDescriptor, name: Option<PathBuf>) {
        self.pending.push(WatchEvent { watch_descriptor, name });
    }
}

impl Default for FakeInotify {
    fn default() -> Self {
        Self::new()
    }
}

impl InotifyInstance for FakeInotify {
    fn add_watch(&mut self, _path: &Path) -> Result<WatchDescriptor> {
        Ok(WatchDescriptor(self.next_wd.fetch_add(1, Ordering::SeqCst)))
    }

    fn read(&mut self) -> Result<Vec<WatchEvent>> {
        Ok(std::mem::take(&mut self.pending))
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_inotify_assigns_increasing_watch_descriptors() {
        let mut fake = FakeInotify::new();
        let wd1 = fake.add_watch(Path::new("/a")).unwrap();
        let wd2 = fake.add_watch(Path::new("/b")).unwrap();
        assert_ne!(wd1, wd2);
    }

    #[test]
    fn fake_inotify_returns_pushed_events_then_drains() {
        let mut fake = FakeInotify::new();
        let wd = fake.add_watch(Path::new("/a")).unwrap();
        fake.push_event(wd, Some(PathBuf::from("inst1")));
        let events = fake.read().unwrap();
        assert_eq!(events.len(), 1);
        assert!(fake.read().unwrap().is_empty());
    }
}
