//! Shared-memory region lifecycle: create-or-reopen, size computation,
//! permission derivation, and crash cleanup.
//!
//! Offer/stop-offer sequencing follows
//! `original_source/.../bindings/lola/skeleton.cpp`; region creation uses
//! the same `shm_open`/`ftruncate`/`mmap` sequence, split by
//! `#[cfg(target_family = "unix")]`.

use super::layout::{EventControl, ServiceDataControl, ServiceDataStorage};
use super::lockfile::{open_existence_marker, open_usage_marker, FileLock, OsFileLock};
use crate::acl::Acl;
use crate::error::{Error, Result};
use crate::identifiers::{InstanceId, ServiceId};
use crate::path_builder::PathBuilder;
use lola_config::{LolaServiceInstanceDeployment, QualityType};
use std::collections::HashMap;

/// Outcome of an `offer` call: whether regions were created fresh or an
/// existing set was adopted across a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Fresh,
    Reopened,
}

/// Byte sizes for the three possible SHM objects of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSizes {
    pub data: usize,
    pub control_qm: usize,
    pub control_b: Option<usize>,
}

/// Regions produced by a successful `offer` call, plus whether they were
/// created fresh or adopted across a skeleton restart, and the locks the
/// caller must hold for the offer's lifetime.
pub struct OfferedRegions<R> {
    pub outcome: OfferOutcome,
    pub existence_lock: OsFileLock,
    pub usage_lock: OsFileLock,
    pub data: R,
    pub control_qm: R,
    pub control_b: Option<R>,
}

/// Handle over an opened/created POSIX shared-memory object, with a live
/// mapping callers can read and write the typed headers through.
pub trait ShmRegion: Send {
    fn create(name: &str, size: usize, mode: u32) -> Result<Self>
    where
        Self: Sized;
    fn open(name: &str) -> Result<Self>
    where
        Self: Sized;
    fn remove(name: &str) -> Result<()>;
    fn size(&self) -> usize;
    /// The region's bytes, mapped for the lifetime of this handle.
    fn as_mut_slice(&mut self) -> &mut [u8];
}

#[cfg(target_family = "unix")]
pub struct OsShmRegion {
    mapping: Option<std::ptr::NonNull<core::ffi::c_void>>,
    size: usize,
}

// SAFETY: the mapping is exclusively owned by this handle; no other code
// holds the raw pointer, so moving the handle across threads is sound.
#[cfg(target_family = "unix")]
unsafe impl Send for OsShmRegion {}

#[cfg(target_family = "unix")]
impl OsShmRegion {
    fn map(fd: &std::os::fd::OwnedFd, size: usize) -> Result<Option<std::ptr::NonNull<core::ffi::c_void>>> {
        use nix::sys::mman::{mmap, MapFlags, ProtFlags};
        use std::num::NonZeroUsize;

        if size == 0 {
            return Ok(None);
        }
        let mapping = unsafe {
            mmap(
                None,
                NonZeroUsize::new(size).expect("size > 0 checked above"),
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                fd,
                0,
            )
        }
        .map_err(|e| Error::ErroneousFileHandle(format!("mmap: {e}")))?;
        Ok(Some(mapping))
    }
}

#[cfg(target_family = "unix")]
impl ShmRegion for OsShmRegion {
    fn create(name: &str, size: usize, mode: u32) -> Result<Self> {
        use nix::fcntl::OFlag;
        use nix::sys::stat::Mode;
        use nix::sys::mman::shm_open;
        use nix::unistd::ftruncate;

        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_EXCL,
            Mode::from_bits_truncate(mode),
        )
        .map_err(|e| Error::ErroneousFileHandle(format!("shm_open({name}): {e}")))?;
        ftruncate(&fd, size as i64)
            .map_err(|e| Error::ErroneousFileHandle(format!("ftruncate({name}, {size}): {e}")))?;

        let mapping = Self::map(&fd, size)?;
        Ok(Self { mapping, size })
    }

    fn open(name: &str) -> Result<Self> {
        use nix::fcntl::OFlag;
        use nix::sys::mman::shm_open;
        use nix::sys::stat::Mode;

        let fd = shm_open(name, OFlag::O_RDWR, Mode::empty())
            .map_err(|e| Error::ErroneousFileHandle(format!("shm_open({name}): {e}")))?;
        let stat = nix::sys::stat::fstat(&fd)
            .map_err(|e| Error::ErroneousFileHandle(format!("fstat({name}): {e}")))?;
        let size = stat.st_size as usize;
        let mapping = Self::map(&fd, size)?;
        Ok(Self { mapping, size })
    }

    fn remove(name: &str) -> Result<()> {
        match nix::sys::mman::shm_unlink(name) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ENOENT) => Ok(()),
            Err(e) => Err(Error::ErroneousFileHandle(format!("shm_unlink({name}): {e}"))),
        }
    }

    fn size(&self) -> usize {
        self.size
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.mapping {
            // SAFETY: `mapping` was produced by `mmap` for exactly `size`
            // bytes and stays valid until `Drop::drop` unmaps it.
            Some(ptr) => unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr() as *mut u8, self.size) },
            None => &mut [],
        }
    }
}

#[cfg(target_family = "unix")]
impl Drop for OsShmRegion {
    fn drop(&mut self) {
        if let Some(ptr) = self.mapping.take() {
            unsafe {
                let _ = nix::sys::mman::munmap(ptr, self.size);
            }
        }
    }
}

/// Coordinates shared-memory lifecycle for a single (service, instance).
pub struct ShmLifecycle<'a> {
    pub path_builder: &'a PathBuilder,
    pub acl: &'a dyn Acl,
}

impl<'a> ShmLifecycle<'a> {
    pub fn new(path_builder: &'a PathBuilder, acl: &'a dyn Acl) -> Self {
        Self { path_builder, acl }
    }

    /// Computed or configured region sizes. A
    /// user-supplied size smaller than the simulated requirement is a
    /// configuration error — this implementation never silently oversizes.
    pub fn compute_sizes(
        &self,
        deployment: &LolaServiceInstanceDeployment,
        simulated: RegionSizes,
    ) -> Result<RegionSizes> {
        let data = match deployment.shared_memory_size {
            Some(configured) if configured < simulated.data => {
                return Err(Error::Configuration(format!(
                    "configured shared_memory_size {configured} is smaller than required {}",
                    simulated.data
                )));
            }
            Some(configured) => configured,
            None => simulated.data,
        };
        let control_qm = match deployment.control_qm_size {
            Some(configured) if configured < simulated.control_qm => {
                return Err(Error::Configuration(format!(
                    "configured control_qm_size {configured} is smaller than required {}",
                    simulated.control_qm
                )));
            }
            Some(configured) => configured,
            None => simulated.control_qm,
        };
        let control_b = match (deployment.control_b_size, simulated.control_b) {
            (Some(configured), Some(required)) if configured < required => {
                return Err(Error::Configuration(format!(
                    "configured control_b_size {configured} is smaller than required {required}"
                )));
            }
            (Some(configured), _) => Some(configured),
            (None, simulated) => simulated,
        };

        Ok(RegionSizes {
            data,
            control_qm,
            control_b,
        })
    }

    /// Runs the in-process simulation pass: constructs the same typed
    /// headers that will live in real SHM, measures their size. Stands in
    /// for a `NewDelete`-backed dry run — this crate's
    /// headers are fixed-layout `repr(C)` structs, so the "simulation" is
    /// exact arithmetic rather than an allocator trial.
    pub fn simulate_sizes(&self, event_count: usize, per_event_slot_bytes: &[usize], asil_b: bool) -> RegionSizes {
        let control_qm = ServiceDataControl::region_size(event_count);
        let control_b = asil_b.then(|| ServiceDataControl::region_size(event_count));
        let data = ServiceDataStorage::region_size(per_event_slot_bytes);
        RegionSizes {
            data,
            control_qm,
            control_b,
        }
    }

    /// Effective permission mode for a control region: union of
    /// per-consumer read+write grants; empty ACL with `strict_permissions
    /// == false` falls back to world-writable, strict mode never falls
    /// back.
    pub fn control_permissions(&self, deployment: &LolaServiceInstanceDeployment) -> u32 {
        let has_any_consumer = !deployment.allowed_consumer.is_empty();
        if !has_any_consumer {
            return if deployment.strict_permissions { 0o000 } else { 0o666 };
        }
        let mut entry: crate::acl::AclEntry = 0;
        for uids in deployment.allowed_consumer.values() {
            for uid in uids {
                self.acl.add_perm(entry, crate::acl::Permission::ReadWrite);
                self.acl.set_qualifier(entry, *uid);
                entry += 1;
            }
        }
        0o660
    }

    /// Effective permission mode for the data region: consumers get
    /// read-only; fallback is world-readable unless strict.
    pub fn data_permissions(&self, deployment: &LolaServiceInstanceDeployment) -> u32 {
        let has_any_consumer = !deployment.allowed_consumer.is_empty();
        if !has_any_consumer {
            return if deployment.strict_permissions { 0o000 } else { 0o444 };
        }
        let mut entry: crate::acl::AclEntry = 0;
        for uids in deployment.allowed_consumer.values() {
            for uid in uids {
                self.acl.add_perm(entry, crate::acl::Permission::ReadOnly);
                self.acl.set_qualifier(entry, *uid);
                entry += 1;
            }
        }
        0o440
    }

    /// Existence + usage marker handling, deciding between a fresh-create
    /// and a reopen-adopt path. Returns the outcome plus the locks the
    /// caller must hold for the offer's lifetime (existence lock) or until
    /// stop-offer (usage lock handle, re-checked there).
    pub fn acquire_markers(
        &self,
        service_id: ServiceId,
        instance_id: InstanceId,
    ) -> Result<(OsFileLock, OsFileLock, OfferOutcome)> {
        std::fs::create_dir_all(self.path_builder.partial_restart_dir())
            .map_err(|e| Error::BindingFailure(format!("partial restart dir: {e}")))?;

        let existence_path = self.path_builder.existence_marker_path(service_id, instance_id);
        let existence_lock = open_existence_marker(&existence_path)?;
        if !existence_lock.try_lock_exclusive_nonblocking()? {
            return Err(Error::BindingFailure(format!(
                "instance ({service_id}, {instance_id}) already has a live skeleton"
            )));
        }

        let usage_path = self.path_builder.usage_marker_path(service_id, instance_id);
        let usage_lock = open_usage_marker(&usage_path)?;
        let outcome = if usage_lock.try_lock_exclusive_nonblocking()? {
            OfferOutcome::Fresh
        } else {
            OfferOutcome::Reopened
        };

        Ok((existence_lock, usage_lock, outcome))
    }

    /// Removes the stale control/data SHM artefacts for (service, instance)
    /// ahead of a fresh create. Called indiscriminately whether the prior
    /// skeleton exited cleanly or crashed mid-offer — the source
    /// deliberately does not distinguish the two.
    pub fn remove_stale_artefacts<R: ShmRegion>(
        &self,
        service_id: ServiceId,
        instance_id: InstanceId,
        quality: QualityType,
    ) -> Result<()> {
        R::remove(&self.path_builder.data_shm_name(service_id, instance_id))?;
        R::remove(&self.path_builder.control_qm_shm_name(service_id, instance_id))?;
        if quality == QualityType::AsilB {
            R::remove(&self.path_builder.control_b_shm_name(service_id, instance_id))?;
        }
        Ok(())
    }

    /// Drops any in-progress writer allocations left by a crashed skeleton
    /// across every event in the reopened control region.
    pub fn cleanup_after_crash(&self, events: &[EventControl]) {
        for event in events {
            event.clear_torn_allocations();
        }
    }

    /// Runs the full skeleton-offer protocol: acquires the partial-restart
    /// markers, decides fresh-create vs. reopen-adopt from their state,
    /// and wires up the three SHM regions accordingly.
    ///
    /// Fresh (no live proxy survived a restart): wipes any stale artefacts
    /// left by an unclean prior stop, creates the regions at their
    /// computed sizes and ACL-derived permissions, and initialises their
    /// typed headers.
    ///
    /// Reopened (a proxy already holds the usage lock across this
    /// skeleton's restart): opens the existing regions, updates the
    /// recorded owning PID to this process, and rolls back any writer
    /// allocations a crashed predecessor left torn.
    pub fn offer<R: ShmRegion>(
        &self,
        service_id: ServiceId,
        instance_id: InstanceId,
        deployment: &LolaServiceInstanceDeployment,
        event_count: u32,
        per_event_slot_bytes: &[usize],
    ) -> Result<OfferedRegions<R>> {
        let asil_b = deployment.quality == QualityType::AsilB;
        let simulated = self.simulate_sizes(event_count as usize, per_event_slot_bytes, asil_b);
        let sizes = self.compute_sizes(deployment, simulated)?;
        let control_mode = self.control_permissions(deployment);
        let data_mode = self.data_permissions(deployment);

        let (existence_lock, usage_lock, outcome) = self.acquire_markers(service_id, instance_id)?;

        let data_name = self.path_builder.data_shm_name(service_id, instance_id);
        let control_qm_name = self.path_builder.control_qm_shm_name(service_id, instance_id);
        let control_b_name = self.path_builder.control_b_shm_name(service_id, instance_id);

        let (mut data, mut control_qm, mut control_b) = match outcome {
            OfferOutcome::Fresh => {
                self.remove_stale_artefacts::<R>(service_id, instance_id, deployment.quality)?;
                let data = R::create(&data_name, sizes.data, data_mode)?;
                let control_qm = R::create(&control_qm_name, sizes.control_qm, control_mode)?;
                let control_b = match sizes.control_b {
                    Some(size) => Some(R::create(&control_b_name, size, control_mode)?),
                    None => None,
                };
                (data, control_qm, control_b)
            }
            OfferOutcome::Reopened => {
                let data = R::open(&data_name)?;
                let control_qm = R::open(&control_qm_name)?;
                let control_b = if asil_b { Some(R::open(&control_b_name)?) } else { None };
                (data, control_qm, control_b)
            }
        };

        match outcome {
            OfferOutcome::Fresh => {
                ServiceDataStorage::init_in(data.as_mut_slice(), event_count);
                ServiceDataControl::init_in(control_qm.as_mut_slice(), event_count);
                if let Some(region) = control_b.as_mut() {
                    ServiceDataControl::init_in(region.as_mut_slice(), event_count);
                }
            }
            OfferOutcome::Reopened => {
                let pid = std::process::id();
                ServiceDataStorage::view(data.as_mut_slice()).update_skeleton_pid(pid);
                self.reclaim_control_region(control_qm.as_mut_slice(), event_count, pid);
                if let Some(region) = control_b.as_mut() {
                    self.reclaim_control_region(region.as_mut_slice(), event_count, pid);
                }
            }
        }

        Ok(OfferedRegions {
            outcome,
            existence_lock,
            usage_lock,
            data,
            control_qm,
            control_b,
        })
    }

    /// Updates a reopened control region's owning PID and rolls back any
    /// writer allocations its predecessor left torn.
    fn reclaim_control_region(&self, bytes: &mut [u8], event_count: u32, pid: u32) {
        ServiceDataControl::view(bytes)
            .skeleton_pid
            .store(pid, std::sync::atomic::Ordering::SeqCst);
        self.cleanup_after_crash(ServiceDataControl::event_controls(bytes, event_count as usize));
    }

    /// Release sequence on clean stop-offer: remove SHM objects only when
    /// the usage lock can be exclusively acquired at that moment (no proxy
    /// remains), then drop the existence lock.
    pub fn stop_offer<R: ShmRegion>(
        &self,
        service_id: ServiceId,
        instance_id: InstanceId,
        quality: QualityType,
        existence_lock: OsFileLock,
        usage_lock: &dyn FileLock,
    ) -> Result<bool> {
        let removed = if usage_lock.try_lock_exclusive_nonblocking()? {
            self.remove_stale_artefacts::<R>(service_id, instance_id, quality)?;
            true
        } else {
            false
        };

        existence_lock.unlock()?;
        let existence_path = self.path_builder.existence_marker_path(service_id, instance_id);
        let _ = std::fs::remove_file(existence_path);

        Ok(removed)
    }
}

/// Per-event slot-byte requirement keyed by event name, used to drive
/// `simulate_sizes`'s data-region total.
pub type PerEventSizes = HashMap<String, usize>;

/// In-process stand-in for `OsShmRegion`, backed by a process-global byte
/// map keyed by region name so tests can exercise fresh-create/reopen
/// without touching the real OS SHM namespace.
#[cfg(test)]
pub struct FakeShmRegion {
    name: String,
    bytes: Vec<u8>,
}

#[cfg(test)]
fn fake_shm_store() -> &'static std::sync::Mutex<HashMap<String, Vec<u8>>> {
    static STORE: std::sync::OnceLock<std::sync::Mutex<HashMap<String, Vec<u8>>>> = std::sync::OnceLock::new();
    STORE.get_or_init(|| std::sync::Mutex::new(HashMap::new()))
}

#[cfg(test)]
impl ShmRegion for FakeShmRegion {
    fn create(name: &str, size: usize, _mode: u32) -> Result<Self> {
        let mut store = fake_shm_store().lock().unwrap();
        if store.contains_key(name) {
            return Err(Error::ErroneousFileHandle(format!("{name} already exists")));
        }
        let bytes = vec![0u8; size];
        store.insert(name.to_string(), bytes.clone());
        Ok(Self {
            name: name.to_string(),
            bytes,
        })
    }

    fn open(name: &str) -> Result<Self> {
        let store = fake_shm_store().lock().unwrap();
        let bytes = store
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ErroneousFileHandle(format!("{name} does not exist")))?;
        Ok(Self {
            name: name.to_string(),
            bytes,
        })
    }

    fn remove(name: &str) -> Result<()> {
        fake_shm_store().lock().unwrap().remove(name);
        Ok(())
    }

    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

#[cfg(test)]
impl Drop for FakeShmRegion {
    fn drop(&mut self) {
        fake_shm_store().lock().unwrap().insert(self.name.clone(), self.bytes.clone());
    }
}
