//! Typed SHM region headers.
//!
//! Atomics-in-shared-memory `repr(C, align(64))` headers for the
//! control/data split: a control region's `ServiceDataControl` head plus
//! per-event `EventControl` records, and a data region's
//! `ServiceDataStorage` head plus per-event slot arrays.

use std::sync::atomic::{AtomicU32, AtomicU64};

/// Per-event bookkeeping inside a control region. `data_control` tracks
/// concurrent writer allocations so `cleanup_after_crash` can roll back
/// torn transactions left by a skeleton that died mid-write.
#[repr(C, align(64))]
#[derive(Debug)]
pub struct EventControl {
    pub max_slots: AtomicU32,
    /// Bitset of slots currently allocated to an in-progress write.
    pub data_control: AtomicU64,
    pub subscriber_count: AtomicU32,
}

impl EventControl {
    pub fn new(max_slots: u32) -> Self {
        Self {
            max_slots: AtomicU32::new(max_slots),
            data_control: AtomicU64::new(0),
            subscriber_count: AtomicU32::new(0),
        }
    }

    /// Drops any in-progress writer allocations; called on reopen after an
    /// unclean restart.
    pub fn clear_torn_allocations(&self) {
        self.data_control.store(0, std::sync::atomic::Ordering::SeqCst);
    }
}

/// Head of a control SHM region (QM or ASIL-B). Followed in the mapped
/// region by `event_count` contiguous `EventControl` records.
#[repr(C, align(64))]
#[derive(Debug)]
pub struct ServiceDataControl {
    pub skeleton_pid: AtomicU32,
    pub event_count: AtomicU32,
}

impl ServiceDataControl {
    pub fn new(event_count: u32) -> Self {
        Self {
            skeleton_pid: AtomicU32::new(std::process::id()),
            event_count: AtomicU32::new(event_count),
        }
    }

    pub const fn header_size() -> usize {
        std::mem::size_of::<ServiceDataControl>()
    }

    /// Total byte size of the control region: header plus one
    /// `EventControl` per configured event.
    pub fn region_size(event_count: usize) -> usize {
        Self::header_size() + event_count * std::mem::size_of::<EventControl>()
    }

    /// Writes a fresh header at the start of `region` and returns a
    /// reference borrowed from it. `region` must be at least
    /// `header_size()` bytes; SHM mappings are page-aligned, always
    /// sufficient for this header's `align(64)`.
    pub fn init_in(region: &mut [u8], event_count: u32) -> &Self {
        assert!(
            region.len() >= Self::header_size(),
            "region too small for ServiceDataControl header"
        );
        let ptr = region.as_mut_ptr() as *mut Self;
        assert_eq!(
            ptr as usize % std::mem::align_of::<Self>(),
            0,
            "region is not sufficiently aligned for ServiceDataControl"
        );
        unsafe {
            ptr.write(Self::new(event_count));
            &*ptr
        }
    }

    /// Views an already-initialised header at the start of `region`
    /// without reinitialising it — used on reopen.
    pub fn view(region: &[u8]) -> &Self {
        assert!(
            region.len() >= Self::header_size(),
            "region too small for ServiceDataControl header"
        );
        let ptr = region.as_ptr() as *const Self;
        assert_eq!(
            ptr as usize % std::mem::align_of::<Self>(),
            0,
            "region is not sufficiently aligned for ServiceDataControl"
        );
        unsafe { &*ptr }
    }

    /// View of the `event_count` `EventControl` records following the
    /// header inside `region`.
    pub fn event_controls(region: &[u8], event_count: usize) -> &[EventControl] {
        let header_size = Self::header_size();
        assert!(
            region.len() >= header_size + event_count * std::mem::size_of::<EventControl>(),
            "region too small for {event_count} EventControl records"
        );
        let ptr = unsafe { region.as_ptr().add(header_size) as *const EventControl };
        unsafe { std::slice::from_raw_parts(ptr, event_count) }
    }
}

/// Head of the data SHM region. Followed by per-event sample slot arrays,
/// sized by each event's effective slot count.
#[repr(C, align(64))]
#[derive(Debug)]
pub struct ServiceDataStorage {
    pub skeleton_pid: AtomicU32,
    pub event_count: AtomicU32,
}

impl ServiceDataStorage {
    pub fn new(event_count: u32) -> Self {
        Self {
            skeleton_pid: AtomicU32::new(std::process::id()),
            event_count: AtomicU32::new(event_count),
        }
    }

    pub const fn header_size() -> usize {
        std::mem::size_of::<ServiceDataStorage>()
    }

    /// Total data-region byte size: header plus `sum(effective_slot_count * element_size)`
    /// across all events, as supplied by the caller (element size is a
    /// per-event type property this crate does not know).
    pub fn region_size(per_event_slot_bytes: &[usize]) -> usize {
        Self::header_size() + per_event_slot_bytes.iter().sum::<usize>()
    }

    /// Updates the recorded owning PID — the skeleton's new PID after a
    /// restart reopens an existing region.
    pub fn update_skeleton_pid(&self, pid: u32) {
        self.skeleton_pid.store(pid, std::sync::atomic::Ordering::SeqCst);
    }

    /// Writes a fresh header at the start of `region` and returns a
    /// reference borrowed from it.
    pub fn init_in(region: &mut [u8], event_count: u32) -> &Self {
        assert!(
            region.len() >= Self::header_size(),
            "region too small for ServiceDataStorage header"
        );
        let ptr = region.as_mut_ptr() as *mut Self;
        assert_eq!(
            ptr as usize % std::mem::align_of::<Self>(),
            0,
            "region is not sufficiently aligned for ServiceDataStorage"
        );
        unsafe {
            ptr.write(Self::new(event_count));
            &*ptr
        }
    }

    /// Views an already-initialised header at the start of `region`
    /// without reinitialising it — used on reopen.
    pub fn view(region: &[u8]) -> &Self {
        assert!(
            region.len() >= Self::header_size(),
            "region too small for ServiceDataStorage header"
        );
        let ptr = region.as_ptr() as *const Self;
        assert_eq!(
            ptr as usize % std::mem::align_of::<Self>(),
            0,
            "region is not sufficiently aligned for ServiceDataStorage"
        );
        unsafe { &*ptr }
    }
}
