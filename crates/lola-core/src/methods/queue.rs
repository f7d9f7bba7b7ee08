//! Fixed-capacity per-instance method call queue.
//!
//! Follows the in-arg/return pointer-active flag split used by
//! `original_source/.../methods/proxy_method*.h`.
//! `CALL_QUEUE_SIZE` stays the compile-time constant `1`: a config asking
//! for anything else is rejected at validation time in `lola-config`, not
//! honoured here.

use super::layout::TypeErasedLayout;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Queue depth for every `ProxyMethod` instance. With depth 1, the queue
/// serialises method calls.
pub const CALL_QUEUE_SIZE: usize = 1;

/// Fixed-size byte storage backing one slot's argument or return value.
/// Never resized after construction, so a raw pointer into it stays valid
/// for the queue's lifetime.
struct SlotBuffer {
    bytes: Box<[UnsafeCell<u8>]>,
}

impl SlotBuffer {
    fn new(size: usize) -> Self {
        Self {
            bytes: (0..size.max(1)).map(|_| UnsafeCell::new(0u8)).collect(),
        }
    }

    fn as_mut_ptr(&self) -> *mut u8 {
        self.bytes.as_ptr() as *mut u8
    }
}

// SAFETY: access to the underlying bytes is externally serialised by
// `SlotFlags` — `CALL_QUEUE_SIZE` caps concurrency to one in-flight call
// per slot, and `MethodCallQueue::allocate` only hands out a slot once its
// flags are clear.
unsafe impl Sync for SlotBuffer {}

#[derive(Debug, Default)]
struct SlotFlags {
    /// One flag per configured in-arg; all false means the slot is free to
    /// receive a new call's arguments.
    in_arg_active: Vec<AtomicBool>,
    return_active: AtomicBool,
}

impl SlotFlags {
    fn new(arg_count: usize) -> Self {
        Self {
            in_arg_active: (0..arg_count).map(|_| AtomicBool::new(false)).collect(),
            return_active: AtomicBool::new(false),
        }
    }

    fn is_free(&self, has_in_args: bool) -> bool {
        let return_free = !self.return_active.load(Ordering::Acquire);
        if !has_in_args {
            return return_free;
        }
        return_free && self.in_arg_active.iter().all(|f| !f.load(Ordering::Acquire))
    }
}

struct Slot {
    flags: SlotFlags,
    arg_buffer: SlotBuffer,
    return_buffer: SlotBuffer,
}

/// Fixed-capacity call queue for one proxy method instance. Owns the byte
/// storage call operators pack arguments into and unpack return values
/// from, sized once from the method's argument/return layouts.
pub struct MethodCallQueue {
    arg_count: usize,
    arg_layout: TypeErasedLayout,
    return_layout: TypeErasedLayout,
    slots: Vec<Arc<Slot>>,
    /// Guards slot-acquisition decisions; pointer-activity
    /// flags need no atomicity beyond this since per-instance concurrency
    /// is capped at `CALL_QUEUE_SIZE`, but acquiring a slot and then
    /// marking it active must be observed as one step by concurrent callers.
    acquire_lock: Mutex<()>,
}

impl MethodCallQueue {
    pub fn new(arg_count: usize, arg_layout: TypeErasedLayout, return_layout: TypeErasedLayout) -> Self {
        let slots = (0..CALL_QUEUE_SIZE)
            .map(|_| {
                Arc::new(Slot {
                    flags: SlotFlags::new(arg_count),
                    arg_buffer: SlotBuffer::new(arg_layout.size),
                    return_buffer: SlotBuffer::new(return_layout.size),
                })
            })
            .collect();
        Self {
            arg_count,
            arg_layout,
            return_layout,
            slots,
            acquire_lock: Mutex::new(()),
        }
    }

    pub fn arg_layout(&self) -> &TypeErasedLayout {
        &self.arg_layout
    }

    pub fn return_layout(&self) -> &TypeErasedLayout {
        &self.return_layout
    }

    /// Finds the lowest-index free slot and marks it active, returning
    /// scoped handles that release the slot on drop. Fails with
    /// `CallQueueFull` if none is free.
    pub fn allocate(&self) -> Result<(InArgPtr, ReturnPtr)> {
        let _guard = self.acquire_lock.lock();
        let has_in_args = self.arg_count > 0;

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.flags.is_free(has_in_args) {
                for flag in &slot.flags.in_arg_active {
                    flag.store(true, Ordering::Release);
                }
                slot.flags.return_active.store(true, Ordering::Release);
                return Ok((
                    InArgPtr {
                        slot: slot.clone(),
                        queue_position: index,
                        released: false,
                    },
                    ReturnPtr {
                        slot: slot.clone(),
                        queue_position: index,
                        released: false,
                    },
                ));
            }
        }

        Err(Error::CallQueueFull)
    }
}

/// Scoped handle over a call's in-arg storage. Move-only; clears the
/// slot's in-arg flags on drop iff not already released.
pub struct InArgPtr {
    slot: Arc<Slot>,
    queue_position: usize,
    released: bool,
}

impl InArgPtr {
    pub fn queue_position(&self) -> usize {
        self.queue_position
    }

    /// Raw pointer to this call's argument buffer, sized by the queue's
    /// `arg_layout`. The zero-copy call operator packs arguments straight
    /// into this storage with no intermediate staging buffer.
    pub fn buffer(&self) -> *mut u8 {
        self.slot.arg_buffer.as_mut_ptr()
    }
}

impl Drop for InArgPtr {
    fn drop(&mut self) {
        if !self.released {
            for flag in &self.slot.flags.in_arg_active {
                flag.store(false, Ordering::Release);
            }
        }
    }
}

/// Scoped handle over a call's return-value storage. Move-only; clears the
/// slot's return flag on drop iff not already released.
pub struct ReturnPtr {
    slot: Arc<Slot>,
    queue_position: usize,
    released: bool,
}

impl ReturnPtr {
    pub fn queue_position(&self) -> usize {
        self.queue_position
    }

    /// Raw pointer to this call's return-value buffer, sized by the
    /// queue's `return_layout`.
    pub fn buffer(&self) -> *mut u8 {
        self.slot.return_buffer.as_mut_ptr()
    }
}

impl Drop for ReturnPtr {
    fn drop(&mut self) {
        if !self.released {
            self.slot.flags.return_active.store(false, Ordering::Release);
        }
    }
}

/// Zero-copy call requires every argument pointer to share one queue
/// position; a mismatch is a precondition violation.
pub fn assert_common_queue_position(in_arg: &InArgPtr, ret: &ReturnPtr) {
    assert_eq!(
        in_arg.queue_position(),
        ret.queue_position(),
        "in-arg and return pointers must share a queue position"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::layout::{TypeErasedLayout, TypeLayout};

    fn layouts() -> (TypeErasedLayout, TypeErasedLayout) {
        (
            TypeErasedLayout::single(TypeLayout::of::<u32>()),
            TypeErasedLayout::single(TypeLayout::of::<u32>()),
        )
    }

    #[test]
    fn s6_queue_full_then_recovers_on_release() {
        let (arg_layout, return_layout) = layouts();
        let queue = MethodCallQueue::new(1, arg_layout, return_layout);
        let (in_arg, ret) = queue.allocate().expect("first allocate succeeds");

        match queue.allocate() {
            Err(Error::CallQueueFull) => {}
            Ok(_) => panic!("expected CallQueueFull, got Ok"),
            Err(other) => panic!("expected CallQueueFull, got {other:?}"),
        }

        drop(in_arg);
        drop(ret);

        queue.allocate().expect("slot is free again after release");
    }

    #[test]
    fn methods_without_in_args_only_gate_on_return_flag() {
        let (arg_layout, return_layout) = layouts();
        let queue = MethodCallQueue::new(0, arg_layout, return_layout);
        let (_in_arg, _ret) = queue.allocate().expect("first allocate succeeds");
        assert!(matches!(queue.allocate(), Err(Error::CallQueueFull)));
    }

    #[test]
    fn allocated_pointers_share_queue_position() {
        let (arg_layout, return_layout) = layouts();
        let queue = MethodCallQueue::new(2, arg_layout, return_layout);
        let (in_arg, ret) = queue.allocate().unwrap();
        assert_common_queue_position(&in_arg, &ret);
    }

    #[test]
    fn slot_buffers_are_sized_from_layouts() {
        let arg_layout = TypeErasedLayout::aggregate(&[TypeLayout::of::<u8>(), TypeLayout::of::<u32>()]);
        let return_layout = TypeErasedLayout::single(TypeLayout::of::<u64>());
        let expected_arg_size = arg_layout.size;
        let expected_return_size = return_layout.size;
        let queue = MethodCallQueue::new(2, arg_layout, return_layout);
        let (in_arg, ret) = queue.allocate().unwrap();

        unsafe {
            std::ptr::write_bytes(in_arg.buffer(), 0xAB, expected_arg_size);
            std::ptr::write_bytes(ret.buffer(), 0xCD, expected_return_size);
            assert_eq!(*in_arg.buffer(), 0xAB);
            assert_eq!(*ret.buffer(), 0xCD);
        }
    }
}
