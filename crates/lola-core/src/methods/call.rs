//! Method call operator variants: packs arguments through the call queue's
//! slot storage, dispatches over the message-passing transport, and
//! unpacks the response.

use super::layout::unpack_arg;
use super::queue::{assert_common_queue_position, MethodCallQueue};
use crate::error::{Error, Result};
use crate::identifiers::ElementFqId;
use crate::messaging::MessagePassingService;

/// Sends a packed argument payload to `element`'s method over `transport`
/// and returns the raw response payload. Both call operator variants
/// funnel through here; only how the payload bytes were assembled differs.
fn do_call(transport: &dyn MessagePassingService, element: ElementFqId, payload: Vec<u8>) -> Result<Vec<u8>> {
    transport.invoke_method(element, payload)
}

fn read_response_into(response: &[u8], dst: *mut u8, expected_len: usize) -> Result<()> {
    if response.len() != expected_len {
        return Err(Error::BindingFailure(format!(
            "method response size mismatch: got {} bytes, expected {expected_len}",
            response.len()
        )));
    }
    // SAFETY: `dst` is the call's return slot, sized to `expected_len` by
    // `MethodCallQueue::new`; `response.len() == expected_len` was just checked.
    unsafe { std::ptr::copy_nonoverlapping(response.as_ptr(), dst, expected_len) };
    Ok(())
}

/// Copying call operator: `pack` writes the argument values into a
/// caller-owned staging buffer sized per `queue.arg_layout()`; the staged
/// bytes are then copied into the queue slot before dispatch. Two copies
/// of the argument bytes in total — matches the non-zero-copy
/// `ProxyMethod::operator()` overload, the default for callers who pass
/// ordinary owned values rather than references into shared memory.
pub fn call_copying<R: Copy>(
    queue: &MethodCallQueue,
    transport: &dyn MessagePassingService,
    element: ElementFqId,
    pack: impl FnOnce(*mut u8),
) -> Result<R> {
    let (in_arg, ret) = queue.allocate()?;
    assert_common_queue_position(&in_arg, &ret);

    let arg_layout = queue.arg_layout();
    let alloc_layout = arg_layout.alloc_layout();
    // SAFETY: `alloc_layout` is a valid, non-zero-sized layout computed by
    // `TypeErasedLayout::alloc_layout`; the allocation is freed below
    // before returning on every path.
    let staging = unsafe { std::alloc::alloc(alloc_layout) };
    if staging.is_null() {
        return Err(Error::BindingFailure("argument staging buffer allocation failed".into()));
    }
    pack(staging);
    // SAFETY: `staging` and `in_arg.buffer()` are both `arg_layout.size`
    // bytes, non-overlapping, just-allocated/queue-owned buffers.
    unsafe {
        std::ptr::copy_nonoverlapping(staging, in_arg.buffer(), arg_layout.size);
        std::alloc::dealloc(staging, alloc_layout);
    }

    // SAFETY: `in_arg.buffer()` is valid for `arg_layout.size` bytes.
    let payload = unsafe { std::slice::from_raw_parts(in_arg.buffer(), arg_layout.size).to_vec() };
    let response = do_call(transport, element, payload)?;

    let return_layout = queue.return_layout();
    read_response_into(&response, ret.buffer(), return_layout.size)?;
    // SAFETY: `ret.buffer()` was just filled with `return_layout.size`
    // bytes matching `R`'s layout by `read_response_into`.
    let value = unsafe { *unpack_arg::<R>(ret.buffer(), return_layout, 0) };
    Ok(value)
}

/// Zero-copy call operator: `pack` writes arguments directly into the
/// slot's own buffer via [`super::layout::pack_arg`], with no staging
/// copy; the response is written directly into the slot's return buffer
/// and read back from there. Matches the zero-copy `ProxyMethod`
/// overload used when the caller already holds references into the
/// region backing argument storage.
pub fn call_zero_copy<R: Copy>(
    queue: &MethodCallQueue,
    transport: &dyn MessagePassingService,
    element: ElementFqId,
    pack: impl FnOnce(*mut u8),
) -> Result<R> {
    let (in_arg, ret) = queue.allocate()?;
    assert_common_queue_position(&in_arg, &ret);

    let arg_layout = queue.arg_layout();
    pack(in_arg.buffer());

    // SAFETY: `in_arg.buffer()` is valid for `arg_layout.size` bytes.
    let payload = unsafe { std::slice::from_raw_parts(in_arg.buffer(), arg_layout.size).to_vec() };
    let response = do_call(transport, element, payload)?;

    let return_layout = queue.return_layout();
    read_response_into(&response, ret.buffer(), return_layout.size)?;
    // SAFETY: see `call_copying`.
    let value = unsafe { *unpack_arg::<R>(ret.buffer(), return_layout, 0) };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::{ElementType, InstanceId, ServiceId};
    use crate::messaging::FakeMessagePassingService;
    use crate::methods::layout::{pack_arg, TypeErasedLayout, TypeLayout};
    use crate::methods::queue::MethodCallQueue;

    fn element() -> ElementFqId {
        ElementFqId::new(ServiceId::new(7), 1, InstanceId::new(1), ElementType::Method)
    }

    fn queue_for_u32_arg() -> MethodCallQueue {
        MethodCallQueue::new(
            1,
            TypeErasedLayout::single(TypeLayout::of::<u32>()),
            TypeErasedLayout::single(TypeLayout::of::<u32>()),
        )
    }

    fn doubling_service() -> FakeMessagePassingService {
        let service = FakeMessagePassingService::new();
        let scope = crate::registration::Scope::new();
        std::mem::forget(service.register_method_handler(
            element(),
            Box::new(|payload| {
                let arg = u32::from_ne_bytes(payload.try_into().unwrap());
                (arg * 2).to_ne_bytes().to_vec()
            }),
            scope,
        ));
        service
    }

    #[test]
    fn copying_call_round_trips_through_handler() {
        let queue = queue_for_u32_arg();
        let service = doubling_service();

        let layout = queue.arg_layout().clone();
        let result: u32 = call_copying(&queue, &service, element(), |buf| unsafe {
            pack_arg(buf, &layout, 0, &21u32);
        })
        .unwrap();

        assert_eq!(result, 42);
    }

    #[test]
    fn zero_copy_call_round_trips_through_handler() {
        let queue = queue_for_u32_arg();
        let service = doubling_service();

        let layout = queue.arg_layout().clone();
        let result: u32 = call_zero_copy(&queue, &service, element(), |buf| unsafe {
            pack_arg(buf, &layout, 0, &10u32);
        })
        .unwrap();

        assert_eq!(result, 20);
    }

    #[test]
    fn mismatched_response_size_is_an_error() {
        let queue = queue_for_u32_arg();
        let service = FakeMessagePassingService::new();
        let scope = crate::registration::Scope::new();
        std::mem::forget(
            service.register_method_handler(element(), Box::new(|_payload| vec![0u8; 1]), scope),
        );

        let layout = queue.arg_layout().clone();
        let result: Result<u32> = call_copying(&queue, &service, element(), |buf| unsafe {
            pack_arg(buf, &layout, 0, &1u32);
        });

        assert!(result.is_err());
    }
}
