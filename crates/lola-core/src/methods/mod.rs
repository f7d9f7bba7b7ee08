//! Method call transport: type-erased argument marshalling plus the
//! fixed-capacity call queue that serialises in-flight invocations.

pub mod call;
pub mod layout;
pub mod queue;

pub use call::{call_copying, call_zero_copy};
pub use layout::{pack_arg, unpack_arg, TypeErasedLayout, TypeLayout};
pub use queue::{assert_common_queue_position, InArgPtr, MethodCallQueue, ReturnPtr, CALL_QUEUE_SIZE};
