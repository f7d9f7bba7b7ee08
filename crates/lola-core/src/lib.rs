//! LoLa shared-memory IPC binding core.
//!
//! Implements the subsystem carrying the engineering weight of an
//! AUTOSAR-style ara::com shared-memory binding: SHM lifecycle and
//! partial-restart arbitration, filesystem-mediated service discovery,
//! scoped handler registration, and type-erased method call transport.
//! Configuration JSON parsing, ACL application, logging, and the
//! message-passing wire protocol itself are external collaborators named
//! in the public traits this crate exposes, not reimplemented here.

pub mod acl;
pub mod discovery;
pub mod error;
pub mod identifiers;
pub mod messaging;
pub mod methods;
pub mod path_builder;
pub mod registration;
pub mod runtime;
pub mod shm;

pub use error::{Error, Result};
pub use identifiers::{ElementFqId, ElementType, InstanceId, ServiceId};
pub use path_builder::PathBuilder;
pub use registration::{Scope, ScopedRegistration};
pub use runtime::Runtime;
