//! Side-channel message-passing transport: event notifications and method
//! invocations travel here instead of through the SHM regions themselves.
//!
//! Uses length-prefixed JSON framing over a `UnixListener`/`UnixStream`
//! pair for the packet shapes named by the
//! `MessagePassingService` collaborator contract.

use crate::error::{Error, Result};
use crate::identifiers::ElementFqId;
use crate::registration::{Scope, ScopedRegistration};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;

/// Wire packet exchanged over the message-passing socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePacket {
    EventNotification { service_id: u16, instance_id: u16, element_id: u16 },
    MethodInvocation { service_id: u16, instance_id: u16, element_id: u16, payload: Vec<u8> },
    MethodResponse { payload: Vec<u8> },
}

impl MessagePacket {
    /// Length-prefixed JSON framing: 4-byte big-endian length, then the
    /// JSON body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
        framed.extend_from_slice(&body);
        Ok(framed)
    }

    pub fn read_from(stream: &mut impl Read) -> Result<MessagePacket> {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

type EventHandler = Box<dyn Fn() + Send + Sync>;
type MethodHandler = Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;
type DeregisterAction = Box<dyn FnOnce() + Send>;

/// Scoped registration handle returned by `register_*`; dropping it
/// deregisters the handler iff the owning scope is still live.
pub type RegistrationGuard = ScopedRegistration<DeregisterAction>;

/// Event notification / method invocation transport, with paired
/// register/unregister mediated through `ScopedRegistration`.
pub trait MessagePassingService: Send + Sync {
    fn notify_event(&self, element: ElementFqId) -> Result<()>;
    fn register_event_notification(&self, element: ElementFqId, handler: EventHandler, scope: Scope) -> RegistrationGuard;
    fn invoke_method(&self, element: ElementFqId, payload: Vec<u8>) -> Result<Vec<u8>>;
    fn register_method_handler(&self, element: ElementFqId, handler: MethodHandler, scope: Scope) -> RegistrationGuard;
}

/// Unix-domain-socket backed implementation. Listens for peer connections
/// and dispatches framed `MessagePacket`s to registered handlers.
pub struct UnixSocketMessagePassingService {
    event_handlers: Arc<DashMap<ElementFqId, Vec<Arc<EventHandler>>>>,
    method_handlers: Arc<DashMap<ElementFqId, Arc<MethodHandler>>>,
    socket_path: std::path::PathBuf,
}

impl UnixSocketMessagePassingService {
    pub fn bind(socket_path: impl Into<std::path::PathBuf>) -> Result<Self> {
        let socket_path = socket_path.into();
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(&socket_path)
            .map_err(|e| Error::BindingFailure(format!("bind({}): {e}", socket_path.display())))?;
        // Caller owns the accept loop on a dedicated thread;
        // we only need the path to dial outbound.
        drop(listener);
        Ok(Self {
            event_handlers: Arc::new(DashMap::new()),
            method_handlers: Arc::new(DashMap::new()),
            socket_path,
        })
    }

    fn dial(&self) -> Result<UnixStream> {
        UnixStream::connect(&self.socket_path)
            .map_err(|e| Error::BindingFailure(format!("connect({}): {e}", self.socket_path.display())))
    }
}

impl MessagePassingService for UnixSocketMessagePassingService {
    fn notify_event(&self, element: ElementFqId) -> Result<()> {
        let packet = MessagePacket::EventNotification {
            service_id: element.service_id.0,
            instance_id: element.instance_id.0,
            element_id: element.element_id,
        };
        let mut stream = self.dial()?;
        stream.write_all(&packet.to_bytes()?)?;

        if let Some(handlers) = self.event_handlers.get(&element) {
            for handler in handlers.iter() {
                handler();
            }
        }
        Ok(())
    }

    fn register_event_notification(&self, element: ElementFqId, handler: EventHandler, scope: Scope) -> RegistrationGuard {
        let handler = Arc::new(handler);
        self.event_handlers.entry(element).or_default().push(handler.clone());

        let handlers = self.event_handlers.clone();
        let action: DeregisterAction = Box::new(move || {
            if let Some(mut entry) = handlers.get_mut(&element) {
                entry.retain(|h| !Arc::ptr_eq(h, &handler));
            }
        });
        ScopedRegistration::new(scope, action)
    }

    fn invoke_method(&self, element: ElementFqId, payload: Vec<u8>) -> Result<Vec<u8>> {
        if let Some(handler) = self.method_handlers.get(&element) {
            return Ok(handler(&payload));
        }
        let packet = MessagePacket::MethodInvocation {
            service_id: element.service_id.0,
            instance_id: element.instance_id.0,
            element_id: element.element_id,
            payload,
        };
        let mut stream = self.dial()?;
        stream.write_all(&packet.to_bytes()?)?;
        match MessagePacket::read_from(&mut stream)? {
            MessagePacket::MethodResponse { payload } => Ok(payload),
            other => Err(Error::BindingFailure(format!("unexpected response packet: {other:?}"))),
        }
    }

    fn register_method_handler(&self, element: ElementFqId, handler: MethodHandler, scope: Scope) -> RegistrationGuard {
        let handler = Arc::new(handler);
        self.method_handlers.insert(element, handler);

        let handlers = self.method_handlers.clone();
        let action: DeregisterAction = Box::new(move || {
            handlers.remove(&element);
        });
        ScopedRegistration::new(scope, action)
    }
}

/// In-memory fake for unit tests: no sockets, direct handler invocation.
#[derive(Default)]
pub struct FakeMessagePassingService {
    event_handlers: Arc<DashMap<ElementFqId, Vec<Arc<EventHandler>>>>,
    method_handlers: Arc<DashMap<ElementFqId, Arc<MethodHandler>>>,
    notified: parking_lot::Mutex<Vec<ElementFqId>>,
}

impl FakeMessagePassingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notified_elements(&self) -> Vec<ElementFqId> {
        self.notified.lock().clone()
    }
}

impl MessagePassingService for FakeMessagePassingService {
    fn notify_event(&self, element: ElementFqId) -> Result<()> {
        self.notified.lock().push(element);
        if let Some(handlers) = self.event_handlers.get(&element) {
            for handler in handlers.iter() {
                handler();
            }
        }
        Ok(())
    }

    fn register_event_notification(&self, element: ElementFqId, handler: EventHandler, scope: Scope) -> RegistrationGuard {
        let handler = Arc::new(handler);
        self.event_handlers.entry(element).or_default().push(handler.clone());

        let handlers = self.event_handlers.clone();
        let action: DeregisterAction = Box::new(move || {
            if let Some(mut entry) = handlers.get_mut(&element) {
                entry.retain(|h| !Arc::ptr_eq(h, &handler));
            }
        });
        ScopedRegistration::new(scope, action)
    }

    fn invoke_method(&self, element: ElementFqId, payload: Vec<u8>) -> Result<Vec<u8>> {
        match self.method_handlers.get(&element) {
            Some(handler) => Ok(handler(&payload)),
            None => Err(Error::BindingFailure("no method handler registered".into())),
        }
    }

    fn register_method_handler(&self, element: ElementFqId, handler: MethodHandler, scope: Scope) -> RegistrationGuard {
        let handler = Arc::new(handler);
        self.method_handlers.insert(element, handler);

        let handlers = self.method_handlers.clone();
        let action: DeregisterAction = Box::new(move || {
            handlers.remove(&element);
        });
        ScopedRegistration::new(scope, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::{ElementType, InstanceId, ServiceId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn element() -> ElementFqId {
        ElementFqId::new(ServiceId::new(1), 1, InstanceId::new(1), ElementType::Event)
    }

    #[test]
    fn fake_service_invokes_registered_event_handler() {
        let service = FakeMessagePassingService::new();
        let scope = Scope::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let _guard = service.register_event_notification(
            element(),
            Box::new(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
            scope,
        );

        service.notify_event(element()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deregistered_handler_no_longer_fires() {
        let service = FakeMessagePassingService::new();
        let scope = Scope::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let guard = service.register_event_notification(
            element(),
            Box::new(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
            scope,
        );
        drop(guard);

        service.notify_event(element()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn method_invocation_routes_to_handler_response() {
        let service = FakeMessagePassingService::new();
        let scope = Scope::new();
        let _guard = service.register_method_handler(
            element(),
            Box::new(|payload| payload.iter().rev().copied().collect()),
            scope,
        );

        let response = service.invoke_method(element(), vec![1, 2, 3]).unwrap();
        assert_eq!(response, vec![3, 2, 1]);
    }

    #[test]
    fn invoking_unregistered_method_fails() {
        let service = FakeMessagePassingService::new();
        assert!(service.invoke_method(element(), vec![]).is_err());
    }
}
