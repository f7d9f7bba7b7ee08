//! RAII scoped handler registration.
//!
//! Grounded on
//! `original_source/.../messaging/method_subscription_registration_guard.{h,cpp}`
//! and `method_call_registration_guard.h`'s `ScopedOperation<MoveOnlyScopedFunction>`
//! pattern, re-expressed per the DESIGN NOTES as an `Arc<AtomicBool>` scope
//! flag instead of a template lifetime-scope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Coarse-grained cancellation token shared by every `ScopedRegistration`
/// tied to an owner's lifetime. Expiring the scope turns subsequent guard
/// drops into no-ops.
#[derive(Debug, Clone)]
pub struct Scope {
    live: Arc<AtomicBool>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Expires the scope: no guard constructed against it will fire again.
    pub fn expire(&self) {
        self.live.store(false, Ordering::Release);
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

/// Move-only RAII guard whose destructor invokes `action` iff `scope` is
/// still live. Used by the message-passing service to hand out
/// deregistration handles for event notifications and method invocations
/// without exposing the underlying table.
pub struct ScopedRegistration<F: FnOnce() + 'static> {
    scope: Scope,
    action: Option<F>,
}

impl<F: FnOnce() + 'static> ScopedRegistration<F> {
    pub fn new(scope: Scope, action: F) -> Self {
        Self {
            scope,
            action: Some(action),
        }
    }

    /// A guard whose drop never invokes anything — the moved-from state
    /// after a move-assign.
    fn disarmed(scope: Scope) -> Self {
        Self { scope, action: None }
    }
}

impl<F: FnOnce() + 'static> Drop for ScopedRegistration<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            if self.scope.is_live() {
                action();
            }
        }
    }
}

/// Move-assignment helper: assigning `src` into
/// `dst` fires `dst`'s prior action exactly once (if still armed and live),
/// then takes on `src`'s action while leaving `src` disarmed so its later
/// drop is a no-op.
pub fn move_assign<F: FnOnce() + 'static>(
    dst: &mut ScopedRegistration<F>,
    src: ScopedRegistration<F>,
) {
    let ScopedRegistration {
        scope: src_scope,
        action: src_action,
    } = src;

    if let Some(action) = dst.action.take() {
        if dst.scope.is_live() {
            action();
        }
    }

    dst.scope = src_scope;
    dst.action = src_action;
    // `src` has already been moved apart (field-by-field destructure); it
    // never reaches its own `Drop` impl, so there is no moved-from guard
    // left to disarm explicitly — matching the "suppress any later action
    // for the moved-from operand" contract.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fires_action_on_drop_while_scope_live() {
        let fired = Rc::new(RefCell::new(false));
        let scope = Scope::new();
        {
            let fired = fired.clone();
            let guard = ScopedRegistration::new(scope.clone(), move || *fired.borrow_mut() = true);
            drop(guard);
        }
        assert!(*fired.borrow());
    }

    #[test]
    fn suppresses_action_after_scope_expires() {
        let fired = Rc::new(RefCell::new(false));
        let scope = Scope::new();
        let fired_clone = fired.clone();
        let guard = ScopedRegistration::new(scope.clone(), move || *fired_clone.borrow_mut() = true);
        scope.expire();
        drop(guard);
        assert!(!*fired.borrow());
    }

    #[test]
    fn s5_move_assign_fires_prior_action_exactly_once() {
        let scope = Scope::new();
        let fired_1 = Rc::new(RefCell::new(0));
        let fired_2 = Rc::new(RefCell::new(0));

        let f1 = fired_1.clone();
        let mut g1 = ScopedRegistration::new(scope.clone(), move || *f1.borrow_mut() += 1);
        let f2 = fired_2.clone();
        let g2 = ScopedRegistration::new(scope.clone(), move || *f2.borrow_mut() += 1);

        move_assign(&mut g1, g2);
        assert_eq!(*fired_1.borrow(), 1, "g1's original action must fire exactly once");
        assert_eq!(*fired_2.borrow(), 0, "g2's action has not fired yet");

        drop(g1);
        assert_eq!(*fired_2.borrow(), 1, "g1 now owns g2's action and fires it once on drop");
    }

    #[test]
    fn disarmed_guard_never_fires() {
        let scope = Scope::new();
        let guard: ScopedRegistration<fn()> = ScopedRegistration::disarmed(scope);
        drop(guard);
    }
}
