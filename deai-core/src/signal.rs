//! Signal/listener registry (component D).
//!
//! Emission snapshots the listener list before invoking any callback, so a
//! handler that adds or removes listeners (including itself, via
//! `stop_listener`) never corrupts the walk in progress. A signal also
//! couples its own lifetime to the emitter's: attaching the first listener
//! takes a strong self-ref on the emitter (so the signal can't outlive the
//! object it watches while a listener is still attached) and fires
//! `__new_signal_<n>` if the emitter defines it; detaching the last
//! listener drops that self-ref and fires `__del_signal_<n>`. The reserved
//! `__destroyed` signal never takes the self-ref, since refing the emitter
//! from its own destruction signal would make it un-droppable; metamethods
//! are skipped for it and for any other signal whose name begins with
//! `__`. This mirrors
//! `di_listen_to_once` / `di_stop_listener` / `di_clear_listeners` in the
//! original object model.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::warn;

use crate::object::{ObjectRef, WeakObjectRef};
use crate::variant::Variant;

const DESTROYED_SIGNAL: &str = "__destroyed";

struct ListenerInner {
    id: u64,
    once: Cell<bool>,
    active: Cell<bool>,
    handler: RefCell<Option<ObjectRef>>,
}

/// One named signal's listener list, owned by the emitting object.
pub struct Signal {
    name: String,
    emitter: WeakObjectRef,
    listeners: RefCell<Vec<Rc<ListenerInner>>>,
    next_id: Cell<u64>,
    /// The emitter's self-ref, held only while `!listeners.is_empty()` and
    /// `name != "__destroyed"`.
    self_ref: RefCell<Option<ObjectRef>>,
}

impl Signal {
    pub fn new(name: impl Into<String>, emitter: WeakObjectRef) -> Self {
        Signal {
            name: name.into(),
            emitter,
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            self_ref: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    fn is_destroy(&self) -> bool {
        self.name == DESTROYED_SIGNAL
    }

    /// Calls `__new_signal_<name>` / `__del_signal_<name>` on the emitter if
    /// it defines one. Only fires for signal names that don't themselves
    /// begin with `__` — `__destroyed` and any other reserved signal are
    /// exempt, not just `__destroyed`.
    fn fire_metamethod(&self, prefix: &str) {
        if self.name.starts_with("__") {
            return;
        }
        let Some(emitter) = self.emitter.upgrade() else { return };
        let method_name = format!("{prefix}_{}", self.name);
        if let Some(Variant::Object(method)) = emitter.get_member(&method_name) {
            if let Err(e) = method.call(&[]) {
                warn!("{method_name} handler failed: {e}");
            }
        }
    }

    /// Attaches a new listener, taking a strong ref on `handler` and, for
    /// the first listener on a non-`__destroyed` signal, a strong self-ref
    /// on the emitter.
    pub fn listen(self: &Rc<Self>, once: bool, handler: ObjectRef) -> ListenerHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let inner = Rc::new(ListenerInner {
            id,
            once: Cell::new(once),
            active: Cell::new(true),
            handler: RefCell::new(Some(handler)),
        });

        let was_empty = self.listeners.borrow().is_empty();
        self.listeners.borrow_mut().push(inner.clone());

        if was_empty {
            self.fire_metamethod("__new_signal");
            if !self.is_destroy() {
                *self.self_ref.borrow_mut() = self.emitter.upgrade();
            }
        }

        ListenerHandle { signal: self.clone(), inner }
    }

    /// Detaches the listener with `id`, idempotent if it's already gone.
    /// Dropping the last listener fires `__del_signal_<name>` and releases
    /// the emitter self-ref.
    fn stop(&self, id: u64) {
        let removed = {
            let mut listeners = self.listeners.borrow_mut();
            match listeners.iter().position(|l| l.id == id) {
                Some(pos) => {
                    let l = listeners.remove(pos);
                    l.active.set(false);
                    l.handler.borrow_mut().take();
                    true
                }
                None => false,
            }
        };
        if removed && self.listeners.borrow().is_empty() {
            self.fire_metamethod("__del_signal");
            self.self_ref.borrow_mut().take();
        }
    }

    /// Detaches every listener at once (used by object finalization), still
    /// firing `__del_signal_<name>` for any signal that had listeners — the
    /// object's members are still intact at this point in the destruction
    /// sequence (§4.2.1 step 3 runs before member removal).
    pub fn clear(&self) {
        let had_listeners = !self.listeners.borrow().is_empty();
        let drained: Vec<Rc<ListenerInner>> = self.listeners.borrow_mut().drain(..).collect();
        for l in drained {
            l.active.set(false);
            l.handler.borrow_mut().take();
        }
        if had_listeners {
            self.fire_metamethod("__del_signal");
        }
        self.self_ref.borrow_mut().take();
    }

    /// Snapshots the active listeners and invokes each handler in
    /// registration order. Listeners added during emission only take effect
    /// on subsequent emissions; a `once` listener is stopped after firing.
    pub fn emit(&self, args: &[Variant]) {
        let snapshot: Vec<Rc<ListenerInner>> = self.listeners.borrow().clone();
        for l in &snapshot {
            if !l.active.get() {
                continue;
            }
            let handler = l.handler.borrow().clone();
            if let Some(h) = handler {
                if let Err(e) = h.call(args) {
                    warn!("listener on signal '{}' failed: {e}", self.name);
                }
            }
            if l.once.get() {
                self.stop(l.id);
            }
        }
    }
}

/// A handle returned by [`Signal::listen`] / [`crate::object::Object::listen`],
/// used to detach the listener later. Stopping is idempotent.
#[derive(Clone)]
pub struct ListenerHandle {
    signal: Rc<Signal>,
    inner: Rc<ListenerInner>,
}

impl ListenerHandle {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn stop(&self) {
        if self.inner.active.get() {
            self.signal.stop(self.inner.id);
        }
    }
}

/// Free-function form of the public contract in spec §4.3:
/// `listen(emitter, signal_name, handler, once)`.
pub fn listen(emitter: &ObjectRef, signal_name: &str, handler: ObjectRef, once: bool) -> ListenerHandle {
    emitter.listen(signal_name, once, handler)
}

/// Free-function form of `stop_listener(listener)`.
pub fn stop_listener(listener: &ListenerHandle) {
    listener.stop();
}

/// Free-function form of `emit(emitter, signal_name, args_tuple)`.
pub fn emit(emitter: &ObjectRef, signal_name: &str, args: &[Variant]) {
    emitter.emit(signal_name, args);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::raw_closure;
    use std::cell::RefCell as StdRefCell;

    fn counting_handler(counter: Rc<StdRefCell<i64>>) -> ObjectRef {
        raw_closure(move |_self, _args| {
            *counter.borrow_mut() += 1;
            Ok(Variant::Nil)
        })
    }

    #[test]
    fn first_listener_takes_self_ref_last_drops_it() {
        let emitter = ObjectRef::new();
        let counter = Rc::new(StdRefCell::new(0));
        let handler = counting_handler(counter);

        let weak = emitter.downgrade();
        let l = emitter.listen("tick", false, handler);
        drop(emitter);
        // The signal's self-ref keeps the emitter alive even though the
        // caller's own strong ref was dropped.
        assert!(weak.upgrade().is_some());

        l.stop();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn new_and_del_signal_metamethods_fire() {
        let emitter = ObjectRef::new();
        let new_calls = Rc::new(StdRefCell::new(0));
        let del_calls = Rc::new(StdRefCell::new(0));

        emitter
            .add_member("__new_signal_tick", Variant::Object(counting_handler(new_calls.clone())), false)
            .unwrap();
        emitter
            .add_member("__del_signal_tick", Variant::Object(counting_handler(del_calls.clone())), false)
            .unwrap();

        let counter = Rc::new(StdRefCell::new(0));
        let l = emitter.listen("tick", false, counting_handler(counter));
        assert_eq!(*new_calls.borrow(), 1);
        assert_eq!(*del_calls.borrow(), 0);

        l.stop();
        assert_eq!(*del_calls.borrow(), 1);
    }

    #[test]
    fn destroyed_signal_never_takes_self_ref() {
        let emitter = ObjectRef::new();
        let weak = emitter.downgrade();
        let counter = Rc::new(StdRefCell::new(0));
        let _l = emitter.listen(DESTROYED_SIGNAL, false, counting_handler(counter));
        drop(emitter);
        assert!(weak.upgrade().is_none());
    }
}
