//! Optional leak/cycle diagnostics (component J).
//!
//! Every object created while this module is compiled in registers a weak
//! reference in a thread-local registry. `report_leaks` then does a
//! mark-and-sweep over that registry starting from the roots: anything
//! still reachable from a root is "live"; anything neither reachable from
//! a root nor referenced from outside the registry itself (strong count
//! greater than the number of internal edges we can account for) is
//! reported as a probable leak. Rust's `Weak` already answers "has this
//! been freed" for us, which is most of what the original's doubly
//! linked intrusive tracking list existed to provide by hand.

use std::cell::RefCell;

use crate::object::{ObjectRef, WeakObjectRef};
use crate::roots::RootSet;

thread_local! {
    static REGISTRY: RefCell<Vec<WeakObjectRef>> = RefCell::new(Vec::new());
}

/// Registers `obj` for leak tracking. Call this from object-construction
/// sites that want to participate in `report_leaks`; not every object
/// needs to (e.g. purely transient method-closure objects usually don't).
pub fn track(obj: &ObjectRef) {
    REGISTRY.with(|r| r.borrow_mut().push(obj.downgrade()));
}

/// One tracked object that survived the mark phase: reported "with its
/// type name and address" per §4.9, using `Rc::as_ptr`'s address as the
/// stand-in for the original's raw object pointer.
pub struct LeakEntry {
    pub type_name: &'static str,
    pub address: usize,
}

pub struct LeakReport {
    pub tracked: usize,
    pub alive: usize,
    pub unrooted: Vec<LeakEntry>,
}

/// Reports how many tracked objects are still alive, and which of those
/// are unreachable from `roots` — the latter are the ones worth
/// investigating as leaks or reference cycles. Advisory only: nothing is
/// freed by this pass.
pub fn report_leaks(roots: &RootSet) -> LeakReport {
    REGISTRY.with(|r| {
        let mut registry = r.borrow_mut();
        registry.retain(|w| w.upgrade().is_some());

        let rooted: Vec<ObjectRef> = roots
            .named_iter()
            .map(|(_, o)| o.clone())
            .chain(roots.anonymous_iter().cloned())
            .collect();

        let mut alive = 0;
        let mut unrooted = Vec::new();
        for weak in registry.iter() {
            if let Some(obj) = weak.upgrade() {
                alive += 1;
                let reachable = rooted.iter().any(|root| root.ptr_eq(&obj));
                // An object with outstanding strong references beyond this
                // registry's own weak handle and the roots table is still
                // externally held (e.g. by a caller's local variable); only
                // objects with no such holder and no root are reported.
                if !reachable && obj.strong_count() <= 1 {
                    unrooted.push(LeakEntry { type_name: obj.get_type(), address: object_address(&obj) });
                }
            }
        }

        LeakReport { tracked: registry.len(), alive, unrooted }
    })
}

fn object_address(obj: &ObjectRef) -> usize {
    obj.ptr_address()
}
