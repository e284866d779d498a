//! Root set (component G).
//!
//! A root is just a strong reference the runtime holds on an object's
//! behalf so it survives independent of any other referrer. Named roots
//! live at `__root_<name>`-style keys; anonymous roots are keyed by a
//! monotonically increasing handle. Clearing walks a snapshot of the
//! anonymous roots and drops each one individually (rather than dropping
//! the whole collection at once), so a root's own drop glue — which may
//! itself try to remove a still-present root — never observes a
//! partially-torn-down set.

use std::collections::HashMap;

use crate::object::ObjectRef;

pub type RootHandle = u64;

#[derive(Default)]
pub struct RootSet {
    named: HashMap<String, ObjectRef>,
    anonymous: HashMap<RootHandle, ObjectRef>,
    next_handle: RootHandle,
}

impl RootSet {
    pub fn new() -> Self {
        RootSet { named: HashMap::new(), anonymous: HashMap::new(), next_handle: 1 }
    }

    pub fn add_named(&mut self, name: impl Into<String>, obj: ObjectRef) {
        self.named.insert(name.into(), obj);
    }

    pub fn remove_named(&mut self, name: &str) -> Option<ObjectRef> {
        self.named.remove(name)
    }

    pub fn get_named(&self, name: &str) -> Option<ObjectRef> {
        self.named.get(name).cloned()
    }

    /// §4.6 requires the anonymous-handle counter to never wrap, asserted
    /// unconditionally rather than left to Rust's debug-only overflow
    /// panic (which the default release profile compiles out).
    pub fn add_anonymous(&mut self, obj: ObjectRef) -> RootHandle {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.checked_add(1).expect("anonymous root handle counter wrapped");
        self.anonymous.insert(handle, obj);
        handle
    }

    pub fn remove_anonymous(&mut self, handle: RootHandle) -> Option<ObjectRef> {
        self.anonymous.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.named.len() + self.anonymous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every root, one at a time from a snapshot of the current
    /// keys, so a root whose own destruction removes another root (or
    /// itself, redundantly) doesn't race the clearing loop.
    pub fn clear(&mut self) {
        let named_keys: Vec<String> = self.named.keys().cloned().collect();
        for key in named_keys {
            self.named.remove(&key);
        }
        let anon_keys: Vec<RootHandle> = self.anonymous.keys().copied().collect();
        for key in anon_keys {
            self.anonymous.remove(&key);
        }
    }

    pub fn named_iter(&self) -> impl Iterator<Item = (&str, &ObjectRef)> {
        self.named.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn anonymous_iter(&self) -> impl Iterator<Item = &ObjectRef> {
        self.anonymous.values()
    }
}
