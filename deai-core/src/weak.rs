//! Re-export point for [`WeakObjectRef`], kept as its own module so other
//! modules (notably `variant`) don't need to depend on all of `object`'s
//! internals just to name the weak-reference type.

pub use crate::object::WeakObjectRef;
