//! Dynamic object runtime: tagged variants, refcounted objects with named
//! members and signals, typed dispatch, and the generic get/set/call
//! accessor protocol that `deai` is built on.

pub mod accessor;
pub mod containers;
pub mod dispatch;
pub mod error;
#[cfg(any(debug_assertions, feature = "leak_detector"))]
pub mod leak;
pub mod object;
pub mod roots;
pub mod signal;
pub mod strings;
pub mod variant;
mod weak;

pub use containers::{DiArray, DiTuple};
pub use error::DiError;
pub use object::{Object, ObjectRef, WeakObjectRef};
pub use roots::{RootHandle, RootSet};
pub use signal::{ListenerHandle, Signal};
pub use strings::DiString;
pub use variant::{Type, Variant};
