//! The embeddable plugin host built on `deai-core`: mainloop integration
//! hooks (component H), the module registry and plugin ABI (component I),
//! and the builtin modules (`log`, `os`, `spawn`, `event`) the
//! entry-point lifecycle in spec §4.8 installs before any plugin runs.

pub mod builtin;
#[cfg(feature = "mainloop")]
pub mod mainloop;
pub mod module;
pub mod objset;
pub mod plugin;

pub use module::Runtime;
pub use plugin::Plugin;

pub use deai_core::{DiError, ObjectRef, Variant};
