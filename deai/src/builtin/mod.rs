//! Builtin modules `main` installs on the root object before any plugin
//! runs, mirroring `original_source/{event,log,os,spawn}.c`.

#[cfg(feature = "mainloop")]
pub mod event;
pub mod log;
pub mod os;
#[cfg(feature = "mainloop")]
pub mod spawn;
