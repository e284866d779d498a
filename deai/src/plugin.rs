//! Plugin loading (part of component I).
//!
//! A plugin is a shared object exporting a single `di_plugin_init`
//! symbol with the signature `extern "C" fn(*const Object) -> i32`. The
//! loader keeps the `libloading::Library` alive for the process lifetime
//! (plugins are never unloaded while the runtime is up — matching the
//! original, which never calls `dlclose`), and treats a non-zero return
//! from the init function as a load failure.

use std::path::Path;

use libloading::{Library, Symbol};
use log::debug;

use deai_core::error::DiError;
use deai_core::object::ObjectRef;

/// C ABI signature every plugin's entry point must match.
pub type PluginInitFn = unsafe extern "C" fn(root: *const ObjectRef) -> i32;

pub struct Plugin {
    path: std::path::PathBuf,
    #[allow(dead_code)]
    library: Library,
}

impl Plugin {
    pub fn load(path: &Path) -> Result<Plugin, DiError> {
        // SAFETY: loading an arbitrary shared object is inherently
        // unsafe; the caller is trusted to only point this at actual
        // deai plugins, same trust boundary the original's `dlopen`
        // call sits behind.
        let library = unsafe { Library::new(path) }
            .map_err(|e| DiError::other(format!("dlopen {}: {e}", path.display())))?;
        debug!("loaded plugin library {}", path.display());
        Ok(Plugin { path: path.to_path_buf(), library })
    }

    pub fn init(&self, root: &ObjectRef) -> Result<(), DiError> {
        let init_fn: Symbol<PluginInitFn> = unsafe {
            self.library
                .get(b"di_plugin_init")
                .map_err(|e| DiError::other(format!("{}: missing di_plugin_init: {e}", self.path.display())))?
        };
        let rc = unsafe { init_fn(root as *const ObjectRef) };
        if rc != 0 {
            return Err(DiError::other(format!(
                "{}: di_plugin_init returned {rc}",
                self.path.display()
            )));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
