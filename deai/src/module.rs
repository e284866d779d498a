//! Module registry & plugin entry (component I).
//!
//! `Runtime` is the process-lifetime context the Design Notes call for:
//! it owns the root set directly (rather than the original's single
//! process-global root table) so more than one `Runtime` can coexist in a
//! process, e.g. across independent integration tests.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, warn};
use tap::Tap;

use deai_core::dispatch::{method0, method1, method2, raw_closure};
use deai_core::error::DiError;
use deai_core::object::ObjectRef;
use deai_core::roots::{RootHandle, RootSet};
use deai_core::variant::{Type, Variant};

use crate::plugin::Plugin;

const DEFAULT_PLUGIN_PATH: &str = "/usr/lib/deai";

struct RuntimeState {
    roots: RefCell<RootSet>,
    modules: RefCell<IndexMap<String, ObjectRef>>,
    plugins: RefCell<Vec<Plugin>>,
    plugin_path: RefCell<Vec<PathBuf>>,
    argv: Vec<String>,
    proctitle: RefCell<String>,
    quit_requested: RefCell<bool>,
    exit_code: RefCell<Option<i32>>,
}

/// The embeddable host: root object, root set, module registry, plugin
/// loader and process lifecycle all in one context rather than behind
/// process-global statics.
pub struct Runtime {
    pub root: ObjectRef,
    state: Rc<RuntimeState>,
}

impl Runtime {
    pub fn new(argv: Vec<String>) -> Runtime {
        let proctitle = argv.first().cloned().unwrap_or_default();
        let plugin_path = std::env::var("DEAI_PLUGIN_PATH")
            .map(|p| std::env::split_paths(&p).collect::<Vec<_>>())
            .unwrap_or_else(|_| vec![PathBuf::from(DEFAULT_PLUGIN_PATH)]);

        let state = Rc::new(RuntimeState {
            roots: RefCell::new(RootSet::new()),
            modules: RefCell::new(IndexMap::new()),
            plugins: RefCell::new(Vec::new()),
            plugin_path: RefCell::new(plugin_path),
            argv,
            proctitle: RefCell::new(proctitle),
            quit_requested: RefCell::new(false),
            exit_code: RefCell::new(None),
        });

        let root = ObjectRef::new();
        Self::wire_root_accessors(&root, &state);
        Self::wire_process_control(&root, &state);

        Runtime { root, state }
    }

    fn wire_root_accessors(root: &ObjectRef, state: &Rc<RuntimeState>) {
        let s = state.clone();
        let _ = root.add_member(
            "__get_argv",
            Variant::Object(method0(move |_self| -> Result<Vec<String>, DiError> {
                Ok(s.argv.clone())
            })),
            false,
        );

        let s = state.clone();
        let _ = root.add_member(
            "__get_proctitle",
            Variant::Object(method0(move |_self| -> Result<String, DiError> {
                Ok(s.proctitle.borrow().clone())
            })),
            false,
        );

        let s = state.clone();
        let _ = root.add_member(
            "__set_proctitle",
            Variant::Object(method1(move |_self, title: Rc<str>| -> Result<(), DiError> {
                *s.proctitle.borrow_mut() = title.to_string();
                Ok(())
            })),
            false,
        );

        let s = state.clone();
        let _ = root.add_member(
            "__get_roots",
            Variant::Object(method0(move |_self| -> Result<Vec<String>, DiError> {
                Ok(s.roots.borrow().named_iter().map(|(k, _)| k.to_string()).collect())
            })),
            false,
        );
    }

    /// Mirrors §4.8's `chdir`/`exit`/`quit`/`exec`/`terminate`/
    /// `register_module`/`load_plugin`/`load_plugin_from_dir` as plain
    /// callable members on the root object, so a plugin or the `deai-cli`
    /// dispatcher can reach them the same way it reaches any other method.
    fn wire_process_control(root: &ObjectRef, state: &Rc<RuntimeState>) {
        let _ = root.add_member(
            "chdir",
            Variant::Object(method1(move |_owner, path: Rc<str>| -> Result<(), DiError> {
                std::env::set_current_dir(path.as_ref()).map_err(|e| DiError::other(format!("chdir: {e}")))
            })),
            false,
        );

        let s = state.clone();
        let _ = root.add_member(
            "exit",
            Variant::Object(method1(move |_owner, code: i64| -> Result<(), DiError> {
                *s.exit_code.borrow_mut() = Some(code as i32);
                *s.quit_requested.borrow_mut() = true;
                Ok(())
            })),
            false,
        );

        let s = state.clone();
        let _ = root.add_member(
            "quit",
            Variant::Object(method0(move |_owner| -> Result<(), DiError> {
                *s.quit_requested.borrow_mut() = true;
                Ok(())
            })),
            false,
        );

        let _ = root.add_member(
            "exec",
            Variant::Object(raw_closure(move |_owner, args| {
                let argv = args
                    .iter()
                    .map(|v| match v.convert(Type::String, true)? {
                        Variant::String(s) => Ok(s.to_string()),
                        other => Err(DiError::InvalidType { from: other.type_tag(), to: Type::String }),
                    })
                    .collect::<Result<Vec<String>, DiError>>()?;
                if argv.is_empty() {
                    return Err(DiError::InvalidArity { expected: 1, got: 0 });
                }
                use std::ffi::CString;
                let cargs: Vec<CString> =
                    argv.iter().map(|a| CString::new(a.as_str()).unwrap()).collect();
                let err = match nix::unistd::execvp(&cargs[0], &cargs) {
                    Ok(_) => unreachable!("execvp only returns on error"),
                    Err(e) => DiError::other(format!("exec: {e}")),
                };
                Err(err)
            })),
            false,
        );

        let s = state.clone();
        let _ = root.add_member(
            "terminate",
            Variant::Object(method0(move |owner| -> Result<(), DiError> {
                let s2 = s.clone();
                let _raise_quit = scopeguard::guard((), move |_| {
                    *s2.quit_requested.borrow_mut() = true;
                });
                owner.emit("__terminate", &[]);
                Ok(())
            })),
            false,
        );

        let s = state.clone();
        let _ = root.add_member(
            "register_module",
            Variant::Object(method2(move |owner, name: Rc<str>, module: ObjectRef| -> Result<(), DiError> {
                owner.add_member(&name, Variant::Object(module.clone()), false)?;
                s.modules.borrow_mut().insert(name.to_string(), module);
                Ok(())
            })),
            false,
        );

        let s = state.clone();
        let _ = root.add_member(
            "load_plugin",
            Variant::Object(method1(move |owner, path: Rc<str>| -> Result<(), DiError> {
                let plugin = Plugin::load(Path::new(path.as_ref()))?;
                plugin.init(owner)?;
                s.plugins.borrow_mut().push(plugin);
                Ok(())
            })),
            false,
        );

        let s = state.clone();
        let _ = root.add_member(
            "load_plugin_from_dir",
            Variant::Object(method1(move |owner, dir: Rc<str>| -> Result<i64, DiError> {
                Ok(load_plugins_from_dir(owner, &s, Path::new(dir.as_ref())) as i64)
            })),
            false,
        );
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.state.exit_code.borrow()
    }

    pub fn argv(&self) -> &[String] {
        &self.state.argv
    }

    pub fn proctitle(&self) -> String {
        self.state.proctitle.borrow().clone()
    }

    pub fn set_proctitle(&self, title: impl Into<String>) {
        *self.state.proctitle.borrow_mut() = title.into();
    }

    /// Registers a module object under `name` on the root object, so it
    /// becomes reachable as `root.<name>` through the accessor protocol.
    pub fn register_module(&self, name: &str, module: ObjectRef) -> Result<(), DiError> {
        self.root.add_member(name, Variant::Object(module.clone()), false)?;
        self.state.modules.borrow_mut().insert(name.to_string(), module);
        Ok(())
    }

    pub fn register_module_method(
        &self,
        module_name: &str,
        method_name: &str,
        method: ObjectRef,
    ) -> Result<(), DiError> {
        let module = self
            .state
            .modules
            .borrow()
            .get(module_name)
            .cloned()
            .ok_or_else(|| DiError::NotFound(module_name.to_string()))?;
        module.add_member(method_name, Variant::Object(method), false)
    }

    pub fn get_module(&self, name: &str) -> Option<ObjectRef> {
        self.state.modules.borrow().get(name).cloned()
    }

    pub fn add_root(&self, name: impl Into<String>, obj: ObjectRef) {
        self.state.roots.borrow_mut().add_named(name, obj);
    }

    pub fn remove_root(&self, name: &str) -> Option<ObjectRef> {
        self.state.roots.borrow_mut().remove_named(name)
    }

    pub fn add_anonymous_root(&self, obj: ObjectRef) -> RootHandle {
        self.state.roots.borrow_mut().add_anonymous(obj)
    }

    pub fn remove_anonymous_root(&self, handle: RootHandle) -> Option<ObjectRef> {
        self.state.roots.borrow_mut().remove_anonymous(handle)
    }

    pub fn clear_roots(&self) {
        self.state.roots.borrow_mut().clear();
    }

    /// The mainloop driver's stopping condition: once nothing keeps any
    /// object graph alive there is nothing left to run for.
    pub fn roots_is_empty(&self) -> bool {
        self.state.roots.borrow().is_empty()
    }

    /// `chdir` is exposed as a runtime operation (rather than left to the
    /// host process) since plugins may be relative-path-sensitive, same
    /// as the original's `di_chdir`.
    pub fn chdir(&self, path: impl AsRef<Path>) -> Result<(), DiError> {
        std::env::set_current_dir(path).map_err(|e| DiError::other(format!("chdir: {e}")))
    }

    /// Replaces the current process image, same as the original's
    /// `execvp`-based `di_exec`. Only returns if `execvp` itself fails.
    pub fn exec(&self, argv: &[String]) -> DiError {
        use std::ffi::CString;
        let cargs: Vec<CString> = argv.iter().map(|a| CString::new(a.as_str()).unwrap()).collect();
        match nix::unistd::execvp(&cargs[0], &cargs) {
            Ok(_) => unreachable!("execvp only returns on error"),
            Err(e) => DiError::other(format!("exec: {e}")),
        }
    }

    pub fn request_quit(&self) {
        *self.state.quit_requested.borrow_mut() = true;
    }

    pub fn quit_requested(&self) -> bool {
        *self.state.quit_requested.borrow()
    }

    /// Emits `__terminate` on the root object so listeners (builtin
    /// modules, plugins) can clean up before `quit` tears down roots. A
    /// listener that panics during cleanup must not stop `quit_requested`
    /// from being set, so the flag is raised through a scope guard rather
    /// than after `emit` returns.
    pub fn terminate(&self) {
        let state = self.state.clone();
        let _raise_quit = scopeguard::guard((), move |_| {
            *state.quit_requested.borrow_mut() = true;
        });
        self.root.emit("__terminate", &[]);
    }

    pub fn plugin_search_path(&self) -> Vec<PathBuf> {
        self.state.plugin_path.borrow().clone()
    }

    /// Loads a single plugin shared object and invokes its `di_plugin_init`
    /// entry point with this runtime's root object, mirroring
    /// `load_plugin_impl`.
    pub fn load_plugin(&self, path: impl AsRef<Path>) -> Result<(), DiError> {
        let plugin = Plugin::load(path.as_ref())?;
        plugin.init(&self.root)?;
        self.state.plugins.borrow_mut().push(plugin);
        Ok(())
    }

    /// Loads every `.so` in `dir`, logging (not failing) on individual
    /// plugin load errors, mirroring `load_plugin_from_dir_impl`.
    pub fn load_plugin_from_dir(&self, dir: impl AsRef<Path>) -> Result<usize, DiError> {
        Ok(load_plugins_from_dir(&self.root, &self.state, dir.as_ref()))
    }

    /// Loads every default plugin directory on the search path.
    pub fn load_default_plugins(&self) -> usize {
        let mut loaded = 0;
        for dir in self.plugin_search_path() {
            loaded += self.load_plugin_from_dir(dir).unwrap_or(0);
        }
        loaded.tap(|n| debug!("loaded {n} plugin(s) from default search path"))
    }

    /// Runs the optional mark-and-sweep leak detector (§4.9) against this
    /// runtime's root set. Advisory only: never frees anything, just
    /// reports what's still alive and unreachable from a root.
    #[cfg(debug_assertions)]
    pub fn report_leaks(&self) -> deai_core::leak::LeakReport {
        deai_core::leak::report_leaks(&self.state.roots.borrow())
    }
}

/// Shared by `Runtime::load_plugin_from_dir` and the `load_plugin_from_dir`
/// root member: iterates regular files ending in the platform shared
/// library suffix and hands each to `Plugin::load`/`Plugin::init`,
/// logging (not failing) on individual plugin errors.
fn load_plugins_from_dir(owner: &ObjectRef, state: &Rc<RuntimeState>, dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("plugin directory {} unavailable: {e}", dir.display());
            return 0;
        }
    };

    let mut loaded = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(std::env::consts::DLL_EXTENSION) {
            continue;
        }
        let result = Plugin::load(&path).and_then(|plugin| {
            plugin.init(owner)?;
            state.plugins.borrow_mut().push(plugin);
            Ok(())
        });
        match result {
            Ok(()) => loaded += 1,
            Err(e) => warn!("failed to load plugin {}: {e}", path.display()),
        }
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use deai_core::accessor::{callx, getx};

    #[test]
    fn argv_and_proctitle_are_wired_on_the_root_object() {
        let rt = Runtime::new(vec!["deai".to_string(), "arg1".to_string()]);
        assert_eq!(rt.argv(), ["deai".to_string(), "arg1".to_string()]);
        assert_eq!(rt.proctitle(), "deai");

        assert_eq!(
            getx(&rt.root, "argv").unwrap(),
            Some(Variant::Array(deai_core::containers::DiArray::from_items(
                Type::String,
                vec![Variant::String(Rc::from("deai")), Variant::String(Rc::from("arg1"))],
            )))
        );

        callx(&rt.root, "__set_proctitle", &[Variant::String(Rc::from("renamed"))]).unwrap();
        assert_eq!(rt.proctitle(), "renamed");
    }

    #[test]
    fn register_module_is_reachable_from_root_and_registry() {
        let rt = Runtime::new(vec!["deai".to_string()]);
        let module = ObjectRef::new();
        module.add_member("ping", Variant::Object(method0(|_self| -> Result<i64, DiError> { Ok(1) })), false).unwrap();

        rt.register_module("net", module).unwrap();

        assert!(rt.get_module("net").is_some());
        assert!(callx(&rt.root, "net", &[]).is_err(), "net is not itself callable");
        let net = getx(&rt.root, "net").unwrap().unwrap();
        match net {
            Variant::Object(net_obj) => assert_eq!(callx(&net_obj, "ping", &[]).unwrap(), Variant::Int(1)),
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn roots_track_add_remove_and_emptiness() {
        let rt = Runtime::new(vec!["deai".to_string()]);
        assert!(rt.roots_is_empty());

        rt.add_root("thing", ObjectRef::new());
        assert!(!rt.roots_is_empty());
        assert!(rt.remove_root("thing").is_some());
        assert!(rt.roots_is_empty());

        let handle = rt.add_anonymous_root(ObjectRef::new());
        assert!(!rt.roots_is_empty());
        assert!(rt.remove_anonymous_root(handle).is_some());
        assert!(rt.roots_is_empty());
    }

    #[test]
    fn quit_and_exit_set_the_requested_flags() {
        let rt = Runtime::new(vec!["deai".to_string()]);
        assert!(!rt.quit_requested());
        assert_eq!(rt.exit_code(), None);

        callx(&rt.root, "exit", &[Variant::Int(7)]).unwrap();
        assert!(rt.quit_requested());
        assert_eq!(rt.exit_code(), Some(7));
    }

    #[test]
    fn terminate_emits_terminate_signal_before_raising_quit() {
        let rt = Runtime::new(vec!["deai".to_string()]);
        let fired = Rc::new(RefCell::new(false));
        let f = fired.clone();
        let handler = raw_closure(move |_self, _args| {
            *f.borrow_mut() = true;
            Ok(Variant::Nil)
        });
        rt.root.listen("__terminate", false, handler);

        rt.terminate();
        assert!(*fired.borrow());
        assert!(rt.quit_requested());
    }
}
