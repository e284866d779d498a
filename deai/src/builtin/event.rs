//! The `event` builtin module (component H's concrete collaborator, §4.7).
//!
//! Exposes `event.fdevent(fd, readable, writable)`, `event.timer(ms)`,
//! `event.periodic(ms)` and `event.prepare()` as factories returning
//! objects that emit the signals §4.7 describes (`read`/`write`/`io`,
//! `elapsed`, `triggered`, `prepare`). Each factory registers its object
//! in a token-keyed table; [`EventModule::dispatch`] is called once per
//! mainloop iteration by the driver (`deai-cli`) to turn a batch of
//! [`Fired`] notifications into signal emissions, mirroring
//! `di_ioev_callback`/`di_timer_callback`/`di_periodic_callback` in
//! `original_source/event.c`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use mio::Token;
use nix::unistd::Pid;

use deai_core::dispatch::{method0, method1, raw_closure};
use deai_core::error::DiError;
use deai_core::object::ObjectRef;
use deai_core::variant::Variant;

use crate::mainloop::{ExitReason, Fired, FdEvents, MioLoop, PeriodicSource, TimerSource};

/// Registry of live event-source objects, keyed by the token or pid the
/// mainloop reports firing against.
pub struct EventModule {
    mainloop: Rc<RefCell<MioLoop>>,
    fd_sources: Rc<RefCell<HashMap<Token, ObjectRef>>>,
    timer_sources: Rc<RefCell<HashMap<Token, ObjectRef>>>,
    periodic_sources: Rc<RefCell<HashMap<Token, ObjectRef>>>,
    child_sources: Rc<RefCell<HashMap<Pid, ObjectRef>>>,
}

impl EventModule {
    pub fn new(mainloop: Rc<RefCell<MioLoop>>) -> Self {
        EventModule {
            mainloop,
            fd_sources: Rc::new(RefCell::new(HashMap::new())),
            timer_sources: Rc::new(RefCell::new(HashMap::new())),
            periodic_sources: Rc::new(RefCell::new(HashMap::new())),
            child_sources: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Registers `obj` as the target for `pid`'s eventual `exit` signal.
    /// Called by the `spawn` module after forking a child.
    pub fn register_child(&self, pid: Pid, obj: ObjectRef) {
        self.child_sources.borrow_mut().insert(pid, obj);
    }

    /// Turns one batch of mainloop notifications into signal emissions on
    /// the matching source objects. Timer sources are one-shot: their
    /// table entry is removed once `elapsed` fires, matching the original's
    /// "won't generate further events until the user calls `again`".
    pub fn dispatch(&self, fired: &[Fired]) {
        for event in fired {
            match event {
                Fired::Fd(token) => {
                    if let Some(obj) = self.fd_sources.borrow().get(token) {
                        obj.emit("io", &[]);
                    }
                }
                Fired::Timer(token) => {
                    let obj = self.timer_sources.borrow_mut().remove(token);
                    if let Some(obj) = obj {
                        obj.emit("elapsed", &[]);
                    } else if let Some(obj) = self.periodic_sources.borrow().get(token) {
                        obj.emit("triggered", &[]);
                    }
                }
                Fired::Child(pid, reason) => {
                    if let Some(obj) = self.child_sources.borrow_mut().remove(pid) {
                        let (code, signal) = match reason {
                            ExitReason::Exited(code) => (*code as i64, 0i64),
                            ExitReason::Signaled(sig) => (0i64, *sig as i64),
                        };
                        obj.emit("exit", &[Variant::Int(code), Variant::Int(signal)]);
                    }
                }
            }
        }
    }

    pub fn as_object(&self) -> ObjectRef {
        let module = ObjectRef::new();

        let mainloop = self.mainloop.clone();
        let fd_sources = self.fd_sources.clone();
        let _ = module.add_member(
            "fdevent",
            Variant::Object(raw_closure(move |_self, args| {
                if args.len() != 3 {
                    return Err(DiError::InvalidArity { expected: 3, got: args.len() });
                }
                let fd = match args[0].convert(deai_core::Type::Int, true)? {
                    Variant::Int(v) => v as std::os::fd::RawFd,
                    _ => unreachable!(),
                };
                let readable = matches!(args[1].convert(deai_core::Type::Bool, true)?, Variant::Bool(true));
                let writable = matches!(args[2].convert(deai_core::Type::Bool, true)?, Variant::Bool(true));

                let token = mainloop.borrow_mut().watch(fd, readable, writable)?;
                let source = ObjectRef::new();
                source.set_type("deai:event.fdevent");
                fd_sources.borrow_mut().insert(token, source.clone());
                Ok(Variant::Object(source))
            })),
            false,
        );

        let mainloop = self.mainloop.clone();
        let timer_sources = self.timer_sources.clone();
        let _ = module.add_member(
            "timer",
            Variant::Object(method1(move |_self, ms: i64| -> Result<ObjectRef, DiError> {
                let token = mainloop.borrow_mut().arm(Duration::from_millis(ms.max(0) as u64))?;
                let source = ObjectRef::new();
                source.set_type("deai:event.timer");
                timer_sources.borrow_mut().insert(token, source.clone());
                Ok(source)
            })),
            false,
        );

        let mainloop = self.mainloop.clone();
        let periodic_sources = self.periodic_sources.clone();
        let _ = module.add_member(
            "periodic",
            Variant::Object(method1(move |_self, ms: i64| -> Result<ObjectRef, DiError> {
                let token = mainloop.borrow_mut().arm_periodic(Duration::from_millis(ms.max(0) as u64))?;
                let source = ObjectRef::new();
                source.set_type("deai:event.periodic");
                periodic_sources.borrow_mut().insert(token, source.clone());
                Ok(source)
            })),
            false,
        );

        let mainloop = self.mainloop.clone();
        let _ = module.add_member(
            "prepare",
            Variant::Object(method0(move |_self| -> Result<ObjectRef, DiError> {
                let source = ObjectRef::new();
                source.set_type("deai:event.prepare");
                let hook_target = source.clone();
                mainloop.borrow_mut().add_prepare_hook(Box::new(move || {
                    hook_target.emit("prepare", &[]);
                }));
                Ok(source)
            })),
            false,
        );

        module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deai_core::accessor::callx;

    fn new_test_module() -> (Rc<RefCell<MioLoop>>, ObjectRef) {
        let mainloop = Rc::new(RefCell::new(MioLoop::new().unwrap()));
        let events = EventModule::new(mainloop.clone());
        (mainloop, events.as_object())
    }

    #[test]
    fn timer_factory_returns_a_typed_source_object() {
        let (_mainloop, module) = new_test_module();
        let result = callx(&module, "timer", &[Variant::Int(50)]).unwrap();
        match result {
            Variant::Object(source) => assert_eq!(source.get_type(), "deai:event.timer"),
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn periodic_factory_returns_a_typed_source_object() {
        let (_mainloop, module) = new_test_module();
        let result = callx(&module, "periodic", &[Variant::Int(100)]).unwrap();
        match result {
            Variant::Object(source) => assert_eq!(source.get_type(), "deai:event.periodic"),
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn prepare_factory_returns_a_typed_source_object() {
        let (_mainloop, module) = new_test_module();
        let result = callx(&module, "prepare", &[]).unwrap();
        match result {
            Variant::Object(source) => assert_eq!(source.get_type(), "deai:event.prepare"),
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_fires_elapsed_once_and_then_forgets_the_timer() {
        let mainloop = Rc::new(RefCell::new(MioLoop::new().unwrap()));
        let events = EventModule::new(mainloop.clone());
        let module = events.as_object();

        let source = match callx(&module, "timer", &[Variant::Int(10)]).unwrap() {
            Variant::Object(o) => o,
            other => panic!("expected object, got {other:?}"),
        };

        let fired = Rc::new(RefCell::new(0));
        let f = fired.clone();
        let handler = deai_core::dispatch::raw_closure(move |_self, _args| {
            *f.borrow_mut() += 1;
            Ok(Variant::Nil)
        });
        source.listen("elapsed", false, handler);

        let token = *events.timer_sources.borrow().keys().next().unwrap();
        events.dispatch(&[Fired::Timer(token)]);
        assert_eq!(*fired.borrow(), 1);
        assert!(events.timer_sources.borrow().is_empty());
    }
}
