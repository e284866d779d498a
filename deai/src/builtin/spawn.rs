//! The `spawn` builtin module (component H's "Child reaper" contract,
//! §4.7), mirroring `original_source/spawn.c`'s `spawn.run`/`spawn.fork`.
//!
//! Forking and exec'ing is delegated to `std::process::Command`, which is
//! the idiomatic replacement for the original's raw `fork`/`execvp` pair;
//! reaping itself happens in [`crate::mainloop::MioLoop::reap_children`]
//! (a single non-blocking `waitpid(-1, WNOHANG)` sweep covers every child
//! regardless of which module spawned it), so this module only needs to
//! remember which result object corresponds to which pid.

use std::process::Command;
use std::rc::Rc;

use nix::unistd::Pid;

use deai_core::dispatch::raw_closure;
use deai_core::error::DiError;
use deai_core::object::ObjectRef;
use deai_core::variant::{Type, Variant};

use super::event::EventModule;

pub fn new_module(events: Rc<EventModule>) -> ObjectRef {
    let module = ObjectRef::new();

    let _ = module.add_member(
        "run",
        Variant::Object(raw_closure(move |_self, args| {
            if args.is_empty() {
                return Err(DiError::InvalidArity { expected: 1, got: 0 });
            }
            let argv = decode_argv(args)?;
            let (prog, rest) = argv.split_first().ok_or(DiError::InvalidArity { expected: 1, got: 0 })?;

            let child = Command::new(prog)
                .args(rest)
                .spawn()
                .map_err(|e| DiError::other(format!("spawn {prog}: {e}")))?;

            let pid = Pid::from_raw(child.id() as i32);
            let result = ObjectRef::new();
            result.set_type("deai:spawn.process");
            let _ = result.add_member("pid", Variant::Int(pid.as_raw() as i64), false);
            events.register_child(pid, result.clone());
            Ok(Variant::Object(result))
        })),
        false,
    );

    module
}

/// Decodes a variadic argument tuple of strings into a `Vec<String>`,
/// mirroring the original's `char **argv` construction from a `di_tuple`.
fn decode_argv(args: &[Variant]) -> Result<Vec<String>, DiError> {
    args.iter()
        .map(|v| match v.convert(Type::String, true)? {
            Variant::String(s) => Ok(s.to_string()),
            other => Err(DiError::InvalidType { from: other.type_tag(), to: Type::String }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use deai_core::accessor::callx;

    #[test]
    fn decode_argv_converts_each_element_to_a_string() {
        let args = [Variant::String(Rc::from("true")), Variant::Int(1)];
        assert_eq!(decode_argv(&args).unwrap(), vec!["true".to_string(), "1".to_string()]);
    }

    #[test]
    fn run_spawns_a_process_and_registers_it_for_reaping() {
        let mainloop = Rc::new(RefCell::new(crate::mainloop::MioLoop::new().unwrap()));
        let events = Rc::new(EventModule::new(mainloop));
        let module = new_module(events.clone());

        let result = callx(&module, "run", &[Variant::String(Rc::from("true"))]).unwrap();
        let process = match result {
            Variant::Object(obj) => obj,
            other => panic!("expected object, got {other:?}"),
        };
        assert_eq!(process.get_type(), "deai:spawn.process");
        match process.get_member("pid") {
            Some(Variant::Int(pid)) => assert!(pid > 0),
            other => panic!("expected pid member, got {other:?}"),
        }
    }
}
