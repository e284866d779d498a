//! The `deai <module>.<method> <arg>*` commandline surface (§6.1).
//!
//! Instantiates a [`Runtime`], installs the builtin modules, routes one
//! call through the generic accessor protocol, and either exits directly
//! (if the call set an explicit exit code) or drives the mainloop until
//! the roots set empties, mirroring `original_source/main.c`'s `main`.

use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;

use deai_core::accessor::{callx, getx};
use deai_core::error::DiError;
use deai_core::variant::Variant;

use deai::builtin::{event, log as log_module, os, spawn};
use deai::mainloop::MioLoop;
use deai::Runtime;

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} <module>.<method> <arg1> <arg2> ... [-- <extra>*]");
    std::process::exit(1);
}

/// Decodes one `i:`/`s:`/`f:` typed literal (§6.1). `s:` literals are
/// leaked to `'static` to become `StringLiteral`s, matching the lifetime
/// the original gives a pointer straight into `argv`: both live for the
/// remainder of the process.
fn parse_typed_arg(raw: &str) -> Result<Variant, String> {
    let bytes = raw.as_bytes();
    if bytes.len() < 2 || bytes[1] != b':' {
        return Err(format!("Invalid argument: {raw}"));
    }
    let value = &raw[2..];
    match bytes[0] {
        b'i' => value
            .parse::<i64>()
            .map(Variant::Int)
            .map_err(|_| format!("Invalid argument type: {raw}")),
        b'f' => value
            .parse::<f64>()
            .map(Variant::Float)
            .map_err(|_| format!("Invalid argument type: {raw}")),
        b's' => Ok(Variant::StringLiteral(Box::leak(value.to_string().into_boxed_str()))),
        _ => Err(format!("Invalid argument type: {raw}")),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let argv: Vec<String> = std::env::args().collect();
    if argv.len() < 2 {
        usage(&argv[0]);
    }

    let (modname, method) = match argv[1].split_once('.') {
        Some((m, rest)) => (Some(m.to_string()), rest.to_string()),
        None => (None, argv[1].clone()),
    };

    let mut call_args = Vec::new();
    for raw in &argv[2..] {
        if raw == "--" {
            break;
        }
        match parse_typed_arg(raw) {
            Ok(v) => call_args.push(v),
            Err(msg) => {
                eprintln!("{msg}");
                return ExitCode::FAILURE;
            }
        }
    }

    let runtime = Runtime::new(argv);

    let mainloop = match MioLoop::new() {
        Ok(m) => Rc::new(RefCell::new(m)),
        Err(e) => {
            eprintln!("failed to initialize mainloop: {e}");
            return ExitCode::FAILURE;
        }
    };
    let event_module = Rc::new(event::EventModule::new(mainloop.clone()));

    let _ = runtime.register_module("log", log_module::new_module());
    let _ = runtime.register_module("os", os::new_module());
    let _ = runtime.register_module("event", event_module.as_object());
    let _ = runtime.register_module("spawn", spawn::new_module(event_module.clone()));

    runtime.load_default_plugins();

    let target = match &modname {
        Some(name) => match getx(&runtime.root, name) {
            Ok(Some(Variant::Object(obj))) => obj,
            Ok(_) => {
                eprintln!("Module \"{name}\" not found");
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("Module \"{name}\" not found: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => runtime.root.clone(),
    };

    let mut exit_code = 0u8;
    let mut quit = false;

    match callx(&target, &method, &call_args) {
        Ok(Variant::Object(obj)) => {
            if let Some(err) = DiError::from_object(&obj) {
                eprintln!("The function you called returned an error message:\n{err}");
                exit_code = 1;
                quit = true;
            }
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("Failed to call \"{}.{}\": {e}", modname.as_deref().unwrap_or(""), method);
            exit_code = 1;
            quit = true;
        }
    }

    if let Some(code) = runtime.exit_code() {
        return ExitCode::from(code as u8);
    }

    if !quit {
        while !runtime.quit_requested() && !runtime.roots_is_empty() {
            match mainloop.borrow_mut().run_once() {
                Ok(fired) => event_module.dispatch(&fired),
                Err(e) => {
                    eprintln!("mainloop error: {e}");
                    exit_code = 1;
                    break;
                }
            }
        }
        if let Some(code) = runtime.exit_code() {
            return ExitCode::from(code as u8);
        }
    }

    #[cfg(debug_assertions)]
    {
        let report = runtime.report_leaks();
        for leak in &report.unrooted {
            log::warn!("possible leak: {} object at {:#x} still alive and unrooted", leak.type_name, leak.address);
        }
    }

    ExitCode::from(exit_code)
}
