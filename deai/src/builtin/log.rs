//! The `log` builtin module: a thin bridge onto the `log` crate's global
//! max level, mirroring `original_source/log.c`'s `log.get_log_level` /
//! `log.set_log_level`.

use log::LevelFilter;

use deai_core::dispatch::{method0, method1};
use deai_core::error::DiError;
use deai_core::object::ObjectRef;
use deai_core::variant::Variant;

fn level_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

fn str_to_level(s: &str) -> Result<LevelFilter, DiError> {
    match s {
        "off" => Ok(LevelFilter::Off),
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        other => Err(DiError::other(format!("unknown log level: {other}"))),
    }
}

pub fn new_module() -> ObjectRef {
    let module = ObjectRef::new();

    let _ = module.add_member(
        "get_log_level",
        Variant::Object(method0(|_self| -> Result<String, DiError> {
            Ok(level_to_str(log::max_level()).to_string())
        })),
        false,
    );

    let _ = module.add_member(
        "set_log_level",
        Variant::Object(method1(|_self, level: std::rc::Rc<str>| -> Result<(), DiError> {
            log::set_max_level(str_to_level(&level)?);
            Ok(())
        })),
        false,
    );

    module
}
