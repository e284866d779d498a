//! The `os` builtin module: host identification, mirroring
//! `original_source/os.c`'s `os.uname`/hostname accessors.

use nix::sys::utsname::uname;

use deai_core::dispatch::method0;
use deai_core::error::DiError;
use deai_core::object::ObjectRef;
use deai_core::variant::Variant;

pub fn new_module() -> ObjectRef {
    let module = ObjectRef::new();

    let _ = module.add_member(
        "hostname",
        Variant::Object(method0(|_self| -> Result<String, DiError> {
            let info = uname().map_err(|e| DiError::other(format!("uname: {e}")))?;
            Ok(info.nodename().to_string_lossy().into_owned())
        })),
        false,
    );

    let _ = module.add_member(
        "uname",
        Variant::Object(method0(|_self| -> Result<Vec<String>, DiError> {
            let info = uname().map_err(|e| DiError::other(format!("uname: {e}")))?;
            Ok(vec![
                info.sysname().to_string_lossy().into_owned(),
                info.nodename().to_string_lossy().into_owned(),
                info.release().to_string_lossy().into_owned(),
                info.version().to_string_lossy().into_owned(),
                info.machine().to_string_lossy().into_owned(),
            ])
        })),
        false,
    );

    module
}

#[cfg(test)]
mod tests {
    use super::*;
    use deai_core::accessor::callx;

    #[test]
    fn hostname_and_uname_return_nonempty_strings() {
        let module = new_module();

        let hostname = callx(&module, "hostname", &[]).unwrap();
        match hostname {
            Variant::String(s) => assert!(!s.is_empty()),
            other => panic!("expected string, got {other:?}"),
        }

        let info = callx(&module, "uname", &[]).unwrap();
        match info {
            Variant::Array(arr) => assert_eq!(arr.len(), 5),
            other => panic!("expected array, got {other:?}"),
        }
    }
}
