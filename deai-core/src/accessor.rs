//! Generic accessor protocol (component F).
//!
//! `getx`/`setx` fall back from a plain member hit to a `__get_<name>`/
//! `__set_<name>` handler and then the fully generic `__get`/`__set`.
//! `delete_member` inverts that order: `__delete` is consulted first,
//! unconditionally, even when a plain member by that name already exists,
//! so a generic deletion hook always gets a chance to observe or veto the
//! deletion. All three generic handlers are themselves just callable
//! members, invoked through [`callx`].

use crate::error::DiError;
use crate::object::ObjectRef;
use crate::variant::Variant;

/// Invokes a callable member by name: `obj.<name>(args...)`.
pub fn callx(obj: &ObjectRef, name: &str, args: &[Variant]) -> Result<Variant, DiError> {
    let member = obj.get_member(name).ok_or_else(|| DiError::NotFound(name.to_string()))?;
    match member {
        Variant::Object(target) => target.call(args),
        _ => Err(DiError::NotCallable),
    }
}

/// Reads a named value, falling back to `__get_<name>` and then `__get`
/// if there's no plain member by that name. Returns `None` (the bottom
/// sentinel) rather than `Variant::Nil` when nothing answers at all.
pub fn getx(obj: &ObjectRef, name: &str) -> Result<Option<Variant>, DiError> {
    if let Some(v) = obj.get_member(name) {
        return Ok(Some(v));
    }

    let getter_name = format!("__get_{name}");
    if obj.has_member(&getter_name) {
        return callx(obj, &getter_name, &[]).map(Some);
    }

    if obj.has_member("__get") {
        let arg = Variant::String(std::rc::Rc::from(name));
        return callx(obj, "__get", std::slice::from_ref(&arg)).map(Some);
    }

    Ok(None)
}

/// Raw variant of [`getx`] that never consults the generic fallbacks,
/// used by callers that must distinguish "no such plain member" from
/// "a fallback handler answered".
pub fn raw_getx(obj: &ObjectRef, name: &str) -> Option<Variant> {
    obj.get_member(name)
}

/// Raw variant of [`setx`] that never consults `__set_<name>`/`__set`:
/// it only touches the member store, unconditionally replacing whatever
/// is there (or inserting a fresh writable member if nothing was).
/// Equivalent to [`raw_delete`] followed by inserting the new value, so
/// the member's position in insertion order moves to the end — the same
/// behavior the spec documents for `rawsetx`.
pub fn raw_setx(obj: &ObjectRef, name: &str, value: Variant) -> Result<(), DiError> {
    obj.remove_member(name);
    obj.add_member(name, value, true)
}

/// Raw variant of [`delete_member`] that never consults `__delete`: it
/// only touches the member store, and is a no-op if the member is
/// already absent.
pub fn raw_delete(obj: &ObjectRef, name: &str) {
    obj.remove_member(name);
}

/// Writes a named value. A plain, already-existing writable member takes
/// priority over any fallback (the in-slot setter priority rule): if the
/// member exists but isn't writable, that's a hard error rather than a
/// silent fallback to `__set_<name>`/`__set`. With no existing member and
/// no fallback handler, `setx` fails `NotFound` rather than silently
/// creating a new member — matching the original `di_setx`, which returns
/// `-ENOENT` in that case rather than inserting one.
pub fn setx(obj: &ObjectRef, name: &str, value: Variant) -> Result<(), DiError> {
    if obj.has_member(name) {
        return obj.set_member(name, value);
    }

    let setter_name = format!("__set_{name}");
    if obj.has_member(&setter_name) {
        let name_arg = Variant::String(std::rc::Rc::from(name));
        callx(obj, &setter_name, &[name_arg, value])?;
        return Ok(());
    }

    if obj.has_member("__set") {
        let name_arg = Variant::String(std::rc::Rc::from(name));
        callx(obj, "__set", &[name_arg, value])?;
        return Ok(());
    }

    Err(DiError::NotFound(name.to_string()))
}

/// Deletes a named member. Unlike `getx`/`setx`, `__delete` is consulted
/// unconditionally first — even when a plain member by that name exists —
/// so a generic deletion hook (a logging or policy handler) can observe or
/// veto the deletion rather than being bypassed whenever the member
/// happens to already exist. `__delete` treats builtin accessor members
/// (`__get_<name>`/`__set_<name>` themselves) as plain members rather than
/// specially protecting them: removing `__get_x` just removes that one
/// member, it does not also remove `x`.
pub fn delete_member(obj: &ObjectRef, name: &str) -> Result<(), DiError> {
    if obj.has_member("__delete") {
        let arg = Variant::String(std::rc::Rc::from(name));
        callx(obj, "__delete", std::slice::from_ref(&arg))?;
        return Ok(());
    }

    if obj.has_member(name) {
        obj.remove_member(name);
        return Ok(());
    }

    Err(DiError::NotFound(name.to_string()))
}
