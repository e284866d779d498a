use deai_core::accessor::{callx, delete_member, getx, raw_delete, raw_getx, raw_setx, setx};
use deai_core::dispatch::{method0, method1};
use deai_core::object::ObjectRef;
use deai_core::variant::Variant;
use deai_core::DiError;

#[test]
fn getx_falls_back_to_named_getter_then_generic_getter() {
    let obj = ObjectRef::new();
    obj.add_member(
        "__get_width",
        Variant::Object(method0(|_self| -> Result<i64, DiError> { Ok(640) })),
        false,
    )
    .unwrap();

    assert_eq!(getx(&obj, "width").unwrap(), Some(Variant::Int(640)));

    let other = ObjectRef::new();
    other
        .add_member(
            "__get",
            Variant::Object(method1(|_self, name: std::rc::Rc<str>| -> Result<i64, DiError> {
                Ok(name.len() as i64)
            })),
            false,
        )
        .unwrap();
    assert_eq!(getx(&other, "height").unwrap(), Some(Variant::Int(6)));
}

#[test]
fn getx_with_no_member_and_no_fallback_returns_bottom() {
    let obj = ObjectRef::new();
    assert_eq!(getx(&obj, "anything").unwrap(), None);
}

#[test]
fn setx_prefers_existing_writable_member_over_fallback() {
    let obj = ObjectRef::new();
    obj.add_member("x", Variant::Int(1), true).unwrap();
    setx(&obj, "x", Variant::Int(2)).unwrap();
    assert_eq!(obj.get_member("x"), Some(Variant::Int(2)));
}

#[test]
fn setx_with_no_existing_member_and_no_fallback_fails_not_found() {
    let obj = ObjectRef::new();
    let err = setx(&obj, "y", Variant::Int(5)).unwrap_err();
    assert!(matches!(err, DiError::NotFound(_)));
    assert!(obj.get_member("y").is_none());
}

#[test]
fn raw_setx_round_trips_through_raw_getx() {
    let obj = ObjectRef::new();
    raw_setx(&obj, "k", Variant::Int(1)).unwrap();
    assert_eq!(raw_getx(&obj, "k"), Some(Variant::Int(1)));

    // Overwriting moves the member to the end of insertion order.
    obj.add_member("earlier", Variant::Int(0), true).unwrap();
    raw_setx(&obj, "k", Variant::Int(2)).unwrap();
    assert_eq!(obj.member_names(), vec!["earlier".to_string(), "k".to_string()]);
    assert_eq!(raw_getx(&obj, "k"), Some(Variant::Int(2)));
}

#[test]
fn raw_setx_does_not_trigger_generic_set_handler() {
    let obj = ObjectRef::new();
    obj.add_member(
        "__set",
        Variant::Object(method1(|_self, _args: i64| -> Result<(), DiError> {
            panic!("raw_setx must not invoke __set");
        })),
        false,
    )
    .unwrap();
    raw_setx(&obj, "x", Variant::Int(9)).unwrap();
    assert_eq!(raw_getx(&obj, "x"), Some(Variant::Int(9)));
}

#[test]
fn raw_delete_removes_without_calling_delete_handler() {
    let obj = ObjectRef::new();
    obj.add_member("k", Variant::Int(1), true).unwrap();
    obj.add_member(
        "__delete",
        Variant::Object(method1(|_self, _name: std::rc::Rc<str>| -> Result<(), DiError> {
            panic!("raw_delete must not invoke __delete");
        })),
        false,
    )
    .unwrap();
    raw_delete(&obj, "k");
    assert!(raw_getx(&obj, "k").is_none());
    raw_delete(&obj, "k");
}

#[test]
fn reserved_getter_setter_names_collide_with_plain_member() {
    let obj = ObjectRef::new();
    obj.add_member("z", Variant::Int(1), true).unwrap();
    let err = obj.add_member("__set_z", Variant::Nil, true).unwrap_err();
    assert!(matches!(err, DiError::Exists(_)));
}

#[test]
fn delete_member_treats_builtin_accessor_members_as_plain() {
    let obj = ObjectRef::new();
    obj.add_member(
        "__get_name",
        Variant::Object(method0(|_self| -> Result<i64, DiError> { Ok(1) })),
        false,
    )
    .unwrap();
    delete_member(&obj, "__get_name").unwrap();
    assert!(!obj.has_member("__get_name"));
    assert!(getx(&obj, "name").unwrap().is_none());
}

#[test]
fn delete_member_consults_generic_delete_handler_even_when_plain_member_exists() {
    let obj = ObjectRef::new();
    obj.add_member("x", Variant::Int(1), true).unwrap();
    obj.add_member(
        "__delete",
        Variant::Object(method1(|_self, _name: std::rc::Rc<str>| -> Result<(), DiError> {
            Err(DiError::other("deletion vetoed"))
        })),
        false,
    )
    .unwrap();

    let err = delete_member(&obj, "x").unwrap_err();
    assert!(matches!(err, DiError::Other { .. }));
    assert!(obj.has_member("x"), "veto must leave the member in place");
}

#[test]
fn callx_invokes_a_callable_member() {
    let obj = ObjectRef::new();
    obj.add_member(
        "double",
        Variant::Object(method1(|_self, n: i64| -> Result<i64, DiError> { Ok(n * 2) })),
        false,
    )
    .unwrap();
    let result = callx(&obj, "double", &[Variant::Int(21)]).unwrap();
    assert_eq!(result, Variant::Int(42));
}

#[test]
fn callx_round_trips_int_and_rejects_out_of_range_uint() {
    let obj = ObjectRef::new();
    obj.add_member(
        "id",
        Variant::Object(method1(|_self, x: i64| -> Result<i64, DiError> { Ok(x) })),
        false,
    )
    .unwrap();

    assert_eq!(callx(&obj, "id", &[Variant::Int(42)]).unwrap(), Variant::Int(42));

    let err = callx(&obj, "id", &[Variant::UInt(1u64 << 63)]).unwrap_err();
    assert!(matches!(err, DiError::OutOfRange));
}
