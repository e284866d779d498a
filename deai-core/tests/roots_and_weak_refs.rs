use deai_core::object::ObjectRef;
use deai_core::roots::RootSet;

#[test]
fn named_root_keeps_object_alive() {
    let mut roots = RootSet::new();
    let obj = ObjectRef::new();
    let weak = obj.downgrade();
    roots.add_named("thing", obj.clone());
    drop(obj);

    assert!(weak.upgrade().is_some());
    roots.remove_named("thing");
    assert!(weak.upgrade().is_none());
}

#[test]
fn anonymous_roots_get_distinct_handles() {
    let mut roots = RootSet::new();
    let a = roots.add_anonymous(ObjectRef::new());
    let b = roots.add_anonymous(ObjectRef::new());
    assert_ne!(a, b);
    assert_eq!(roots.len(), 2);
}

#[test]
fn clearing_roots_drops_everything() {
    let mut roots = RootSet::new();
    let obj = ObjectRef::new();
    let weak = obj.downgrade();
    roots.add_named("x", obj.clone());
    roots.add_anonymous(obj);
    assert_eq!(roots.len(), 2);

    roots.clear();
    assert!(roots.is_empty());
    assert!(weak.upgrade().is_none());
}
