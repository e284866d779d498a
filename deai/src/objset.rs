//! A small object-set helper: holds a collection of strong references and
//! notifies each member via `__objset_hold`/`__objset_release` calls (if
//! it implements them) as it's added to or dropped from the set. Included
//! mainly as a second, independent exercise of the accessor protocol
//! beyond the root set itself.

use std::cell::RefCell;

use deai_core::accessor::callx;
use deai_core::error::DiError;
use deai_core::object::ObjectRef;
use deai_core::variant::Variant;

pub struct ObjSet {
    members: RefCell<Vec<ObjectRef>>,
}

impl ObjSet {
    pub fn new() -> Self {
        ObjSet { members: RefCell::new(Vec::new()) }
    }

    pub fn hold(&self, obj: ObjectRef) {
        if obj.has_member("__objset_hold") {
            let _ = callx(&obj, "__objset_hold", &[]);
        }
        self.members.borrow_mut().push(obj);
    }

    pub fn release(&self, obj: &ObjectRef) {
        let mut members = self.members.borrow_mut();
        if let Some(pos) = members.iter().position(|m| m.ptr_eq(obj)) {
            let removed = members.remove(pos);
            drop(members);
            if removed.has_member("__objset_release") {
                let _ = callx(&removed, "__objset_release", &[]);
            }
        }
    }

    pub fn clear(&self) {
        let drained: Vec<ObjectRef> = self.members.borrow_mut().drain(..).collect();
        for obj in drained {
            if obj.has_member("__objset_release") {
                let _ = callx(&obj, "__objset_release", &[]);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    pub fn contains(&self, obj: &ObjectRef) -> bool {
        self.members.borrow().iter().any(|m| m.ptr_eq(obj))
    }
}

impl Default for ObjSet {
    fn default() -> Self {
        ObjSet::new()
    }
}

/// Wraps an [`ObjSet`] as a plain `deai` object so it can be stored as a
/// member value and manipulated through the generic accessor protocol
/// (`add`/`remove`/`clear` as callable members).
pub fn new_objset_object() -> ObjectRef {
    use deai_core::dispatch::{method0, method1, raw_closure};
    use std::rc::Rc;

    let set = Rc::new(ObjSet::new());
    let obj = ObjectRef::new();

    let s = set.clone();
    let _ = obj.add_member(
        "add",
        Variant::Object(method1(move |_self, item: ObjectRef| -> Result<(), DiError> {
            s.hold(item);
            Ok(())
        })),
        false,
    );

    let s = set.clone();
    let _ = obj.add_member(
        "remove",
        Variant::Object(method1(move |_self, item: ObjectRef| -> Result<(), DiError> {
            s.release(&item);
            Ok(())
        })),
        false,
    );

    let s = set.clone();
    let _ = obj.add_member(
        "len",
        Variant::Object(method0(move |_self| -> Result<i64, DiError> { Ok(s.len() as i64) })),
        false,
    );

    let s = set.clone();
    let _ = obj.add_member(
        "clear",
        Variant::Object(raw_closure(move |_self, args| {
            let _ = args;
            s.clear();
            Ok(Variant::Nil)
        })),
        false,
    );

    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use deai_core::dispatch::method0;

    #[test]
    fn hold_and_release_call_the_objset_hooks() {
        let set = ObjSet::new();
        let held = std::rc::Rc::new(std::cell::Cell::new(false));
        let released = std::rc::Rc::new(std::cell::Cell::new(false));

        let obj = ObjectRef::new();
        let h = held.clone();
        obj.add_member(
            "__objset_hold",
            Variant::Object(method0(move |_self| -> Result<(), DiError> {
                h.set(true);
                Ok(())
            })),
            false,
        )
        .unwrap();
        let r = released.clone();
        obj.add_member(
            "__objset_release",
            Variant::Object(method0(move |_self| -> Result<(), DiError> {
                r.set(true);
                Ok(())
            })),
            false,
        )
        .unwrap();

        set.hold(obj.clone());
        assert!(held.get());
        assert_eq!(set.len(), 1);
        assert!(set.contains(&obj));

        set.release(&obj);
        assert!(released.get());
        assert_eq!(set.len(), 0);
        assert!(!set.contains(&obj));
    }

    #[test]
    fn clear_drains_and_releases_every_member() {
        let set = ObjSet::new();
        set.hold(ObjectRef::new());
        set.hold(ObjectRef::new());
        assert_eq!(set.len(), 2);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn objset_object_exposes_add_remove_clear_len() {
        use deai_core::accessor::callx;

        let set_obj = new_objset_object();
        let item = ObjectRef::new();

        callx(&set_obj, "add", &[Variant::Object(item.clone())]).unwrap();
        assert_eq!(callx(&set_obj, "len", &[]).unwrap(), Variant::Int(1));

        callx(&set_obj, "remove", &[Variant::Object(item)]).unwrap();
        assert_eq!(callx(&set_obj, "len", &[]).unwrap(), Variant::Int(0));

        callx(&set_obj, "add", &[Variant::Object(ObjectRef::new())]).unwrap();
        callx(&set_obj, "clear", &[]).unwrap();
        assert_eq!(callx(&set_obj, "len", &[]).unwrap(), Variant::Int(0));
    }
}
