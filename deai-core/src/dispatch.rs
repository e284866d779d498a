//! Typed dispatch (component E).
//!
//! No FFI/libffi bridge: a method is a type-erased
//! `Fn(&ObjectRef, &[Variant]) -> Result<Variant, DiError>` thunk, and
//! `TypedMethod` is the generic adapter that builds one from an ordinary
//! Rust closure over concrete argument types, checking arity and running
//! each argument through `Variant::convert` before calling the closure.
//! Methods are themselves represented as tiny callable [`Object`]s stored
//! as `Variant::Object` member values, the same way the original model
//! represents closures as objects with a `call` implementation.

use std::rc::Rc;

use crate::containers::DiArray;
use crate::error::DiError;
use crate::object::ObjectRef;
use crate::variant::{Type, Variant};

/// Implemented for Rust types a method argument can be decoded into.
/// `FromVariant::TYPE` drives the arity/type checking `TypedMethod`
/// performs before a closure ever runs.
pub trait FromVariant: Sized {
    const TYPE: Type;
    fn from_variant(v: &Variant) -> Result<Self, DiError>;
}

macro_rules! impl_from_variant {
    ($ty:ty, $tag:expr, $pat:pat => $conv:expr) => {
        impl FromVariant for $ty {
            const TYPE: Type = $tag;
            fn from_variant(v: &Variant) -> Result<Self, DiError> {
                let converted = v.convert(Self::TYPE, true)?;
                match converted {
                    $pat => Ok($conv),
                    other => Err(DiError::InvalidType { from: other.type_tag(), to: Self::TYPE }),
                }
            }
        }
    };
}

impl_from_variant!(bool, Type::Bool, Variant::Bool(b) => b);
impl_from_variant!(i64, Type::Int, Variant::Int(v) => v);
impl_from_variant!(u64, Type::UInt, Variant::UInt(v) => v);
impl_from_variant!(isize, Type::NInt, Variant::NInt(v) => v);
impl_from_variant!(usize, Type::NUInt, Variant::NUInt(v) => v);
impl_from_variant!(f64, Type::Float, Variant::Float(v) => v);

impl FromVariant for Rc<str> {
    const TYPE: Type = Type::String;
    fn from_variant(v: &Variant) -> Result<Self, DiError> {
        match v.convert(Type::String, true)? {
            Variant::String(s) => Ok(s),
            other => Err(DiError::InvalidType { from: other.type_tag(), to: Type::String }),
        }
    }
}

impl FromVariant for ObjectRef {
    const TYPE: Type = Type::Object;
    fn from_variant(v: &Variant) -> Result<Self, DiError> {
        match v {
            Variant::Object(o) => Ok(o.clone()),
            other => Err(DiError::InvalidType { from: other.type_tag(), to: Type::Object }),
        }
    }
}

/// Implemented for Rust return types a method closure can produce.
pub trait IntoVariant {
    fn into_variant(self) -> Variant;
}

macro_rules! impl_into_variant {
    ($ty:ty, $variant:path) => {
        impl IntoVariant for $ty {
            fn into_variant(self) -> Variant {
                $variant(self)
            }
        }
    };
}

impl_into_variant!(bool, Variant::Bool);
impl_into_variant!(i64, Variant::Int);
impl_into_variant!(u64, Variant::UInt);
impl_into_variant!(isize, Variant::NInt);
impl_into_variant!(usize, Variant::NUInt);
impl_into_variant!(f64, Variant::Float);

impl IntoVariant for () {
    fn into_variant(self) -> Variant {
        Variant::Nil
    }
}

impl IntoVariant for String {
    fn into_variant(self) -> Variant {
        Variant::String(Rc::from(self))
    }
}

impl IntoVariant for ObjectRef {
    fn into_variant(self) -> Variant {
        Variant::Object(self)
    }
}

impl IntoVariant for DiArray {
    fn into_variant(self) -> Variant {
        Variant::Array(self)
    }
}

impl IntoVariant for Vec<String> {
    fn into_variant(self) -> Variant {
        let items: Vec<Variant> = self.into_iter().map(|s| Variant::String(Rc::from(s))).collect();
        Variant::Array(DiArray::from_items(Type::String, items))
    }
}

/// Builds a zero-argument method closure into a callable child object
/// suitable for insertion as a member value.
pub fn method0<R, F>(f: F) -> ObjectRef
where
    R: IntoVariant + 'static,
    F: Fn(&ObjectRef) -> Result<R, DiError> + 'static,
{
    build(0, move |owner, args| {
        check_arity(args, 0)?;
        f(owner).map(IntoVariant::into_variant)
    })
}

/// Builds a one-argument method closure into a callable child object.
pub fn method1<A, R, F>(f: F) -> ObjectRef
where
    A: FromVariant,
    R: IntoVariant + 'static,
    F: Fn(&ObjectRef, A) -> Result<R, DiError> + 'static,
{
    build(1, move |owner, args| {
        check_arity(args, 1)?;
        let a = A::from_variant(&args[0])?;
        f(owner, a).map(IntoVariant::into_variant)
    })
}

/// Builds a two-argument method closure into a callable child object.
pub fn method2<A, B, R, F>(f: F) -> ObjectRef
where
    A: FromVariant,
    B: FromVariant,
    R: IntoVariant + 'static,
    F: Fn(&ObjectRef, A, B) -> Result<R, DiError> + 'static,
{
    build(2, move |owner, args| {
        check_arity(args, 2)?;
        let a = A::from_variant(&args[0])?;
        let b = B::from_variant(&args[1])?;
        f(owner, a, b).map(IntoVariant::into_variant)
    })
}

fn check_arity(args: &[Variant], expected: usize) -> Result<(), DiError> {
    if args.len() != expected {
        return Err(DiError::InvalidArity { expected, got: args.len() });
    }
    Ok(())
}

fn build(
    _arity: usize,
    thunk: impl Fn(&ObjectRef, &[Variant]) -> Result<Variant, DiError> + 'static,
) -> ObjectRef {
    let obj = ObjectRef::new();
    obj.set_call(Box::new(move |owner, args| thunk(owner, args)));
    obj
}

/// The variadic escape hatch for bridging genuinely dynamically typed
/// foreign code: a raw closure receiving unconverted arguments.
pub fn raw_closure(
    f: impl Fn(&ObjectRef, &[Variant]) -> Result<Variant, DiError> + 'static,
) -> ObjectRef {
    let obj = ObjectRef::new();
    obj.set_call(Box::new(f));
    obj
}

/// A field-getter shortcut: a callable object that just reads a member by
/// name off the (captured) owner object, rather than requiring every
/// trivial accessor to be written out as a one-line closure by hand.
pub fn field_getter(owner: ObjectRef, field: &'static str) -> ObjectRef {
    raw_closure(move |_self_obj, args| {
        check_arity(args, 0)?;
        owner.get_member(field).ok_or_else(|| DiError::NotFound(field.to_string()))
    })
}
