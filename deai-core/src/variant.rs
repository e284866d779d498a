//! The tagged variant value model (component A).
//!
//! [`Type`] enumerates the fixed set of type tags from the spec's type
//! table. [`Variant`] is the owned value itself; `Clone`/`Drop` play the
//! role of the spec's `copy`/`free` operations, and [`Variant::convert`]
//! implements the conversion table.

use std::rc::Rc;

use crate::containers::{DiArray, DiTuple};
use crate::error::DiError;
use crate::object::ObjectRef;
use crate::strings::DiString;
use crate::weak::WeakObjectRef;

/// One of the fixed type tags a [`Variant`] can carry.
///
/// `Any` is only meaningful inside dispatch signatures; no [`Variant`]
/// value is ever itself tagged `Any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Nil,
    Bool,
    NInt,
    NUInt,
    Int,
    UInt,
    Float,
    Pointer,
    StringLiteral,
    String,
    Array,
    Tuple,
    Variant,
    Object,
    WeakObject,
    EmptyObject,
    Any,
}

impl Type {
    /// Deterministic per-tag size. Not used for allocation (Rust owns
    /// layout) but kept for diagnostics and cross-language parity checks.
    pub fn size_hint(self) -> usize {
        match self {
            Type::Nil | Type::Any | Type::EmptyObject => 0,
            Type::Bool => std::mem::size_of::<bool>(),
            Type::NInt | Type::NUInt => std::mem::size_of::<isize>(),
            Type::Int | Type::UInt => 8,
            Type::Float => std::mem::size_of::<f64>(),
            Type::Pointer
            | Type::StringLiteral
            | Type::String
            | Type::Object
            | Type::WeakObject => std::mem::size_of::<usize>(),
            Type::Array => std::mem::size_of::<DiArray>(),
            Type::Tuple => std::mem::size_of::<DiTuple>(),
            Type::Variant => std::mem::size_of::<usize>(),
        }
    }
}

/// A tagged, owned value. Untagged `Option<Variant>` models the spec's
/// distinguished *bottom* sentinel: `None` is "no value exists", while
/// `Some(Variant::Nil)` is the legitimate nil value.
#[derive(Debug, Clone)]
pub enum Variant {
    Nil,
    Bool(bool),
    NInt(isize),
    NUInt(usize),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Opaque native pointer; never freed by the runtime.
    Pointer(usize),
    StringLiteral(&'static str),
    String(Rc<str>),
    Array(DiArray),
    Tuple(DiTuple),
    Variant(Box<Variant>),
    Object(ObjectRef),
    WeakObject(WeakObjectRef),
    /// Sentinel for "object slot present but value unknown"; treated as
    /// [`Variant::Nil`] for conversion purposes.
    EmptyObject,
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Nil, Variant::Nil) | (Variant::EmptyObject, Variant::EmptyObject) => true,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::NInt(a), Variant::NInt(b)) => a == b,
            (Variant::NUInt(a), Variant::NUInt(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::UInt(a), Variant::UInt(b)) => a == b,
            (Variant::Float(a), Variant::Float(b)) => a == b,
            (Variant::Pointer(a), Variant::Pointer(b)) => a == b,
            (Variant::Array(a), Variant::Array(b)) => a == b,
            (Variant::Tuple(a), Variant::Tuple(b)) => a == b,
            (Variant::Variant(a), Variant::Variant(b)) => a == b,
            (Variant::Object(a), Variant::Object(b)) => a.ptr_eq(b),
            (Variant::WeakObject(a), Variant::WeakObject(b)) => a.ptr_eq(b),
            (a, b) => match (a.as_str_value(), b.as_str_value()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl Variant {
    pub fn type_tag(&self) -> Type {
        match self {
            Variant::Nil => Type::Nil,
            Variant::Bool(_) => Type::Bool,
            Variant::NInt(_) => Type::NInt,
            Variant::NUInt(_) => Type::NUInt,
            Variant::Int(_) => Type::Int,
            Variant::UInt(_) => Type::UInt,
            Variant::Float(_) => Type::Float,
            Variant::Pointer(_) => Type::Pointer,
            Variant::StringLiteral(_) => Type::StringLiteral,
            Variant::String(_) => Type::String,
            Variant::Array(_) => Type::Array,
            Variant::Tuple(_) => Type::Tuple,
            Variant::Variant(_) => Type::Variant,
            Variant::Object(_) => Type::Object,
            Variant::WeakObject(_) => Type::WeakObject,
            Variant::EmptyObject => Type::EmptyObject,
        }
    }

    pub fn as_di_string(&self) -> Option<DiString> {
        match self {
            Variant::String(s) => Some(DiString::Owned(s.clone())),
            Variant::StringLiteral(s) => Some(DiString::Literal(s)),
            _ => None,
        }
    }

    fn as_str_value(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            Variant::StringLiteral(s) => Some(s),
            _ => None,
        }
    }

    fn checked_int_cast<T, U>(value: T) -> Result<U, DiError>
    where
        U: TryFrom<T>,
    {
        U::try_from(value).map_err(|_| DiError::OutOfRange)
    }

    /// Converts between type tags.
    ///
    /// `borrow = true` promises the result will not outlive `self` (for the
    /// tags where that distinction matters, e.g. upgrading a weak
    /// reference) and never mutates `self`. `borrow = false` is the
    /// transferring form; callers that pass `borrow = false` are expected to
    /// drop `self` immediately afterwards (Rust's ownership already
    /// prevents the "half-converted" state the original C implementation
    /// had to guard against by hand).
    pub fn convert(&self, to: Type, borrow: bool) -> Result<Variant, DiError> {
        use Type::*;
        let from = self.type_tag();
        if from == to {
            return Ok(self.clone());
        }

        if let Variant::Variant(inner) = self {
            return inner.convert(to, borrow);
        }
        if to == Variant {
            return Ok(Variant::Variant(Box::new(self.clone())));
        }

        match (self, to) {
            (Variant::NInt(v), NUInt) => Ok(Variant::NUInt(Self::checked_int_cast(*v)?)),
            (Variant::NInt(v), Int) => Ok(Variant::Int(Self::checked_int_cast(*v)?)),
            (Variant::NInt(v), UInt) => Ok(Variant::UInt(Self::checked_int_cast(*v)?)),
            (Variant::NInt(v), Float) => Ok(Variant::Float(*v as f64)),

            (Variant::NUInt(v), NInt) => Ok(Variant::NInt(Self::checked_int_cast(*v)?)),
            (Variant::NUInt(v), Int) => Ok(Variant::Int(Self::checked_int_cast(*v)?)),
            (Variant::NUInt(v), UInt) => Ok(Variant::UInt(Self::checked_int_cast(*v)?)),
            (Variant::NUInt(v), Float) => Ok(Variant::Float(*v as f64)),

            (Variant::Int(v), NInt) => Ok(Variant::NInt(Self::checked_int_cast(*v)?)),
            (Variant::Int(v), NUInt) => Ok(Variant::NUInt(Self::checked_int_cast(*v)?)),
            (Variant::Int(v), UInt) => Ok(Variant::UInt(Self::checked_int_cast(*v)?)),
            (Variant::Int(v), Float) => Ok(Variant::Float(*v as f64)),

            (Variant::UInt(v), NInt) => Ok(Variant::NInt(Self::checked_int_cast(*v)?)),
            (Variant::UInt(v), NUInt) => Ok(Variant::NUInt(Self::checked_int_cast(*v)?)),
            (Variant::UInt(v), Int) => Ok(Variant::Int(Self::checked_int_cast(*v)?)),
            (Variant::UInt(v), Float) => Ok(Variant::Float(*v as f64)),

            (Variant::StringLiteral(s), String) => Ok(Variant::String(Rc::from(*s))),
            (Variant::String(_), StringLiteral) => Err(DiError::InvalidType { from, to }),

            (Variant::Nil, Array) => Ok(Variant::Array(DiArray::empty(Type::Nil))),
            (Variant::Nil, Tuple) => Ok(Variant::Tuple(DiTuple::empty())),
            (Variant::Nil, WeakObject) => Ok(Variant::WeakObject(WeakObjectRef::dead())),

            (Variant::Object(o), WeakObject) => Ok(Variant::WeakObject(o.downgrade())),
            (Variant::WeakObject(w), Object) => {
                if borrow {
                    return Err(DiError::InvalidType { from, to });
                }
                w.upgrade()
                    .map(Variant::Object)
                    .ok_or(DiError::InvalidType { from, to })
            }

            (Variant::Tuple(t), Array) => t.clone().into_array().map(Variant::Array),
            (Variant::Array(a), Tuple) => Ok(Variant::Tuple(a.clone().into_tuple())),

            _ => Err(DiError::InvalidType { from, to }),
        }
    }
}
