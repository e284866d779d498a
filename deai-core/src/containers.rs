//! Container primitives (component B): homogeneous arrays and
//! heterogeneous tuples.

use crate::error::DiError;
use crate::variant::{Type, Variant};

/// A homogeneous, dynamically sized array. `elem_type` is `Type::Nil` for
/// an empty array with no established element type yet.
#[derive(Debug, Clone, PartialEq)]
pub struct DiArray {
    elem_type: Type,
    items: Vec<Variant>,
}

impl DiArray {
    pub fn empty(elem_type: Type) -> Self {
        DiArray { elem_type, items: Vec::new() }
    }

    pub fn from_items(elem_type: Type, items: Vec<Variant>) -> Self {
        DiArray { elem_type, items }
    }

    pub fn elem_type(&self) -> Type {
        self.elem_type
    }

    pub fn items(&self) -> &[Variant] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, value: Variant) -> Result<(), DiError> {
        if self.items.is_empty() && self.elem_type == Type::Nil {
            self.elem_type = value.type_tag();
        } else if value.type_tag() != self.elem_type {
            return Err(DiError::InvalidType { from: value.type_tag(), to: self.elem_type });
        }
        self.items.push(value);
        Ok(())
    }

    /// Arrays convert to tuples unconditionally, carrying each element
    /// through as-is.
    pub fn into_tuple(self) -> DiTuple {
        DiTuple(self.items)
    }
}

/// A heterogeneous, fixed-length ordered sequence of values.
#[derive(Debug, Clone, PartialEq)]
pub struct DiTuple(pub Vec<Variant>);

impl DiTuple {
    pub fn empty() -> Self {
        DiTuple(Vec::new())
    }

    pub fn from_items(items: Vec<Variant>) -> Self {
        DiTuple(items)
    }

    pub fn items(&self) -> &[Variant] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A tuple converts to an array only when every element already
    /// shares the same type tag (the empty tuple converts to an empty
    /// array of type `Nil`).
    pub fn into_array(self) -> Result<DiArray, DiError> {
        let mut iter = self.0.into_iter();
        let first = match iter.next() {
            None => return Ok(DiArray::empty(Type::Nil)),
            Some(v) => v,
        };
        let elem_type = first.type_tag();
        let mut items = vec![first];
        for item in iter {
            if item.type_tag() != elem_type {
                return Err(DiError::InvalidType { from: item.type_tag(), to: elem_type });
            }
            items.push(item);
        }
        Ok(DiArray::from_items(elem_type, items))
    }
}
