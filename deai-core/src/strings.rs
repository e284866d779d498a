//! String primitives (component B).
//!
//! `deai` distinguishes borrowed string literals (no allocation, no
//! lifetime tied to an object) from owned, refcounted strings. Promotion
//! from literal to owned is always allowed; the reverse is not, since an
//! owned string's bytes may not be `'static`.

use std::fmt;
use std::rc::Rc;

/// Either a `'static` literal or a refcounted owned string.
#[derive(Debug, Clone)]
pub enum DiString {
    Literal(&'static str),
    Owned(Rc<str>),
}

impl DiString {
    pub fn as_str(&self) -> &str {
        match self {
            DiString::Literal(s) => s,
            DiString::Owned(s) => s,
        }
    }

    /// Promotes a literal to an owned string; owned strings are returned
    /// unchanged. There is no corresponding `demote`.
    pub fn into_owned(self) -> DiString {
        match self {
            DiString::Literal(s) => DiString::Owned(Rc::from(s)),
            owned => owned,
        }
    }
}

impl fmt::Display for DiString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq for DiString {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}
impl Eq for DiString {}

impl std::hash::Hash for DiString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl From<&'static str> for DiString {
    fn from(s: &'static str) -> Self {
        DiString::Literal(s)
    }
}

impl From<String> for DiString {
    fn from(s: String) -> Self {
        DiString::Owned(Rc::from(s))
    }
}
