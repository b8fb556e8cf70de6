//! Dynamically typed variable values.

use std::fmt;
use std::sync::Arc;

use crate::ecs::EntityId;

/// A single entity variable.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Unset.
    #[default]
    Null,
    /// Numeric value.
    Num(f64),
    /// Shared immutable string.
    Text(Arc<str>),
    /// Reference to another entity.
    Ref(EntityId),
}

impl Value {
    /// Change detection used by the variable store.
    ///
    /// Numbers compare by bit pattern, so writing `NaN` over `NaN` is not a
    /// change and `0.0` over `-0.0` is.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => self == other,
        }
    }

    /// Numeric payload.
    #[must_use]
    pub fn as_num(&self) -> Option<f64> {
        match *self {
            Self::Num(n) => Some(n),
            _ => None,
        }
    }

    /// Text payload.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Entity payload.
    #[must_use]
    pub fn as_entity(&self) -> Option<EntityId> {
        match *self {
            Self::Ref(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this is [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Num(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Num(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(Arc::from(s))
    }
}

impl From<EntityId> for Value {
    fn from(e: EntityId) -> Self {
        Self::Ref(e)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Ref(e) => write!(f, "{e}"),
        }
    }
}
