//! Token identities for dependency slots
//!
//! A [`Token`] names exactly one logical dependency slot in the registry.
//! Tokens come in two flavors: type identities (`Token::of::<T>()`) for
//! providers resolved by Rust type, and symbolic keys (`Token::key("...")`)
//! for values that share a type or are only known by name. Both support
//! equality, hashing and a canonical string projection used for cache keys,
//! graph node ids and diagnostics.

use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;

use serde::{Serialize, Serializer};

/// Identifier naming one dependency slot in the container.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// A Rust type identity
    Type {
        type_id: TypeId,
        type_name: &'static str,
    },
    /// A symbolic key
    Key(Cow<'static, str>),
}

impl Token {
    /// Create a token from a type identity
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Create a token from a symbolic key
    pub fn key(key: impl Into<Cow<'static, str>>) -> Self {
        Self::Key(key.into())
    }

    /// Check whether this token names the given type
    pub fn is_type<T: ?Sized + 'static>(&self) -> bool {
        matches!(self, Self::Type { type_id, .. } if *type_id == TypeId::of::<T>())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { type_name, .. } => write!(f, "{}", type_name),
            Self::Key(key) => write!(f, "{}", key),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { type_name, .. } => f.debug_tuple("Token::Type").field(type_name).finish(),
            Self::Key(key) => f.debug_tuple("Token::Key").field(key).finish(),
        }
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<&'static str> for Token {
    fn from(key: &'static str) -> Self {
        Self::key(key)
    }
}
