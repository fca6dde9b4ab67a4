use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Provider scope enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scope {
    /// One instance per container, created on first request
    Singleton,
    /// New instance on every request, never cached
    Transient,
    /// One instance per logical request scope
    Request,
}

impl Scope {
    /// Check if the scope is singleton
    pub fn is_singleton(&self) -> bool {
        matches!(self, Scope::Singleton)
    }

    /// Check if the scope is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Scope::Transient)
    }

    /// Check if the scope is request-bound
    pub fn is_request(&self) -> bool {
        matches!(self, Scope::Request)
    }

    /// Get the scope name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Singleton => "singleton",
            Scope::Transient => "transient",
            Scope::Request => "request",
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Singleton
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = crate::errors::DiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "singleton" => Ok(Scope::Singleton),
            "transient" => Ok(Scope::Transient),
            "request" => Ok(Scope::Request),
            _ => Err(crate::errors::DiError::UnknownScope {
                scope: s.to_string(),
            }),
        }
    }
}

/// Identifier for one logical request scope.
///
/// Supplied by the surrounding call site when resolving request-scoped
/// providers; the cache it keys lives until the scope is explicitly
/// released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_str() {
        assert_eq!("singleton".parse::<Scope>().unwrap(), Scope::Singleton);
        assert_eq!("Transient".parse::<Scope>().unwrap(), Scope::Transient);
        assert_eq!("request".parse::<Scope>().unwrap(), Scope::Request);

        assert!("invalid".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(format!("{}", Scope::Singleton), "singleton");
        assert_eq!(format!("{}", Scope::Transient), "transient");
        assert_eq!(format!("{}", Scope::Request), "request");
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }
}
