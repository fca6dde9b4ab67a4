use thiserror::Error;

use crate::container::token::Token;

/// Core error type for the wyre runtime
#[derive(Debug, Error)]
pub enum DiError {
    #[error("no provider registered for token: {token}")]
    NotFound { token: String },

    #[error("circular dependency detected for {token}: {path}")]
    CircularDependency { token: String, path: String },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("no active resolution context: {message}")]
    ContextMissing { message: String },

    #[error("container has been disposed")]
    ContainerDisposed,

    #[error("token {token} requires async resolution; use the async path")]
    AsyncResolutionRequired { token: String },

    #[error("token {token} resolved to an unexpected type (expected {expected})")]
    TypeMismatch {
        token: String,
        expected: &'static str,
    },

    #[error("construction failed: {message}")]
    Construction { message: String },

    #[error("unknown scope: {scope}")]
    UnknownScope { scope: String },

    #[error("lock poisoned on resource: {resource}")]
    Lock { resource: String },

    #[error("disposal completed with {} failure(s): {}", .failures.len(), .failures.join("; "))]
    DisposalFailed { failures: Vec<String> },
}

impl DiError {
    /// Create a not-found error for a token
    pub fn not_found(token: &Token) -> Self {
        Self::NotFound {
            token: token.to_string(),
        }
    }

    /// Create a construction error; intended for use inside provider factories
    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction {
            message: message.into(),
        }
    }

    /// Create a context-missing error
    pub fn context_missing(message: impl Into<String>) -> Self {
        Self::ContextMissing {
            message: message.into(),
        }
    }

    /// Create a lock error for a named resource
    pub fn lock(resource: impl Into<String>) -> Self {
        Self::Lock {
            resource: resource.into(),
        }
    }

    /// Check if the error is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the error is a circular-dependency error
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_carries_token() {
        let err = DiError::not_found(&Token::key("db.pool"));
        assert!(err.to_string().contains("db.pool"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_circular_dependency_display_carries_path() {
        let err = DiError::CircularDependency {
            token: "A".to_string(),
            path: "A -> B -> A".to_string(),
        };
        assert!(err.to_string().contains("A -> B -> A"));
        assert!(err.is_circular());
    }

    #[test]
    fn test_disposal_failed_aggregates() {
        let err = DiError::DisposalFailed {
            failures: vec!["a failed".to_string(), "b failed".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("2 failure(s)"));
        assert!(message.contains("a failed"));
        assert!(message.contains("b failed"));
    }
}
