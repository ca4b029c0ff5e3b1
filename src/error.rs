//! Error types for resolution, registration and routing

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving services and synthesizing routes
#[derive(Error, Debug)]
pub enum SingularError {
    /// Symbol path does not name a loadable type
    #[error("Type not found: {symbol}")]
    TypeNotFound { symbol: String },

    /// A key or identifier contained an empty segment
    #[error("Empty segment in identifier: '{input}'")]
    EmptySegment { input: String },

    /// A route marker carries neither `method` nor `methods`
    #[error(
        "Method '{method}' of controller '{controller}' is marked as a route but defines no HTTP method"
    )]
    RouteMethodNotDefined { method: String, controller: String },

    /// A method referenced as a filter carries markers of its own
    #[error(
        "Method '{method}' of controller '{controller}' is used as a filter but carries markers"
    )]
    FilterHasAnnotation { method: String, controller: String },

    /// Pack name is not registered on the application
    #[error("Pack not found: {pack}")]
    PackNotFound { pack: String },

    /// A filter or converter reference names a method the type does not have
    #[error("Method '{method}' is not defined on '{type_name}'")]
    MethodNotDefined { method: String, type_name: String },

    /// A referenced method exists but cannot serve the requested role
    #[error("Method '{method}' of '{type_name}' cannot be used as {expected}")]
    SignatureMismatch {
        method: String,
        type_name: String,
        expected: &'static str,
    },

    /// Registry key is not bound
    #[error("Service not found: {key}")]
    NotFound { key: String },

    /// Registry key is already bound
    #[error("Service already registered: {key}")]
    AlreadyRegistered { key: String },

    /// A shared entry re-entered its own construction
    #[error("Circular dependency detected while resolving: {key}")]
    CircularDependency { key: String },

    /// Entry resolved to a value of another type
    #[error("Service '{key}' is not of type {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// Assertion marker holds an invalid regular expression
    #[error("Invalid assertion for parameter '{param}' ({pattern}): {reason}")]
    InvalidAssertion {
        param: String,
        pattern: String,
        reason: String,
    },

    /// Two bindings claim the same route name
    #[error("Route name already bound: {name}")]
    RouteNameConflict { name: String },

    /// No published binding matches the request
    #[error("No route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// A path value could not be converted
    #[error("Failed to convert parameter '{param}': {reason}")]
    ConversionFailed { param: String, reason: String },

    /// Constructor or handler failed
    #[error("Failed to create service {key}: {reason}")]
    CreationFailed { key: String, reason: String },

    /// Two descriptors were defined for one symbol path
    #[error("Type already defined: {symbol}")]
    DuplicateType { symbol: String },

    /// Filesystem access failed while scanning a pack
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be read
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SingularError {
    /// Create a NotFound error for a key
    #[inline]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a TypeNotFound error for a symbol path
    #[inline]
    pub fn type_not_found(symbol: impl Into<String>) -> Self {
        Self::TypeNotFound {
            symbol: symbol.into(),
        }
    }

    /// Create an EmptySegment error
    #[inline]
    pub fn empty_segment(input: impl Into<String>) -> Self {
        Self::EmptySegment {
            input: input.into(),
        }
    }

    /// Create an AlreadyRegistered error
    #[inline]
    pub fn already_registered(key: impl Into<String>) -> Self {
        Self::AlreadyRegistered { key: key.into() }
    }

    /// Create a CircularDependency error
    #[inline]
    pub fn circular(key: impl Into<String>) -> Self {
        Self::CircularDependency { key: key.into() }
    }

    /// Create a TypeMismatch error for the expected type
    #[inline]
    pub fn type_mismatch<T: 'static>(key: impl Into<String>) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a ConversionFailed error
    #[inline]
    pub fn conversion_failed(param: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConversionFailed {
            param: param.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for resolution operations
pub type Result<T> = std::result::Result<T, SingularError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_key() {
        let err = SingularError::not_found("shop.service.cart");
        assert_eq!(err.to_string(), "Service not found: shop.service.cart");
    }
}
