//! Error types for addin authors and the builder protocol

use thiserror::Error;

use crate::types::{AddinId, TypeHandle};

/// Errors raised by extension builders and the composition operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtensionError {
    /// Required builder configuration is missing
    #[error("Builder '{builder}' is missing required configuration field '{field}'")]
    Configuration { builder: String, field: String },

    /// A composition operation received no value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Insertion index past the end of the child list
    #[error("Index {index} out of range for {len} children")]
    IndexOutOfRange { index: usize, len: usize },

    /// A child operation was attempted before the parent was built
    #[error("Builder '{0}' has not been built yet")]
    NotBuilt(String),

    /// A child operation was attempted on a leaf builder
    #[error("Builder '{0}' does not accept children")]
    NotComposite(String),

    /// A nested builder names a parent that is not attached to the point
    #[error("Builder '{builder}' names unknown parent '{parent}'")]
    UnknownParent { builder: String, parent: String },

    /// The factory type could not be resolved
    #[error("Type resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    /// The resolved type is not an extension factory
    #[error("Type '{0}' is not an extension factory")]
    NotAFactory(TypeHandle),

    /// The factory itself reported an error
    #[error("Factory error: {0}")]
    Factory(String),
}

impl ExtensionError {
    /// Create a configuration error for a missing field
    pub fn configuration(builder: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Configuration {
            builder: builder.into(),
            field: field.into(),
        }
    }

    /// Create a factory error with a message
    pub fn factory(message: impl Into<String>) -> Self {
        Self::Factory(message.into())
    }
}

/// Errors from resolving a [`TypeHandle`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// The owning addin loaded but did not register the type
    #[error("Type not found: {0}")]
    TypeNotFound(TypeHandle),

    /// The owning addin is not known to the host
    #[error("Unknown addin: {0}")]
    UnknownAddin(AddinId),

    /// Loading the owning addin's code failed
    #[error("Failed to load addin '{addin}': {message}")]
    Load { addin: AddinId, message: String },
}

/// Errors that addin code can return to the host
#[derive(Error, Debug)]
pub enum AddinError {
    /// The same type name was registered twice by one addin
    #[error("Duplicate type: {0}")]
    DuplicateType(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),
}

impl AddinError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_names_field() {
        let err = ExtensionError::configuration("file-menu", "label");
        let msg = err.to_string();
        assert!(msg.contains("file-menu"));
        assert!(msg.contains("label"));
    }

    #[test]
    fn test_index_out_of_range_display() {
        let err = ExtensionError::IndexOutOfRange { index: 4, len: 2 };
        let msg = err.to_string();
        assert!(msg.contains('4'));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_resolve_error_converts() {
        let handle = TypeHandle::new("core", "Missing");
        let err: ExtensionError = ResolveError::TypeNotFound(handle).into();
        assert!(matches!(err, ExtensionError::Resolve(_)));
        assert!(err.to_string().contains("core/Missing"));
    }

    #[test]
    fn test_load_error_display() {
        let err = ResolveError::Load {
            addin: AddinId::from("ui"),
            message: "no such file".to_string(),
        };
        assert!(err.to_string().contains("ui"));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_addin_error_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AddinError = io_err.into();
        assert!(matches!(err, AddinError::Io(_)));
        assert!(AddinError::custom("boom").to_string().contains("boom"));
    }
}
