//! Error types for trellis-core

use std::path::PathBuf;

use thiserror::Error;
use trellis_addin_api::{AddinError, AddinId, ExtensionError, ResolveError, TypeHandle};

use crate::lifecycle::AddinStatus;
use crate::properties::PropertyOwner;

/// Top-level error type for trellis-core
#[derive(Error, Debug)]
pub enum EngineError {
    /// A second root was bound without unbinding the first
    #[error("Extension point '{0}' already has a bound root")]
    AlreadyBound(String),

    /// The extension point has no root
    #[error("Extension point '{0}' has no bound root")]
    NotBound(String),

    /// Loading an addin's code failed
    #[error("Failed to load addin '{addin}': {source}")]
    Load {
        addin: AddinId,
        #[source]
        source: LoadError,
    },

    /// Builder or tree operation failed
    #[error("Extension error: {0}")]
    Extension(#[from] ExtensionError),

    /// The owning addin loaded but does not register the type
    #[error("Type not found: {0}")]
    TypeNotFound(TypeHandle),

    /// Property key already written by another (or the same) owner
    #[error("Property key '{key}' is already set by {owner}")]
    KeyConflict { key: String, owner: PropertyOwner },

    /// Property key absent
    #[error("Property key not found: {0}")]
    KeyNotFound(String),

    /// Transition not on the status graph
    #[error("Invalid status transition for '{addin}': {from} -> {to}")]
    InvalidTransition {
        addin: AddinId,
        from: AddinStatus,
        to: AddinStatus,
    },

    /// Addin not known to the engine
    #[error("Addin not found: {0}")]
    NotFound(AddinId),

    /// Lifecycle entry point called before `initialize`
    #[error("Engine is not initialized")]
    NotInitialized,

    /// The manifest resolver produced no plan
    #[error("Resolution failed: {0}")]
    Resolution(String),

    /// A status listener rejected a transition
    #[error("Listener '{listener}' failed: {message}")]
    Listener { listener: String, message: String },

    /// Engine configuration could not be read or written
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a listener error
    pub fn listener(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Listener {
            listener: listener.into(),
            message: message.into(),
        }
    }
}

impl From<EngineError> for ResolveError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::TypeNotFound(handle) => ResolveError::TypeNotFound(handle),
            EngineError::NotFound(addin) => ResolveError::UnknownAddin(addin),
            EngineError::Load { addin, source } => ResolveError::Load {
                addin,
                message: source.to_string(),
            },
            other => ResolveError::Load {
                addin: AddinId::from("<engine>"),
                message: other.to_string(),
            },
        }
    }
}

/// Errors from bringing an addin's code units into the process
#[derive(Error, Debug)]
pub enum LoadError {
    /// Code unit file not found in the addin location or any probing directory
    #[error("Code unit '{unit}' not found (searched {searched:?})")]
    MissingFile {
        unit: String,
        searched: Vec<PathBuf>,
    },

    /// IO error while copying or reading a code unit
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to open a dynamic library
    #[error("Failed to load library: {0}")]
    Library(#[from] libloading::Error),

    /// API version mismatch between trellis and the code unit
    #[error("API version mismatch: trellis expects {expected}, code unit has {found}")]
    ApiVersionMismatch { expected: u32, found: u32 },

    /// The loading substrate rejected the code unit
    #[error("Loader rejected code unit '{unit}': {message}")]
    Substrate { unit: String, message: String },

    /// The code unit failed to register its types
    #[error("Type registration failed: {0}")]
    Registration(#[from] AddinError),

    /// The addin was never registered with the loader
    #[error("Unknown addin: {0}")]
    UnknownAddin(AddinId),

    /// The addin has stopped or failed and its code may not be loaded again
    #[error("Addin '{0}' is stopped or failed")]
    Retired(AddinId),
}

impl LoadError {
    pub fn substrate(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Substrate {
            unit: unit.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_missing_file_lists_search_paths() {
        let err = LoadError::MissingFile {
            unit: "libui.so".to_string(),
            searched: vec![PathBuf::from("/addins/ui"), PathBuf::from("/shared")],
        };
        let msg = err.to_string();
        assert!(msg.contains("libui.so"));
        assert!(msg.contains("/shared"));
    }

    #[test]
    fn engine_load_error_keeps_source() {
        let err = EngineError::Load {
            addin: AddinId::from("ui"),
            source: LoadError::ApiVersionMismatch {
                expected: 1,
                found: 2,
            },
        };
        assert!(err.to_string().contains("ui"));
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("expects 1"));
    }

    #[test]
    fn engine_error_converts_to_resolve_error() {
        let handle = TypeHandle::new("core", "Missing");
        let err: ResolveError = EngineError::TypeNotFound(handle.clone()).into();
        assert_eq!(err, ResolveError::TypeNotFound(handle));

        let err: ResolveError = EngineError::Load {
            addin: AddinId::from("core"),
            source: LoadError::substrate("core.so", "bad format"),
        }
        .into();
        assert!(matches!(err, ResolveError::Load { message, .. } if message.contains("bad format")));
    }

    #[test]
    fn key_conflict_names_owner() {
        let err = EngineError::KeyConflict {
            key: "theme".to_string(),
            owner: PropertyOwner::Addin(AddinId::from("ui")),
        };
        assert!(err.to_string().contains("theme"));
        assert!(err.to_string().contains("ui"));
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
