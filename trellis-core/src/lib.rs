//! trellis-core: Addin container engine
//!
//! This crate composes independently built addins into a host process:
//!
//! - **Lifecycle** - [`AddinEngine`] moves addins through [`AddinStatus`] and
//!   publishes [`StatusEvent`]s to listeners and a broadcast channel
//! - **Extension composition** - [`ExtensionPoint`] binds builders to a
//!   host-owned root; [`DeclaredBuilder`] builds each node at most once
//! - **Module loading** - [`ModuleLoader`] with shadow copies, probing
//!   directories and file- or memory-backed loads
//! - **Type resolution** - [`TypeResolver`] loads an addin on first use of one
//!   of its types
//! - **Properties** - [`PropertyNamespace`] is a collision-checked key/value
//!   space shared by the host and addins
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis_core::{AddinEngine, EngineConfig, NativeLoader, RootNode};
//!
//! fn example() -> Result<(), trellis_core::EngineError> {
//!     let config = EngineConfig::load(&EngineConfig::default_path())?;
//!     let engine = AddinEngine::new(config, Arc::new(NativeLoader::new()));
//!     engine.initialize(true)?;
//!
//!     let menu = Arc::new(engine.extension_point("main-menu"));
//!     menu.bind(Arc::new(RootNode::new()))?;
//!     engine.load_extension_point(menu)?;
//!
//!     engine.stop()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extension;
pub mod framework;
pub mod lifecycle;
pub mod loading;
pub mod properties;
pub mod resolution;
pub mod types;

pub use config::{EngineConfig, LoadingConfig};
pub use error::{EngineError, LoadError};
pub use extension::{DeclaredBuilder, ExtensionPoint, ExtensionRegistry, ExtensionRoot, RootNode};
pub use framework::Framework;
pub use lifecycle::{
    AddinEngine, AddinFailure, AddinInfo, AddinStatus, EngineBuilder, FnListener, StatusEvent,
    StatusListener, listener_fn,
};
pub use loading::{
    CodeLoader, CodeUnit, ConfiguredMethod, LoadMethod, LoadMethodSelector, ModuleLoader,
    NativeLoader, StaticLoader,
};
pub use properties::{PropertyNamespace, PropertyOwner, PropertyValue};
pub use resolution::{
    AddinDescriptor, AddinResolutionPlan, AddinScanner, DirectoryScanner, ExtensionDeclaration,
    ManifestResolver, NameConvention, RejectedAddin, ResolutionContext, ScannedAddin, StaticPlan,
    TomlManifestResolver,
};
pub use types::TypeResolver;
