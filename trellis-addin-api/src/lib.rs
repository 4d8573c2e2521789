//! trellis-addin-api - Addin API for the trellis extension container
//!
//! This crate provides the traits and types an addin needs to contribute
//! extensions to a trellis host. Addins are native Rust dynamic libraries
//! (or statically linked units) that register named types when their code is
//! loaded. The host refers to those types through [`TypeHandle`]s and only
//! loads an addin's code when one of its types is actually needed.
//!
//! # Example
//!
//! ```ignore
//! use trellis_addin_api::{
//!     Addin, AddinError, BuildContext, ExtensionError, ExtensionValue, TypeTable,
//!     export_addin, factory_fn,
//! };
//!
//! #[derive(Default)]
//! pub struct HelloAddin;
//!
//! impl Addin for HelloAddin {
//!     fn register_types(&self, types: &mut TypeTable) -> Result<(), AddinError> {
//!         types.register_factory(
//!             "Greeting",
//!             factory_fn(|ctx: &BuildContext<'_>| {
//!                 let text: String = ctx.config().get("text").unwrap_or_default();
//!                 Ok(ExtensionValue::new(text))
//!             }),
//!         )
//!     }
//! }
//!
//! export_addin!(HelloAddin);
//! ```

pub mod builder;
pub mod error;
pub mod registry;
pub mod types;

pub use builder::{
    BuildContext, BuilderConfig, BuilderDescriptor, BuilderKind, CompositeExtensionBuilder,
    ExtensionBuilder, ExtensionFactory, FnFactory, factory_fn,
};
pub use error::{AddinError, ExtensionError, ResolveError};
pub use registry::{ResolveType, ResolvedType, TypeTable};
pub use types::{AddinId, ExtensionValue, TypeHandle};

/// Current addin API version. Addins must match this exactly.
/// This is checked when a code unit is loaded.
pub const API_VERSION: u32 = 1;

/// Entry point of one loaded code unit.
///
/// The host calls [`Addin::register_types`] exactly once, right after the
/// unit is loaded, and consults [`Addin::references`] to find further code
/// units that must be probed for and loaded alongside it.
pub trait Addin: Send + Sync {
    /// Register every type this code unit makes available to the host.
    fn register_types(&self, types: &mut TypeTable) -> Result<(), AddinError>;

    /// File names of other code units this unit needs (resolved through the
    /// host's probing directories).
    fn references(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called when the host releases this code unit.
    fn on_unload(&mut self) -> Result<(), AddinError> {
        Ok(())
    }
}

/// Export an addin type for dynamic loading.
///
/// This macro generates the C ABI entry points that the trellis native
/// loader resolves.
///
/// # Usage
///
/// ```ignore
/// trellis_addin_api::export_addin!(MyAddin);
/// ```
///
/// # Generated Functions
///
/// - `_trellis_addin_create()`: Creates a new addin instance
/// - `_trellis_addin_api_version()`: Returns the API version
/// - `_trellis_addin_destroy()`: Destroys an addin instance
#[macro_export]
macro_rules! export_addin {
    ($addin_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _trellis_addin_create() -> *mut dyn $crate::Addin {
            let addin: Box<dyn $crate::Addin> = Box::new(<$addin_type>::default());
            Box::into_raw(addin)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _trellis_addin_api_version() -> u32 {
            $crate::API_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _trellis_addin_destroy(ptr: *mut dyn $crate::Addin) {
            if !ptr.is_null() {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
            }
        }
    };
}
