//! Extension composition: declared builders, contribution registry and the
//! tree binder that places built values under host-owned roots.

mod builder;
mod point;
mod registry;

pub use builder::DeclaredBuilder;
pub use point::{ExtensionPoint, ExtensionRoot, RootNode};
pub use registry::ExtensionRegistry;
