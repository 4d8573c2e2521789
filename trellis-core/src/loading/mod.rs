//! Module loading policy
//!
//! Decides, per addin, how its code units are brought into the process and
//! where they are read from:
//!
//! - [`ModuleLoader`]: locates code units (addin location, then probing
//!   directories), shadow-copies them if enabled, and loads them through a
//!   [`CodeLoader`] substrate
//! - [`NativeLoader`]: dynamic libraries via `libloading`
//! - [`StaticLoader`]: addins linked into the host binary
//!
//! # Unloading
//!
//! Neither bundled substrate can give a loaded unit's memory back to the
//! process. [`ModuleLoader::unload`] drops the addin's instances and type
//! registrations and removes its shadow copies, but hosts that need memory
//! reclamation must isolate addins at the process level.

mod native;
mod policy;
mod static_loader;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use trellis_addin_api::Addin;

use crate::error::LoadError;

pub use native::NativeLoader;
pub use policy::{ConfiguredMethod, LoadMethodSelector, ModuleLoader};
pub use static_loader::StaticLoader;

/// How a code unit is handed to the substrate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadMethod {
    /// Load from a path: richer diagnostics, requires a real file
    #[default]
    FileBacked,
    /// Load from raw bytes: never holds the deployed file, loses the path
    MemoryBacked,
}

/// The code-loading substrate
pub trait CodeLoader: Send + Sync {
    fn load_file(&self, path: &Path) -> Result<Box<dyn Addin>, LoadError>;

    fn load_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<Box<dyn Addin>, LoadError>;

    /// Whether dropping a unit actually releases its code
    fn supports_unload(&self) -> bool;
}

/// One loaded code unit of an addin
pub struct CodeUnit {
    name: String,
    origin: Option<PathBuf>,
    method: LoadMethod,
    instance: Box<dyn Addin>,
}

impl CodeUnit {
    pub(crate) fn new(
        name: String,
        origin: Option<PathBuf>,
        method: LoadMethod,
        instance: Box<dyn Addin>,
    ) -> Self {
        Self {
            name,
            origin,
            method,
            instance,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the unit was loaded from; `None` for memory-backed loads
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    pub fn method(&self) -> LoadMethod {
        self.method
    }

    pub(crate) fn instance(&self) -> &dyn Addin {
        self.instance.as_ref()
    }
}

impl Drop for CodeUnit {
    fn drop(&mut self) {
        // on_unload runs before the instance (and any library behind it) goes away
        if let Err(e) = self.instance.on_unload() {
            tracing::warn!(
                unit = %self.name,
                error = %e,
                "Code unit on_unload returned error"
            );
        }
    }
}

/// Extensions that mark a unit name as a complete library file name
const LIBRARY_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];

/// Platform file name candidates for a code unit name
pub(crate) fn library_file_names(unit: &str) -> Vec<String> {
    let has_library_extension = Path::new(unit)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| LIBRARY_EXTENSIONS.contains(&ext));
    if has_library_extension {
        return vec![unit.to_string()];
    }
    let extensions: &[&str] = if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else if cfg!(target_os = "windows") {
        &["dll"]
    } else {
        &["so"]
    };
    extensions
        .iter()
        .flat_map(|ext| [format!("{unit}.{ext}"), format!("lib{unit}.{ext}")])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_file_name_is_kept() {
        assert_eq!(library_file_names("core.so"), vec!["core.so"]);
        assert_eq!(library_file_names("libcore.dylib"), vec!["libcore.dylib"]);
    }

    #[test]
    fn dotted_name_without_library_extension_is_expanded() {
        let names = library_file_names("core.v2");
        assert!(names.len() >= 2);
        assert!(names.iter().all(|n| n.contains("core.v2.")));
        assert!(names.iter().any(|n| n.starts_with("libcore.v2.")));
    }

    #[test]
    fn bare_name_expands_to_platform_candidates() {
        let names = library_file_names("core");
        assert!(names.len() >= 2);
        assert!(names.iter().all(|n| n.contains("core")));
        assert!(names.iter().any(|n| n.starts_with("lib")));
    }

    #[test]
    fn load_method_serializes_snake_case() {
        let json = serde_json::to_string(&LoadMethod::MemoryBacked).unwrap();
        assert_eq!(json, "\"memory_backed\"");
    }
}
