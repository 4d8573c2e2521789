//! Native dynamic library substrate

use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use libloading::Library;
use trellis_addin_api::{API_VERSION, Addin};

use super::CodeLoader;
use crate::error::LoadError;

/// Loads addins built with `export_addin!` from shared libraries.
///
/// Libraries stay mapped until the loader itself is dropped: code handed out
/// by a unit (factories, handlers) may still be referenced after the unit is
/// released, so unloading a unit never closes its library.
#[derive(Default)]
pub struct NativeLoader {
    retained: Mutex<Vec<Library>>,
}

impl NativeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of libraries opened so far
    pub fn library_count(&self) -> usize {
        self.retained.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Addin>, LoadError> {
        // SAFETY: the library was placed in an addin location by the operator
        // and is expected to follow the export_addin! contract.
        let library = unsafe { Library::new(path)? };

        // SAFETY: calling a C function exported by the addin.
        let api_version_fn: libloading::Symbol<extern "C" fn() -> u32> =
            unsafe { library.get(b"_trellis_addin_api_version")? };

        let found = api_version_fn();
        if found != API_VERSION {
            return Err(LoadError::ApiVersionMismatch {
                expected: API_VERSION,
                found,
            });
        }

        // SAFETY: the create function returns a pointer produced by
        // Box::into_raw in the addin, converted back into the Box here.
        let create_fn: libloading::Symbol<extern "C" fn() -> *mut dyn Addin> =
            unsafe { library.get(b"_trellis_addin_create")? };
        let instance = unsafe { Box::from_raw(create_fn()) };

        self.retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(library);
        Ok(instance)
    }
}

impl CodeLoader for NativeLoader {
    fn load_file(&self, path: &Path) -> Result<Box<dyn Addin>, LoadError> {
        tracing::debug!(path = %path.display(), "Opening addin library");
        self.open(path)
    }

    fn load_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<Box<dyn Addin>, LoadError> {
        // dlopen needs a file; stage the bytes in an anonymous temp file that
        // is deleted again once the library is mapped.
        let mut staged = tempfile::Builder::new()
            .prefix("trellis-")
            .suffix(&format!("-{name}"))
            .tempfile()?;
        staged.write_all(&bytes)?;
        staged.flush()?;
        tracing::debug!(unit = %name, size = bytes.len(), "Opening addin library from memory");
        self.open(staged.path())
    }

    fn supports_unload(&self) -> bool {
        false
    }
}
