//! Substrate for addins linked into the host binary

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use trellis_addin_api::Addin;

use super::CodeLoader;
use crate::error::LoadError;

type Constructor = Arc<dyn Fn() -> Box<dyn Addin> + Send + Sync>;

/// Code units resolved from an in-process constructor table.
///
/// Units are keyed by file name: the policy still locates (and optionally
/// shadow-copies) the deployed file, the substrate then instantiates the
/// addin registered under that file's name instead of mapping its contents.
#[derive(Default)]
pub struct StaticLoader {
    constructors: RwLock<HashMap<String, Constructor>>,
    loads: Mutex<Vec<String>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for the code unit file `unit`
    pub fn register<F>(&self, unit: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Addin> + Send + Sync + 'static,
    {
        self.constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(unit.into(), Arc::new(constructor));
    }

    /// Builder form of [`StaticLoader::register`]
    pub fn with<F>(self, unit: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn Addin> + Send + Sync + 'static,
    {
        self.register(unit, constructor);
        self
    }

    /// How many times `unit` has been instantiated
    pub fn load_count(&self, unit: &str) -> usize {
        self.loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|name| name.as_str() == unit)
            .count()
    }

    fn instantiate(&self, unit: &str) -> Result<Box<dyn Addin>, LoadError> {
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(unit)
            .cloned()
            .ok_or_else(|| LoadError::substrate(unit, "no statically linked addin registered"))?;
        self.loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(unit.to_string());
        Ok(constructor())
    }
}

impl CodeLoader for StaticLoader {
    fn load_file(&self, path: &Path) -> Result<Box<dyn Addin>, LoadError> {
        let unit = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| LoadError::substrate(path.display().to_string(), "invalid file name"))?;
        self.instantiate(unit)
    }

    fn load_bytes(&self, name: &str, _bytes: Vec<u8>) -> Result<Box<dyn Addin>, LoadError> {
        self.instantiate(name)
    }

    fn supports_unload(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_addin_api::{AddinError, TypeTable};

    #[derive(Default)]
    struct Nothing;

    impl Addin for Nothing {
        fn register_types(&self, _types: &mut TypeTable) -> Result<(), AddinError> {
            Ok(())
        }
    }

    #[test]
    fn loads_registered_unit_by_file_name() {
        let loader = StaticLoader::new().with("core.so", || Box::new(Nothing));

        loader.load_file(Path::new("/addins/core/core.so")).unwrap();
        loader.load_bytes("core.so", Vec::new()).unwrap();

        assert_eq!(loader.load_count("core.so"), 2);
        assert_eq!(loader.load_count("other.so"), 0);
    }

    #[test]
    fn unknown_unit_is_substrate_error() {
        let loader = StaticLoader::new();
        let err = loader.load_file(Path::new("/addins/x/x.so")).err().unwrap();
        assert!(matches!(err, LoadError::Substrate { unit, .. } if unit == "x.so"));
    }
}
