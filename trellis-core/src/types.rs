//! Lazy, memoized type handle resolution

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use trellis_addin_api::{AddinId, ResolveError, ResolveType, ResolvedType, TypeHandle};

use crate::error::EngineError;
use crate::loading::ModuleLoader;

/// Resolves [`TypeHandle`]s against the registration tables of loaded addins.
///
/// The owning addin is loaded on the first resolution of one of its handles,
/// never before. Results are cached per handle until the owner is unloaded.
pub struct TypeResolver {
    loader: Arc<ModuleLoader>,
    cache: RwLock<HashMap<TypeHandle, ResolvedType>>,
}

impl TypeResolver {
    pub fn new(loader: Arc<ModuleLoader>) -> Self {
        Self {
            loader,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    pub fn resolve(&self, handle: &TypeHandle) -> Result<ResolvedType, EngineError> {
        if let Some(resolved) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
        {
            return Ok(resolved.clone());
        }

        let owner = handle.addin();
        if !self.loader.is_registered(owner) {
            return Err(EngineError::NotFound(owner.clone()));
        }
        if !self.loader.is_loaded(owner) {
            tracing::debug!(handle = %handle, "Loading owner on first type resolution");
        }
        self.loader.load(owner)?;

        let resolved = self
            .loader
            .lookup_type(handle)
            .ok_or_else(|| EngineError::TypeNotFound(handle.clone()))?;
        self.remember(handle, &resolved);
        Ok(resolved)
    }

    /// Cache `resolved` unless its owner was unloaded since the lookup.
    ///
    /// Owners are unloaded before [`TypeResolver::invalidate`] runs, so
    /// checking under the write lock never leaves a stale entry behind.
    fn remember(&self, handle: &TypeHandle, resolved: &ResolvedType) -> bool {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if !self.loader.is_loaded(handle.addin()) {
            tracing::debug!(handle = %handle, "Owner unloaded during resolution; not cached");
            return false;
        }
        cache.insert(handle.clone(), resolved.clone());
        true
    }

    /// Drop cached resolutions of types owned by `addin`
    pub fn invalidate(&self, addin: &AddinId) -> usize {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let before = cache.len();
        cache.retain(|handle, _| handle.addin() != addin);
        before - cache.len()
    }

    pub fn is_cached(&self, handle: &TypeHandle) -> bool {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(handle)
    }
}

impl ResolveType for TypeResolver {
    fn resolve_type(&self, handle: &TypeHandle) -> Result<ResolvedType, ResolveError> {
        self.resolve(handle).map_err(ResolveError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadingConfig;
    use crate::error::LoadError;
    use crate::loading::{LoadMethod, StaticLoader};
    use crate::resolution::AddinDescriptor;
    use tempfile::TempDir;
    use trellis_addin_api::{Addin, AddinError, TypeTable};

    struct Handlers;

    impl Addin for Handlers {
        fn register_types(&self, types: &mut TypeTable) -> Result<(), AddinError> {
            types.register("OnClick", Arc::new(42_u32))
        }
    }

    fn resolver(dir: &TempDir) -> (TypeResolver, Arc<StaticLoader>) {
        let location = dir.path().join("handlers");
        std::fs::create_dir_all(&location).unwrap();
        std::fs::write(location.join("handlers.so"), b"unit").unwrap();

        let substrate = Arc::new(StaticLoader::new().with("handlers.so", || Box::new(Handlers)));
        let config = LoadingConfig {
            shadow_copy_enabled: false,
            shadow_copy_directory: dir.path().join("shadow"),
            probing_directories: Vec::new(),
            default_method: LoadMethod::FileBacked,
        };
        let loader = Arc::new(ModuleLoader::new(config, substrate.clone()));
        loader.register(&AddinDescriptor::new("handlers", location).with_code_unit("handlers.so"));
        (TypeResolver::new(loader), substrate)
    }

    #[test]
    fn first_resolution_loads_owner_once() {
        let dir = TempDir::new().unwrap();
        let (types, substrate) = resolver(&dir);
        let handle = TypeHandle::new("handlers", "OnClick");

        assert!(!types.loader().is_loaded(handle.addin()));
        let first = types.resolve(&handle).unwrap();
        let second = types.resolve(&TypeHandle::new("handlers", "OnClick")).unwrap();

        assert_eq!(substrate.load_count("handlers.so"), 1);
        assert!(first.ptr_eq(&second));
        assert_eq!(*first.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn missing_type_after_load() {
        let dir = TempDir::new().unwrap();
        let (types, _) = resolver(&dir);
        let err = types.resolve(&TypeHandle::new("handlers", "Nope")).unwrap_err();
        assert!(matches!(err, EngineError::TypeNotFound(_)));
        // the owner was still loaded
        assert!(types.loader().is_loaded(&AddinId::from("handlers")));
    }

    #[test]
    fn unknown_owner() {
        let dir = TempDir::new().unwrap();
        let (types, _) = resolver(&dir);
        let err = types.resolve_type(&TypeHandle::new("ghost", "X")).unwrap_err();
        assert_eq!(err, ResolveError::UnknownAddin(AddinId::from("ghost")));
    }

    #[test]
    fn load_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let (types, _) = resolver(&dir);
        std::fs::remove_file(dir.path().join("handlers/handlers.so")).unwrap();

        let err = types.resolve(&TypeHandle::new("handlers", "OnClick")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Load { source: LoadError::MissingFile { .. }, .. }
        ));
        assert!(!types.is_cached(&TypeHandle::new("handlers", "OnClick")));
    }

    #[test]
    fn invalidate_drops_owner_entries() {
        let dir = TempDir::new().unwrap();
        let (types, _) = resolver(&dir);
        let handle = TypeHandle::new("handlers", "OnClick");

        types.resolve(&handle).unwrap();
        assert!(types.is_cached(&handle));
        assert_eq!(types.invalidate(&AddinId::from("handlers")), 1);
        assert!(!types.is_cached(&handle));
    }

    #[test]
    fn resolution_outliving_its_owner_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let (types, _) = resolver(&dir);
        let handle = TypeHandle::new("handlers", "OnClick");

        types.loader().load(handle.addin()).unwrap();
        let resolved = types.loader().lookup_type(&handle).unwrap();
        types.loader().retire(handle.addin());
        types.invalidate(handle.addin());

        assert!(!types.remember(&handle, &resolved));
        assert!(!types.is_cached(&handle));
    }
}
