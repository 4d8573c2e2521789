//! Per-addin type registration table and the resolution contract

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::builder::ExtensionFactory;
use crate::error::{AddinError, ResolveError};
use crate::types::{AddinId, TypeHandle};

/// A type resolved from a [`TypeHandle`].
///
/// Extension factories are stored as `Arc<Arc<dyn ExtensionFactory>>` so they
/// can travel through the `Any` table; use [`ResolvedType::factory`] to get
/// them back.
#[derive(Clone)]
pub struct ResolvedType {
    handle: TypeHandle,
    value: Arc<dyn Any + Send + Sync>,
}

impl ResolvedType {
    pub fn handle(&self) -> &TypeHandle {
        &self.handle
    }

    /// Downcast to a registered service of type `T`
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    /// The extension factory registered under this handle, if it is one
    pub fn factory(&self) -> Option<Arc<dyn ExtensionFactory>> {
        self.downcast::<Arc<dyn ExtensionFactory>>()
            .map(|factory| Arc::clone(factory.as_ref()))
    }

    /// Whether both resolutions point at the same registered entry
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl std::fmt::Debug for ResolvedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedType")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Registration table filled in by one addin while its code is loaded.
///
/// Replaces name-based reflection: the host looks types up here by
/// `(addin, name)` instead of introspecting loaded code.
#[derive(Debug)]
pub struct TypeTable {
    addin: AddinId,
    entries: HashMap<String, ResolvedType>,
}

impl TypeTable {
    pub fn new(addin: AddinId) -> Self {
        Self {
            addin,
            entries: HashMap::new(),
        }
    }

    pub fn addin(&self) -> &AddinId {
        &self.addin
    }

    /// Register an extension factory under `name`
    pub fn register_factory(
        &mut self,
        name: &str,
        factory: impl ExtensionFactory + 'static,
    ) -> Result<(), AddinError> {
        let factory: Arc<dyn ExtensionFactory> = Arc::new(factory);
        self.register(name, Arc::new(factory))
    }

    /// Register an arbitrary shared value (e.g. a command handler) under `name`
    pub fn register<T: Any + Send + Sync>(
        &mut self,
        name: &str,
        value: Arc<T>,
    ) -> Result<(), AddinError> {
        if self.entries.contains_key(name) {
            return Err(AddinError::DuplicateType(format!("{}/{}", self.addin, name)));
        }
        let resolved = ResolvedType {
            handle: TypeHandle::new(self.addin.clone(), name),
            value,
        };
        self.entries.insert(name.to_string(), resolved);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedType> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move every entry of `other` into this table
    pub fn merge(&mut self, other: TypeTable) -> Result<(), AddinError> {
        if let Some(name) = other.entries.keys().find(|name| self.entries.contains_key(*name)) {
            return Err(AddinError::DuplicateType(format!("{}/{}", self.addin, name)));
        }
        self.entries.extend(other.entries);
        Ok(())
    }
}

/// Resolves deferred type handles, loading the owning addin on first use.
pub trait ResolveType: Send + Sync {
    fn resolve_type(&self, handle: &TypeHandle) -> Result<ResolvedType, ResolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{BuildContext, factory_fn};
    use crate::types::ExtensionValue;

    fn table() -> TypeTable {
        TypeTable::new(AddinId::from("core"))
    }

    #[test]
    fn test_register_and_get_service() {
        let mut types = table();
        types.register("Answer", Arc::new(42u64)).unwrap();

        let resolved = types.get("Answer").unwrap();
        assert_eq!(resolved.handle(), &TypeHandle::new("core", "Answer"));
        assert_eq!(resolved.downcast::<u64>().as_deref(), Some(&42));
        assert!(resolved.factory().is_none());
    }

    #[test]
    fn test_register_factory_roundtrips_through_any() {
        let mut types = table();
        types
            .register_factory(
                "Label",
                factory_fn(|_ctx: &BuildContext<'_>| Ok(ExtensionValue::new("label"))),
            )
            .unwrap();

        assert!(types.get("Label").unwrap().factory().is_some());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut types = table();
        types.register("A", Arc::new(1u8)).unwrap();
        let err = types.register("A", Arc::new(2u8)).unwrap_err();
        assert!(matches!(err, AddinError::DuplicateType(name) if name == "core/A"));
        assert_eq!(types.len(), 1);
    }

    #[test]
    fn test_merge_rejects_overlap() {
        let mut first = table();
        first.register("A", Arc::new(1u8)).unwrap();
        let mut second = table();
        second.register("A", Arc::new(2u8)).unwrap();

        assert!(first.merge(second).is_err());

        let mut third = table();
        third.register("B", Arc::new(3u8)).unwrap();
        first.merge(third).unwrap();
        assert!(first.contains("B"));
    }
}
