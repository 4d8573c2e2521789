//! Shared property namespace
//!
//! A process-wide key/value space through which extension trees, addins and
//! the host publish data to each other. Keys are never overwritten: a second
//! write to a present key fails with [`EngineError::KeyConflict`], whoever
//! the writer is.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use trellis_addin_api::AddinId;

use crate::error::EngineError;

/// Shared, type-erased property value
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Who wrote a property entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyOwner {
    /// The hosting application
    Host,
    /// An addin, usually from a status listener
    Addin(AddinId),
    /// A host-owned extension point
    ExtensionPoint(String),
}

impl fmt::Display for PropertyOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Addin(id) => write!(f, "addin '{id}'"),
            Self::ExtensionPoint(name) => write!(f, "extension point '{name}'"),
        }
    }
}

struct PropertyEntry {
    owner: PropertyOwner,
    value: PropertyValue,
}

/// Collision-checked key/value namespace.
///
/// Mutated by the control thread during transitions; other readers get a
/// snapshot of whatever is present at the time of the call.
#[derive(Default)]
pub struct PropertyNamespace {
    entries: RwLock<HashMap<String, PropertyEntry>>,
}

impl PropertyNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `value` under `key`
    pub fn set_property<T: Any + Send + Sync>(
        &self,
        owner: &PropertyOwner,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), EngineError> {
        self.set_shared(owner, key, Arc::new(value))
    }

    /// Publish an already shared value under `key`
    pub fn set_shared(
        &self,
        owner: &PropertyOwner,
        key: impl Into<String>,
        value: PropertyValue,
    ) -> Result<(), EngineError> {
        let key = key.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&key) {
            return Err(EngineError::KeyConflict {
                key,
                owner: existing.owner.clone(),
            });
        }
        tracing::debug!(key = %key, owner = %owner, "Property set");
        entries.insert(
            key,
            PropertyEntry {
                owner: owner.clone(),
                value,
            },
        );
        Ok(())
    }

    pub fn get_property(&self, key: &str) -> Result<PropertyValue, EngineError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|entry| Arc::clone(&entry.value))
            .ok_or_else(|| EngineError::KeyNotFound(key.to_string()))
    }

    /// Read a property as `T`; `None` if it holds another type
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>, EngineError> {
        Ok(self.get_property(key)?.downcast::<T>().ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn owner_of(&self, key: &str) -> Option<PropertyOwner> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|entry| entry.owner.clone())
    }

    /// Remove a property written by `owner`.
    ///
    /// Returns `false` if the key is absent. Removing another owner's key
    /// fails with [`EngineError::KeyConflict`].
    pub fn remove_property(&self, owner: &PropertyOwner, key: &str) -> Result<bool, EngineError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            None => Ok(false),
            Some(entry) if &entry.owner != owner => Err(EngineError::KeyConflict {
                key: key.to_string(),
                owner: entry.owner.clone(),
            }),
            Some(_) => {
                entries.remove(key);
                tracing::debug!(key = %key, owner = %owner, "Property removed");
                Ok(true)
            }
        }
    }

    /// Remove every key written by `owner`, returning the removed keys sorted
    pub fn remove_owned_by(&self, owner: &PropertyOwner) -> Vec<String> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| &entry.owner == owner)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &removed {
            entries.remove(key);
        }
        removed.sort();
        removed
    }

    /// Snapshot of present keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
