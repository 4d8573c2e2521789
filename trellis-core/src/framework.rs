//! Framework - services shared between the engine, listeners and the host

use std::sync::Arc;

use crate::error::EngineError;
use crate::extension::ExtensionRegistry;
use crate::properties::{PropertyNamespace, PropertyOwner, PropertyValue};
use crate::types::TypeResolver;

/// One per engine instance; handed to every status listener.
pub struct Framework {
    properties: PropertyNamespace,
    extensions: ExtensionRegistry,
    types: Arc<TypeResolver>,
}

impl Framework {
    pub fn new(types: Arc<TypeResolver>) -> Self {
        Self {
            properties: PropertyNamespace::new(),
            extensions: ExtensionRegistry::new(),
            types,
        }
    }

    pub fn properties(&self) -> &PropertyNamespace {
        &self.properties
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    pub fn types(&self) -> &Arc<TypeResolver> {
        &self.types
    }

    pub fn set_property(
        &self,
        owner: &PropertyOwner,
        key: impl Into<String>,
        value: PropertyValue,
    ) -> Result<(), EngineError> {
        self.properties.set_shared(owner, key, value)
    }

    pub fn get_property(&self, key: &str) -> Result<PropertyValue, EngineError> {
        self.properties.get_property(key)
    }

    pub fn contains_property_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }
}
