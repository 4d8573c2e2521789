//! Extension builder protocol
//!
//! A builder describes how to materialize one extension node. Leaf builders
//! produce a value; composite builders produce a value that also holds an
//! ordered list of child extension values. Builders cache what they build:
//! asking for the value again returns the same node.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ExtensionError;
use crate::registry::{ResolveType, ResolvedType};
use crate::types::{AddinId, ExtensionValue, TypeHandle};

/// Capability set of a builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuilderKind {
    /// Produces a value, takes no children
    #[default]
    Leaf,
    /// Produces a value that accepts ordered children
    Composite,
}

/// Typed key/value configuration attached to one builder declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuilderConfig {
    values: BTreeMap<String, toml::Value>,
}

impl BuilderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values.get(key).and_then(|v| v.clone().try_into().ok())
    }

    /// Write a configuration value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), ExtensionError> {
        let value = toml::Value::try_from(value)
            .map_err(|e| ExtensionError::InvalidArgument(format!("config '{key}': {e}")))?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Declaration of one builder, as read from an addin manifest or built in code.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderDescriptor {
    /// Builder id, unique within its addin and extension point
    pub id: String,
    /// Owning addin
    pub addin: AddinId,
    pub kind: BuilderKind,
    /// Id of a composite builder on the same point to nest under
    pub parent: Option<String>,
    /// Explicit position among the target's children
    pub insert_index: Option<usize>,
    /// Configuration fields that must be present before activation
    pub required: Vec<String>,
    pub config: BuilderConfig,
}

impl BuilderDescriptor {
    pub fn leaf(addin: impl Into<AddinId>, id: impl Into<String>) -> Self {
        Self::new(addin.into(), id.into(), BuilderKind::Leaf)
    }

    pub fn composite(addin: impl Into<AddinId>, id: impl Into<String>) -> Self {
        Self::new(addin.into(), id.into(), BuilderKind::Composite)
    }

    fn new(addin: AddinId, id: String, kind: BuilderKind) -> Self {
        Self {
            id,
            addin,
            kind,
            parent: None,
            insert_index: None,
            required: Vec::new(),
            config: BuilderConfig::new(),
        }
    }

    /// Builder: nest under another builder on the same point
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Builder: insert at a fixed position
    pub fn at_index(mut self, index: usize) -> Self {
        self.insert_index = Some(index);
        self
    }

    /// Builder: mark a configuration field as required
    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    /// Builder: set a configuration value
    pub fn with_config<T: Serialize>(mut self, key: &str, value: T) -> Result<Self, ExtensionError> {
        self.config.set(key, value)?;
        Ok(self)
    }

    /// Check declared requirements against the configuration.
    ///
    /// Runs at resolve time so missing configuration fails the addin before
    /// any of its code is loaded.
    pub fn validate(&self) -> Result<(), ExtensionError> {
        match self.required.iter().find(|field| !self.config.contains(field)) {
            Some(field) => Err(ExtensionError::configuration(&self.id, field.as_str())),
            None => Ok(()),
        }
    }
}

/// What a factory sees while it builds one node.
pub struct BuildContext<'a> {
    descriptor: &'a BuilderDescriptor,
    types: &'a dyn ResolveType,
}

impl<'a> BuildContext<'a> {
    pub fn new(descriptor: &'a BuilderDescriptor, types: &'a dyn ResolveType) -> Self {
        Self { descriptor, types }
    }

    pub fn addin(&self) -> &AddinId {
        &self.descriptor.addin
    }

    pub fn builder_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.descriptor.config
    }

    /// Resolve another type (possibly owned by another addin).
    ///
    /// Prefer storing the [`TypeHandle`] in the built value and resolving it
    /// when the behavior is invoked, so the owning addin stays unloaded until
    /// then.
    pub fn resolve(&self, handle: &TypeHandle) -> Result<ResolvedType, ExtensionError> {
        Ok(self.types.resolve_type(handle)?)
    }

    /// Parse a configured type reference relative to the building addin
    pub fn handle(&self, key: &str) -> Option<TypeHandle> {
        self.config()
            .get::<String>(key)
            .map(|reference| TypeHandle::parse(self.addin(), &reference))
    }

    pub fn log_debug(&self, message: &str) {
        tracing::debug!(addin = %self.descriptor.addin, builder = %self.descriptor.id, "{}", message);
    }
}

/// Addin-side code that creates the value for a builder.
///
/// The child hooks let a composite value mirror child changes into whatever
/// host resource it wraps (a menu widget, a route table).
pub trait ExtensionFactory: Send + Sync {
    fn create(&self, ctx: &BuildContext<'_>) -> Result<ExtensionValue, ExtensionError>;

    fn child_inserted(&self, _parent: &ExtensionValue, _index: usize, _child: &ExtensionValue) {}

    fn child_removed(&self, _parent: &ExtensionValue, _child: &ExtensionValue) {}
}

/// Adapter turning a closure into an [`ExtensionFactory`]
pub struct FnFactory<F>(F);

/// Wrap a closure as an extension factory
pub fn factory_fn<F>(f: F) -> FnFactory<F>
where
    F: Fn(&BuildContext<'_>) -> Result<ExtensionValue, ExtensionError> + Send + Sync,
{
    FnFactory(f)
}

impl<F> ExtensionFactory for FnFactory<F>
where
    F: Fn(&BuildContext<'_>) -> Result<ExtensionValue, ExtensionError> + Send + Sync,
{
    fn create(&self, ctx: &BuildContext<'_>) -> Result<ExtensionValue, ExtensionError> {
        (self.0)(ctx)
    }
}

/// Contract for materializing one extension node.
pub trait ExtensionBuilder: Send + Sync {
    fn descriptor(&self) -> &BuilderDescriptor;

    /// Build the value, or return the cached one.
    ///
    /// Calling this repeatedly returns the identical value.
    fn build_extension(&self, types: &dyn ResolveType) -> Result<ExtensionValue, ExtensionError>;

    /// The cached value, if the builder has been built
    fn built_value(&self) -> Option<ExtensionValue>;

    /// Composite view of this builder, `None` for leaves
    fn as_composite(&self) -> Option<&dyn CompositeExtensionBuilder> {
        None
    }

    /// Eager configuration check
    fn validate(&self) -> Result<(), ExtensionError> {
        self.descriptor().validate()
    }
}

/// Child operations of a composite builder.
///
/// All operations require the builder to be built already and reject a
/// missing value with [`ExtensionError::InvalidArgument`].
pub trait CompositeExtensionBuilder: ExtensionBuilder {
    fn add_child_extension(&self, value: Option<&ExtensionValue>) -> Result<(), ExtensionError>;

    fn insert_child_extension(
        &self,
        index: usize,
        value: Option<&ExtensionValue>,
    ) -> Result<(), ExtensionError>;

    /// Returns `false` when the value was not a child
    fn remove_child_extension(&self, value: Option<&ExtensionValue>)
    -> Result<bool, ExtensionError>;

    /// Current children in order
    fn children(&self) -> Vec<ExtensionValue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_get_set() {
        let mut config = BuilderConfig::new();
        config.set("label", "File").unwrap();
        config.set("order", 3i64).unwrap();

        assert_eq!(config.get::<String>("label"), Some("File".to_string()));
        assert_eq!(config.get::<i64>("order"), Some(3));
        assert_eq!(config.get::<i64>("label"), None);
        assert!(config.contains("order"));
        assert!(!config.contains("missing"));
    }

    #[test]
    fn test_descriptor_validate_reports_missing_field() {
        let descriptor = BuilderDescriptor::leaf("ui", "open")
            .require("label")
            .require("handler")
            .with_config("label", "Open")
            .unwrap();

        let err = descriptor.validate().unwrap_err();
        assert_eq!(err, ExtensionError::configuration("open", "handler"));
    }

    #[test]
    fn test_descriptor_validate_ok() {
        let descriptor = BuilderDescriptor::composite("ui", "file")
            .require("label")
            .with_config("label", "File")
            .unwrap();
        assert!(descriptor.validate().is_ok());
        assert_eq!(descriptor.kind, BuilderKind::Composite);
    }

    #[test]
    fn test_descriptor_builders() {
        let descriptor = BuilderDescriptor::leaf("ui", "save")
            .with_parent("file")
            .at_index(0);
        assert_eq!(descriptor.parent.as_deref(), Some("file"));
        assert_eq!(descriptor.insert_index, Some(0));
    }

    #[test]
    fn test_builder_kind_deserializes_snake_case() {
        let kind: BuilderKind = serde_json::from_str("\"composite\"").unwrap();
        assert_eq!(kind, BuilderKind::Composite);
    }

    #[test]
    fn test_builder_traits_are_object_safe() {
        fn _leaf(_: &dyn ExtensionBuilder) {}
        fn _composite(_: &dyn CompositeExtensionBuilder) {}
        fn _factory(_: &dyn ExtensionFactory) {}
    }
}
