//! Identifier and value types shared by the host and addins

use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable identifier of an addin (its name or namespace).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddinId(String);

impl AddinId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AddinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AddinId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AddinId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for AddinId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Deferred reference to a type registered by a specific addin.
///
/// A handle never holds the type itself; the host resolves it on first use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeHandle {
    addin: AddinId,
    type_name: String,
}

impl TypeHandle {
    pub fn new(addin: impl Into<AddinId>, type_name: impl Into<String>) -> Self {
        Self {
            addin: addin.into(),
            type_name: type_name.into(),
        }
    }

    /// Parse a manifest reference.
    ///
    /// `"other-addin/TypeName"` names a type in another addin, a bare
    /// `"TypeName"` names a type in `owner`.
    pub fn parse(owner: &AddinId, reference: &str) -> Self {
        match reference.split_once('/') {
            Some((addin, type_name)) => Self::new(addin.trim(), type_name.trim()),
            None => Self::new(owner.clone(), reference.trim()),
        }
    }

    pub fn addin(&self) -> &AddinId {
        &self.addin
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addin, self.type_name)
    }
}

/// A built extension node.
///
/// Values are shared handles: cloning is cheap, and equality is identity,
/// so two values are equal only if they came from the same build.
#[derive(Clone)]
pub struct ExtensionValue(Arc<dyn Any + Send + Sync>);

impl ExtensionValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    /// Borrow the inner value as `T`, if that is what it holds
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Get a shared handle to the inner value as `T`
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    /// Whether both values are the same built node
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ExtensionValue {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ExtensionValue {}

impl fmt::Debug for ExtensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtensionValue({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_handle_parse_local() {
        let owner = AddinId::from("ui");
        let handle = TypeHandle::parse(&owner, "MainMenu");
        assert_eq!(handle.addin(), &owner);
        assert_eq!(handle.type_name(), "MainMenu");
    }

    #[test]
    fn test_type_handle_parse_foreign() {
        let owner = AddinId::from("ui");
        let handle = TypeHandle::parse(&owner, "core/ClickHandler");
        assert_eq!(handle.addin().as_str(), "core");
        assert_eq!(handle.type_name(), "ClickHandler");
        assert_eq!(handle.to_string(), "core/ClickHandler");
    }

    #[test]
    fn test_type_handle_equality_is_by_value() {
        assert_eq!(TypeHandle::new("a", "T"), TypeHandle::new("a", "T"));
        assert_ne!(TypeHandle::new("a", "T"), TypeHandle::new("b", "T"));
    }

    #[test]
    fn test_extension_value_identity() {
        let a = ExtensionValue::new("menu".to_string());
        let b = ExtensionValue::new("menu".to_string());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_extension_value_downcast() {
        let value = ExtensionValue::new(42u32);
        assert_eq!(value.downcast_ref::<u32>(), Some(&42));
        assert!(value.downcast_ref::<String>().is_none());
        assert_eq!(value.downcast::<u32>().as_deref(), Some(&42));
    }

    #[test]
    fn test_addin_id_serializes_transparently() {
        let id = AddinId::from("core");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"core\"");
    }
}
