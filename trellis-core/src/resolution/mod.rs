//! External collaborators that discover addins and produce the activation plan
//!
//! The engine only depends on the traits here. [`DirectoryScanner`] and
//! [`TomlManifestResolver`] are the bundled defaults: one sub-directory per
//! addin, described by an `addin.toml` manifest.

mod manifest;
mod scanner;

use std::path::PathBuf;

use trellis_addin_api::{AddinId, BuilderDescriptor, TypeHandle};

use crate::error::EngineError;

pub use manifest::TomlManifestResolver;
pub use scanner::DirectoryScanner;

/// One extension contributed by an addin
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDeclaration {
    /// Name of the host extension point
    pub point: String,
    pub builder: BuilderDescriptor,
    /// Type that creates the node; resolved only when the node is built
    pub factory: TypeHandle,
}

/// Everything the engine needs to know about one addin
#[derive(Debug, Clone, PartialEq)]
pub struct AddinDescriptor {
    pub id: AddinId,
    pub version: String,
    /// Directory the addin was deployed to
    pub location: PathBuf,
    pub dependencies: Vec<AddinId>,
    /// Code unit names, located in `location` or the probing directories
    pub code_units: Vec<String>,
    pub extensions: Vec<ExtensionDeclaration>,
}

impl AddinDescriptor {
    pub fn new(id: impl Into<AddinId>, location: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            version: "0.0.0".to_string(),
            location: location.into(),
            dependencies: Vec::new(),
            code_units: Vec::new(),
            extensions: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<AddinId>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_code_unit(mut self, unit: impl Into<String>) -> Self {
        self.code_units.push(unit.into());
        self
    }

    /// Contribute a builder whose factory is `type_name` in this addin
    pub fn with_extension(
        mut self,
        point: impl Into<String>,
        builder: BuilderDescriptor,
        type_name: &str,
    ) -> Self {
        let factory = TypeHandle::parse(&self.id, type_name);
        self.extensions.push(ExtensionDeclaration {
            point: point.into(),
            builder,
            factory,
        });
        self
    }
}

/// An addin whose manifest could not be turned into a descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedAddin {
    pub id: AddinId,
    pub location: PathBuf,
    pub reason: String,
}

/// Dependency-ordered activation plan: dependencies precede dependents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddinResolutionPlan {
    addins: Vec<AddinDescriptor>,
    rejected: Vec<RejectedAddin>,
}

impl AddinResolutionPlan {
    pub fn new(addins: Vec<AddinDescriptor>) -> Self {
        Self {
            addins,
            rejected: Vec::new(),
        }
    }

    pub fn with_rejected(mut self, rejected: RejectedAddin) -> Self {
        self.rejected.push(rejected);
        self
    }

    pub fn addins(&self) -> &[AddinDescriptor] {
        &self.addins
    }

    pub fn rejected(&self) -> &[RejectedAddin] {
        &self.rejected
    }

    pub fn into_parts(self) -> (Vec<AddinDescriptor>, Vec<RejectedAddin>) {
        (self.addins, self.rejected)
    }
}

/// A discovered addin location and its raw artifacts
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedAddin {
    pub location: PathBuf,
    pub artifacts: Vec<PathBuf>,
}

impl ScannedAddin {
    /// Directory name, used as the addin id when no manifest names one
    pub fn fallback_id(&self) -> AddinId {
        AddinId::from(
            self.location
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("<unnamed>"),
        )
    }
}

/// Produces the list of addin locations to introspect
pub trait AddinScanner: Send + Sync {
    fn scan(&self) -> Result<Vec<ScannedAddin>, EngineError>;
}

/// Which artifact describes an addin
#[derive(Debug, Clone, PartialEq)]
pub struct NameConvention {
    pub manifest_file: String,
}

impl Default for NameConvention {
    fn default() -> Self {
        Self {
            manifest_file: "addin.toml".to_string(),
        }
    }
}

/// A manifest artifact read during introspection
#[derive(Debug, Clone, PartialEq)]
pub struct RawManifest {
    pub scanned: ScannedAddin,
    pub content: String,
}

/// Scratch state shared by `introspect` and `try_parse`
#[derive(Debug, Default)]
pub struct ResolutionContext {
    scanned: Vec<ScannedAddin>,
    manifests: Vec<RawManifest>,
    rejected: Vec<RejectedAddin>,
}

impl ResolutionContext {
    pub fn new(scanned: Vec<ScannedAddin>) -> Self {
        Self {
            scanned,
            ..Self::default()
        }
    }

    pub fn scanned(&self) -> &[ScannedAddin] {
        &self.scanned
    }

    pub fn manifests(&self) -> &[RawManifest] {
        &self.manifests
    }

    pub fn add_manifest(&mut self, manifest: RawManifest) {
        self.manifests.push(manifest);
    }

    pub fn rejected(&self) -> &[RejectedAddin] {
        &self.rejected
    }

    pub fn reject(&mut self, scanned: &ScannedAddin, reason: impl Into<String>) {
        self.rejected.push(RejectedAddin {
            id: scanned.fallback_id(),
            location: scanned.location.clone(),
            reason: reason.into(),
        });
    }
}

/// Turns scanned locations into an activation plan
pub trait ManifestResolver: Send + Sync {
    /// Find and read manifest artifacts; `false` if nothing usable was found
    fn introspect(&self, convention: &NameConvention, ctx: &mut ResolutionContext) -> bool;

    /// Parse what `introspect` collected into an ordered plan
    fn try_parse(&self, ctx: &ResolutionContext) -> Option<AddinResolutionPlan>;
}

/// Resolver over a fixed, already ordered plan.
///
/// For hosts that build descriptors in code instead of reading manifests.
pub struct StaticPlan(pub AddinResolutionPlan);

impl ManifestResolver for StaticPlan {
    fn introspect(&self, _convention: &NameConvention, _ctx: &mut ResolutionContext) -> bool {
        true
    }

    fn try_parse(&self, _ctx: &ResolutionContext) -> Option<AddinResolutionPlan> {
        Some(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_builders() {
        let addin = AddinDescriptor::new("ui", "/addins/ui")
            .with_version("1.2.0")
            .with_dependency("core")
            .with_code_unit("ui")
            .with_extension("main-menu", BuilderDescriptor::leaf("ui", "open"), "OpenItem");

        assert_eq!(addin.version, "1.2.0");
        assert_eq!(addin.dependencies, vec![AddinId::from("core")]);
        assert_eq!(addin.extensions[0].factory, TypeHandle::new("ui", "OpenItem"));
    }

    #[test]
    fn fallback_id_uses_directory_name() {
        let scanned = ScannedAddin {
            location: PathBuf::from("/addins/logging"),
            artifacts: Vec::new(),
        };
        assert_eq!(scanned.fallback_id().as_str(), "logging");
    }

    #[test]
    fn static_plan_returns_its_plan() {
        let plan = AddinResolutionPlan::new(vec![AddinDescriptor::new("core", "/addins/core")]);
        let resolver = StaticPlan(plan.clone());
        let mut ctx = ResolutionContext::default();

        assert!(resolver.introspect(&NameConvention::default(), &mut ctx));
        assert_eq!(resolver.try_parse(&ctx), Some(plan));
    }
}
