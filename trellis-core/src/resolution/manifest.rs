//! `addin.toml` manifests
//!
//! ```toml
//! id = "ui"
//! version = "1.0.0"
//! dependencies = ["core"]
//! code_units = ["ui"]
//!
//! [[extension]]
//! point = "main-menu"
//! id = "file"
//! kind = "composite"
//! factory = "MenuFactory"
//! required = ["label"]
//!
//! [extension.config]
//! label = "File"
//! ```

use std::collections::HashSet;

use serde::Deserialize;
use trellis_addin_api::{AddinId, BuilderConfig, BuilderDescriptor, BuilderKind, TypeHandle};

use super::{
    AddinDescriptor, AddinResolutionPlan, ExtensionDeclaration, ManifestResolver, NameConvention,
    RawManifest, ResolutionContext,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    id: Option<String>,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    code_units: Vec<String>,
    #[serde(default, rename = "extension")]
    extensions: Vec<ManifestExtension>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestExtension {
    point: String,
    id: String,
    #[serde(default)]
    kind: BuilderKind,
    /// `Type` in the declaring addin, or `other-addin/Type`
    factory: String,
    parent: Option<String>,
    index: Option<usize>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    config: BuilderConfig,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

/// Reads one `addin.toml` per scanned location.
///
/// The plan is a stable topological order: among addins whose dependencies
/// are already placed, scan order wins. Addins caught in a cycle or depending
/// on something unknown are appended in scan order so the engine can fail
/// them individually.
#[derive(Debug, Default)]
pub struct TomlManifestResolver;

impl TomlManifestResolver {
    pub fn new() -> Self {
        Self
    }

    fn parse_one(raw: &RawManifest) -> Result<AddinDescriptor, String> {
        let file: ManifestFile = toml::from_str(&raw.content).map_err(|e| e.to_string())?;
        let id = file
            .id
            .map(AddinId::from)
            .unwrap_or_else(|| raw.scanned.fallback_id());

        let mut descriptor = AddinDescriptor::new(id.clone(), raw.scanned.location.clone())
            .with_version(file.version);
        descriptor.dependencies = file.dependencies.into_iter().map(AddinId::from).collect();
        descriptor.code_units = file.code_units;

        for ext in file.extensions {
            let mut builder = match ext.kind {
                BuilderKind::Leaf => BuilderDescriptor::leaf(id.clone(), ext.id),
                BuilderKind::Composite => BuilderDescriptor::composite(id.clone(), ext.id),
            };
            if let Some(parent) = ext.parent {
                builder = builder.with_parent(parent);
            }
            if let Some(index) = ext.index {
                builder = builder.at_index(index);
            }
            for field in ext.required {
                builder = builder.require(field);
            }
            builder.config = ext.config;

            descriptor.extensions.push(ExtensionDeclaration {
                point: ext.point,
                factory: TypeHandle::parse(&id, &ext.factory),
                builder,
            });
        }

        Ok(descriptor)
    }

    fn order(addins: Vec<AddinDescriptor>) -> Vec<AddinDescriptor> {
        let mut remaining = addins;
        let mut placed: HashSet<AddinId> = HashSet::new();
        let mut ordered = Vec::with_capacity(remaining.len());

        loop {
            let ready = remaining
                .iter()
                .position(|a| a.dependencies.iter().all(|d| placed.contains(d)));
            match ready {
                Some(index) => {
                    let addin = remaining.remove(index);
                    placed.insert(addin.id.clone());
                    ordered.push(addin);
                }
                None => break,
            }
        }

        if !remaining.is_empty() {
            tracing::warn!(
                unresolved = ?remaining.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
                "Addins with unsatisfiable dependencies"
            );
        }
        ordered.extend(remaining);
        ordered
    }
}

impl ManifestResolver for TomlManifestResolver {
    fn introspect(&self, convention: &NameConvention, ctx: &mut ResolutionContext) -> bool {
        let scanned = ctx.scanned().to_vec();
        for addin in &scanned {
            let manifest = addin.artifacts.iter().find(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n == convention.manifest_file)
            });

            let Some(path) = manifest else {
                tracing::debug!(
                    location = %addin.location.display(),
                    "No manifest, skipping location"
                );
                continue;
            };

            match std::fs::read_to_string(path) {
                Ok(content) => ctx.add_manifest(RawManifest {
                    scanned: addin.clone(),
                    content,
                }),
                Err(e) => ctx.reject(addin, format!("unreadable manifest: {e}")),
            }
        }

        !ctx.manifests().is_empty() || !ctx.rejected().is_empty()
    }

    fn try_parse(&self, ctx: &ResolutionContext) -> Option<AddinResolutionPlan> {
        let mut addins = Vec::new();
        let mut plan_rejected = ctx.rejected().to_vec();
        let mut seen = HashSet::new();

        for raw in ctx.manifests() {
            match Self::parse_one(raw) {
                Ok(addin) if !seen.insert(addin.id.clone()) => {
                    plan_rejected.push(super::RejectedAddin {
                        id: addin.id,
                        location: addin.location,
                        reason: "duplicate addin id".to_string(),
                    });
                }
                Ok(addin) => addins.push(addin),
                Err(reason) => {
                    tracing::warn!(
                        location = %raw.scanned.location.display(),
                        error = %reason,
                        "Invalid addin manifest"
                    );
                    plan_rejected.push(super::RejectedAddin {
                        id: raw.scanned.fallback_id(),
                        location: raw.scanned.location.clone(),
                        reason,
                    });
                }
            }
        }

        let mut plan = AddinResolutionPlan::new(Self::order(addins));
        for rejected in plan_rejected {
            plan = plan.with_rejected(rejected);
        }
        Some(plan)
    }
}
