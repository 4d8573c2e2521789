//! The standard memoizing builder behind every declared contribution

use std::sync::{Arc, Mutex, PoisonError};

use trellis_addin_api::{
    BuildContext, BuilderDescriptor, BuilderKind, CompositeExtensionBuilder, ExtensionBuilder,
    ExtensionError, ExtensionFactory, ExtensionValue, ResolveType, TypeHandle,
};

use crate::resolution::ExtensionDeclaration;

/// Where a builder gets its factory from
enum FactorySource {
    /// Resolved lazily on first build, loading the owning addin
    Handle(TypeHandle),
    Direct(Arc<dyn ExtensionFactory>),
}

#[derive(Default)]
struct BuilderState {
    value: Option<ExtensionValue>,
    factory: Option<Arc<dyn ExtensionFactory>>,
    children: Vec<ExtensionValue>,
}

/// Builder for one declared extension node, leaf or composite.
///
/// The value is built at most once; later builds hand out the cached value.
/// For composites the builder also owns the ordered child list and mirrors
/// every change into the factory's child hooks.
pub struct DeclaredBuilder {
    descriptor: BuilderDescriptor,
    source: FactorySource,
    state: Mutex<BuilderState>,
}

impl DeclaredBuilder {
    /// Builder whose factory is registered by an addin under `factory`
    pub fn new(descriptor: BuilderDescriptor, factory: TypeHandle) -> Self {
        Self {
            descriptor,
            source: FactorySource::Handle(factory),
            state: Mutex::new(BuilderState::default()),
        }
    }

    /// Builder with a host-supplied factory
    pub fn with_factory(descriptor: BuilderDescriptor, factory: impl ExtensionFactory + 'static) -> Self {
        Self {
            descriptor,
            source: FactorySource::Direct(Arc::new(factory)),
            state: Mutex::new(BuilderState::default()),
        }
    }

    pub fn from_declaration(declaration: &ExtensionDeclaration) -> Self {
        Self::new(declaration.builder.clone(), declaration.factory.clone())
    }

    /// Handle of the addin-registered factory, if any
    pub fn factory_handle(&self) -> Option<&TypeHandle> {
        match &self.source {
            FactorySource::Handle(handle) => Some(handle),
            FactorySource::Direct(_) => None,
        }
    }

    pub fn is_built(&self) -> bool {
        self.state().value.is_some()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BuilderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_factory(&self, types: &dyn ResolveType) -> Result<Arc<dyn ExtensionFactory>, ExtensionError> {
        match &self.source {
            FactorySource::Direct(factory) => Ok(Arc::clone(factory)),
            FactorySource::Handle(handle) => types
                .resolve_type(handle)?
                .factory()
                .ok_or_else(|| ExtensionError::NotAFactory(handle.clone())),
        }
    }

    fn composite_state(
        &self,
        value: Option<&ExtensionValue>,
    ) -> Result<(std::sync::MutexGuard<'_, BuilderState>, ExtensionValue, ExtensionValue), ExtensionError> {
        if self.descriptor.kind != BuilderKind::Composite {
            return Err(ExtensionError::NotComposite(self.descriptor.id.clone()));
        }
        let child = value
            .cloned()
            .ok_or_else(|| ExtensionError::InvalidArgument("child extension value is required".to_string()))?;
        let state = self.state();
        let parent = state
            .value
            .clone()
            .ok_or_else(|| ExtensionError::NotBuilt(self.descriptor.id.clone()))?;
        Ok((state, parent, child))
    }
}

impl ExtensionBuilder for DeclaredBuilder {
    fn descriptor(&self) -> &BuilderDescriptor {
        &self.descriptor
    }

    fn build_extension(&self, types: &dyn ResolveType) -> Result<ExtensionValue, ExtensionError> {
        let mut state = self.state();
        if let Some(value) = &state.value {
            return Ok(value.clone());
        }

        self.descriptor.validate()?;
        let factory = self.resolve_factory(types)?;
        let value = factory.create(&BuildContext::new(&self.descriptor, types))?;
        tracing::debug!(
            addin = %self.descriptor.addin,
            builder = %self.descriptor.id,
            "Extension built"
        );

        state.factory = Some(factory);
        state.value = Some(value.clone());
        Ok(value)
    }

    fn built_value(&self) -> Option<ExtensionValue> {
        self.state().value.clone()
    }

    fn as_composite(&self) -> Option<&dyn CompositeExtensionBuilder> {
        match self.descriptor.kind {
            BuilderKind::Composite => Some(self),
            BuilderKind::Leaf => None,
        }
    }
}

impl CompositeExtensionBuilder for DeclaredBuilder {
    fn add_child_extension(&self, value: Option<&ExtensionValue>) -> Result<(), ExtensionError> {
        let (mut state, parent, child) = self.composite_state(value)?;
        let index = state.children.len();
        state.children.push(child.clone());
        if let Some(factory) = &state.factory {
            factory.child_inserted(&parent, index, &child);
        }
        Ok(())
    }

    fn insert_child_extension(
        &self,
        index: usize,
        value: Option<&ExtensionValue>,
    ) -> Result<(), ExtensionError> {
        let (mut state, parent, child) = self.composite_state(value)?;
        let len = state.children.len();
        if index > len {
            return Err(ExtensionError::IndexOutOfRange { index, len });
        }
        state.children.insert(index, child.clone());
        if let Some(factory) = &state.factory {
            factory.child_inserted(&parent, index, &child);
        }
        Ok(())
    }

    fn remove_child_extension(
        &self,
        value: Option<&ExtensionValue>,
    ) -> Result<bool, ExtensionError> {
        let (mut state, parent, child) = self.composite_state(value)?;
        let Some(position) = state.children.iter().position(|c| c.ptr_eq(&child)) else {
            return Ok(false);
        };
        state.children.remove(position);
        if let Some(factory) = &state.factory {
            factory.child_removed(&parent, &child);
        }
        Ok(true)
    }

    fn children(&self) -> Vec<ExtensionValue> {
        self.state().children.clone()
    }
}
