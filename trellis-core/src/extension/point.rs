//! Extension points: binding builders to a host-owned root

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use trellis_addin_api::{ExtensionBuilder, ExtensionError, ExtensionValue, ResolveType};

use crate::error::EngineError;

/// Host-owned attachment site for top-level extension values.
///
/// Implementations wrap whatever the host renders (a menu bar, a route
/// table); the binder only needs positional insert and identity removal.
pub trait ExtensionRoot: Send + Sync {
    fn child_count(&self) -> usize;

    /// Insert at `index`, where `index <= child_count()`
    fn insert_child(&self, index: usize, value: &ExtensionValue) -> Result<(), ExtensionError>;

    /// Remove by identity; `false` if the value is not a child
    fn remove_child(&self, value: &ExtensionValue) -> bool;
}

/// Plain ordered root, for hosts that only need the values
#[derive(Default)]
pub struct RootNode {
    children: Mutex<Vec<ExtensionValue>>,
}

impl RootNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current children
    pub fn children(&self) -> Vec<ExtensionValue> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExtensionValue>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ExtensionRoot for RootNode {
    fn child_count(&self) -> usize {
        self.lock().len()
    }

    fn insert_child(&self, index: usize, value: &ExtensionValue) -> Result<(), ExtensionError> {
        let mut children = self.lock();
        if index > children.len() {
            return Err(ExtensionError::IndexOutOfRange {
                index,
                len: children.len(),
            });
        }
        children.insert(index, value.clone());
        Ok(())
    }

    fn remove_child(&self, value: &ExtensionValue) -> bool {
        let mut children = self.lock();
        match children.iter().position(|c| c.ptr_eq(value)) {
            Some(position) => {
                children.remove(position);
                true
            }
            None => false,
        }
    }
}

/// Where an attached value went
enum Target {
    Root,
    /// Nested under an attached composite builder
    Parent(Arc<dyn ExtensionBuilder>),
}

struct Attachment {
    builder: Arc<dyn ExtensionBuilder>,
    value: ExtensionValue,
    target: Target,
}

#[derive(Default)]
struct PointState {
    root: Option<Arc<dyn ExtensionRoot>>,
    attached: Vec<Attachment>,
}

fn same_builder(a: &Arc<dyn ExtensionBuilder>, b: &Arc<dyn ExtensionBuilder>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Binds one host root to a sequence of builders and keeps the tree in sync.
///
/// Builders without a parent become children of the root, in attach order
/// unless they declare an insertion index. Builders naming a parent are
/// attached to that (already attached) composite builder instead.
pub struct ExtensionPoint {
    name: String,
    types: Arc<dyn ResolveType>,
    state: Mutex<PointState>,
}

impl ExtensionPoint {
    pub fn new(name: impl Into<String>, types: Arc<dyn ResolveType>) -> Self {
        Self {
            name: name.into(),
            types,
            state: Mutex::new(PointState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> MutexGuard<'_, PointState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bind(&self, root: Arc<dyn ExtensionRoot>) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.root.is_some() {
            return Err(EngineError::AlreadyBound(self.name.clone()));
        }
        tracing::debug!(point = %self.name, "Root bound");
        state.root = Some(root);
        Ok(())
    }

    /// Release the root. Values already placed in it stay there; the host
    /// owns the root and decides what to do with them.
    pub fn unbind(&self) -> Option<Arc<dyn ExtensionRoot>> {
        let mut state = self.state();
        state.attached.clear();
        state.root.take()
    }

    pub fn is_bound(&self) -> bool {
        self.state().root.is_some()
    }

    pub fn is_attached(&self, builder: &Arc<dyn ExtensionBuilder>) -> bool {
        self.state()
            .attached
            .iter()
            .any(|a| same_builder(&a.builder, builder))
    }

    pub fn attached_count(&self) -> usize {
        self.state().attached.len()
    }

    /// Build `builder` and place its value.
    ///
    /// Returns `Ok(false)` when nothing happened: no root is bound, or the
    /// builder is attached already. Factories and the root run without the
    /// point locked, so they may query or attach to this point themselves.
    pub fn attach(&self, builder: Arc<dyn ExtensionBuilder>) -> Result<bool, EngineError> {
        let descriptor = builder.descriptor().clone();
        let (root, parent) = {
            let state = self.state();
            let Some(root) = state.root.clone() else {
                tracing::debug!(point = %self.name, "Attach ignored, no root bound");
                return Ok(false);
            };
            if state.attached.iter().any(|a| same_builder(&a.builder, &builder)) {
                return Ok(false);
            }
            let parent = match &descriptor.parent {
                Some(parent_id) => Some(
                    find_parent(&state.attached, &descriptor.addin, parent_id).ok_or_else(|| {
                        ExtensionError::UnknownParent {
                            builder: descriptor.id.clone(),
                            parent: parent_id.clone(),
                        }
                    })?,
                ),
                None => None,
            };
            (root, parent)
        };

        let value = builder.build_extension(self.types.as_ref())?;

        let target = match parent {
            None => {
                let index = descriptor.insert_index.unwrap_or_else(|| root.child_count());
                root.insert_child(index, &value)?;
                Target::Root
            }
            Some(parent) => {
                parent.build_extension(self.types.as_ref())?;
                let composite = parent
                    .as_composite()
                    .ok_or_else(|| ExtensionError::NotComposite(parent.descriptor().id.clone()))?;
                match descriptor.insert_index {
                    Some(index) => composite.insert_child_extension(index, Some(&value))?,
                    None => composite.add_child_extension(Some(&value))?,
                }
                Target::Parent(parent)
            }
        };

        let mut state = self.state();
        let rebound = !state.root.as_ref().is_some_and(|r| Arc::ptr_eq(r, &root));
        if rebound || state.attached.iter().any(|a| same_builder(&a.builder, &builder)) {
            // lost a race with another attach of this builder, or with unbind
            drop(state);
            tracing::debug!(point = %self.name, builder = %descriptor.id, "Attach superseded");
            remove_placed(Some(&root), &target, &value)?;
            return Ok(false);
        }
        state.attached.push(Attachment {
            builder,
            value,
            target,
        });
        drop(state);

        tracing::debug!(
            point = %self.name,
            addin = %descriptor.addin,
            builder = %descriptor.id,
            "Extension attached"
        );
        Ok(true)
    }

    /// Attach several builders, parents before the children naming them.
    ///
    /// Stops at the first failure; builders attached before it stay attached.
    pub fn attach_all(&self, builders: &[Arc<dyn ExtensionBuilder>]) -> Result<usize, EngineError> {
        let mut pending: Vec<&Arc<dyn ExtensionBuilder>> = builders.iter().collect();
        let mut attached = 0;

        while !pending.is_empty() {
            let ready = pending.iter().position(|builder| {
                let descriptor = builder.descriptor();
                match &descriptor.parent {
                    None => true,
                    Some(parent_id) => {
                        let state = self.state();
                        find_parent(&state.attached, &descriptor.addin, parent_id).is_some()
                            || !pending.iter().any(|b| &b.descriptor().id == parent_id)
                    }
                }
            });
            // Everything left waits on a parent that is itself waiting
            let index = ready.unwrap_or(0);
            if self.attach(Arc::clone(pending.remove(index)))? {
                attached += 1;
            }
        }
        Ok(attached)
    }

    /// Remove the value `builder` placed, along with anything nested under it.
    ///
    /// Returns `Ok(false)` if the builder was never attached.
    pub fn detach(&self, builder: &Arc<dyn ExtensionBuilder>) -> Result<bool, EngineError> {
        let state = self.state();
        if !state.attached.iter().any(|a| same_builder(&a.builder, builder)) {
            return Ok(false);
        }

        let nested: Vec<Arc<dyn ExtensionBuilder>> = state
            .attached
            .iter()
            .filter(|a| matches!(&a.target, Target::Parent(p) if same_builder(p, builder)))
            .map(|a| Arc::clone(&a.builder))
            .collect();
        drop(state);
        for child in nested.iter().rev() {
            self.detach(child)?;
        }

        let (root, attachment) = {
            let mut state = self.state();
            let Some(position) = state
                .attached
                .iter()
                .position(|a| same_builder(&a.builder, builder))
            else {
                return Ok(false);
            };
            (state.root.clone(), state.attached.remove(position))
        };
        remove_placed(root.as_ref(), &attachment.target, &attachment.value)?;

        let descriptor = attachment.builder.descriptor();
        tracing::debug!(
            point = %self.name,
            addin = %descriptor.addin,
            builder = %descriptor.id,
            "Extension detached"
        );
        Ok(true)
    }
}

/// Take a placed value back out of the root or its parent composite
fn remove_placed(
    root: Option<&Arc<dyn ExtensionRoot>>,
    target: &Target,
    value: &ExtensionValue,
) -> Result<(), EngineError> {
    match target {
        Target::Root => {
            if let Some(root) = root {
                root.remove_child(value);
            }
        }
        Target::Parent(parent) => {
            if let Some(composite) = parent.as_composite() {
                composite.remove_child_extension(Some(value))?;
            }
        }
    }
    Ok(())
}

/// Attached composite named `parent_id`, preferring one from the same addin
fn find_parent(
    attached: &[Attachment],
    addin: &trellis_addin_api::AddinId,
    parent_id: &str,
) -> Option<Arc<dyn ExtensionBuilder>> {
    let candidates = attached.iter().filter(|a| a.builder.descriptor().id == parent_id);
    let mut first = None;
    for candidate in candidates {
        if &candidate.builder.descriptor().addin == addin {
            return Some(Arc::clone(&candidate.builder));
        }
        first.get_or_insert_with(|| Arc::clone(&candidate.builder));
    }
    first
}
