//! AddinEngine - drives addins through their lifecycle
//!
//! All transitions run under one control lock, so addins are started and
//! stopped strictly one at a time, in plan order (reverse order for stops).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;
use trellis_addin_api::{AddinId, ExtensionBuilder, ResolveType};

use super::{AddinFailure, AddinStatus, StatusEvent, StatusListener};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::extension::{DeclaredBuilder, ExtensionPoint};
use crate::framework::Framework;
use crate::loading::{CodeLoader, LoadMethodSelector, ModuleLoader};
use crate::properties::PropertyOwner;
use crate::resolution::{
    AddinDescriptor, AddinResolutionPlan, AddinScanner, DirectoryScanner, ManifestResolver,
    NameConvention, ResolutionContext, TomlManifestResolver,
};
use crate::types::TypeResolver;

/// Snapshot of one addin as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddinInfo {
    pub id: AddinId,
    pub version: String,
    pub status: AddinStatus,
    pub dependencies: Vec<AddinId>,
    pub location: PathBuf,
    pub failure: Option<AddinFailure>,
}

struct AddinRecord {
    descriptor: AddinDescriptor,
    status: AddinStatus,
    failure: Option<AddinFailure>,
}

impl AddinRecord {
    fn info(&self) -> AddinInfo {
        AddinInfo {
            id: self.descriptor.id.clone(),
            version: self.descriptor.version.clone(),
            status: self.status,
            dependencies: self.descriptor.dependencies.clone(),
            location: self.descriptor.location.clone(),
            failure: self.failure.clone(),
        }
    }
}

#[derive(Default)]
struct EngineState {
    initialized: bool,
    /// Activation plan order, never re-derived
    order: Vec<AddinId>,
    records: HashMap<AddinId, AddinRecord>,
}

impl EngineState {
    fn status(&self, id: &AddinId) -> Option<AddinStatus> {
        self.records.get(id).map(|r| r.status)
    }

    fn position(&self, id: &AddinId) -> Option<usize> {
        self.order.iter().position(|o| o == id)
    }

    fn dependencies_of(&self, id: &AddinId) -> &[AddinId] {
        self.records
            .get(id)
            .map(|r| r.descriptor.dependencies.as_slice())
            .unwrap_or_default()
    }

    /// Everything that depends on `id`, directly or not, in plan order
    fn dependents(&self, id: &AddinId) -> Vec<AddinId> {
        let mut found: HashSet<&AddinId> = HashSet::from([id]);
        loop {
            let before = found.len();
            for other in &self.order {
                if !found.contains(other) && self.dependencies_of(other).iter().any(|d| found.contains(d)) {
                    found.insert(other);
                }
            }
            if found.len() == before {
                break;
            }
        }
        self.order
            .iter()
            .filter(|o| *o != id && found.contains(o))
            .cloned()
            .collect()
    }

    /// Everything `id` depends on, directly or not, in plan order
    fn dependencies(&self, id: &AddinId) -> Vec<AddinId> {
        let mut found: HashSet<&AddinId> = HashSet::new();
        let mut pending: Vec<&AddinId> = self.dependencies_of(id).iter().collect();
        while let Some(dep) = pending.pop() {
            if found.insert(dep) {
                pending.extend(self.dependencies_of(dep));
            }
        }
        self.order
            .iter()
            .filter(|o| found.contains(o))
            .cloned()
            .collect()
    }
}

/// Assembles an [`AddinEngine`] with non-default collaborators
pub struct EngineBuilder {
    config: EngineConfig,
    substrate: Arc<dyn CodeLoader>,
    scanner: Option<Box<dyn AddinScanner>>,
    resolver: Option<Box<dyn ManifestResolver>>,
    selector: Option<Box<dyn LoadMethodSelector>>,
    convention: NameConvention,
}

impl EngineBuilder {
    pub fn scanner(mut self, scanner: impl AddinScanner + 'static) -> Self {
        self.scanner = Some(Box::new(scanner));
        self
    }

    pub fn resolver(mut self, resolver: impl ManifestResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn load_method_selector(mut self, selector: impl LoadMethodSelector + 'static) -> Self {
        self.selector = Some(Box::new(selector));
        self
    }

    pub fn name_convention(mut self, convention: NameConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn build(self) -> AddinEngine {
        let mut loader = ModuleLoader::new(self.config.loading.clone(), self.substrate);
        if let Some(selector) = self.selector {
            loader = loader.with_boxed_selector(selector);
        }
        let loader = Arc::new(loader);
        let types = Arc::new(TypeResolver::new(Arc::clone(&loader)));

        let scanner = self
            .scanner
            .unwrap_or_else(|| Box::new(DirectoryScanner::new(self.config.addin_dirs.clone())));
        let resolver = self
            .resolver
            .unwrap_or_else(|| Box::new(TomlManifestResolver::new()));
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));

        AddinEngine {
            config: self.config,
            scanner,
            resolver,
            convention: self.convention,
            loader,
            framework: Framework::new(types),
            state: Mutex::new(EngineState::default()),
            listeners: RwLock::new(Vec::new()),
            points: Mutex::new(Vec::new()),
            events,
            control: Mutex::new(()),
        }
    }
}

/// The addin container.
///
/// One instance per process is the expected deployment; nothing enforces it.
pub struct AddinEngine {
    config: EngineConfig,
    scanner: Box<dyn AddinScanner>,
    resolver: Box<dyn ManifestResolver>,
    convention: NameConvention,
    loader: Arc<ModuleLoader>,
    framework: Framework,
    state: Mutex<EngineState>,
    listeners: RwLock<Vec<Arc<dyn StatusListener>>>,
    points: Mutex<Vec<Arc<ExtensionPoint>>>,
    events: broadcast::Sender<StatusEvent>,
    /// Held for the whole of every lifecycle operation
    control: Mutex<()>,
}

impl AddinEngine {
    /// Engine with the directory scanner and TOML manifest resolver
    pub fn new(config: EngineConfig, substrate: Arc<dyn CodeLoader>) -> Self {
        Self::builder(config, substrate).build()
    }

    pub fn builder(config: EngineConfig, substrate: Arc<dyn CodeLoader>) -> EngineBuilder {
        EngineBuilder {
            config,
            substrate,
            scanner: None,
            resolver: None,
            selector: None,
            convention: NameConvention::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    pub fn types(&self) -> &Arc<TypeResolver> {
        self.framework.types()
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    /// Register a synchronous listener; listeners run in registration order
    pub fn add_listener(&self, listener: impl StatusListener + 'static) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Receive every status event on a broadcast channel
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_of(&self, id: &AddinId) -> Option<AddinStatus> {
        self.state().status(id)
    }

    fn ensure_initialized(&self) -> Result<(), EngineError> {
        if self.state().initialized {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    /// Every addin in plan order
    pub fn get_all_addins(&self) -> Vec<AddinInfo> {
        let state = self.state();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .map(AddinRecord::info)
            .collect()
    }

    /// Started addins in plan order
    pub fn get_started_addins(&self) -> Vec<AddinInfo> {
        self.get_all_addins()
            .into_iter()
            .filter(|info| info.status == AddinStatus::Started)
            .collect()
    }

    pub fn addin(&self, id: &AddinId) -> Option<AddinInfo> {
        self.state().records.get(id).map(AddinRecord::info)
    }

    pub fn status(&self, id: &AddinId) -> Option<AddinStatus> {
        self.status_of(id)
    }

    // ─── Lifecycle entry points ──────────────────────────────────────────

    /// [`AddinEngine::initialize`], starting addins when the configuration's
    /// `start_automatically` is set
    pub fn initialize_configured(&self) -> Result<(), EngineError> {
        self.initialize(self.config.start_automatically)
    }

    /// Discover addins, resolve them and optionally start them.
    ///
    /// Calling this twice is a no-op.
    pub fn initialize(&self, start_automatically: bool) -> Result<(), EngineError> {
        let _control = self.control();
        if self.state().initialized {
            tracing::warn!("Engine already initialized");
            return Ok(());
        }

        let scanned = self.scanner.scan()?;
        let mut ctx = ResolutionContext::new(scanned);
        let plan = if self.resolver.introspect(&self.convention, &mut ctx) {
            self.resolver
                .try_parse(&ctx)
                .ok_or_else(|| EngineError::Resolution("manifest resolver produced no plan".to_string()))?
        } else {
            tracing::info!("No addin manifests found");
            AddinResolutionPlan::default()
        };

        let (addins, rejected) = plan.into_parts();
        let mut invalid = Vec::new();
        {
            let mut state = self.state();
            for descriptor in addins {
                if state.records.contains_key(&descriptor.id) {
                    tracing::warn!(addin = %descriptor.id, "Duplicate addin in plan, ignoring");
                    continue;
                }
                state.order.push(descriptor.id.clone());
                state.records.insert(
                    descriptor.id.clone(),
                    AddinRecord {
                        descriptor,
                        status: AddinStatus::Discovered,
                        failure: None,
                    },
                );
            }
            for rejected in rejected {
                if state.records.contains_key(&rejected.id) {
                    tracing::warn!(addin = %rejected.id, reason = %rejected.reason, "Rejected duplicate addin");
                    continue;
                }
                state.order.push(rejected.id.clone());
                state.records.insert(
                    rejected.id.clone(),
                    AddinRecord {
                        descriptor: AddinDescriptor::new(rejected.id.clone(), rejected.location),
                        status: AddinStatus::Discovered,
                        failure: None,
                    },
                );
                invalid.push((rejected.id, rejected.reason));
            }
            state.initialized = true;
            tracing::info!(addins = state.order.len(), "Activation plan loaded");
        }

        for (id, reason) in invalid {
            self.fail(
                &id,
                (AddinStatus::Discovered, AddinStatus::Resolved),
                format!("invalid manifest: {reason}"),
            );
        }

        let order = self.state().order.clone();
        for id in &order {
            if self.status_of(id) == Some(AddinStatus::Discovered) {
                self.resolve_addin(id);
            }
        }

        if start_automatically {
            self.start_all();
        }
        Ok(())
    }

    /// Start every resolved addin in plan order
    pub fn start(&self) -> Result<(), EngineError> {
        let _control = self.control();
        self.ensure_initialized()?;
        self.start_all();
        Ok(())
    }

    /// Start one addin, and before it any dependency not started yet
    pub fn start_addin(&self, id: &AddinId) -> Result<AddinStatus, EngineError> {
        let _control = self.control();
        self.ensure_initialized()?;
        let status = self
            .status_of(id)
            .ok_or_else(|| EngineError::NotFound(id.clone()))?;
        match status {
            AddinStatus::Started => return Ok(status),
            AddinStatus::Resolved => {}
            other => {
                return Err(EngineError::InvalidTransition {
                    addin: id.clone(),
                    from: other,
                    to: AddinStatus::Started,
                });
            }
        }

        let dependencies = self.state().dependencies(id);
        for dep in &dependencies {
            if self.status_of(dep) == Some(AddinStatus::Resolved) {
                self.start_one(dep);
            }
        }
        self.start_one(id);
        self.status_of(id)
            .ok_or_else(|| EngineError::NotFound(id.clone()))
    }

    /// Stop every started addin, dependents first
    pub fn stop(&self) -> Result<(), EngineError> {
        let _control = self.control();
        self.ensure_initialized()?;
        let order = self.state().order.clone();
        for id in order.iter().rev() {
            if self.status_of(id) == Some(AddinStatus::Started) {
                self.stop_one(id);
            }
        }
        Ok(())
    }

    /// Stop one addin after stopping everything started that depends on it
    pub fn stop_addin(&self, id: &AddinId) -> Result<AddinStatus, EngineError> {
        let _control = self.control();
        self.ensure_initialized()?;
        let status = self
            .status_of(id)
            .ok_or_else(|| EngineError::NotFound(id.clone()))?;
        if status != AddinStatus::Started {
            return Err(EngineError::InvalidTransition {
                addin: id.clone(),
                from: status,
                to: AddinStatus::Stopping,
            });
        }

        let dependents = self.state().dependents(id);
        for dep in dependents.iter().rev() {
            if self.status_of(dep) == Some(AddinStatus::Started) {
                self.stop_one(dep);
            }
        }
        self.stop_one(id);
        self.status_of(id)
            .ok_or_else(|| EngineError::NotFound(id.clone()))
    }

    // ─── Extension points ────────────────────────────────────────────────

    /// A fresh extension point resolving factories through this engine
    pub fn extension_point(&self, name: impl Into<String>) -> ExtensionPoint {
        let types: Arc<dyn ResolveType> = Arc::clone(self.types()) as Arc<dyn ResolveType>;
        ExtensionPoint::new(name, types)
    }

    /// Attach the contributions of every started addin to a bound point.
    ///
    /// The point stays in sync afterwards: addins reaching `Started` attach
    /// their builders, addins stopping or failing detach them. Returns the
    /// number of builders attached now.
    pub fn load_extension_point(&self, point: Arc<ExtensionPoint>) -> Result<usize, EngineError> {
        let _control = self.control();
        if !point.is_bound() {
            return Err(EngineError::NotBound(point.name().to_string()));
        }
        {
            let mut points = self.points.lock().unwrap_or_else(PoisonError::into_inner);
            if !points.iter().any(|p| Arc::ptr_eq(p, &point)) {
                points.push(Arc::clone(&point));
            }
        }

        let started: Vec<AddinId> = self
            .get_started_addins()
            .into_iter()
            .map(|info| info.id)
            .collect();
        let mut attached = 0;
        for id in &started {
            let builders = self.framework.extensions().contributions_of(point.name(), id);
            match point.attach_all(&builders) {
                Ok(count) => attached += count,
                // a started addin that cannot contribute is taken down
                Err(e) => self.fail(id, (AddinStatus::Started, AddinStatus::Stopping), e.to_string()),
            }
        }
        tracing::info!(point = %point.name(), attached, "Extension point loaded");
        Ok(attached)
    }

    /// Stop keeping `point` in sync. Values already attached stay attached.
    pub fn unload_extension_point(&self, point: &Arc<ExtensionPoint>) -> bool {
        let _control = self.control();
        let mut points = self.points.lock().unwrap_or_else(PoisonError::into_inner);
        let before = points.len();
        points.retain(|p| !Arc::ptr_eq(p, point));
        points.len() != before
    }

    // ─── Transitions ─────────────────────────────────────────────────────

    fn resolve_addin(&self, id: &AddinId) {
        let checked = {
            let state = self.state();
            check_resolvable(&state, id)
        };
        let descriptor = match checked {
            Ok(descriptor) => descriptor,
            Err(message) => {
                self.fail(id, (AddinStatus::Discovered, AddinStatus::Resolved), message);
                return;
            }
        };

        self.loader.register(&descriptor);
        for declaration in &descriptor.extensions {
            let builder: Arc<dyn ExtensionBuilder> = Arc::new(DeclaredBuilder::from_declaration(declaration));
            self.framework
                .extensions()
                .register(declaration.point.clone(), builder);
        }

        let outcome = self
            .transition(id, AddinStatus::Resolved, None)
            .and_then(|event| self.notify(&event));
        if let Err(e) = outcome {
            self.fail(id, (AddinStatus::Discovered, AddinStatus::Resolved), e.to_string());
        }
    }

    fn start_all(&self) {
        let order = self.state().order.clone();
        for id in &order {
            if self.status_of(id) == Some(AddinStatus::Resolved) {
                self.start_one(id);
            }
        }
    }

    fn start_one(&self, id: &AddinId) {
        const STARTING: (AddinStatus, AddinStatus) = (AddinStatus::Resolved, AddinStatus::Started);

        let unmet = {
            let state = self.state();
            state
                .dependencies_of(id)
                .iter()
                .find_map(|dep| match state.status(dep) {
                    Some(AddinStatus::Started) => None,
                    Some(status) => Some(format!("dependency '{dep}' is {status}")),
                    None => Some(format!("unknown dependency '{dep}'")),
                })
        };
        if let Some(message) = unmet {
            self.fail(id, STARTING, message);
            return;
        }

        if let Err(e) = self.loader.load(id) {
            self.fail(id, STARTING, e.to_string());
            return;
        }

        let event = match self.transition(id, AddinStatus::Started, None) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(addin = %id, error = %e, "Cannot start addin");
                return;
            }
        };
        let outcome = self.notify(&event).and_then(|_| self.attach_extensions(id));
        if let Err(e) = outcome {
            self.fail(id, STARTING, e.to_string());
        }
    }

    fn stop_one(&self, id: &AddinId) {
        let event = match self.transition(id, AddinStatus::Stopping, None) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(addin = %id, error = %e, "Cannot stop addin");
                return;
            }
        };

        // listeners see Stopping while the code is still loaded
        let mut errors = Vec::new();
        if let Err(e) = self.notify(&event) {
            errors.push(e.to_string());
        }
        if let Err(e) = self.detach_extensions(id) {
            errors.push(e.to_string());
        }
        self.release(id);

        let outcome = if errors.is_empty() {
            self.transition(id, AddinStatus::Stopped, None)
        } else {
            let failure = AddinFailure {
                from: AddinStatus::Stopping,
                attempted: AddinStatus::Stopped,
                message: errors.join("; "),
            };
            tracing::error!(addin = %id, error = %failure.message, "Addin failed while stopping");
            self.transition(id, AddinStatus::Failed, Some(failure))
        };
        match outcome {
            Ok(event) => {
                if let Err(e) = self.notify(&event) {
                    tracing::warn!(addin = %id, error = %e, "Listener failed after teardown");
                }
            }
            Err(e) => tracing::error!(addin = %id, error = %e, "Cannot finish stopping addin"),
        }
        self.sweep_properties(id);
    }

    /// Fail `id` and everything depending on it.
    ///
    /// Started dependents are torn down first, in reverse plan order, then
    /// `id` itself, then the dependents that never started.
    fn fail(&self, id: &AddinId, transition: (AddinStatus, AddinStatus), message: String) {
        let (status, dependents) = {
            let state = self.state();
            (state.status(id), state.dependents(id))
        };
        match status {
            Some(status) if !status.is_terminal() => {}
            _ => return,
        }

        let cause = format!("dependency '{id}' failed");
        for dep in dependents.iter().rev() {
            if self.status_of(dep) == Some(AddinStatus::Started) {
                self.fail_single(dep, (AddinStatus::Started, AddinStatus::Stopping), cause.clone());
            }
        }
        self.fail_single(id, transition, message);
        for dep in &dependents {
            let Some(status) = self.status_of(dep) else {
                continue;
            };
            if let Some(next) = status.next() {
                self.fail_single(dep, (status, next), cause.clone());
            }
        }
    }

    fn fail_single(&self, id: &AddinId, transition: (AddinStatus, AddinStatus), message: String) {
        let Some(status) = self.status_of(id) else {
            return;
        };
        if status.is_terminal() {
            return;
        }
        let (from, attempted) = transition;
        tracing::error!(addin = %id, from = %from, attempted = %attempted, error = %message, "Addin failed");

        if status == AddinStatus::Started {
            match self.transition(id, AddinStatus::Stopping, None) {
                Ok(event) => {
                    if let Err(e) = self.notify(&event) {
                        tracing::warn!(addin = %id, error = %e, "Listener failed during teardown");
                    }
                }
                Err(e) => tracing::warn!(addin = %id, error = %e, "Cannot tear down addin"),
            }
        }
        if let Err(e) = self.detach_extensions(id) {
            tracing::warn!(addin = %id, error = %e, "Detaching extensions failed during teardown");
        }
        self.release(id);

        let failure = AddinFailure {
            from,
            attempted,
            message,
        };
        match self.transition(id, AddinStatus::Failed, Some(failure)) {
            Ok(event) => {
                if let Err(e) = self.notify(&event) {
                    tracing::warn!(addin = %id, error = %e, "Listener failed on failure event");
                }
            }
            Err(e) => tracing::warn!(addin = %id, error = %e, "Cannot mark addin failed"),
        }
        self.sweep_properties(id);
    }

    /// Commit a status change and build its event
    fn transition(
        &self,
        id: &AddinId,
        to: AddinStatus,
        failure: Option<AddinFailure>,
    ) -> Result<StatusEvent, EngineError> {
        let mut state = self.state();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(id.clone()))?;
        let from = record.status;
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                addin: id.clone(),
                from,
                to,
            });
        }

        record.status = to;
        let mut event = StatusEvent::new(id.clone(), from, to);
        if let Some(failure) = failure {
            record.failure = Some(failure.clone());
            event = event.with_failure(failure);
        }
        tracing::info!(addin = %id, from = %from, to = %to, "Addin status changed");
        Ok(event)
    }

    /// Run every listener, then broadcast. Reports the first listener error.
    fn notify(&self, event: &StatusEvent) -> Result<(), EngineError> {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut result = Ok(());
        for listener in &listeners {
            if let Err(e) = listener.on_status_changed(event, &self.framework) {
                tracing::warn!(
                    listener = %listener.name(),
                    addin = %event.addin,
                    status = %event.new_status,
                    error = %e,
                    "Status listener failed"
                );
                if result.is_ok() {
                    result = Err(EngineError::listener(listener.name(), e.to_string()));
                }
            }
        }

        // no subscribers is fine
        let _ = self.events.send(event.clone());
        result
    }

    fn loaded_points(&self) -> Vec<Arc<ExtensionPoint>> {
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn attach_extensions(&self, id: &AddinId) -> Result<(), EngineError> {
        for point in self.loaded_points() {
            let builders = self.framework.extensions().contributions_of(point.name(), id);
            if !builders.is_empty() {
                point.attach_all(&builders)?;
            }
        }
        Ok(())
    }

    fn detach_extensions(&self, id: &AddinId) -> Result<(), EngineError> {
        let mut result = Ok(());
        for point in self.loaded_points().iter().rev() {
            let builders = self.framework.extensions().contributions_of(point.name(), id);
            for builder in builders.iter().rev() {
                if let Err(e) = point.detach(builder) {
                    tracing::warn!(addin = %id, point = %point.name(), error = %e, "Detach failed");
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        result
    }

    /// Drop code, cached types and contributions of a stopping or failing addin
    fn release(&self, id: &AddinId) {
        self.loader.retire(id);
        self.framework.types().invalidate(id);
        self.framework.extensions().remove_addin(id);
    }

    fn sweep_properties(&self, id: &AddinId) {
        let owner = PropertyOwner::Addin(id.clone());
        for key in self.framework.properties().remove_owned_by(&owner) {
            tracing::warn!(addin = %id, key = %key, "Removed property left behind by addin");
        }
    }
}

/// Plan-order and configuration checks for `Discovered -> Resolved`
fn check_resolvable(state: &EngineState, id: &AddinId) -> Result<AddinDescriptor, String> {
    let record = state
        .records
        .get(id)
        .ok_or_else(|| format!("unknown addin '{id}'"))?;
    let position = state.position(id).unwrap_or(usize::MAX);

    for dep in &record.descriptor.dependencies {
        match state.position(dep) {
            None => return Err(format!("unknown dependency '{dep}'")),
            Some(p) if p >= position => {
                return Err(format!("dependency '{dep}' is ordered after it in the activation plan"));
            }
            Some(_) => {}
        }
        if state.status(dep) == Some(AddinStatus::Failed) {
            return Err(format!("dependency '{dep}' failed"));
        }
    }

    for declaration in &record.descriptor.extensions {
        declaration.builder.validate().map_err(|e| e.to_string())?;
    }
    Ok(record.descriptor.clone())
}
