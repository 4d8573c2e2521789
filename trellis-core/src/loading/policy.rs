//! ModuleLoader - per-addin loading decisions, shadow copies and probing

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tempfile::TempDir;
use trellis_addin_api::{AddinId, ResolvedType, TypeHandle, TypeTable};

use super::{CodeLoader, CodeUnit, LoadMethod, library_file_names};
use crate::config::LoadingConfig;
use crate::error::{EngineError, LoadError};
use crate::resolution::AddinDescriptor;

/// Host hook deciding how an addin's code is loaded
pub trait LoadMethodSelector: Send + Sync {
    fn decide_load_method(&self, addin: &AddinDescriptor, configured: LoadMethod) -> LoadMethod;
}

/// Uses the configured default for every addin
pub struct ConfiguredMethod;

impl LoadMethodSelector for ConfiguredMethod {
    fn decide_load_method(&self, _addin: &AddinDescriptor, configured: LoadMethod) -> LoadMethod {
        configured
    }
}

/// Where an addin's code units come from
#[derive(Debug, Clone)]
struct ModuleSource {
    location: PathBuf,
    code_units: Vec<String>,
}

/// Code and registrations of one loaded addin
struct LoadedModule {
    types: TypeTable,
    shadow_dir: Option<PathBuf>,
    units: Vec<CodeUnit>,
}

/// Brings addin code into the process according to [`LoadingConfig`].
pub struct ModuleLoader {
    config: LoadingConfig,
    selector: Box<dyn LoadMethodSelector>,
    sources: RwLock<HashMap<AddinId, (ModuleSource, AddinDescriptor)>>,
    /// Decided once per addin, never changed afterwards
    methods: Mutex<HashMap<AddinId, LoadMethod>>,
    loaded: Mutex<HashMap<AddinId, LoadedModule>>,
    /// Stopped or failed addins; never loaded again
    retired: Mutex<HashSet<AddinId>>,
    /// Serializes loads so one addin is never loaded twice concurrently
    load_lock: Mutex<()>,
    /// Private directory under `shadow_copy_directory`, created on first
    /// shadow copy and removed with the loader
    shadow_root: Mutex<Option<TempDir>>,
    substrate: Arc<dyn CodeLoader>,
}

impl ModuleLoader {
    pub fn new(config: LoadingConfig, substrate: Arc<dyn CodeLoader>) -> Self {
        Self {
            config,
            selector: Box::new(ConfiguredMethod),
            sources: RwLock::new(HashMap::new()),
            methods: Mutex::new(HashMap::new()),
            loaded: Mutex::new(HashMap::new()),
            retired: Mutex::new(HashSet::new()),
            load_lock: Mutex::new(()),
            shadow_root: Mutex::new(None),
            substrate,
        }
    }

    /// Builder: override the load method decision
    pub fn with_selector(self, selector: impl LoadMethodSelector + 'static) -> Self {
        self.with_boxed_selector(Box::new(selector))
    }

    pub fn with_boxed_selector(mut self, selector: Box<dyn LoadMethodSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn config(&self) -> &LoadingConfig {
        &self.config
    }

    /// Make an addin known to the loader
    pub fn register(&self, addin: &AddinDescriptor) {
        let source = ModuleSource {
            location: addin.location.clone(),
            code_units: addin.code_units.clone(),
        };
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addin.id.clone(), (source, addin.clone()));
    }

    pub fn is_registered(&self, addin: &AddinId) -> bool {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(addin)
    }

    /// Decide (once) how `addin` is loaded
    pub fn decide_load_method(&self, addin: &AddinId) -> Result<LoadMethod, EngineError> {
        let mut methods = self.methods.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(method) = methods.get(addin) {
            return Ok(*method);
        }
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        let (_, descriptor) = sources.get(addin).ok_or_else(|| EngineError::Load {
            addin: addin.clone(),
            source: LoadError::UnknownAddin(addin.clone()),
        })?;
        let method = self
            .selector
            .decide_load_method(descriptor, self.config.default_method);
        tracing::debug!(addin = %addin, method = ?method, "Load method decided");
        methods.insert(addin.clone(), method);
        Ok(method)
    }

    pub fn is_loaded(&self, addin: &AddinId) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(addin)
    }

    /// Load an addin's code units, if not loaded already.
    ///
    /// Returns the names of the loaded units. A failure leaves nothing
    /// behind: units loaded so far are released and shadow copies removed.
    pub fn load(&self, addin: &AddinId) -> Result<Vec<String>, EngineError> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(module) = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(addin)
        {
            return Ok(module.unit_names());
        }
        if self
            .retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(addin)
        {
            return Err(EngineError::Load {
                addin: addin.clone(),
                source: LoadError::Retired(addin.clone()),
            });
        }

        let method = self.decide_load_method(addin)?;
        let source = self
            .sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(addin)
            .map(|(source, _)| source.clone())
            .ok_or_else(|| EngineError::Load {
                addin: addin.clone(),
                source: LoadError::UnknownAddin(addin.clone()),
            })?;

        let shadow_dir = if self.config.shadow_copy_enabled {
            let root = self.ensure_shadow_root().map_err(|source| EngineError::Load {
                addin: addin.clone(),
                source,
            })?;
            Some(root.join(addin.as_str()))
        } else {
            None
        };

        let module = self
            .load_units(addin, &source, method, shadow_dir.as_deref())
            .map_err(|source| {
                if let Some(dir) = &shadow_dir {
                    remove_shadow_dir(addin, dir);
                }
                tracing::error!(addin = %addin, error = %source, "Addin load failed");
                EngineError::Load {
                    addin: addin.clone(),
                    source,
                }
            })?;

        let names = module.unit_names();
        tracing::info!(
            addin = %addin,
            method = ?method,
            units = ?names,
            types = module.types.len(),
            "Addin code loaded"
        );
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addin.clone(), module);
        Ok(names)
    }

    /// This loader's shadow directory, if one has been created yet.
    ///
    /// Each loader copies into its own `engine-*` directory so engines
    /// sharing a configuration never touch each other's copies.
    pub fn shadow_root(&self) -> Option<PathBuf> {
        self.shadow_root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
    }

    fn ensure_shadow_root(&self) -> Result<PathBuf, LoadError> {
        let mut root = self.shadow_root.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(dir) = root.as_ref() {
            return Ok(dir.path().to_path_buf());
        }
        std::fs::create_dir_all(&self.config.shadow_copy_directory)?;
        let dir = tempfile::Builder::new()
            .prefix("engine-")
            .tempdir_in(&self.config.shadow_copy_directory)?;
        let path = dir.path().to_path_buf();
        tracing::debug!(dir = %path.display(), "Shadow root created");
        *root = Some(dir);
        Ok(path)
    }

    fn load_units(
        &self,
        addin: &AddinId,
        source: &ModuleSource,
        method: LoadMethod,
        shadow_dir: Option<&Path>,
    ) -> Result<LoadedModule, LoadError> {
        if let Some(dir) = shadow_dir {
            std::fs::create_dir_all(dir)?;
        }

        let mut module = LoadedModule {
            types: TypeTable::new(addin.clone()),
            shadow_dir: shadow_dir.map(Path::to_path_buf),
            units: Vec::new(),
        };
        let mut pending: VecDeque<String> = source.code_units.iter().cloned().collect();
        let mut seen = HashSet::new();

        while let Some(unit) = pending.pop_front() {
            if !seen.insert(unit.clone()) {
                continue;
            }

            let deployed = self.locate(&source.location, &unit)?;
            let path = match shadow_dir {
                Some(dir) => shadow_copy(&deployed, dir)?,
                None => deployed,
            };

            let (instance, origin) = match method {
                LoadMethod::FileBacked => (self.substrate.load_file(&path)?, Some(path)),
                LoadMethod::MemoryBacked => {
                    let bytes = std::fs::read(&path)?;
                    let name = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or(unit.as_str())
                        .to_string();
                    (self.substrate.load_bytes(&name, bytes)?, None)
                }
            };
            let code_unit = CodeUnit::new(unit, origin, method, instance);

            let mut unit_types = TypeTable::new(addin.clone());
            code_unit.instance().register_types(&mut unit_types)?;
            module.types.merge(unit_types)?;
            pending.extend(code_unit.instance().references());
            module.units.push(code_unit);
        }

        Ok(module)
    }

    /// Find a code unit in the addin location, then in each probing directory
    fn locate(&self, location: &Path, unit: &str) -> Result<PathBuf, LoadError> {
        let candidates = library_file_names(unit);
        let dirs = std::iter::once(location).chain(
            self.config
                .probing_directories
                .iter()
                .map(PathBuf::as_path),
        );

        let mut searched = Vec::new();
        for dir in dirs {
            for file_name in &candidates {
                let path = dir.join(file_name);
                if path.is_file() {
                    return Ok(path);
                }
            }
            searched.push(dir.to_path_buf());
        }

        Err(LoadError::MissingFile {
            unit: unit.to_string(),
            searched,
        })
    }

    /// Look a type up among the registrations of a loaded addin
    pub fn lookup_type(&self, handle: &TypeHandle) -> Option<ResolvedType> {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle.addin())
            .and_then(|module| module.types.get(handle.type_name()).cloned())
    }

    /// Release an addin's code units and registrations.
    ///
    /// Best effort: the substrate may keep the code mapped. Returns `false`
    /// if the addin was not loaded.
    pub fn unload(&self, addin: &AddinId) -> bool {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(module) = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(addin)
        else {
            return false;
        };

        let shadow_dir = module.shadow_dir.clone();
        drop(module);
        if let Some(dir) = shadow_dir {
            remove_shadow_dir(addin, &dir);
        }

        if self.substrate.supports_unload() {
            tracing::info!(addin = %addin, "Addin code unloaded");
        } else {
            tracing::info!(
                addin = %addin,
                "Addin code released; substrate keeps it mapped until process exit"
            );
        }
        true
    }

    /// Unload `addin` and refuse any later load of it
    pub fn retire(&self, addin: &AddinId) -> bool {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addin.clone());
        self.unload(addin)
    }

    /// Name, load method and origin of each loaded unit of `addin`, in load order
    pub fn loaded_units(&self, addin: &AddinId) -> Vec<(String, LoadMethod, Option<PathBuf>)> {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(addin)
            .map(|module| {
                module
                    .units
                    .iter()
                    .map(|u| (u.name().to_string(), u.method(), u.origin().map(Path::to_path_buf)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of currently loaded addins, sorted
    pub fn loaded_addins(&self) -> Vec<AddinId> {
        let mut ids: Vec<AddinId> = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

impl LoadedModule {
    fn unit_names(&self) -> Vec<String> {
        self.units.iter().map(|u| u.name().to_string()).collect()
    }
}

fn shadow_copy(deployed: &Path, dir: &Path) -> Result<PathBuf, LoadError> {
    let file_name = deployed
        .file_name()
        .ok_or_else(|| LoadError::substrate(deployed.display().to_string(), "invalid file name"))?;
    let target = dir.join(file_name);
    std::fs::copy(deployed, &target)?;
    tracing::debug!(from = %deployed.display(), to = %target.display(), "Shadow copy created");
    Ok(target)
}

fn remove_shadow_dir(addin: &AddinId, dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        tracing::warn!(addin = %addin, dir = %dir.display(), error = %e, "Failed to remove shadow copies");
    }
}
