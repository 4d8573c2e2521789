//! Lifecycle scenarios driven through the public engine API
//!
//! Addins are statically linked through StaticLoader; their "code units" are
//! placeholder files in a temp directory so the loading policy still locates
//! and (optionally) shadow-copies them.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use trellis_addin_api::{Addin, AddinError, AddinId, TypeTable};
use trellis_core::{
    AddinDescriptor, AddinEngine, AddinResolutionPlan, AddinStatus, EngineConfig, EngineError,
    LoadMethod, PropertyOwner, StaticLoader, StaticPlan, StatusEvent, listener_fn,
};

#[derive(Default)]
struct Service;

impl Addin for Service {
    fn register_types(&self, types: &mut TypeTable) -> Result<(), AddinError> {
        let owner = types.addin().to_string();
        types.register("Service", Arc::new(owner))
    }
}

struct Host {
    _dir: TempDir,
    root: PathBuf,
    substrate: Arc<StaticLoader>,
}

impl Host {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        Self {
            _dir: dir,
            root,
            substrate: Arc::new(StaticLoader::new()),
        }
    }

    /// Deploy a code unit for `id` and describe the addin
    fn deploy(&self, id: &str, dependencies: &[&str]) -> AddinDescriptor {
        let location = self.root.join("addins").join(id);
        std::fs::create_dir_all(&location).unwrap();
        let unit = format!("{id}.so");
        std::fs::write(location.join(&unit), b"unit").unwrap();
        self.substrate.register(unit.clone(), || Box::new(Service));

        dependencies
            .iter()
            .fold(AddinDescriptor::new(id, location), |d, dep| d.with_dependency(*dep))
            .with_code_unit(unit)
    }

    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.addin_dirs = vec![self.root.join("addins")];
        config.loading.shadow_copy_directory = self.root.join("shadow");
        config
    }

    fn engine(&self, plan: Vec<AddinDescriptor>) -> AddinEngine {
        AddinEngine::builder(self.config(), self.substrate.clone())
            .resolver(StaticPlan(AddinResolutionPlan::new(plan)))
            .build()
    }
}

/// Records "addin:status" for every event
fn record(engine: &AddinEngine) -> Arc<Mutex<Vec<String>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    engine.add_listener(listener_fn("recorder", move |event: &StatusEvent, _| {
        sink.lock()
            .unwrap()
            .push(format!("{}:{}", event.addin, event.new_status));
        Ok(())
    }));
    log
}

fn only(log: &Arc<Mutex<Vec<String>>>, statuses: &[&str]) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|entry| statuses.iter().any(|s| entry.ends_with(&format!(":{s}"))))
        .cloned()
        .collect()
}

fn id(name: &str) -> AddinId {
    AddinId::from(name)
}

#[test]
fn dependency_chain_starts_forward_and_stops_backward() {
    let host = Host::new();
    let engine = host.engine(vec![
        host.deploy("core", &[]),
        host.deploy("logging", &["core"]),
        host.deploy("ui", &["logging"]),
    ]);
    let log = record(&engine);

    engine.initialize(true).unwrap();
    assert_eq!(
        only(&log, &["started"]),
        vec!["core:started", "logging:started", "ui:started"]
    );

    log.lock().unwrap().clear();
    engine.stop().unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "ui:stopping",
            "ui:stopped",
            "logging:stopping",
            "logging:stopped",
            "core:stopping",
            "core:stopped",
        ]
    );
    assert!(engine.get_started_addins().is_empty());
}

#[test]
fn each_addin_walks_the_full_path() {
    let host = Host::new();
    let engine = host.engine(vec![host.deploy("core", &[])]);
    let log = record(&engine);

    engine.initialize(false).unwrap();
    engine.start().unwrap();
    engine.stop().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["core:resolved", "core:started", "core:stopping", "core:stopped"]
    );
}

#[test]
fn load_failure_fails_dependents_but_not_siblings() {
    let host = Host::new();
    let core = host.deploy("core", &[]);
    std::fs::remove_file(core.location.join("core.so")).unwrap();
    let engine = host.engine(vec![
        core,
        host.deploy("logging", &["core"]),
        host.deploy("ui", &["logging"]),
        host.deploy("other", &[]),
    ]);

    engine.initialize(true).unwrap();

    let core = engine.addin(&id("core")).unwrap();
    assert_eq!(core.status, AddinStatus::Failed);
    let failure = core.failure.unwrap();
    assert_eq!(failure.from, AddinStatus::Resolved);
    assert_eq!(failure.attempted, AddinStatus::Started);
    assert!(failure.message.contains("core.so"));

    for dependent in ["logging", "ui"] {
        let info = engine.addin(&id(dependent)).unwrap();
        assert_eq!(info.status, AddinStatus::Failed, "{dependent}");
        assert!(info.failure.unwrap().message.contains("dependency"));
    }
    assert_eq!(engine.status(&id("other")), Some(AddinStatus::Started));
}

#[test]
fn listener_error_tears_the_addin_down() {
    let host = Host::new();
    let engine = host.engine(vec![
        host.deploy("core", &[]),
        host.deploy("logging", &["core"]),
        host.deploy("ui", &["logging"]),
    ]);
    let log = record(&engine);
    engine.add_listener(listener_fn("routes", |event: &StatusEvent, _| {
        if event.addin.as_str() == "logging" && event.new_status == AddinStatus::Started {
            return Err(EngineError::Config("route table full".to_string()));
        }
        Ok(())
    }));

    engine.initialize(true).unwrap();

    assert_eq!(
        only(&log, &["started", "stopping", "failed"]),
        vec![
            "core:started",
            "logging:started",
            "logging:stopping",
            "logging:failed",
            "ui:failed",
        ]
    );
    let failure = engine.addin(&id("logging")).unwrap().failure.unwrap();
    assert!(failure.message.contains("routes"));
    assert_eq!(host.substrate.load_count("ui.so"), 0);
}

#[test]
fn second_writer_of_a_key_fails() {
    let host = Host::new();
    let engine = host.engine(vec![
        host.deploy("core", &[]),
        host.deploy("logging", &["core"]),
        host.deploy("ui", &["logging"]),
        host.deploy("late", &["core"]),
    ]);
    let log = record(&engine);
    engine.add_listener(listener_fn("publisher", |event: &StatusEvent, framework| {
        if event.addin.as_str() == "core" && event.new_status == AddinStatus::Started {
            framework.set_property(&PropertyOwner::Addin(event.addin.clone()), "shared", Arc::new(1))?;
        }
        if event.addin.as_str() == "late" && event.new_status == AddinStatus::Started {
            framework.set_property(&PropertyOwner::Addin(event.addin.clone()), "shared", Arc::new(2))?;
        }
        Ok(())
    }));

    engine.initialize(true).unwrap();

    assert_eq!(engine.status(&id("late")), Some(AddinStatus::Failed));
    assert_eq!(engine.status(&id("ui")), Some(AddinStatus::Started));
    let failure = engine.addin(&id("late")).unwrap().failure.unwrap();
    assert!(failure.message.contains("shared"));

    assert_eq!(
        engine.framework().properties().owner_of("shared"),
        Some(PropertyOwner::Addin(id("core")))
    );

    log.lock().unwrap().clear();
    engine.stop_addin(&id("core")).unwrap();
    assert_eq!(
        only(&log, &["stopping"]),
        vec!["ui:stopping", "logging:stopping", "core:stopping"]
    );
}

#[test]
fn start_addin_starts_dependencies_first() {
    let host = Host::new();
    let engine = host.engine(vec![
        host.deploy("core", &[]),
        host.deploy("logging", &["core"]),
        host.deploy("ui", &["logging"]),
        host.deploy("other", &[]),
    ]);
    let log = record(&engine);
    engine.initialize(false).unwrap();

    assert_eq!(engine.start_addin(&id("ui")).unwrap(), AddinStatus::Started);
    assert_eq!(
        only(&log, &["started"]),
        vec!["core:started", "logging:started", "ui:started"]
    );
    assert_eq!(engine.status(&id("other")), Some(AddinStatus::Resolved));
}

#[test]
fn stopped_is_terminal() {
    let host = Host::new();
    let engine = host.engine(vec![host.deploy("core", &[])]);
    engine.initialize(true).unwrap();
    engine.stop_addin(&id("core")).unwrap();

    let err = engine.start_addin(&id("core")).unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: AddinStatus::Stopped,
            to: AddinStatus::Started,
            ..
        }
    ));
    // its code cannot come back through type resolution either
    assert!(
        engine
            .types()
            .resolve(&trellis_addin_api::TypeHandle::new("core", "Service"))
            .is_err()
    );
}

#[test]
fn lazy_type_resolution_loads_once() {
    let host = Host::new();
    let engine = host.engine(vec![host.deploy("handlers", &[])]);
    engine.initialize(false).unwrap();
    assert_eq!(host.substrate.load_count("handlers.so"), 0);

    let handle = trellis_addin_api::TypeHandle::new("handlers", "Service");
    let first = engine.types().resolve(&handle).unwrap();
    let second = engine.types().resolve(&handle).unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(*first.downcast::<String>().unwrap(), "handlers");

    engine.start().unwrap();
    assert_eq!(host.substrate.load_count("handlers.so"), 1);
}

#[test]
fn orphaned_properties_are_swept_on_stop() {
    let host = Host::new();
    let engine = host.engine(vec![host.deploy("core", &[])]);
    engine.add_listener(listener_fn("publisher", |event: &StatusEvent, framework| {
        if event.new_status == AddinStatus::Started {
            framework.set_property(
                &PropertyOwner::Addin(event.addin.clone()),
                "core.version",
                Arc::new("1.0".to_string()),
            )?;
        }
        Ok(())
    }));
    engine
        .framework()
        .set_property(&PropertyOwner::Host, "host.name", Arc::new("demo"))
        .unwrap();

    engine.initialize(true).unwrap();
    assert!(engine.framework().contains_property_key("core.version"));

    engine.stop().unwrap();
    assert!(!engine.framework().contains_property_key("core.version"));
    assert!(engine.framework().contains_property_key("host.name"));
}

#[test]
fn configured_initialize_honors_start_automatically() {
    let host = Host::new();
    let mut config = host.config();
    config.start_automatically = false;
    let engine = AddinEngine::builder(config, host.substrate.clone())
        .resolver(StaticPlan(AddinResolutionPlan::new(vec![host.deploy("core", &[])])))
        .build();

    engine.initialize_configured().unwrap();
    assert_eq!(engine.status(&id("core")), Some(AddinStatus::Resolved));
    assert_eq!(host.substrate.load_count("core.so"), 0);

    let engine = host.engine(vec![host.deploy("core", &[])]);
    assert!(engine.config().start_automatically);
    engine.initialize_configured().unwrap();
    assert_eq!(engine.status(&id("core")), Some(AddinStatus::Started));
}

#[test]
fn shadow_copies_follow_the_lifecycle() {
    let host = Host::new();
    let mut config = host.config();
    config.loading.shadow_copy_enabled = true;
    let engine = AddinEngine::builder(config, host.substrate.clone())
        .resolver(StaticPlan(AddinResolutionPlan::new(vec![host.deploy("core", &[])])))
        .build();

    engine.initialize(true).unwrap();
    let copy = engine.loader().shadow_root().unwrap().join("core/core.so");
    assert!(copy.starts_with(host.root.join("shadow")));
    assert!(copy.is_file());
    let units = engine.loader().loaded_units(&id("core"));
    assert_eq!(units[0].2.as_deref(), Some(copy.as_path()));

    engine.stop().unwrap();
    assert!(!copy.exists());
    assert!(host.root.join("addins/core/core.so").is_file());
}

#[test]
fn engines_sharing_a_config_keep_their_own_shadow_copies() {
    let host = Host::new();
    let mut config = host.config();
    config.loading.shadow_copy_enabled = true;
    let plan = vec![host.deploy("core", &[])];
    let engine = |plan: Vec<AddinDescriptor>| {
        AddinEngine::builder(config.clone(), host.substrate.clone())
            .resolver(StaticPlan(AddinResolutionPlan::new(plan)))
            .build()
    };
    let first = engine(plan.clone());
    let second = engine(plan);

    first.initialize(true).unwrap();
    second.initialize(true).unwrap();
    let kept = first.loader().shadow_root().unwrap().join("core/core.so");
    assert_ne!(first.loader().shadow_root(), second.loader().shadow_root());

    second.stop().unwrap();
    drop(second);
    assert_eq!(first.status(&id("core")), Some(AddinStatus::Started));
    assert!(kept.is_file());

    first.stop().unwrap();
    assert!(!kept.exists());
}

#[test]
fn memory_backed_addins_leave_the_deployed_file_alone() {
    let host = Host::new();
    let mut config = host.config();
    config.loading.shadow_copy_enabled = true;
    config.loading.default_method = LoadMethod::MemoryBacked;
    let deployed = host.root.join("addins/core/core.so");
    let engine = AddinEngine::builder(config, host.substrate.clone())
        .resolver(StaticPlan(AddinResolutionPlan::new(vec![host.deploy("core", &[])])))
        .build();
    let before = std::fs::read(&deployed).unwrap();

    engine.initialize(true).unwrap();
    let units = engine.loader().loaded_units(&id("core"));
    assert_eq!(units.len(), 1);
    let (name, method, origin) = &units[0];
    assert_eq!(name, "core.so");
    assert_eq!(*method, LoadMethod::MemoryBacked);
    assert!(origin.is_none());
    assert_eq!(host.substrate.load_count("core.so"), 1);

    engine.stop().unwrap();
    assert!(engine.loader().loaded_units(&id("core")).is_empty());
    assert_eq!(std::fs::read(&deployed).unwrap(), before);
}

#[test]
fn manifests_on_disk_drive_the_engine() {
    let host = Host::new();
    host.deploy("core", &[]);
    host.deploy("ui", &[]);
    std::fs::write(
        host.root.join("addins/core/addin.toml"),
        "id = \"core\"\nversion = \"1.0.0\"\ncode_units = [\"core.so\"]\n",
    )
    .unwrap();
    std::fs::write(
        host.root.join("addins/ui/addin.toml"),
        "id = \"ui\"\ndependencies = [\"core\"]\ncode_units = [\"ui.so\"]\n",
    )
    .unwrap();

    let engine = AddinEngine::new(host.config(), host.substrate.clone());
    engine.initialize(true).unwrap();

    let started: Vec<String> = engine
        .get_started_addins()
        .into_iter()
        .map(|info| info.id.to_string())
        .collect();
    assert_eq!(started, vec!["core", "ui"]);
    assert_eq!(engine.addin(&id("core")).unwrap().version, "1.0.0");
}

#[tokio::test]
async fn status_events_are_broadcast() {
    let host = Host::new();
    let engine = host.engine(vec![host.deploy("core", &[]), host.deploy("ui", &["core"])]);
    let mut rx = engine.subscribe();

    engine.initialize(true).unwrap();
    engine.stop().unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    let started: Vec<&str> = seen
        .iter()
        .filter(|e| e.new_status == AddinStatus::Started)
        .map(|e| e.addin.as_str())
        .collect();
    assert_eq!(started, vec!["core", "ui"]);
    assert_eq!(seen.len(), 8);
    assert_eq!(seen.last().unwrap().to_string(), "core: stopping -> stopped");
}
