use std::fs::{self, File};
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use switchboard_core::{ServiceLookup, ServiceObject};
use switchboard_framework::{
    Container, Environment, Module, ModuleBase, ModuleResult, PluginInfo,
};
use switchboard_runtime::{
    PluginCatalog, PluginError, PluginInstance, PluginListener, PluginManager,
};
use zip::write::SimpleFileOptions;

type Log = Arc<Mutex<Vec<String>>>;

struct Journal {
    name: String,
    log: Log,
}

impl Module for Journal {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, _: &Container) -> ModuleResult<()> {
        Ok(())
    }

    fn start(&self) -> ModuleResult<()> {
        self.log.lock().push(format!("start:{}", self.name));
        Ok(())
    }

    fn stop(&self) -> ModuleResult<()> {
        self.log.lock().push(format!("stop:{}", self.name));
        Ok(())
    }
}

struct Flaky {
    log: Log,
}

impl Module for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn initialize(&self, _: &Container) -> ModuleResult<()> {
        Ok(())
    }

    fn start(&self) -> ModuleResult<()> {
        panic!("flaky start")
    }

    fn stop(&self) -> ModuleResult<()> {
        self.log.lock().push("stop:flaky".into());
        Ok(())
    }

    fn destroy(&self) -> ModuleResult<()> {
        self.log.lock().push("destroy:flaky".into());
        Ok(())
    }
}

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        42
    }
}

fn catalog(log: &Log) -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    let journal_log = log.clone();
    catalog.register("journal", move || {
        PluginInstance::Module(Arc::new(Journal {
            name: "journal".into(),
            log: journal_log.clone(),
        }))
    });
    let flaky_log = log.clone();
    catalog.register("flaky", move || {
        PluginInstance::Module(Arc::new(Flaky {
            log: flaky_log.clone(),
        }))
    });
    catalog.register("clock", || {
        let clock = Arc::new(FixedClock);
        PluginInstance::Module(Arc::new(
            ModuleBase::builder("clock")
                .service(ServiceObject::new(clock.clone()).with::<dyn Clock>(clock))
                .build(),
        ))
    });
    catalog
}

fn manager_with(root: &Path, container: Container, log: &Log) -> PluginManager {
    PluginManager::builder(container, root)
        .catalog(catalog(log))
        .server_version("1.0.0")
        .build()
}

fn manager(root: &Path, log: &Log) -> (PluginManager, ServiceLookup) {
    let lookup = ServiceLookup::new();
    let container = Container::builder(lookup.clone()).build();
    (manager_with(root, container, log), lookup)
}

fn zip_bytes<W: Write + Seek>(writer: W, files: &[(&str, &str)]) -> W {
    let mut zip = zip::ZipWriter::new(writer);
    for (name, body) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap()
}

fn write_archive(path: &Path, files: &[(&str, &str)]) {
    zip_bytes(File::create(path).unwrap(), files);
}

fn plugin_dir(root: &Path, name: &str, manifest: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("plugin.toml"), manifest).unwrap();
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl PluginListener for Recorder {
    fn plugin_created(&self, name: &str, _: &PluginInfo) {
        self.events.lock().push(format!("created:{name}"));
    }

    fn plugin_destroyed(&self, name: &str, _: &PluginInfo) {
        self.events.lock().push(format!("destroyed:{name}"));
    }

    fn plugins_monitored(&self) {
        self.events.lock().push("monitored".into());
    }
}

#[test]
fn new_archive_is_extracted_and_loaded_once() {
    let root = tempfile::tempdir().unwrap();
    let log = Log::default();
    let (manager, _) = manager(root.path(), &log);

    write_archive(
        &root.path().join("Search.zip"),
        &[("plugin.toml", "class = \"journal\"\nname = \"Search\"")],
    );

    let first = manager.scan();
    assert_eq!(first.extracted, vec!["search"]);
    assert_eq!(first.loaded, vec!["search"]);
    assert!(root.path().join("search/plugin.toml").exists());

    let second = manager.scan();
    assert!(second.is_empty(), "unexpected work: {second:?}");
    assert_eq!(*log.lock(), vec!["start:journal"]);
}

#[test]
fn archive_without_manifest_is_ignored() {
    let root = tempfile::tempdir().unwrap();
    let (manager, _) = manager(root.path(), &Log::default());

    write_archive(&root.path().join("commons.jar"), &[("README", "not a plugin")]);

    assert!(manager.scan().is_empty());
    assert!(!root.path().join("commons").exists());
}

#[test]
fn updated_archive_is_reloaded() {
    let root = tempfile::tempdir().unwrap();
    let log = Log::default();
    let (manager, _) = manager(root.path(), &log);
    let archive = root.path().join("search.zip");

    write_archive(&archive, &[("plugin.toml", "class = \"journal\"\nversion = \"1.0\"")]);
    manager.scan();
    assert_eq!(
        manager.plugin_info("search").unwrap().version.as_deref(),
        Some("1.0")
    );

    write_archive(&archive, &[("plugin.toml", "class = \"journal\"\nversion = \"2.0\"")]);
    set_mtime(&archive, SystemTime::now() + Duration::from_secs(120));

    let summary = manager.scan();
    assert_eq!(summary.unloaded, vec!["search"]);
    assert_eq!(summary.extracted, vec!["search"]);
    assert_eq!(summary.loaded, vec!["search"]);
    assert_eq!(
        manager.plugin_info("search").unwrap().version.as_deref(),
        Some("2.0")
    );
    assert_eq!(
        *log.lock(),
        vec!["start:journal", "stop:journal", "start:journal"]
    );
}

#[test]
fn removed_archive_unloads_plugin() {
    let root = tempfile::tempdir().unwrap();
    let log = Log::default();
    let (manager, _) = manager(root.path(), &log);
    let archive = root.path().join("search.zip");

    write_archive(&archive, &[("plugin.toml", "class = \"journal\"")]);
    manager.scan();
    assert!(manager.is_loaded("search"));

    fs::remove_file(&archive).unwrap();
    let summary = manager.scan();
    assert_eq!(summary.unloaded, vec!["search"]);
    assert!(!manager.is_loaded("search"));
    assert!(!root.path().join("search").exists());
}

#[test]
fn plain_directories_survive_without_archive() {
    let root = tempfile::tempdir().unwrap();
    let (manager, _) = manager(root.path(), &Log::default());
    plugin_dir(root.path(), "local", "class = \"journal\"");

    manager.scan();
    assert!(manager.scan().is_empty());
    assert!(manager.is_loaded("local"));
}

#[test]
fn child_waits_for_parent_in_same_scan() {
    let root = tempfile::tempdir().unwrap();
    let (manager, _) = manager(root.path(), &Log::default());
    let recorder = Arc::new(Recorder::default());
    manager.add_listener(recorder.clone());

    plugin_dir(root.path(), "addon", "class = \"journal\"\nparent_plugin = \"zeta\"");
    plugin_dir(root.path(), "zeta", "class = \"clock\"");

    let summary = manager.scan();
    assert_eq!(summary.loaded, vec!["zeta", "addon"]);
    assert!(summary.deferred.is_empty());

    let child_loader = manager.class_loader("addon").unwrap();
    assert_eq!(child_loader.parent().unwrap().name(), "zeta");

    recorder.events.lock().clear();
    assert!(manager.unload_plugin("zeta"));
    assert!(!manager.is_loaded("addon"));
    assert_eq!(
        *recorder.events.lock(),
        vec!["destroyed:addon", "destroyed:zeta"]
    );
}

#[test]
fn child_without_parent_is_skipped() {
    let root = tempfile::tempdir().unwrap();
    let (manager, _) = manager(root.path(), &Log::default());
    plugin_dir(root.path(), "orphan", "class = \"journal\"\nparent_plugin = \"ghost\"");
    plugin_dir(root.path(), "search", "class = \"journal\"");

    let summary = manager.scan();
    assert_eq!(summary.failed, vec!["orphan"]);
    assert_eq!(summary.loaded, vec!["search"]);
}

#[test]
fn setup_mode_loads_only_bootstrap() {
    let root = tempfile::tempdir().unwrap();
    let log = Log::default();
    let environment = Environment {
        setup_mode: true,
        ..Environment::default()
    };
    let container = Container::builder(ServiceLookup::new())
        .environment(environment)
        .build();
    let manager = manager_with(root.path(), container.clone(), &log);

    plugin_dir(root.path(), "admin", "class = \"journal\"");
    plugin_dir(root.path(), "search", "class = \"journal\"");

    assert_eq!(manager.scan().loaded, vec!["admin"]);

    container.set_setup_mode(false).unwrap();
    assert_eq!(manager.scan().loaded, vec!["search"]);
}

#[test]
fn broken_manifest_is_retried_after_it_changes() {
    let root = tempfile::tempdir().unwrap();
    let (manager, _) = manager(root.path(), &Log::default());
    plugin_dir(root.path(), "broken", "class = ");
    plugin_dir(root.path(), "search", "class = \"journal\"");

    let summary = manager.scan();
    assert_eq!(summary.failed, vec!["broken"]);
    assert_eq!(summary.loaded, vec!["search"]);

    assert!(manager.scan().is_empty());

    let manifest = root.path().join("broken/plugin.toml");
    fs::write(&manifest, "class = \"journal\"").unwrap();
    set_mtime(&manifest, SystemTime::now() + Duration::from_secs(120));
    assert_eq!(manager.scan().loaded, vec!["broken"]);
}

#[test]
fn missing_class_and_old_server_fail() {
    let root = tempfile::tempdir().unwrap();
    let (manager, _) = manager(root.path(), &Log::default());
    plugin_dir(root.path(), "future", "class = \"journal\"\nmin_server_version = \"2.0\"");
    plugin_dir(root.path(), "unknown", "class = \"org.example.nothing\"");

    let summary = manager.scan();
    assert_eq!(summary.failed, vec!["future", "unknown"]);
    assert!(manager.plugins().is_empty());
}

#[test]
fn panicking_start_is_cleaned_up_and_isolated() {
    let root = tempfile::tempdir().unwrap();
    let log = Log::default();
    let (manager, _) = manager(root.path(), &log);
    let recorder = Arc::new(Recorder::default());
    manager.add_listener(recorder.clone());

    plugin_dir(root.path(), "admin", "class = \"flaky\"");
    plugin_dir(root.path(), "search", "class = \"journal\"");

    let summary = manager.scan();
    assert_eq!(summary.failed, vec!["admin"]);
    assert_eq!(summary.loaded, vec!["search"]);
    assert_eq!(
        *log.lock(),
        vec!["stop:flaky", "destroy:flaky", "start:journal"]
    );
    assert_eq!(
        recorder.events.lock().last().map(String::as_str),
        Some("monitored")
    );

    assert!(manager.scan().is_empty());
}

#[test]
fn published_services_follow_plugin_lifecycle() {
    let root = tempfile::tempdir().unwrap();
    let (manager, lookup) = manager(root.path(), &Log::default());
    plugin_dir(root.path(), "clock", "class = \"clock\"");

    manager.scan();
    let clock = lookup.lookup_service::<dyn Clock>().unwrap();
    assert_eq!(clock.now(), 42);

    manager.unload_plugin("clock");
    assert!(lookup.lookup_service::<dyn Clock>().is_none());
}

#[test]
fn install_plugin_scans_immediately() {
    let root = tempfile::tempdir().unwrap();
    let (manager, _) = manager(root.path(), &Log::default());
    let recorder = Arc::new(Recorder::default());
    manager.add_listener(recorder.clone());

    let bytes = zip_bytes(Cursor::new(Vec::new()), &[("plugin.toml", "class = \"journal\"")])
        .into_inner();
    let summary = manager.install_plugin(&bytes[..], "motd.zip").unwrap();

    assert_eq!(summary.loaded, vec!["motd"]);
    assert!(manager.is_plugin_downloaded("motd.zip"));
    assert!(!root.path().join("motd.zip.part").exists());
    assert_eq!(*recorder.events.lock(), vec!["created:motd", "monitored"]);

    assert!(matches!(
        manager.install_plugin(&bytes[..], "nested/motd.zip"),
        Err(PluginError::Archive { .. })
    ));
}

#[test]
fn shutdown_unloads_newest_first() {
    let root = tempfile::tempdir().unwrap();
    let (manager, _) = manager(root.path(), &Log::default());
    let recorder = Arc::new(Recorder::default());
    manager.add_listener(recorder.clone());

    plugin_dir(root.path(), "admin", "class = \"journal\"");
    plugin_dir(root.path(), "clock", "class = \"clock\"");
    manager.scan();

    recorder.events.lock().clear();
    manager.shutdown();
    manager.shutdown();
    assert_eq!(
        *recorder.events.lock(),
        vec!["destroyed:clock", "destroyed:admin"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn monitor_scans_immediately_and_on_request() {
    let root = tempfile::tempdir().unwrap();
    let (manager, _) = manager(root.path(), &Log::default());

    manager.start().unwrap();
    assert!(manager.start().is_err());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !manager.is_executed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    write_archive(&root.path().join("search.zip"), &[("plugin.toml", "class = \"journal\"")]);
    assert!(manager.request_scan());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !manager.is_loaded("search") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let shutdown = manager.clone();
    tokio::task::spawn_blocking(move || shutdown.shutdown())
        .await
        .unwrap();
    assert!(!manager.request_scan());
    assert!(manager.plugins().is_empty());
}
