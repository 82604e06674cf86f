//! Hot deployment of plugins from a watched directory.
//!
//! Every scan:
//!
//! 1. explodes new plugin archives (those carrying a `plugin.toml`) into
//!    sibling directories, and re-extracts archives newer than their
//!    directory after unloading the old plugin;
//! 2. unloads and deletes extracted directories whose archive is gone;
//! 3. loads every plugin directory not loaded yet, bootstrap plugin first.
//!
//! A candidate that fails to load is logged and skipped; the rest of the
//! scan carries on. A failed candidate is retried once its manifest changes.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Read};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use switchboard_framework::{Container, ModuleResult, PluginContext, PluginInfo};
use tracing::{debug, debug_span, error, info, info_span, trace, warn};

use crate::archive;
use crate::catalog::{PluginCatalog, PluginInstance};
use crate::classloader::PluginClassLoader;
use crate::config::PluginsConfig;
use crate::error::{PluginError, PluginResult, RuntimeError, RuntimeResult};
use crate::manifest::{MANIFEST_FILE, PluginManifest};
use crate::monitor::PluginMonitor;

/// Receives plugin lifecycle notifications.
///
/// Called on the scanning thread after the manager's bookkeeping is updated.
pub trait PluginListener: Send + Sync {
    fn plugin_created(&self, _name: &str, _info: &PluginInfo) {}

    fn plugin_destroyed(&self, _name: &str, _info: &PluginInfo) {}

    /// A scan finished.
    fn plugins_monitored(&self) {}
}

/// What one scan did, by plugin name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub extracted: Vec<String>,
    pub loaded: Vec<String>,
    pub unloaded: Vec<String>,
    /// Waiting for their parent plugin.
    pub deferred: Vec<String>,
    pub failed: Vec<String>,
}

impl ScanSummary {
    pub fn is_empty(&self) -> bool {
        self.extracted.is_empty()
            && self.loaded.is_empty()
            && self.unloaded.is_empty()
            && self.deferred.is_empty()
            && self.failed.is_empty()
    }
}

struct LoadedPlugin {
    info: PluginInfo,
    directory: PathBuf,
    instance: PluginInstance,
    loader: Arc<PluginClassLoader>,
    parent: Option<String>,
    children: Vec<String>,
}

#[derive(Default)]
struct State {
    plugins: HashMap<String, LoadedPlugin>,
    /// Load order, for shutdown.
    order: Vec<String>,
    /// Candidate directory → manifest mtime when it last failed.
    failed: HashMap<PathBuf, Option<SystemTime>>,
}

struct Candidate {
    name: String,
    dir: PathBuf,
}

enum LoadOutcome {
    Loaded,
    Deferred,
}

struct Inner {
    directory: PathBuf,
    config: PluginsConfig,
    server_version: String,
    container: Container,
    catalog: Arc<PluginCatalog>,
    state: Mutex<State>,
    /// Serializes scans, installs and unloads. Re-entrant so a plugin may
    /// call back into the manager from its lifecycle methods.
    scan_lock: ReentrantMutex<()>,
    listeners: RwLock<Vec<Arc<dyn PluginListener>>>,
    executed: AtomicBool,
    shut_down: AtomicBool,
    monitor: Mutex<Option<PluginMonitor>>,
}

/// Builder for [`PluginManager`].
pub struct PluginManagerBuilder {
    container: Container,
    directory: PathBuf,
    config: PluginsConfig,
    server_version: String,
    catalog: Option<PluginCatalog>,
}

impl PluginManagerBuilder {
    /// Scan settings. `config.directory` is ignored in favour of the
    /// directory given to [`PluginManager::builder`].
    pub fn config(mut self, config: PluginsConfig) -> Self {
        self.config = config;
        self
    }

    /// Version compared against `min_server_version`.
    pub fn server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }

    /// Host class catalog. Defaults to [`PluginCatalog::collect_all`].
    pub fn catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> PluginManager {
        let catalog = self.catalog.unwrap_or_else(PluginCatalog::collect_all);
        PluginManager {
            inner: Arc::new(Inner {
                directory: self.directory,
                config: self.config,
                server_version: self.server_version,
                container: self.container,
                catalog: Arc::new(catalog),
                state: Mutex::new(State::default()),
                scan_lock: ReentrantMutex::new(()),
                listeners: RwLock::new(Vec::new()),
                executed: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                monitor: Mutex::new(None),
            }),
        }
    }
}

/// Loads, tracks and unloads plugins found in one directory.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<Inner>,
}

impl PluginManager {
    pub fn builder(container: Container, directory: impl Into<PathBuf>) -> PluginManagerBuilder {
        PluginManagerBuilder {
            container,
            directory: directory.into(),
            config: PluginsConfig::default(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            catalog: None,
        }
    }

    pub(crate) fn downgrade(&self) -> WeakPluginManager {
        WeakPluginManager(Arc::downgrade(&self.inner))
    }

    /// The watched directory.
    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.inner.catalog
    }

    /// Starts the background monitor. Must be called inside a tokio runtime.
    ///
    /// The first scan runs immediately; later scans follow the configured
    /// delay after the previous one finished.
    pub fn start(&self) -> RuntimeResult<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(RuntimeError::State("plugin manager was shut down"));
        }
        let mut monitor = self.inner.monitor.lock();
        if monitor.is_some() {
            return Err(RuntimeError::State("plugin monitor already running"));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| RuntimeError::State("plugin monitor requires a tokio runtime"))?;
        fs::create_dir_all(&self.inner.directory)?;

        let interval = self.inner.config.scan_interval();
        info!(
            directory = %self.inner.directory.display(),
            interval_secs = interval.as_secs(),
            "Starting plugin monitor"
        );
        *monitor = Some(PluginMonitor::spawn(&handle, self, interval));
        Ok(())
    }

    /// Wakes the monitor for an immediate scan. Returns `false` when the
    /// monitor is not running.
    pub fn request_scan(&self) -> bool {
        match self.inner.monitor.lock().as_ref() {
            Some(monitor) if !monitor.is_stopped() => {
                monitor.run_now();
                true
            }
            _ => false,
        }
    }

    /// Stops the monitor and unloads every plugin, newest first.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(monitor) = self.inner.monitor.lock().take() {
            monitor.stop();
        }

        let _scan = self.inner.scan_lock.lock();
        let order = std::mem::take(&mut self.inner.state.lock().order);
        let mut unloaded = Vec::new();
        for name in order.iter().rev() {
            self.unload_locked(name, &mut unloaded);
        }
        self.inner.state.lock().failed.clear();
        info!(count = unloaded.len(), "Plugin manager shut down");
    }

    pub fn add_listener(&self, listener: Arc<dyn PluginListener>) {
        self.inner.listeners.write().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn PluginListener>) {
        self.inner
            .listeners
            .write()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Names of the loaded plugins, sorted.
    pub fn plugins(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.state.lock().plugins.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn plugin(&self, name: &str) -> Option<PluginInstance> {
        let state = self.inner.state.lock();
        state.plugins.get(name).map(|p| p.instance.clone())
    }

    pub fn plugin_info(&self, name: &str) -> Option<PluginInfo> {
        let state = self.inner.state.lock();
        state.plugins.get(name).map(|p| p.info.clone())
    }

    pub fn plugin_directory(&self, name: &str) -> Option<PathBuf> {
        let state = self.inner.state.lock();
        state.plugins.get(name).map(|p| p.directory.clone())
    }

    pub fn class_loader(&self, name: &str) -> Option<Arc<PluginClassLoader>> {
        let state = self.inner.state.lock();
        state.plugins.get(name).map(|p| p.loader.clone())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.inner.state.lock().plugins.contains_key(name)
    }

    /// Whether at least one scan has completed.
    pub fn is_executed(&self) -> bool {
        self.inner.executed.load(Ordering::Acquire)
    }

    /// Whether `file_name` is present in the plugin directory.
    pub fn is_plugin_downloaded(&self, file_name: &str) -> bool {
        self.inner.directory.join(file_name).exists()
    }

    // =========================================================================
    // Installation
    // =========================================================================

    /// Installs or replaces the archive `file_name` and scans right away.
    ///
    /// The content is written to `<file_name>.part` and renamed into place,
    /// so a concurrent scan never sees a partial archive.
    pub fn install_plugin(&self, mut reader: impl Read, file_name: &str) -> PluginResult<ScanSummary> {
        let is_plain_name = Path::new(file_name)
            .file_name()
            .is_some_and(|f| f == file_name);
        if !is_plain_name
            || archive::plugin_name(Path::new(file_name), &self.inner.config.archive_extensions)
                .is_none()
        {
            return Err(PluginError::archive(file_name, "not a plugin archive file name"));
        }

        fs::create_dir_all(&self.inner.directory)?;
        let target = self.inner.directory.join(file_name);
        let part = self.inner.directory.join(format!("{file_name}.part"));

        let written = {
            let mut out = File::create(&part)?;
            io::copy(&mut reader, &mut out).and_then(|n| out.sync_all().map(|_| n))
        };
        let written = match written {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&part);
                return Err(e.into());
            }
        };
        fs::rename(&part, &target)?;
        info!(file = file_name, bytes = written, "Installed plugin archive");

        Ok(self.scan())
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Runs one scan of the plugin directory.
    pub fn scan(&self) -> ScanSummary {
        let _scan = self.inner.scan_lock.lock();
        let mut summary = ScanSummary::default();
        if self.inner.shut_down.load(Ordering::Acquire) {
            return summary;
        }

        let span = debug_span!("plugin_scan", directory = %self.inner.directory.display());
        let _enter = span.enter();

        match self.scan_locked(&mut summary) {
            Ok(()) => {}
            Err(e) => error!(error = %e, "Plugin scan failed"),
        }

        self.inner.executed.store(true, Ordering::Release);
        if !summary.is_empty() {
            debug!(?summary, "Plugin scan finished");
        }
        self.fire(|l| l.plugins_monitored());
        summary
    }

    fn scan_locked(&self, summary: &mut ScanSummary) -> io::Result<()> {
        let dir = &self.inner.directory;
        if !dir.is_dir() {
            trace!("Plugin directory does not exist");
            return Ok(());
        }

        let mut archives = HashMap::new();
        let mut directories = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                directories.push(Candidate {
                    name: file_name.to_string(),
                    dir: path.clone(),
                });
            } else if let Some(name) =
                archive::plugin_name(&path, &self.inner.config.archive_extensions)
            {
                archives.entry(name).or_insert(path);
            }
        }

        // Extract new and updated archives.
        let mut archive_names: Vec<_> = archives.keys().cloned().collect();
        archive_names.sort();
        for name in &archive_names {
            let path = &archives[name];
            if self.sync_archive(name, path, summary) && !directories.iter().any(|c| &c.name == name)
            {
                directories.push(Candidate {
                    name: name.clone(),
                    dir: dir.join(name),
                });
            }
        }

        // Extracted directories whose archive disappeared.
        directories.retain(|candidate| {
            if archives.contains_key(&candidate.name) || !archive::is_extracted(&candidate.dir) {
                return true;
            }
            self.unload_locked(&candidate.name, &mut summary.unloaded);
            match fs::remove_dir_all(&candidate.dir) {
                Ok(()) => info!(plugin = %candidate.name, "Removed plugin whose archive was deleted"),
                Err(e) => warn!(plugin = %candidate.name, error = %e, "Failed to remove plugin directory"),
            }
            false
        });

        for dev_dir in &self.inner.config.dev_directories {
            let Some(name) = dev_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if dev_dir.is_dir() && !directories.iter().any(|c| c.name == name) {
                directories.push(Candidate {
                    name: name.to_string(),
                    dir: dev_dir.clone(),
                });
            }
        }

        self.load_candidates(directories, summary);
        // Forget failures of candidates that are gone.
        self.inner
            .state
            .lock()
            .failed
            .retain(|dir, _| dir.is_dir());
        Ok(())
    }

    /// Brings the extracted directory of one archive up to date. Returns
    /// whether the directory exists afterwards.
    fn sync_archive(&self, name: &str, path: &Path, summary: &mut ScanSummary) -> bool {
        let dest = self.inner.directory.join(name);
        let needs_extract = if !dest.exists() {
            true
        } else {
            match archive::is_stale(path, &dest) {
                Ok(stale) => stale,
                Err(e) => {
                    warn!(plugin = name, error = %e, "Cannot compare plugin archive with its directory");
                    false
                }
            }
        };
        if !needs_extract {
            return true;
        }

        match archive::contains_manifest(path) {
            Ok(true) => {}
            Ok(false) => {
                trace!(archive = %path.display(), "Archive has no plugin manifest, ignoring");
                return dest.exists();
            }
            Err(e) => {
                warn!(archive = %path.display(), error = %e, "Unreadable plugin archive");
                summary.failed.push(name.to_string());
                return dest.exists();
            }
        }

        if dest.exists() {
            info!(plugin = name, "Plugin archive changed, reloading");
            self.unload_locked(name, &mut summary.unloaded);
        }

        match archive::extract(path, &dest) {
            Ok(()) => {
                info!(plugin = name, archive = %path.display(), "Extracted plugin archive");
                self.inner.state.lock().failed.remove(&dest);
                summary.extracted.push(name.to_string());
                true
            }
            Err(e) => {
                warn!(plugin = name, error = %e, "Failed to extract plugin archive");
                summary.failed.push(name.to_string());
                dest.exists()
            }
        }
    }

    fn load_candidates(&self, mut candidates: Vec<Candidate>, summary: &mut ScanSummary) {
        let bootstrap = self.inner.config.bootstrap.as_str();
        candidates.sort_by(|a, b| {
            (a.name != bootstrap)
                .cmp(&(b.name != bootstrap))
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.name.cmp(&b.name))
        });

        if self.inner.container.is_setup_mode() {
            candidates.retain(|c| c.name == bootstrap);
        }

        let on_disk: HashSet<String> = candidates.iter().map(|c| c.name.clone()).collect();
        let mut pending: Vec<Candidate> = {
            let state = self.inner.state.lock();
            candidates
                .into_iter()
                .filter(|c| !state.plugins.contains_key(&c.name))
                .filter(|c| match state.failed.get(&c.dir) {
                    Some(stamp) => *stamp != manifest_stamp(&c.dir),
                    None => true,
                })
                .collect()
        };

        // Children whose parent loads later in the same scan are retried
        // until a pass makes no progress.
        loop {
            let mut progress = false;
            let mut deferred = Vec::new();
            for candidate in pending {
                match self.load_plugin(&candidate, &on_disk) {
                    Ok(LoadOutcome::Loaded) => {
                        progress = true;
                        summary.loaded.push(candidate.name);
                    }
                    Ok(LoadOutcome::Deferred) => deferred.push(candidate),
                    Err(e) => {
                        warn!(plugin = %candidate.name, error = %e, "Failed to load plugin");
                        self.inner
                            .state
                            .lock()
                            .failed
                            .insert(candidate.dir.clone(), manifest_stamp(&candidate.dir));
                        summary.failed.push(candidate.name);
                    }
                }
            }
            pending = deferred;
            if !progress || pending.is_empty() {
                break;
            }
        }

        for candidate in pending {
            debug!(plugin = %candidate.name, "Parent plugin not loaded yet, deferring");
            summary.deferred.push(candidate.name);
        }
    }

    fn load_plugin(&self, candidate: &Candidate, on_disk: &HashSet<String>) -> PluginResult<LoadOutcome> {
        let name = candidate.name.as_str();
        let span = info_span!("plugin_load", plugin = name);
        let _enter = span.enter();

        let manifest = PluginManifest::load(&candidate.dir)?;
        if !manifest.supports_server(&self.inner.server_version) {
            return Err(PluginError::VersionTooOld {
                plugin: name.to_string(),
                required: manifest.min_server_version.clone().unwrap_or_default(),
                running: self.inner.server_version.clone(),
            });
        }

        let loader = match manifest.parent_plugin.as_deref() {
            Some(parent) => {
                let parent_loader = self
                    .inner
                    .state
                    .lock()
                    .plugins
                    .get(parent)
                    .map(|p| p.loader.clone());
                match parent_loader {
                    Some(parent_loader) => PluginClassLoader::with_parent(name, parent_loader),
                    None if on_disk.contains(parent) && parent != name => {
                        return Ok(LoadOutcome::Deferred);
                    }
                    None => {
                        return Err(PluginError::ParentMissing {
                            plugin: name.to_string(),
                            parent: parent.to_string(),
                        });
                    }
                }
            }
            None => PluginClassLoader::new(name, self.inner.catalog.clone()),
        };
        let loader = Arc::new(loader);

        let result = self.instantiate(name, candidate, &manifest, &loader);
        let (instance, info) = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                loader.destroy();
                return Err(e);
            }
        };

        {
            let mut state = self.inner.state.lock();
            if let Some(parent) = &manifest.parent_plugin
                && let Some(p) = state.plugins.get_mut(parent)
            {
                p.children.push(name.to_string());
            }
            state.failed.remove(&candidate.dir);
            state.order.push(name.to_string());
            state.plugins.insert(
                name.to_string(),
                LoadedPlugin {
                    info: info.clone(),
                    directory: candidate.dir.clone(),
                    instance,
                    loader,
                    parent: manifest.parent_plugin.clone(),
                    children: Vec::new(),
                },
            );
        }

        info!(
            plugin = name,
            class = %manifest.class,
            version = info.version.as_deref().unwrap_or("-"),
            "Loaded plugin"
        );
        self.fire(|l| l.plugin_created(name, &info));
        Ok(LoadOutcome::Loaded)
    }

    fn instantiate(
        &self,
        name: &str,
        candidate: &Candidate,
        manifest: &PluginManifest,
        loader: &PluginClassLoader,
    ) -> PluginResult<(PluginInstance, PluginInfo)> {
        loader.add_directory(&candidate.dir)?;
        let create = loader.load_class(&manifest.class)?;
        let instance = guarded(&manifest.class, || Ok(create()))?;
        drop(create);
        let info = manifest.info(name);

        let activated = guarded(&manifest.class, || match &instance {
            PluginInstance::Module(module) => {
                module.initialize(&self.inner.container)?;
                module.start()?;
                Ok(())
            }
            PluginInstance::Plugin(plugin) => {
                let context = PluginContext {
                    info: info.clone(),
                    directory: candidate.dir.clone(),
                    container: self.inner.container.clone(),
                };
                plugin.initialize(&context)?;
                Ok(())
            }
        });
        if let Err(e) = activated {
            deactivate(name, &instance);
            return Err(e);
        }
        Ok((instance, info))
    }

    // =========================================================================
    // Unloading
    // =========================================================================

    /// Unloads a plugin and its children. Returns whether it was loaded.
    pub fn unload_plugin(&self, name: &str) -> bool {
        let _scan = self.inner.scan_lock.lock();
        let mut unloaded = Vec::new();
        self.unload_locked(name, &mut unloaded)
    }

    fn unload_locked(&self, name: &str, unloaded: &mut Vec<String>) -> bool {
        let entry = {
            let mut state = self.inner.state.lock();
            let Some(entry) = state.plugins.remove(name) else {
                return false;
            };
            state.order.retain(|n| n != name);
            if let Some(parent) = &entry.parent
                && let Some(p) = state.plugins.get_mut(parent)
            {
                p.children.retain(|c| c != name);
            }
            entry
        };

        for child in entry.children.iter().rev() {
            debug!(plugin = name, child = %child, "Unloading child plugin");
            self.unload_locked(child, unloaded);
        }

        let LoadedPlugin {
            info,
            instance,
            loader,
            ..
        } = entry;
        deactivate(name, &instance);
        // The object drops before its loader releases the libraries.
        drop(instance);
        loader.destroy();

        info!(plugin = name, "Unloaded plugin");
        unloaded.push(name.to_string());
        self.fire(|l| l.plugin_destroyed(name, &info));
        true
    }

    fn fire(&self, f: impl Fn(&dyn PluginListener)) {
        let listeners = self.inner.listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }
}

/// Handle held by the monitor task so it does not keep the manager alive.
#[derive(Clone)]
pub(crate) struct WeakPluginManager(Weak<Inner>);

impl WeakPluginManager {
    pub(crate) fn upgrade(&self) -> Option<PluginManager> {
        self.0.upgrade().map(|inner| PluginManager { inner })
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("directory", &self.inner.directory)
            .field("plugins", &self.plugins())
            .finish()
    }
}

/// Runs plugin code, turning a panic into an instantiation error.
fn guarded<T>(class: &str, f: impl FnOnce() -> PluginResult<T>) -> PluginResult<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
        Err(PluginError::Instantiation {
            class: class.to_string(),
            reason: panic_message(panic.as_ref()),
        })
    })
}

/// Stops and destroys an instance, logging failures and panics.
fn deactivate(name: &str, instance: &PluginInstance) {
    let steps: Vec<(&str, Box<dyn FnOnce() -> ModuleResult<()> + '_>)> = match instance {
        PluginInstance::Module(module) => vec![
            ("stop", Box::new(|| module.stop())),
            ("destroy", Box::new(|| module.destroy())),
        ],
        PluginInstance::Plugin(plugin) => vec![("destroy", Box::new(|| plugin.destroy()))],
    };
    for (step, run) in steps {
        match catch_unwind(AssertUnwindSafe(run)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(plugin = name, step, error = %e, "Plugin cleanup failed"),
            Err(panic) => error!(
                plugin = name,
                step,
                panic = %panic_message(panic.as_ref()),
                "Plugin panicked during cleanup"
            ),
        }
    }
}

fn manifest_stamp(dir: &Path) -> Option<SystemTime> {
    fs::metadata(dir.join(MANIFEST_FILE))
        .and_then(|m| m.modified())
        .ok()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::ServiceLookup;
    use switchboard_framework::{Module, ModuleError, ModuleResult, Plugin};

    struct Quiet(&'static str);

    impl Module for Quiet {
        fn name(&self) -> &str {
            self.0
        }
        fn initialize(&self, _: &Container) -> ModuleResult<()> {
            Ok(())
        }
        fn start(&self) -> ModuleResult<()> {
            Ok(())
        }
        fn stop(&self) -> ModuleResult<()> {
            Ok(())
        }
    }

    /// Panics on start.
    struct Fragile;

    impl Module for Fragile {
        fn name(&self) -> &str {
            "fragile"
        }
        fn initialize(&self, _: &Container) -> ModuleResult<()> {
            Ok(())
        }
        fn start(&self) -> ModuleResult<()> {
            panic!("start exploded")
        }
        fn stop(&self) -> ModuleResult<()> {
            Err(ModuleError::failed("never started"))
        }
    }

    struct Motd;

    impl Plugin for Motd {
        fn initialize(&self, context: &PluginContext) -> ModuleResult<()> {
            assert!(context.directory.join(MANIFEST_FILE).exists());
            Ok(())
        }
    }

    fn manager(dir: &Path) -> PluginManager {
        let mut catalog = PluginCatalog::new();
        catalog.register("quiet", || PluginInstance::Module(Arc::new(Quiet("quiet"))));
        catalog.register("motd", || PluginInstance::Plugin(Arc::new(Motd)));
        catalog.register("boom", || panic!("constructor exploded"));
        catalog.register("fragile", || PluginInstance::Module(Arc::new(Fragile)));
        let container = Container::builder(ServiceLookup::new()).build();
        PluginManager::builder(container, dir).catalog(catalog).build()
    }

    fn plugin_dir(root: &Path, name: &str, manifest: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
    }

    #[test]
    fn test_bootstrap_loads_first() {
        let root = tempfile::tempdir().unwrap();
        plugin_dir(root.path(), "Zeta", "class = \"quiet\"");
        plugin_dir(root.path(), "admin", "class = \"quiet\"");
        plugin_dir(root.path(), "beta", "class = \"motd\"");

        let summary = manager(root.path()).scan();
        assert_eq!(summary.loaded, vec!["admin", "beta", "Zeta"]);
    }

    #[test]
    fn test_panicking_constructor_is_isolated() {
        let root = tempfile::tempdir().unwrap();
        plugin_dir(root.path(), "bad", "class = \"boom\"");
        plugin_dir(root.path(), "good", "class = \"quiet\"");

        let manager = manager(root.path());
        let summary = manager.scan();
        assert_eq!(summary.failed, vec!["bad"]);
        assert_eq!(summary.loaded, vec!["good"]);

        // Not retried while the manifest is unchanged.
        assert!(manager.scan().is_empty());
    }

    #[test]
    fn test_unload_and_rescan() {
        let root = tempfile::tempdir().unwrap();
        plugin_dir(root.path(), "search", "class = \"quiet\"\nname = \"Search\"");

        let manager = manager(root.path());
        manager.scan();
        assert_eq!(manager.plugin_info("search").unwrap().name, "Search");
        assert!(manager.is_executed());

        assert!(manager.unload_plugin("search"));
        assert!(!manager.unload_plugin("search"));
        assert!(!manager.is_loaded("search"));

        assert_eq!(manager.scan().loaded, vec!["search"]);
    }

    #[test]
    fn test_install_rejects_paths() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager(root.path());
        assert!(manager.install_plugin(&b""[..], "../evil.zip").is_err());
        assert!(manager.install_plugin(&b""[..], "notes.txt").is_err());
    }

    #[test]
    fn test_shutdown_stops_scanning() {
        let root = tempfile::tempdir().unwrap();
        plugin_dir(root.path(), "search", "class = \"quiet\"");
        let manager = manager(root.path());
        manager.scan();
        manager.shutdown();
        assert!(manager.plugins().is_empty());
        assert!(manager.scan().is_empty());
    }

    #[test]
    fn test_panicking_start_skips_only_that_plugin() {
        let root = tempfile::tempdir().unwrap();
        plugin_dir(root.path(), "alpha", "class = \"fragile\"");
        plugin_dir(root.path(), "zeta", "class = \"quiet\"");

        let manager = manager(root.path());
        let summary = manager.scan();
        assert_eq!(summary.failed, vec!["alpha"]);
        assert_eq!(summary.loaded, vec!["zeta"]);
        assert!(manager.is_executed());
        assert!(!manager.is_loaded("alpha"));

        assert!(manager.scan().is_empty());
    }

    #[test]
    fn test_failures_of_removed_directories_are_forgotten() {
        let root = tempfile::tempdir().unwrap();
        plugin_dir(root.path(), "bad", "class = \"boom\"");

        let manager = manager(root.path());
        assert_eq!(manager.scan().failed, vec!["bad"]);
        assert_eq!(manager.inner.state.lock().failed.len(), 1);

        fs::remove_dir_all(root.path().join("bad")).unwrap();
        assert!(manager.scan().is_empty());
        assert!(manager.inner.state.lock().failed.is_empty());
    }
}
