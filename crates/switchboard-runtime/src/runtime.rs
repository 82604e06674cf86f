//! Server orchestration.
//!
//! ```rust,ignore
//! use switchboard_runtime::SwitchboardRuntime;
//!
//! #[tokio::main]
//! async fn main() -> switchboard_runtime::RuntimeResult<()> {
//!     let runtime = SwitchboardRuntime::builder()
//!         .config_file("switchboard.toml")
//!         .build()?;
//!     runtime.run().await
//! }
//! ```
//!
//! One *session* is a registry, the container around it and the plugin
//! manager watching the plugin directory. `run` starts a session, waits for
//! Ctrl+C, SIGTERM or [`Container::stop`], and tears the session down. When
//! a module calls [`Container::restart`] on a restartable host, a fresh
//! session is started in its place.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use switchboard_core::ServiceLookup;
use switchboard_framework::{Container, ContainerBuilder};
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::catalog::PluginCatalog;
use crate::config::{ConfigLoader, SwitchboardConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::manager::PluginManager;

type ContainerHook = Arc<dyn Fn(ContainerBuilder) -> ContainerBuilder + Send + Sync>;

struct Session {
    lookup: ServiceLookup,
    container: Container,
    manager: PluginManager,
}

impl Session {
    /// Blocking: runs every plugin's `stop`/`destroy`.
    fn stop(&self) {
        self.manager.shutdown();
        self.container.stop_all_services();
        debug!(
            registry_id = %self.lookup.registry_id(),
            remaining = self.lookup.len(),
            "Session stopped"
        );
    }
}

/// The Switchboard server.
pub struct SwitchboardRuntime {
    config: SwitchboardConfig,
    catalog: PluginCatalog,
    container_hooks: Vec<ContainerHook>,
    session: Mutex<Option<Arc<Session>>>,
}

impl Default for SwitchboardRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchboardRuntime {
    /// Loads `switchboard.toml` from the usual places, falling back to
    /// defaults when it cannot be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config ({e}), using defaults");
            SwitchboardConfig::default()
        });
        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime and initializes logging from `config`.
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            home = %config.server.home.display(),
            plugin_dir = %config.plugins.directory.display(),
            setup_mode = config.server.setup_mode,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            catalog: PluginCatalog::collect_all(),
            container_hooks: Vec::new(),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    /// Replaces the plugin class catalog.
    pub fn with_catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Adjusts every container this runtime builds, e.g. to register
    /// service implementations for `Container::start_service`.
    pub fn configure_container(
        mut self,
        hook: impl Fn(ContainerBuilder) -> ContainerBuilder + Send + Sync + 'static,
    ) -> Self {
        self.container_hooks.push(Arc::new(hook));
        self
    }

    /// The plugin directory, resolved against `server.home`.
    pub fn plugin_directory(&self) -> PathBuf {
        resolve(&self.config.server.home, &self.config.plugins.directory)
    }

    pub fn container(&self) -> Option<Container> {
        self.session.lock().as_ref().map(|s| s.container.clone())
    }

    pub fn service_lookup(&self) -> Option<ServiceLookup> {
        self.session.lock().as_ref().map(|s| s.lookup.clone())
    }

    pub fn plugin_manager(&self) -> Option<PluginManager> {
        self.session.lock().as_ref().map(|s| s.manager.clone())
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Starts a session: registry, container and plugin monitor.
    pub fn start(&self) -> RuntimeResult<()> {
        let mut current = self.session.lock();
        if current.is_some() {
            return Err(RuntimeError::State("runtime is already running"));
        }

        let lookup = ServiceLookup::new();
        let mut builder =
            Container::builder(lookup.clone()).environment(self.config.server.environment());
        for hook in &self.container_hooks {
            builder = hook(builder);
        }
        let container = builder.build();

        let mut plugins = self.config.plugins.clone();
        plugins.dev_directories = plugins
            .dev_directories
            .iter()
            .map(|d| resolve(&self.config.server.home, d))
            .collect();

        let manager = PluginManager::builder(container.clone(), self.plugin_directory())
            .config(plugins)
            .server_version(self.config.server.version.clone())
            .catalog(self.catalog.clone())
            .build();
        manager.start()?;

        info!(
            registry_id = %lookup.registry_id(),
            plugin_dir = %manager.directory().display(),
            "Switchboard started"
        );
        *current = Some(Arc::new(Session {
            lookup,
            container,
            manager,
        }));
        Ok(())
    }

    /// Stops the current session, if any.
    pub async fn stop(&self) -> RuntimeResult<()> {
        let session = self.session.lock().take();
        let Some(session) = session else {
            warn!("Runtime is not running");
            return Ok(());
        };
        info!("Stopping Switchboard");
        if let Err(e) = tokio::task::spawn_blocking(move || session.stop()).await {
            error!(error = %e, "Session shutdown panicked");
        }
        info!("Switchboard stopped");
        Ok(())
    }

    /// Runs until Ctrl+C, SIGTERM or `Container::stop`.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Switchboard is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` resolves or a module stops the container.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            self.start()?;
            let Some(container) = self.container() else {
                return Err(RuntimeError::State("session vanished after start"));
            };
            let token = container.shutdown_token();

            let restart = tokio::select! {
                _ = &mut shutdown => false,
                _ = token.cancelled() => container.take_restart_request(),
            };

            self.stop().await?;
            if !restart {
                return Ok(());
            }
            info!("Restarting Switchboard");
        }
    }
}

/// Builder for a [`SwitchboardRuntime`] with custom configuration sources.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    catalog: Option<PluginCatalog>,
    container_hooks: Vec<ContainerHook>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            catalog: None,
            container_hooks: Vec::new(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn configure_container(
        mut self,
        hook: impl Fn(ContainerBuilder) -> ContainerBuilder + Send + Sync + 'static,
    ) -> Self {
        self.container_hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> RuntimeResult<SwitchboardRuntime> {
        let config = self.config_loader.load()?;
        let mut runtime = SwitchboardRuntime::from_config(&config);
        if let Some(catalog) = self.catalog {
            runtime.catalog = catalog;
        }
        runtime.container_hooks = self.container_hooks;
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(home: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Cannot listen for Ctrl+C, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn runtime(home: &Path) -> SwitchboardRuntime {
        let mut config = SwitchboardConfig::default();
        config.server.home = home.to_path_buf();
        config.server.restartable = true;
        SwitchboardRuntime::from_config(&config).with_catalog(PluginCatalog::new())
    }

    #[test]
    fn test_plugin_directory_is_relative_to_home() {
        let home = tempfile::tempdir().unwrap();
        let runtime = runtime(home.path());
        assert_eq!(runtime.plugin_directory(), home.path().join("plugins"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_and_stop() {
        let home = tempfile::tempdir().unwrap();
        let runtime = runtime(home.path());

        runtime.start().unwrap();
        assert!(runtime.is_running());
        assert!(matches!(runtime.start(), Err(RuntimeError::State(_))));
        assert!(home.path().join("plugins").is_dir());

        runtime.stop().await.unwrap();
        assert!(!runtime.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_container_stop_ends_run() {
        let home = tempfile::tempdir().unwrap();
        let runtime = Arc::new(runtime(home.path()));

        let handle = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run_until(std::future::pending()).await }
        });

        let container = loop {
            if let Some(c) = runtime.container() {
                break c;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        container.stop().unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!runtime.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_builds_new_session() {
        let home = tempfile::tempdir().unwrap();
        let runtime = Arc::new(runtime(home.path()));

        let handle = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run_until(std::future::pending()).await }
        });

        let first = loop {
            if let Some(lookup) = runtime.service_lookup() {
                break lookup;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        runtime.container().unwrap().restart().unwrap();

        let second = loop {
            if let Some(lookup) = runtime.service_lookup()
                && lookup.registry_id() != first.registry_id()
            {
                break lookup;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert_ne!(first.registry_id(), second.registry_id());

        runtime.container().unwrap().stop().unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
