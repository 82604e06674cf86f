//! Link-time catalog of plugin classes.
//!
//! A manifest names its implementation by class name. Classes compiled into
//! the host binary are collected through a `linkme` distributed slice that
//! the `#[export_module]` and `#[export_plugin]` attributes append to.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use linkme::distributed_slice;
use switchboard_framework::{Container, Module, ModuleResult, Plugin, PluginContext};
use tracing::warn;

/// A live plugin object.
#[derive(Clone)]
pub enum PluginInstance {
    /// Driven through `initialize(container)` and `start`.
    Module(Arc<dyn Module>),
    /// Driven through `initialize(context)`.
    Plugin(Arc<dyn Plugin>),
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(module) => f.debug_tuple("Module").field(&module.name()).finish(),
            Self::Plugin(_) => f.write_str("Plugin"),
        }
    }
}

impl PluginInstance {
    /// Ties `guard` to the object: the guard is dropped only after the last
    /// clone of the instance. Native plugin classes pin their library this way.
    pub fn pinned(self, guard: impl Send + Sync + 'static) -> Self {
        let guard: Arc<dyn Any + Send + Sync> = Arc::new(guard);
        match self {
            Self::Module(module) => Self::Module(Arc::new(PinnedModule {
                module,
                _guard: guard,
            })),
            Self::Plugin(plugin) => Self::Plugin(Arc::new(PinnedPlugin {
                plugin,
                _guard: guard,
            })),
        }
    }
}

// Fields drop in declaration order: the object before its guard.
struct PinnedModule {
    module: Arc<dyn Module>,
    _guard: Arc<dyn Any + Send + Sync>,
}

impl Module for PinnedModule {
    fn name(&self) -> &str {
        self.module.name()
    }

    fn initialize(&self, container: &Container) -> ModuleResult<()> {
        self.module.initialize(container)
    }

    fn start(&self) -> ModuleResult<()> {
        self.module.start()
    }

    fn stop(&self) -> ModuleResult<()> {
        self.module.stop()
    }

    fn destroy(&self) -> ModuleResult<()> {
        self.module.destroy()
    }
}

struct PinnedPlugin {
    plugin: Arc<dyn Plugin>,
    _guard: Arc<dyn Any + Send + Sync>,
}

impl Plugin for PinnedPlugin {
    fn initialize(&self, context: &PluginContext) -> ModuleResult<()> {
        self.plugin.initialize(context)
    }

    fn destroy(&self) -> ModuleResult<()> {
        self.plugin.destroy()
    }
}

/// A named constructor.
#[derive(Debug, Clone, Copy)]
pub struct PluginClass {
    pub name: &'static str,
    pub create: fn() -> PluginInstance,
}

/// Every class exported with `#[export_module]` or `#[export_plugin]`.
#[distributed_slice]
pub static PLUGIN_CLASSES: [PluginClass];

/// Shared class constructor.
pub type Factory = Arc<dyn Fn() -> PluginInstance + Send + Sync>;

/// Class name → constructor table.
///
/// The host catalog starts from [`PLUGIN_CLASSES`]; embedders and tests add
/// classes at runtime with [`PluginCatalog::register`].
#[derive(Clone, Default)]
pub struct PluginCatalog {
    classes: HashMap<String, Factory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of every class linked into the binary.
    pub fn collect_all() -> Self {
        let mut catalog = Self::new();
        for class in PLUGIN_CLASSES {
            if catalog.classes.contains_key(class.name) {
                warn!(class = class.name, "Duplicate plugin class, keeping the first");
                continue;
            }
            let create = class.create;
            catalog
                .classes
                .insert(class.name.to_string(), Arc::new(create));
        }
        catalog
    }

    /// Adds (or replaces) a class.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        create: impl Fn() -> PluginInstance + Send + Sync + 'static,
    ) -> &mut Self {
        self.classes.insert(name.into(), Arc::new(create));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub(crate) fn factory(&self, name: &str) -> Option<Factory> {
        self.classes.get(name).cloned()
    }

    /// Class names, sorted.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("classes", &self.class_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Noop;

    impl Module for Noop {
        fn name(&self) -> &str {
            "noop"
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

    #[distributed_slice(PLUGIN_CLASSES)]
    static NOOP_CLASS: PluginClass = PluginClass {
        name: "test.catalog.noop",
        create: || PluginInstance::Module(Arc::new(Noop)),
    };

    #[test]
    fn test_collect_all_sees_linked_classes() {
        let catalog = PluginCatalog::collect_all();
        assert!(catalog.contains("test.catalog.noop"));

        let create = catalog.factory("test.catalog.noop").unwrap();
        match create() {
            PluginInstance::Module(module) => assert_eq!(module.name(), "noop"),
            PluginInstance::Plugin(_) => panic!("expected a module"),
        }
    }

    #[test]
    fn test_register_adds_runtime_class() {
        let mut catalog = PluginCatalog::new();
        assert!(catalog.is_empty());
        catalog.register("b", || PluginInstance::Module(Arc::new(Noop)));
        catalog.register("a", || PluginInstance::Module(Arc::new(Noop)));
        assert_eq!(catalog.class_names(), vec!["a", "b"]);
        assert!(catalog.factory("missing").is_none());
    }

    type DropLog = Arc<Mutex<Vec<&'static str>>>;

    struct Tracked(DropLog, &'static str);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.lock().push(self.1);
        }
    }

    struct Held(#[allow(dead_code)] Tracked);

    impl Module for Held {
        fn name(&self) -> &str {
            "held"
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

    #[test]
    fn test_pinned_guard_outlives_every_clone() {
        let log = DropLog::default();
        let instance = PluginInstance::Module(Arc::new(Held(Tracked(log.clone(), "instance"))))
            .pinned(Tracked(log.clone(), "guard"));
        let copy = instance.clone();

        drop(instance);
        assert!(log.lock().is_empty());
        match &copy {
            PluginInstance::Module(module) => assert_eq!(module.name(), "held"),
            PluginInstance::Plugin(_) => panic!("expected a module"),
        }

        drop(copy);
        assert_eq!(*log.lock(), vec!["instance", "guard"]);
    }
}
