use std::sync::Arc;

use switchboard_framework::{Container, Module, ModuleResult, Plugin, PluginContext};
use switchboard_macros::{export_module, export_plugin};
use switchboard_runtime::{PluginCatalog, PluginClassLoader, PluginInstance};

struct Greeter;

impl Module for Greeter {
    fn name(&self) -> &str {
        "greeter"
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

struct Banner;

impl Plugin for Banner {
    fn initialize(&self, _: &PluginContext) -> ModuleResult<()> {
        Ok(())
    }
}

#[export_module("test.export.greeter")]
fn greeter() -> Arc<Greeter> {
    Arc::new(Greeter)
}

#[export_plugin("test.export.banner")]
fn banner() -> Arc<Banner> {
    Arc::new(Banner)
}

#[test]
fn exported_classes_reach_the_catalog() {
    let catalog = PluginCatalog::collect_all();
    assert!(catalog.contains("test.export.greeter"));
    assert!(catalog.contains("test.export.banner"));

    let loader = PluginClassLoader::new("greeter", Arc::new(catalog));
    let create = loader.load_class("test.export.greeter").unwrap();
    match create() {
        PluginInstance::Module(module) => assert_eq!(module.name(), "greeter"),
        PluginInstance::Plugin(_) => panic!("expected a module"),
    }

    let create = loader.load_class("test.export.banner").unwrap();
    assert!(matches!(create(), PluginInstance::Plugin(_)));
}
