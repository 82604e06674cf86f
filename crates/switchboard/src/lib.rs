//! # Switchboard
//!
//! An in-process service registry with typed module wiring and hot-deployed
//! plugins.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────┐     ┌──────────────────────────────┐
//! │ PluginManager│────▶│ Container │────▶│ ServiceLookup (registry)     │
//! │ (plugins/)   │     │ (facade)  │     │  items, templates, trackers  │
//! └──────────────┘     └───────────┘     └──────────────────────────────┘
//!        │                                          ▲
//!        └──── Module / Plugin instances ───────────┘
//! ```
//!
//! - **Registry**: services published under capabilities and attributes,
//!   found by template, watched through transition events
//! - **Modules**: [`ModuleBase`](framework::ModuleBase) publishes services on
//!   start and wires dependencies into typed slots
//! - **Container**: environment, lifecycle and permission-checked registry
//!   access handed to modules
//! - **Plugins**: directories and archives under `plugins/`, loaded
//!   bootstrap-first and reloaded when their archive changes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! #[export_module("org.example.clock")]
//! fn clock() -> Arc<ModuleBase> {
//!     Arc::new(ModuleBase::builder("clock").build())
//! }
//!
//! #[tokio::main]
//! async fn main() -> RuntimeResult<()> {
//!     SwitchboardRuntime::new().run().await
//! }
//! ```
//!
//! Crates using the export attributes also depend on `switchboard-runtime`
//! directly, since the generated statics name it.
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output
//! - `native-plugins`: plugin classes from dynamic libraries

pub use switchboard_core as core;
pub use switchboard_framework as framework;
pub use switchboard_macros::{export_module, export_plugin};
pub use switchboard_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use switchboard::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use switchboard_runtime::{RuntimeError, RuntimeResult, SwitchboardRuntime};

    // Plugin catalog
    pub use switchboard_macros::{export_module, export_plugin};
    pub use switchboard_runtime::{PluginCatalog, PluginInstance, PluginListener, PluginManager};

    // Modules and wiring
    pub use switchboard_framework::{
        Container, Dependencies, Dependency, Environment, Module, ModuleBase, ModuleError,
        ModuleResult, Plugin, PluginContext, PluginInfo, TrackInfo,
    };

    // Registry
    pub use switchboard_core::{
        Entry, Name, ServiceItem, ServiceLookup, ServiceObject, ServiceTemplate, ServiceTracker,
        TrackerCallback,
    };
}
