//! # Switchboard Framework
//!
//! Module and plugin contracts built on top of the Switchboard registry.
//!
//! - [`Module`]: the lifecycle every managed component implements
//! - [`ModuleBase`]: lifecycle bookkeeping, self-publishing and dependency
//!   wiring through [`TrackInfo`] and typed slots ([`Dependency`],
//!   [`Dependencies`], [`Injector`])
//! - [`Container`]: registry access, host environment and lifecycle control,
//!   gated by [`Permissions`]
//! - [`Plugin`]: installable units that are not modules
//!
//! ## Lifecycle
//!
//! ```text
//! plugin manager            module                     registry
//!      │  initialize(container) │                          │
//!      │───────────────────────▶│  subscribe dependencies  │
//!      │                        │─────────────────────────▶│
//!      │        start()         │  register own services   │
//!      │───────────────────────▶│─────────────────────────▶│
//!      │        stop()          │  cancel everything       │
//!      │───────────────────────▶│─────────────────────────▶│
//! ```

pub mod base;
pub mod container;
pub mod error;
pub mod module;
pub mod plugin;
pub mod slot;

pub use base::{ModuleBase, ModuleBaseBuilder, SlotOf, TrackInfo};
pub use container::{Container, ContainerBuilder, Environment, ModuleContext, Permissions};
pub use error::{ContainerError, ContainerResult, ModuleError, ModuleResult};
pub use module::{Module, ModuleState};
pub use plugin::{Plugin, PluginContext, PluginInfo};
pub use slot::{Dependencies, Dependency, FnInjector, Injector};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        Container, Dependencies, Dependency, Module, ModuleBase, ModuleError, ModuleResult,
        Plugin, PluginContext, TrackInfo,
    };
}
