//! The module contract.

use crate::container::Container;
use crate::error::ModuleResult;

/// Lifecycle state of a module.
///
/// ```text
/// Constructed ──initialize──▶ Initialized ──start──▶ Started
///                                 ▲                     │
///                                 └──initialize── Stopped ◀──stop──┘
///                                                   │
///                                                destroy
///                                                   ▼
///                                               Destroyed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    Constructed,
    Initialized,
    Started,
    Stopped,
    Destroyed,
}

/// A managed server component.
///
/// All methods take `&self`: modules are shared behind `Arc` between the
/// plugin manager and the registry, so implementations keep their mutable
/// state behind locks.
pub trait Module: Send + Sync {
    /// Module name, unique within the server.
    fn name(&self) -> &str;

    /// Binds the module to the container. Called before `start` and again
    /// when a stopped module is reconfigured.
    fn initialize(&self, container: &Container) -> ModuleResult<()>;

    /// Publishes the module's services. Must return promptly; long-running
    /// work belongs on the module's own tasks.
    fn start(&self) -> ModuleResult<()>;

    /// Withdraws everything the module published. Calling `stop` on a module
    /// that is not running does nothing.
    fn stop(&self) -> ModuleResult<()>;

    /// Releases remaining resources.
    fn destroy(&self) -> ModuleResult<()> {
        Ok(())
    }
}
