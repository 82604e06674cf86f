//! Error types for modules and the container.

use switchboard_core::LookupError;
use thiserror::Error;

use crate::container::Permissions;
use crate::module::ModuleState;

/// Errors raised by [`Module`](crate::Module) lifecycle calls.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The call is not valid in the module's current state.
    #[error("module '{module}' cannot {operation} while {state:?}")]
    IllegalState {
        module: String,
        state: ModuleState,
        operation: &'static str,
    },

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    /// A discovered dependency could not be delivered to its slot.
    #[error("cannot wire dependency '{slot}': {reason}")]
    Wiring { slot: String, reason: String },

    /// Module-specific failure.
    #[error("{0}")]
    Failed(String),
}

impl ModuleError {
    /// Creates a module-specific failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Result type for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Errors raised by [`Container`](crate::Container) operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The container handle was not granted the required permission.
    #[error("unauthorized: missing {0:?}")]
    Unauthorized(Permissions),

    /// No registered service or implementation provides the capability.
    #[error("no implementation available for {0}")]
    NoImplementation(&'static str),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;
