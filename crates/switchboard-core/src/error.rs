//! Error types for the service registry.

use thiserror::Error;

use crate::id::ServiceId;

/// Errors returned by [`ServiceLookup`](crate::ServiceLookup) operations.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    /// The registration was cancelled or never existed in this registry.
    #[error("unknown service: {0}")]
    UnknownService(ServiceId),

    /// A freshly minted ID collided with a live one.
    ///
    /// This is an invariant violation; the offending registration is
    /// rejected instead of overwriting the existing item.
    #[error("duplicate service id: {0}")]
    DuplicateServiceId(ServiceId),

    /// The registry was dropped while a handle still referenced it.
    #[error("service registry is no longer available")]
    RegistryClosed,

    /// The caller is not allowed to perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

/// Result type for registry operations.
pub type LookupResult<T> = Result<T, LookupError>;

/// Returned by a [`ServiceEventListener`](crate::ServiceEventListener).
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// The listener declines further events for this registration.
    ///
    /// The registry cancels the corresponding
    /// [`EventRegistration`](crate::EventRegistration) when it sees this.
    #[error("unknown event")]
    UnknownEvent,

    /// Delivery failed. The error is logged and delivery continues.
    #[error("{0}")]
    Failed(String),
}

impl NotifyError {
    /// Creates a failure with a message.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}
