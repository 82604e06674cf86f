//! Transition events and listeners.

use bitflags::bitflags;

use crate::error::NotifyError;
use crate::id::ServiceId;
use crate::item::ServiceItem;

bitflags! {
    /// Kinds of match-state change a subscription can ask for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Transitions: u8 {
        /// The item matched before the mutation and no longer does.
        const MATCH_NOMATCH = 1 << 0;
        /// The item did not match before the mutation and now does.
        const NOMATCH_MATCH = 1 << 1;
        /// The item matched before and after; its attributes changed.
        const MATCH_MATCH = 1 << 2;
    }
}

/// Notification delivered to a subscription.
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    /// Exactly one transition bit.
    pub transition: Transitions,
    pub service_id: ServiceId,
    /// The item after the mutation, or the last known state when the
    /// item was cancelled.
    pub item: ServiceItem,
    /// Strictly increasing per registry; gaps are allowed.
    pub sequence_number: u64,
    /// The subscription this event was delivered for.
    pub event_id: u64,
}

impl ServiceEvent {
    /// Returns `true` if the item left the subscription's match set.
    pub fn is_removal(&self) -> bool {
        self.transition == Transitions::MATCH_NOMATCH
    }
}

/// Receives events for one subscription.
///
/// Listeners run synchronously on the mutating thread and must not block.
/// Returning [`NotifyError::UnknownEvent`] cancels the subscription.
pub trait ServiceEventListener: Send + Sync {
    fn notify(&self, event: &ServiceEvent) -> Result<(), NotifyError>;
}

impl<F> ServiceEventListener for F
where
    F: Fn(&ServiceEvent) -> Result<(), NotifyError> + Send + Sync,
{
    fn notify(&self, event: &ServiceEvent) -> Result<(), NotifyError> {
        self(event)
    }
}
