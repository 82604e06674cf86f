//! Add/remove callbacks on top of registry subscriptions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::capability::Capability;
use crate::error::NotifyError;
use crate::event::{ServiceEvent, Transitions};
use crate::item::{ServiceItem, ServiceTemplate};
use crate::lookup::{EventRegistration, ServiceLookup};

/// Receives tracked services as they appear and disappear.
///
/// `add_service` may be called more than once for the same item when it is
/// registered while the tracker is starting up; implementations must
/// tolerate repeats.
pub trait TrackerCallback: Send + Sync {
    fn add_service(&self, capability: Capability, item: &ServiceItem);
    fn remove_service(&self, capability: Capability, item: &ServiceItem);
}

/// Tracks every registered service exposing one of a set of capabilities.
pub struct ServiceTracker {
    registrations: Mutex<Vec<EventRegistration>>,
    active: Arc<AtomicBool>,
}

impl ServiceTracker {
    /// Subscribes to `capabilities` and replays the services already present.
    ///
    /// Subscriptions are installed before the registry is enumerated so no
    /// concurrent registration falls between the two steps.
    pub fn new(
        lookup: &ServiceLookup,
        capabilities: &[Capability],
        callback: Arc<dyn TrackerCallback>,
    ) -> Self {
        let active = Arc::new(AtomicBool::new(true));

        let registrations: Vec<_> = capabilities
            .iter()
            .map(|&capability| {
                let callback = Arc::clone(&callback);
                let active = Arc::clone(&active);
                lookup.notify(
                    ServiceTemplate::any().with_type(capability),
                    Transitions::MATCH_NOMATCH | Transitions::NOMATCH_MATCH,
                    move |event: &ServiceEvent| -> Result<(), NotifyError> {
                        if !active.load(Ordering::Acquire) {
                            return Err(NotifyError::UnknownEvent);
                        }
                        if event.is_removal() {
                            callback.remove_service(capability, &event.item);
                        } else {
                            callback.add_service(capability, &event.item);
                        }
                        Ok(())
                    },
                )
            })
            .collect();

        for &capability in capabilities {
            let present = lookup.lookup_with_max(&ServiceTemplate::any().with_type(capability), usize::MAX);
            trace!(capability = capability.name(), count = present.total_matches, "Replaying present services");
            for item in &present.items {
                callback.add_service(capability, item);
            }
        }

        debug!(capabilities = capabilities.len(), "Service tracker started");
        Self {
            registrations: Mutex::new(registrations),
            active,
        }
    }

    /// Tears down every subscription. Further calls do nothing.
    pub fn cancel(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        for registration in self.registrations.lock().drain(..) {
            registration.cancel();
        }
        debug!("Service tracker cancelled");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}
