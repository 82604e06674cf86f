//! The service registry.
//!
//! [`ServiceLookup`] stores [`ServiceItem`]s, answers template queries and
//! notifies subscriptions about match-state transitions.
//!
//! # Event delivery
//!
//! Every mutation classifies the change against each live subscription while
//! holding the state lock, using a per-subscription index of the item IDs it
//! currently matches. The resulting events are numbered and appended to a
//! single delivery queue before the lock is released, so queue order equals
//! sequence order.
//!
//! The queue is drained under a re-entrant delivery lock by the mutating
//! thread before the mutation returns. A thread that mutates while another
//! drain is in progress waits for that drain, which delivers its events too.
//! A listener that mutates the registry from inside a callback does not
//! deadlock: its events are appended to the queue and delivered by the drain
//! that is already running, after the current event.

use std::cell::Cell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, error, trace, warn};

use crate::capability::{Capability, ServiceObject};
use crate::entry::Entry;
use crate::error::{LookupError, LookupResult, NotifyError};
use crate::event::{ServiceEvent, ServiceEventListener, Transitions};
use crate::id::ServiceId;
use crate::item::{ServiceItem, ServiceTemplate};

// =============================================================================
// Internal state
// =============================================================================

struct Subscription {
    template: ServiceTemplate,
    mask: Transitions,
    listener: Arc<dyn ServiceEventListener>,
    /// IDs of the items this subscription's template currently matches.
    matched: HashSet<ServiceId>,
}

#[derive(Default)]
struct State {
    items: HashMap<ServiceId, ServiceItem>,
    subscriptions: HashMap<u64, Subscription>,
    next_event_id: u64,
    sequence: u64,
}

struct Pending {
    listener: Arc<dyn ServiceEventListener>,
    event: ServiceEvent,
}

struct Shared {
    registry_id: ServiceId,
    state: RwLock<State>,
    queue: Mutex<VecDeque<Pending>>,
    /// Held while draining; the flag marks a drain already in progress on
    /// this thread.
    delivery: ReentrantMutex<Cell<bool>>,
}

/// Clears the draining flag even if a listener panics.
struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

// =============================================================================
// ServiceLookup
// =============================================================================

/// Result of a bounded lookup.
#[derive(Debug, Clone)]
pub struct ServiceMatches {
    /// At most `max_matches` items.
    pub items: Vec<ServiceItem>,
    /// Number of items matching the template, regardless of the bound.
    pub total_matches: usize,
}

/// In-process service registry.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct ServiceLookup {
    shared: Arc<Shared>,
}

impl Default for ServiceLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("ServiceLookup")
            .field("registry_id", &self.shared.registry_id)
            .field("items", &state.items.len())
            .field("subscriptions", &state.subscriptions.len())
            .finish()
    }
}

impl ServiceLookup {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                registry_id: ServiceId::generate(),
                state: RwLock::new(State::default()),
                queue: Mutex::new(VecDeque::new()),
                delivery: ReentrantMutex::new(Cell::new(false)),
            }),
        }
    }

    /// Identity of this registry, used as the source of its events.
    pub fn registry_id(&self) -> &ServiceId {
        &self.shared.registry_id
    }

    // ─── Mutation ───────────────────────────────────────────────────────────

    /// Publishes `item`.
    ///
    /// An item without an ID gets a fresh one. An item carrying an ID
    /// replaces whatever is registered under it.
    pub fn register(&self, mut item: ServiceItem) -> LookupResult<ServiceRegistration> {
        let mut state = self.shared.state.write();
        let id = match item.service_id.clone() {
            Some(id) => id,
            None => {
                let id = ServiceId::generate();
                if state.items.contains_key(&id) {
                    error!(service_id = %id, "Generated service id collides with a live registration");
                    return Err(LookupError::DuplicateServiceId(id));
                }
                item.service_id = Some(id.clone());
                id
            }
        };
        debug!(
            service_id = %id,
            service = item.service.primary().name(),
            attributes = item.attributes.len(),
            "Registering service"
        );
        self.shared.apply(&mut state, &id, Some(item));
        drop(state);

        self.shared.drain();
        Ok(ServiceRegistration {
            service_id: id,
            shared: Arc::downgrade(&self.shared),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Subscribes `listener` to the transitions in `mask` for items
    /// matching `template`.
    ///
    /// Items already matching at subscription time produce no events; they
    /// only seed the subscription's match set.
    pub fn notify(
        &self,
        template: ServiceTemplate,
        mask: Transitions,
        listener: impl ServiceEventListener + 'static,
    ) -> EventRegistration {
        let mut state = self.shared.state.write();
        let matched = state
            .items
            .iter()
            .filter(|(_, item)| template.matches(item))
            .map(|(id, _)| id.clone())
            .collect();
        state.next_event_id += 1;
        let event_id = state.next_event_id;
        let sequence_number = state.sequence;
        state.subscriptions.insert(
            event_id,
            Subscription {
                template,
                mask,
                listener: Arc::new(listener),
                matched,
            },
        );
        trace!(event_id, ?mask, "Subscription added");

        EventRegistration {
            event_id,
            source: self.shared.registry_id.clone(),
            sequence_number,
            shared: Arc::downgrade(&self.shared),
        }
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    /// Returns any one service matching `template`.
    pub fn lookup(&self, template: &ServiceTemplate) -> Option<ServiceObject> {
        let state = self.shared.state.read();
        state
            .items
            .values()
            .find(|item| template.matches(item))
            .map(|item| item.service.clone())
    }

    /// Returns up to `max_matches` matching items and the total match count.
    pub fn lookup_with_max(&self, template: &ServiceTemplate, max_matches: usize) -> ServiceMatches {
        let state = self.shared.state.read();
        let mut items = Vec::new();
        let mut total_matches = 0;
        for item in state.items.values().filter(|item| template.matches(item)) {
            total_matches += 1;
            if items.len() < max_matches {
                items.push(item.clone());
            }
        }
        ServiceMatches {
            items,
            total_matches,
        }
    }

    /// Returns the most specific capability of every matching item, without
    /// duplicates, keeping only names starting with `prefix` when given.
    pub fn service_types(&self, template: &ServiceTemplate, prefix: Option<&str>) -> Vec<Capability> {
        let state = self.shared.state.read();
        let mut seen = HashSet::new();
        state
            .items
            .values()
            .filter(|item| template.matches(item))
            .map(|item| item.service.primary())
            .filter(|cap| prefix.is_none_or(|p| cap.name().starts_with(p)))
            .filter(|cap| seen.insert(*cap))
            .collect()
    }

    /// Returns any one service exposing capability `C`.
    pub fn lookup_service<C: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        self.lookup(&ServiceTemplate::of::<C>())
            .and_then(|service| service.get::<C>())
    }

    /// Returns every service exposing capability `C`.
    pub fn lookup_all<C: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<C>> {
        let template = ServiceTemplate::of::<C>();
        let state = self.shared.state.read();
        state
            .items
            .values()
            .filter(|item| template.matches(item))
            .filter_map(|item| item.service.get::<C>())
            .collect()
    }

    /// Number of registered items.
    pub fn len(&self) -> usize {
        self.shared.state.read().items.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.state.read().subscriptions.len()
    }
}

impl Shared {
    /// Stores `new` under `id` (or removes the item when `None`) and queues
    /// the resulting transitions.
    fn apply(&self, state: &mut State, id: &ServiceId, new: Option<ServiceItem>) {
        let State {
            items,
            subscriptions,
            sequence,
            ..
        } = state;

        let old = match &new {
            Some(item) => items.insert(id.clone(), item.clone()),
            None => items.remove(id),
        };
        let Some(snapshot) = new.as_ref().or(old.as_ref()) else {
            return;
        };

        let mut queue = self.queue.lock();
        for (&event_id, sub) in subscriptions.iter_mut() {
            let was = sub.matched.contains(id);
            let now = new.as_ref().is_some_and(|item| sub.template.matches(item));
            let transition = match (was, now) {
                (true, false) => {
                    sub.matched.remove(id);
                    Transitions::MATCH_NOMATCH
                }
                (false, true) => {
                    sub.matched.insert(id.clone());
                    Transitions::NOMATCH_MATCH
                }
                (true, true) => Transitions::MATCH_MATCH,
                (false, false) => continue,
            };
            if !sub.mask.contains(transition) {
                continue;
            }
            *sequence += 1;
            queue.push_back(Pending {
                listener: Arc::clone(&sub.listener),
                event: ServiceEvent {
                    transition,
                    service_id: id.clone(),
                    item: snapshot.clone(),
                    sequence_number: *sequence,
                    event_id,
                },
            });
        }
    }

    fn update(&self, id: &ServiceId, edit: impl FnOnce(&mut Vec<Entry>)) -> LookupResult<()> {
        let mut state = self.state.write();
        let mut item = state
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| LookupError::UnknownService(id.clone()))?;
        edit(&mut item.attributes);
        debug!(service_id = %id, attributes = item.attributes.len(), "Updating service attributes");
        self.apply(&mut state, id, Some(item));
        drop(state);
        self.drain();
        Ok(())
    }

    fn remove_item(&self, id: &ServiceId) {
        let mut state = self.state.write();
        if !state.items.contains_key(id) {
            return;
        }
        debug!(service_id = %id, "Cancelling service registration");
        self.apply(&mut state, id, None);
        drop(state);
        self.drain();
    }

    fn remove_subscription(&self, event_id: u64) -> bool {
        let removed = self.state.write().subscriptions.remove(&event_id).is_some();
        if removed {
            trace!(event_id, "Subscription removed");
        }
        removed
    }

    fn drain(&self) {
        let delivery = self.delivery.lock();
        if delivery.get() {
            // Re-entered from a listener; the running drain picks this up.
            return;
        }
        delivery.set(true);
        let _guard = DrainGuard(&delivery);

        loop {
            let Some(pending) = self.queue.lock().pop_front() else {
                break;
            };
            let event_id = pending.event.event_id;
            if !self.state.read().subscriptions.contains_key(&event_id) {
                continue;
            }
            trace!(
                event_id,
                sequence = pending.event.sequence_number,
                service_id = %pending.event.service_id,
                transition = ?pending.event.transition,
                "Delivering service event"
            );
            match pending.listener.notify(&pending.event) {
                Ok(()) => {}
                Err(NotifyError::UnknownEvent) => {
                    debug!(event_id, "Listener declined further events, cancelling subscription");
                    self.remove_subscription(event_id);
                }
                Err(NotifyError::Failed(reason)) => {
                    warn!(
                        event_id,
                        service_id = %pending.event.service_id,
                        error = %reason,
                        "Service event listener failed"
                    );
                }
            }
        }
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Handle to one published item.
///
/// Dropping the handle does not unpublish the item; call
/// [`cancel`](Self::cancel).
pub struct ServiceRegistration {
    service_id: ServiceId,
    shared: Weak<Shared>,
    cancelled: AtomicBool,
}

impl ServiceRegistration {
    pub fn service_id(&self) -> &ServiceId {
        &self.service_id
    }

    /// Replaces the item's attributes.
    pub fn set_attributes(&self, attributes: Vec<Entry>) -> LookupResult<()> {
        self.edit(|current| *current = attributes)
    }

    /// Appends to the item's attributes.
    pub fn add_attributes(&self, attributes: Vec<Entry>) -> LookupResult<()> {
        self.edit(|current| current.extend(attributes))
    }

    /// Removes the item from the registry. Further calls do nothing.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_item(&self.service_id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn edit(&self, edit: impl FnOnce(&mut Vec<Entry>)) -> LookupResult<()> {
        if self.is_cancelled() {
            return Err(LookupError::UnknownService(self.service_id.clone()));
        }
        let shared = self.shared.upgrade().ok_or(LookupError::RegistryClosed)?;
        shared.update(&self.service_id, edit)
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("service_id", &self.service_id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Handle to one subscription.
pub struct EventRegistration {
    event_id: u64,
    source: ServiceId,
    sequence_number: u64,
    shared: Weak<Shared>,
}

impl EventRegistration {
    /// Identifies the subscription; carried by its events as `event_id`.
    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    /// The registry that issued this subscription.
    pub fn source(&self) -> &ServiceId {
        &self.source
    }

    /// The registry's sequence number when the subscription was created.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Stops delivery. Further calls do nothing.
    pub fn cancel(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_subscription(self.event_id);
        }
    }

    /// Returns `false` once cancelled, by the caller or by the registry.
    pub fn is_active(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| shared.state.read().subscriptions.contains_key(&self.event_id))
    }
}

impl fmt::Debug for EventRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistration")
            .field("event_id", &self.event_id)
            .field("source", &self.source)
            .field("sequence_number", &self.sequence_number)
            .finish()
    }
}
