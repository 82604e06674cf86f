//! Base implementation for managed modules.
//!
//! [`ModuleBase`] carries the bookkeeping every module needs:
//!
//! - the lifecycle state machine of [`ModuleState`];
//! - publishing the module's own services on `start` and withdrawing them on
//!   `stop`;
//! - wiring declared dependencies into typed slots through a
//!   [`ServiceTracker`].
//!
//! Concrete modules embed a `ModuleBase` and delegate their [`Module`]
//! implementation to it, adding their own behaviour around the calls.
//!
//! ```rust,ignore
//! struct Muc {
//!     base: ModuleBase,
//!     router: Dependency<dyn PacketRouter>,
//! }
//!
//! let router = Dependency::new();
//! let muc = Arc::new_cyclic(|this: &Weak<Muc>| Muc {
//!     base: ModuleBase::builder("muc")
//!         .track(TrackInfo::new().slot::<dyn PacketRouter, _>("router", router.clone()))
//!         .publish_self(this.clone(), |muc| {
//!             ServiceObject::new(muc.clone()).with::<dyn Module>(muc)
//!         })
//!         .build(),
//!     router,
//! });
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use switchboard_core::{
    Capability, Entry, Name, ServiceItem, ServiceLookup, ServiceObject, ServiceRegistration,
    ServiceTracker, TrackerCallback,
};
use tracing::{debug, info, warn};

use crate::container::Container;
use crate::error::{ModuleError, ModuleResult};
use crate::module::{Module, ModuleState};
use crate::slot::{Injector, Presence};

// =============================================================================
// TrackInfo
// =============================================================================

struct Binding {
    field: String,
    injector: Arc<dyn Injector>,
}

/// Declares which capabilities a module depends on and where each
/// discovered service is delivered.
///
/// One capability may feed several slots. A binding with an empty field name
/// only records that a matching service exists.
#[derive(Default)]
pub struct TrackInfo {
    entries: Vec<(Capability, Vec<Binding>)>,
}

impl TrackInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers services exposing `C` to `injector` under `field`.
    pub fn track<C: ?Sized + 'static>(
        mut self,
        field: impl Into<String>,
        injector: impl Injector + 'static,
    ) -> Self {
        self.bind(Capability::of::<C>(), field.into(), Arc::new(injector));
        self
    }

    /// Like [`track`](Self::track), with the slot's type tied to `C`.
    ///
    /// Works for both [`Dependency<C>`](crate::Dependency) and
    /// [`Dependencies<C>`](crate::Dependencies).
    pub fn slot<C, S>(self, field: impl Into<String>, slot: S) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        S: Injector + SlotOf<C> + 'static,
    {
        self.track::<C>(field, slot)
    }

    /// Tracks `C` without wiring it anywhere.
    pub fn presence<C: ?Sized + 'static>(mut self) -> Self {
        self.bind(Capability::of::<C>(), String::new(), Arc::new(Presence));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.entries.iter().map(|(capability, _)| *capability).collect()
    }

    fn bind(&mut self, capability: Capability, field: String, injector: Arc<dyn Injector>) {
        let binding = Binding { field, injector };
        match self.entries.iter_mut().find(|(c, _)| *c == capability) {
            Some((_, bindings)) => bindings.push(binding),
            None => self.entries.push((capability, vec![binding])),
        }
    }

    fn bindings(&self, capability: &Capability) -> &[Binding] {
        self.entries
            .iter()
            .find(|(c, _)| c == capability)
            .map(|(_, bindings)| bindings.as_slice())
            .unwrap_or_default()
    }
}

/// Marks a slot whose element type is `C`.
pub trait SlotOf<C: ?Sized> {}

impl<C: ?Sized> SlotOf<C> for crate::slot::Dependency<C> {}
impl<C: ?Sized> SlotOf<C> for crate::slot::Dependencies<C> {}

// =============================================================================
// Wiring
// =============================================================================

type Hook = Box<dyn Fn(&str, &ServiceItem) + Send + Sync>;

/// Tracker callback delivering services to the declared bindings.
struct Wiring {
    module: String,
    track_info: TrackInfo,
    on_added: Option<Hook>,
    on_removed: Option<Hook>,
}

impl Wiring {
    fn deliver(&self, capability: Capability, item: &ServiceItem, adding: bool) {
        for binding in self.track_info.bindings(&capability) {
            let result = if adding {
                binding.injector.inject(&item.service)
            } else {
                binding.injector.eject(&item.service)
            };
            match result {
                Ok(()) => {
                    let hook = if adding { &self.on_added } else { &self.on_removed };
                    if let Some(hook) = hook {
                        hook(&binding.field, item);
                    }
                }
                Err(reason) => {
                    let error = ModuleError::Wiring {
                        slot: binding.field.clone(),
                        reason,
                    };
                    warn!(module = %self.module, capability = capability.name(), %error, "Dependency not wired");
                }
            }
        }
    }

    fn clear(&self) {
        for (_, bindings) in &self.track_info.entries {
            for binding in bindings {
                binding.injector.clear();
            }
        }
    }
}

impl TrackerCallback for Wiring {
    fn add_service(&self, capability: Capability, item: &ServiceItem) {
        self.deliver(capability, item, true);
    }

    fn remove_service(&self, capability: Capability, item: &ServiceItem) {
        self.deliver(capability, item, false);
    }
}

// =============================================================================
// ModuleBase
// =============================================================================

type SelfPublisher = Box<dyn Fn() -> Option<ServiceObject> + Send + Sync>;

enum Services {
    None,
    SelfHandle(SelfPublisher),
    Items(Vec<ServiceItem>),
}

#[derive(Default)]
struct Runtime {
    lookup: Option<ServiceLookup>,
    registrations: Vec<ServiceRegistration>,
    tracker: Option<ServiceTracker>,
}

/// Builder for [`ModuleBase`].
pub struct ModuleBaseBuilder {
    name: String,
    track_info: TrackInfo,
    services: Services,
    attributes: Vec<Entry>,
    on_added: Option<Hook>,
    on_removed: Option<Hook>,
}

impl ModuleBaseBuilder {
    /// Declares the module's dependencies.
    pub fn track(mut self, track_info: TrackInfo) -> Self {
        self.track_info = track_info;
        self
    }

    /// Publishes the module itself on `start`.
    ///
    /// `publish` turns the upgraded module into the handle to register; the
    /// module is skipped if it has already been dropped.
    pub fn publish_self<M: Send + Sync + 'static>(
        mut self,
        this: Weak<M>,
        publish: impl Fn(Arc<M>) -> ServiceObject + Send + Sync + 'static,
    ) -> Self {
        self.services = Services::SelfHandle(Box::new(move || this.upgrade().map(&publish)));
        self
    }

    /// Publishes one service on `start`.
    pub fn service(self, service: ServiceObject) -> Self {
        self.services(vec![service])
    }

    /// Publishes several services on `start`.
    pub fn services(mut self, services: Vec<ServiceObject>) -> Self {
        self.services = Services::Items(services.into_iter().map(ServiceItem::new).collect());
        self
    }

    /// Adds an attribute to every published service.
    pub fn attribute(mut self, entry: impl Into<Entry>) -> Self {
        self.attributes.push(entry.into());
        self
    }

    /// Called after a discovered service was wired into a slot.
    pub fn on_service_added(mut self, hook: impl Fn(&str, &ServiceItem) + Send + Sync + 'static) -> Self {
        self.on_added = Some(Box::new(hook));
        self
    }

    /// Called after a departed service was removed from a slot.
    pub fn on_service_removed(mut self, hook: impl Fn(&str, &ServiceItem) + Send + Sync + 'static) -> Self {
        self.on_removed = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> ModuleBase {
        let mut attributes = vec![Name::new(self.name.clone()).into()];
        attributes.extend(self.attributes);
        ModuleBase {
            wiring: Arc::new(Wiring {
                module: self.name.clone(),
                track_info: self.track_info,
                on_added: self.on_added,
                on_removed: self.on_removed,
            }),
            name: self.name,
            services: self.services,
            attributes,
            state: Mutex::new(ModuleState::Constructed),
            runtime: Mutex::new(Runtime::default()),
        }
    }
}

/// Reusable lifecycle, publishing and wiring for modules.
///
/// A module publishes only what it declares: items added with
/// [`service`](ModuleBaseBuilder::service) or a handle to itself through
/// [`publish_self`](ModuleBaseBuilder::publish_self). Without either,
/// `start` registers nothing.
pub struct ModuleBase {
    name: String,
    wiring: Arc<Wiring>,
    services: Services,
    attributes: Vec<Entry>,
    state: Mutex<ModuleState>,
    runtime: Mutex<Runtime>,
}

impl fmt::Debug for ModuleBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBase")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl ModuleBase {
    pub fn builder(name: impl Into<String>) -> ModuleBaseBuilder {
        ModuleBaseBuilder {
            name: name.into(),
            track_info: TrackInfo::default(),
            services: Services::None,
            attributes: Vec::new(),
            on_added: None,
            on_removed: None,
        }
    }

    /// A module with no dependencies and nothing to publish.
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    pub fn state(&self) -> ModuleState {
        *self.state.lock()
    }

    /// The registry, once initialized.
    pub fn lookup(&self) -> Option<ServiceLookup> {
        self.runtime.lock().lookup.clone()
    }

    fn illegal(&self, state: ModuleState, operation: &'static str) -> ModuleError {
        ModuleError::IllegalState {
            module: self.name.clone(),
            state,
            operation,
        }
    }

    fn items(&self) -> Vec<ServiceItem> {
        let items = match &self.services {
            Services::None => Vec::new(),
            Services::SelfHandle(publish) => publish().map(ServiceItem::new).into_iter().collect(),
            Services::Items(items) => items.clone(),
        };
        items
            .into_iter()
            .map(|mut item| {
                item.attributes.extend(self.attributes.iter().cloned());
                item
            })
            .collect()
    }

    fn release(&self) {
        let (registrations, tracker) = {
            let mut runtime = self.runtime.lock();
            (std::mem::take(&mut runtime.registrations), runtime.tracker.take())
        };
        for registration in &registrations {
            registration.cancel();
        }
        if let Some(tracker) = tracker {
            tracker.cancel();
        }
        self.wiring.clear();
    }
}

impl Module for ModuleBase {
    fn name(&self) -> &str {
        &self.name
    }

    /// Service-added hooks run while the module's state is locked and must
    /// not call back into the module's lifecycle.
    fn initialize(&self, container: &Container) -> ModuleResult<()> {
        let mut state = self.state.lock();
        if !matches!(*state, ModuleState::Constructed | ModuleState::Stopped) {
            return Err(self.illegal(*state, "initialize"));
        }

        let lookup = container.service_lookup()?;
        let tracker = if self.wiring.track_info.is_empty() {
            None
        } else {
            let capabilities = self.wiring.track_info.capabilities();
            debug!(module = %self.name, dependencies = capabilities.len(), "Tracking dependencies");
            let callback: Arc<dyn TrackerCallback> = self.wiring.clone();
            Some(ServiceTracker::new(&lookup, &capabilities, callback))
        };

        let mut runtime = self.runtime.lock();
        runtime.lookup = Some(lookup);
        runtime.tracker = tracker;
        *state = ModuleState::Initialized;
        Ok(())
    }

    fn start(&self) -> ModuleResult<()> {
        let mut state = self.state.lock();
        if *state != ModuleState::Initialized {
            return Err(self.illegal(*state, "start"));
        }

        let lookup = self
            .runtime
            .lock()
            .lookup
            .clone()
            .ok_or_else(|| self.illegal(*state, "start"))?;

        let mut registrations = Vec::new();
        for item in self.items() {
            match lookup.register(item) {
                Ok(registration) => registrations.push(registration),
                Err(e) => {
                    for registration in &registrations {
                        registration.cancel();
                    }
                    return Err(e.into());
                }
            }
        }

        info!(module = %self.name, services = registrations.len(), "Module started");
        self.runtime.lock().registrations = registrations;
        *state = ModuleState::Started;
        Ok(())
    }

    fn stop(&self) -> ModuleResult<()> {
        let mut state = self.state.lock();
        if !matches!(*state, ModuleState::Initialized | ModuleState::Started) {
            return Ok(());
        }
        self.release();
        *state = ModuleState::Stopped;
        info!(module = %self.name, "Module stopped");
        Ok(())
    }

    fn destroy(&self) -> ModuleResult<()> {
        let mut state = self.state.lock();
        if *state == ModuleState::Destroyed {
            return Ok(());
        }
        self.release();
        self.runtime.lock().lookup = None;
        *state = ModuleState::Destroyed;
        debug!(module = %self.name, "Module destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex as PlMutex;
    use switchboard_core::ServiceTemplate;

    use super::*;
    use crate::slot::{Dependencies, Dependency};

    trait Store: Send + Sync {
        fn label(&self) -> &str;
    }

    struct Memory(&'static str);

    impl Store for Memory {
        fn label(&self) -> &str {
            self.0
        }
    }

    fn store(label: &'static str) -> ServiceItem {
        let svc = Arc::new(Memory(label));
        ServiceItem::new(ServiceObject::new(svc.clone()).with::<dyn Store>(svc))
    }

    fn container() -> Container {
        Container::builder(ServiceLookup::new()).build()
    }

    #[test]
    fn test_single_slot_follows_registry() {
        let container = container();
        let lookup = container.service_lookup().unwrap();
        let foo: Dependency<dyn Store> = Dependency::new();
        let base = ModuleBase::builder("m")
            .track(TrackInfo::new().slot::<dyn Store, _>("foo", foo.clone()))
            .build();

        base.initialize(&container).unwrap();
        assert!(!foo.is_set());

        let reg = lookup.register(store("a")).unwrap();
        assert_eq!(foo.get().unwrap().label(), "a");

        reg.cancel();
        assert!(foo.get().is_none());
    }

    #[test]
    fn test_list_slot_and_hooks() {
        let container = container();
        let lookup = container.service_lookup().unwrap();
        lookup.register(store("early")).unwrap();

        let all: Dependencies<dyn Store> = Dependencies::new();
        let log = Arc::new(PlMutex::new(Vec::new()));
        let (added, removed) = (Arc::clone(&log), Arc::clone(&log));
        let base = ModuleBase::builder("m")
            .track(TrackInfo::new().slot::<dyn Store, _>("stores", all.clone()))
            .on_service_added(move |field, _| added.lock().push(format!("+{field}")))
            .on_service_removed(move |field, _| removed.lock().push(format!("-{field}")))
            .build();

        base.initialize(&container).unwrap();
        let late = lookup.register(store("late")).unwrap();
        assert_eq!(all.len(), 2);

        late.cancel();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get()[0].label(), "early");
        assert_eq!(*log.lock(), vec!["+stores", "+stores", "-stores"]);
    }

    #[test]
    fn test_presence_only() {
        let container = container();
        let seen = Arc::new(PlMutex::new(0));
        let counter = Arc::clone(&seen);
        let base = ModuleBase::builder("m")
            .track(TrackInfo::new().presence::<dyn Store>())
            .on_service_added(move |field, _| {
                assert!(field.is_empty());
                *counter.lock() += 1;
            })
            .build();
        base.initialize(&container).unwrap();
        container.service_lookup().unwrap().register(store("x")).unwrap();
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_start_requires_initialize() {
        let base = ModuleBase::new("m");
        assert!(matches!(
            base.start(),
            Err(ModuleError::IllegalState { operation: "start", .. })
        ));
    }

    #[test]
    fn test_lifecycle_publishes_and_withdraws() {
        let container = container();
        let lookup = container.service_lookup().unwrap();
        let base = ModuleBase::builder("publisher")
            .service(store("mine").service)
            .track(TrackInfo::new().presence::<dyn Store>())
            .build();

        base.initialize(&container).unwrap();
        base.start().unwrap();
        assert_eq!(base.state(), ModuleState::Started);
        let found = lookup.lookup_with_max(
            &ServiceTemplate::of::<dyn Store>().with_attribute(Name::new("publisher")),
            10,
        );
        assert_eq!(found.total_matches, 1);

        base.stop().unwrap();
        base.stop().unwrap();
        assert!(lookup.is_empty());
        assert_eq!(lookup.subscription_count(), 0);

        base.initialize(&container).unwrap();
        base.start().unwrap();
        assert_eq!(lookup.len(), 1);

        base.destroy().unwrap();
        assert_eq!(base.state(), ModuleState::Destroyed);
        assert!(lookup.is_empty());
        assert!(base.initialize(&container).is_err());
    }

    struct Echo {
        base: ModuleBase,
    }

    impl Store for Echo {
        fn label(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_publish_self() {
        let container = container();
        let echo = Arc::new_cyclic(|this: &Weak<Echo>| Echo {
            base: ModuleBase::builder("echo")
                .publish_self(this.clone(), |echo| {
                    ServiceObject::new(echo.clone()).with::<dyn Store>(echo)
                })
                .build(),
        });

        echo.base.initialize(&container).unwrap();
        echo.base.start().unwrap();
        let lookup = container.service_lookup().unwrap();
        assert_eq!(lookup.lookup_service::<dyn Store>().unwrap().label(), "echo");
    }

    #[test]
    fn test_plain_module_publishes_nothing() {
        let container = container();
        let base = ModuleBase::new("plain");
        base.initialize(&container).unwrap();
        base.start().unwrap();

        assert_eq!(base.state(), ModuleState::Started);
        assert!(container.service_lookup().unwrap().is_empty());
    }
}
