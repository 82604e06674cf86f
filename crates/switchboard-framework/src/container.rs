//! Process-wide container facade.
//!
//! A [`Container`] bundles the service registry, the host environment and
//! coarse lifecycle control. Handles are cheap to clone; every handle carries
//! a set of [`Permissions`] and a narrower handle can be derived with
//! [`Container::restricted`]. Operations outside the handle's grants fail
//! with [`ContainerError::Unauthorized`].
//!
//! ```rust,ignore
//! let container = Container::builder(ServiceLookup::new())
//!     .environment(Environment::new("/var/lib/switchboard"))
//!     .implementation::<dyn Clock>(|_| {
//!         let clock = Arc::new(SystemClock);
//!         ServiceObject::new(clock.clone()).with::<dyn Clock>(clock)
//!     })
//!     .build();
//!
//! let clock: Arc<dyn Clock> = container.start_service::<dyn Clock>()?;
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use parking_lot::{Mutex, RwLock};
use switchboard_core::{
    Capability, ServiceItem, ServiceLookup, ServiceObject, ServiceRegistration, ServiceTemplate,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ContainerError, ContainerResult};

bitflags! {
    /// Operations a container handle may perform.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u8 {
        /// Obtain the service registry.
        const LOOKUP = 1 << 0;
        /// Start and stop services by capability.
        const SERVICES = 1 << 1;
        /// Stop or restart the host, toggle setup mode.
        const LIFECYCLE = 1 << 2;
    }
}

// =============================================================================
// Environment
// =============================================================================

/// Host settings exposed to modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub home: PathBuf,
    pub locale: String,
    pub encoding: String,
    pub timezone: String,
    pub setup_mode: bool,
    pub standalone: bool,
    pub restartable: bool,
}

impl Environment {
    /// Settings rooted at `home` with `en`/`UTF-8`/`UTC` defaults.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            home: PathBuf::from("."),
            locale: "en".into(),
            encoding: "UTF-8".into(),
            timezone: "UTC".into(),
            setup_mode: false,
            standalone: true,
            restartable: false,
        }
    }
}

/// Per-module view of the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleContext {
    pub name: String,
    pub locale: String,
    pub encoding: String,
    pub timezone: String,
    /// `<home>/modules/<name>`
    pub home_dir: PathBuf,
    /// `<home>/logs/<name>`
    pub log_dir: PathBuf,
}

// =============================================================================
// Container
// =============================================================================

type ImplementationFactory = Arc<dyn Fn(&Container) -> ServiceObject + Send + Sync>;

struct Implementation {
    capability: Capability,
    factory: ImplementationFactory,
}

struct StartedService {
    object: ServiceObject,
    registration: ServiceRegistration,
}

struct Inner {
    lookup: ServiceLookup,
    environment: Environment,
    setup_mode: AtomicBool,
    implementations: RwLock<HashMap<TypeId, Implementation>>,
    started: Mutex<HashMap<TypeId, StartedService>>,
    shutdown: CancellationToken,
    restart_requested: AtomicBool,
}

/// Shared facade over the registry and host environment.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
    grants: Permissions,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("grants", &self.grants)
            .field("environment", &self.inner.environment)
            .finish()
    }
}

/// Builds a [`Container`] with every permission granted.
pub struct ContainerBuilder {
    lookup: ServiceLookup,
    environment: Environment,
    implementations: HashMap<TypeId, Implementation>,
}

impl ContainerBuilder {
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Registers the implementation used by
    /// [`Container::start_service`] for capability `C`.
    pub fn implementation<C: ?Sized + 'static>(
        mut self,
        factory: impl Fn(&Container) -> ServiceObject + Send + Sync + 'static,
    ) -> Self {
        let capability = Capability::of::<C>();
        self.implementations.insert(
            capability.type_id(),
            Implementation {
                capability,
                factory: Arc::new(factory),
            },
        );
        self
    }

    pub fn build(self) -> Container {
        let setup_mode = AtomicBool::new(self.environment.setup_mode);
        Container {
            inner: Arc::new(Inner {
                lookup: self.lookup,
                environment: self.environment,
                setup_mode,
                implementations: RwLock::new(self.implementations),
                started: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                restart_requested: AtomicBool::new(false),
            }),
            grants: Permissions::all(),
        }
    }
}

impl Container {
    pub fn builder(lookup: ServiceLookup) -> ContainerBuilder {
        ContainerBuilder {
            lookup,
            environment: Environment::default(),
            implementations: HashMap::new(),
        }
    }

    /// Returns a handle limited to the intersection of this handle's grants
    /// and `permissions`.
    pub fn restricted(&self, permissions: Permissions) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            grants: self.grants & permissions,
        }
    }

    pub fn permissions(&self) -> Permissions {
        self.grants
    }

    fn require(&self, permission: Permissions) -> ContainerResult<()> {
        if self.grants.contains(permission) {
            Ok(())
        } else {
            Err(ContainerError::Unauthorized(permission))
        }
    }

    // ─── Environment ────────────────────────────────────────────────────────

    pub fn is_setup_mode(&self) -> bool {
        self.inner.setup_mode.load(Ordering::Acquire)
    }

    /// Leaves or re-enters setup mode.
    pub fn set_setup_mode(&self, setup_mode: bool) -> ContainerResult<()> {
        self.require(Permissions::LIFECYCLE)?;
        self.inner.setup_mode.store(setup_mode, Ordering::Release);
        info!(setup_mode, "Setup mode changed");
        Ok(())
    }

    pub fn is_standalone(&self) -> bool {
        self.inner.environment.standalone
    }

    pub fn is_restartable(&self) -> bool {
        self.inner.environment.restartable
    }

    pub fn environment(&self) -> &Environment {
        &self.inner.environment
    }

    /// Returns the environment as seen by the module called `name`.
    pub fn module_context(&self, name: &str) -> ModuleContext {
        let env = &self.inner.environment;
        ModuleContext {
            name: name.to_string(),
            locale: env.locale.clone(),
            encoding: env.encoding.clone(),
            timezone: env.timezone.clone(),
            home_dir: env.home.join("modules").join(name),
            log_dir: env.home.join("logs").join(name),
        }
    }

    // ─── Services ───────────────────────────────────────────────────────────

    /// Returns the service registry.
    pub fn service_lookup(&self) -> ContainerResult<ServiceLookup> {
        self.require(Permissions::LOOKUP)?;
        Ok(self.inner.lookup.clone())
    }

    /// Locates a service exposing `C`, or instantiates the registered
    /// implementation and publishes it.
    ///
    /// The service is published without holding any container lock, so
    /// listeners reacting to it may start or stop other services. Two
    /// callers racing on the same capability may both run the factory; the
    /// loser withdraws its copy and returns the winner's.
    pub fn start_service<C: ?Sized + Send + Sync + 'static>(&self) -> ContainerResult<Arc<C>> {
        self.require(Permissions::SERVICES)?;
        let capability = Capability::of::<C>();

        if let Some(existing) = self.started_view::<C>(&capability) {
            return Ok(existing);
        }
        if let Some(existing) = self.inner.lookup.lookup_service::<C>() {
            debug!(capability = capability.name(), "Service already available");
            return Ok(existing);
        }

        let factory = self
            .inner
            .implementations
            .read()
            .get(&capability.type_id())
            .map(|implementation| Arc::clone(&implementation.factory))
            .ok_or(ContainerError::NoImplementation(capability.name()))?;

        let object = factory(self);
        let service = object
            .get::<C>()
            .ok_or(ContainerError::NoImplementation(capability.name()))?;
        let registration = self.inner.lookup.register(ServiceItem::new(object.clone()))?;
        let service_id = registration.service_id().clone();

        let winner = {
            let mut started = self.inner.started.lock();
            match started.get(&capability.type_id()).and_then(|s| s.object.get::<C>()) {
                Some(winner) => Some((winner, registration)),
                None => {
                    started.insert(
                        capability.type_id(),
                        StartedService {
                            object,
                            registration,
                        },
                    );
                    None
                }
            }
        };
        if let Some((winner, ours)) = winner {
            ours.cancel();
            debug!(capability = capability.name(), service_id = %service_id, "Service started concurrently, withdrawing duplicate");
            return Ok(winner);
        }

        info!(capability = capability.name(), service_id = %service_id, "Service started");
        Ok(service)
    }

    fn started_view<C: ?Sized + Send + Sync + 'static>(&self, capability: &Capability) -> Option<Arc<C>> {
        let started = self.inner.started.lock();
        started.get(&capability.type_id())?.object.get::<C>()
    }

    /// Unpublishes the service started for `C` through
    /// [`start_service`](Self::start_service), if any.
    ///
    /// Returns `true` if a service was stopped.
    pub fn stop_service<C: ?Sized + 'static>(&self) -> ContainerResult<bool> {
        self.require(Permissions::SERVICES)?;
        let capability = Capability::of::<C>();
        let started = self.inner.started.lock().remove(&capability.type_id());
        match started {
            Some(StartedService { registration, .. }) => {
                registration.cancel();
                info!(capability = capability.name(), service_id = %registration.service_id(), "Service stopped");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Capabilities with a registered implementation.
    pub fn implementations(&self) -> Vec<Capability> {
        self.inner
            .implementations
            .read()
            .values()
            .map(|implementation| implementation.capability)
            .collect()
    }

    /// Returns `true` if some registered item exposes `C`.
    pub fn has_service<C: ?Sized + 'static>(&self) -> bool {
        self.inner
            .lookup
            .lookup(&ServiceTemplate::of::<C>())
            .is_some()
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Asks the host to shut down.
    pub fn stop(&self) -> ContainerResult<()> {
        self.require(Permissions::LIFECYCLE)?;
        info!("Container stop requested");
        self.inner.shutdown.cancel();
        Ok(())
    }

    /// Asks the host to restart. Does nothing when the host cannot restart.
    pub fn restart(&self) -> ContainerResult<()> {
        self.require(Permissions::LIFECYCLE)?;
        if !self.is_restartable() {
            debug!("Restart requested but the host is not restartable");
            return Ok(());
        }
        info!("Container restart requested");
        self.inner.restart_requested.store(true, Ordering::Release);
        self.inner.shutdown.cancel();
        Ok(())
    }

    /// Token cancelled by [`stop`](Self::stop) and [`restart`](Self::restart).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Returns and clears a pending restart request.
    pub fn take_restart_request(&self) -> bool {
        self.inner.restart_requested.swap(false, Ordering::AcqRel)
    }

    /// Unpublishes every service started through the container.
    pub fn stop_all_services(&self) {
        let started: Vec<_> = self.inner.started.lock().drain().collect();
        for (_, StartedService { registration, .. }) in started {
            registration.cancel();
        }
    }
}
