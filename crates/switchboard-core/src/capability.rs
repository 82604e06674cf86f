//! Capability types and opaque service handles.
//!
//! A [`Capability`] names a behavioral contract, normally a trait object type
//! such as `dyn SessionManager`. A [`ServiceObject`] is the handle published
//! in the registry: it records its concrete type (the most specific
//! capability) plus every trait-object view the publisher chose to expose.
//!
//! Whether a handle satisfies a capability is decided by the views it
//! carries, not by any type hierarchy:
//!
//! ```rust,ignore
//! let router = Arc::new(PacketRouter::default());
//! let object = ServiceObject::new(router.clone())
//!     .with::<dyn Router>(router.clone())
//!     .with::<dyn Startable>(router);
//!
//! assert!(object.satisfies(&Capability::of::<dyn Router>()));
//! let as_router: Arc<dyn Router> = object.get::<dyn Router>().unwrap();
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// =============================================================================
// Capability
// =============================================================================

/// Identity of a capability type.
#[derive(Clone, Copy)]
pub struct Capability {
    type_id: TypeId,
    name: &'static str,
}

impl Capability {
    /// Returns the capability for `C`, usually a `dyn Trait`.
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
        }
    }

    /// The `TypeId` of the capability type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The fully qualified type name, as reported by the compiler.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({})", self.name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// ServiceObject
// =============================================================================

/// Type-erased `Arc<C>` stored behind `dyn Any`, keyed by `TypeId::of::<C>()`.
type ErasedView = Arc<dyn Any + Send + Sync>;

/// Opaque, cheaply clonable handle to a published service.
///
/// Two handles are equal when they wrap the same allocation.
#[derive(Clone)]
pub struct ServiceObject {
    primary: Capability,
    addr: usize,
    views: Arc<HashMap<TypeId, (Capability, ErasedView)>>,
}

impl ServiceObject {
    /// Wraps a concrete service. The concrete type becomes the handle's
    /// most specific capability.
    pub fn new<T: Send + Sync + 'static>(service: Arc<T>) -> Self {
        let primary = Capability::of::<T>();
        let addr = Arc::as_ptr(&service) as *const () as usize;
        let mut views = HashMap::new();
        views.insert(primary.type_id, (primary, Arc::new(service) as ErasedView));
        Self {
            primary,
            addr,
            views: Arc::new(views),
        }
    }

    /// Adds a view of the service as capability `C`.
    pub fn with<C: ?Sized + Send + Sync + 'static>(mut self, view: Arc<C>) -> Self {
        let capability = Capability::of::<C>();
        Arc::make_mut(&mut self.views)
            .insert(capability.type_id, (capability, Arc::new(view) as ErasedView));
        self
    }

    /// Returns the concrete capability of the wrapped service.
    pub fn primary(&self) -> Capability {
        self.primary
    }

    /// Returns `true` when the handle exposes capability `capability`.
    pub fn satisfies(&self, capability: &Capability) -> bool {
        self.views.contains_key(&capability.type_id)
    }

    /// Returns the handle viewed as `C`, if it exposes that capability.
    pub fn get<C: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        self.views
            .get(&TypeId::of::<C>())
            .and_then(|(_, view)| view.downcast_ref::<Arc<C>>())
            .cloned()
    }

    /// Iterates over every capability the handle exposes.
    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.views.values().map(|(capability, _)| *capability)
    }
}

impl PartialEq for ServiceObject {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr && self.primary == other.primary
    }
}

impl Eq for ServiceObject {}

impl fmt::Debug for ServiceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceObject")
            .field("primary", &self.primary.name)
            .field("views", &self.views.len())
            .finish()
    }
}
