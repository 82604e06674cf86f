//! Typed dependency slots.
//!
//! A slot receives services discovered by a module's tracker. The two
//! built-in slots cover the common shapes:
//!
//! - [`Dependency`] holds at most one service;
//! - [`Dependencies`] holds every matching service.
//!
//! Both are cheap handles: the module keeps one clone to read from and hands
//! another to its [`TrackInfo`](crate::TrackInfo). Anything else can be wired
//! through a custom [`Injector`] or [`FnInjector`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use switchboard_core::ServiceObject;

/// Receives and releases discovered services.
pub trait Injector: Send + Sync {
    /// Delivers a newly matching service.
    fn inject(&self, service: &ServiceObject) -> Result<(), String>;

    /// Withdraws a service that no longer matches.
    fn eject(&self, service: &ServiceObject) -> Result<(), String>;

    /// Drops everything the slot holds. Called when the module stops.
    fn clear(&self) {}
}

fn missing_view<T: ?Sized>() -> String {
    format!("service does not expose {}", std::any::type_name::<T>())
}

// =============================================================================
// Dependency
// =============================================================================

/// Slot holding a single service of capability `T`.
pub struct Dependency<T: ?Sized> {
    current: Arc<RwLock<Option<Arc<T>>>>,
}

impl<T: ?Sized> Dependency<T> {
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns the wired service, if any.
    pub fn get(&self) -> Option<Arc<T>> {
        self.current.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.current.read().is_some()
    }
}

impl<T: ?Sized> Default for Dependency<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for Dependency<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Dependency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("type", &std::any::type_name::<T>())
            .field("set", &self.is_set())
            .finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Injector for Dependency<T> {
    fn inject(&self, service: &ServiceObject) -> Result<(), String> {
        let view = service.get::<T>().ok_or_else(missing_view::<T>)?;
        *self.current.write() = Some(view);
        Ok(())
    }

    fn eject(&self, service: &ServiceObject) -> Result<(), String> {
        let view = service.get::<T>().ok_or_else(missing_view::<T>)?;
        let mut current = self.current.write();
        // A newer service may have replaced the departing one.
        if current.as_ref().is_some_and(|held| Arc::ptr_eq(held, &view)) {
            *current = None;
        }
        Ok(())
    }

    fn clear(&self) {
        *self.current.write() = None;
    }
}

// =============================================================================
// Dependencies
// =============================================================================

/// Slot holding every service of capability `T`.
pub struct Dependencies<T: ?Sized> {
    current: Arc<RwLock<Vec<Arc<T>>>>,
}

impl<T: ?Sized> Dependencies<T> {
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Snapshot of the wired services in discovery order.
    pub fn get(&self) -> Vec<Arc<T>> {
        self.current.read().clone()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}

impl<T: ?Sized> Default for Dependencies<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for Dependencies<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Dependencies<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("type", &std::any::type_name::<T>())
            .field("len", &self.len())
            .finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Injector for Dependencies<T> {
    fn inject(&self, service: &ServiceObject) -> Result<(), String> {
        let view = service.get::<T>().ok_or_else(missing_view::<T>)?;
        let mut current = self.current.write();
        // The tracker may announce the same service twice.
        if !current.iter().any(|held| Arc::ptr_eq(held, &view)) {
            current.push(view);
        }
        Ok(())
    }

    fn eject(&self, service: &ServiceObject) -> Result<(), String> {
        let view = service.get::<T>().ok_or_else(missing_view::<T>)?;
        self.current.write().retain(|held| !Arc::ptr_eq(held, &view));
        Ok(())
    }

    fn clear(&self) {
        self.current.write().clear();
    }
}

// =============================================================================
// FnInjector
// =============================================================================

/// Injector built from a pair of closures over the typed service.
pub struct FnInjector<T: ?Sized, A, R> {
    add: A,
    remove: R,
    _marker: PhantomData<fn(&T)>,
}

impl<T, A, R> FnInjector<T, A, R>
where
    T: ?Sized + Send + Sync + 'static,
    A: Fn(Arc<T>) + Send + Sync,
    R: Fn(Arc<T>) + Send + Sync,
{
    pub fn new(add: A, remove: R) -> Self {
        Self {
            add,
            remove,
            _marker: PhantomData,
        }
    }
}

impl<T, A, R> Injector for FnInjector<T, A, R>
where
    T: ?Sized + Send + Sync + 'static,
    A: Fn(Arc<T>) + Send + Sync,
    R: Fn(Arc<T>) + Send + Sync,
{
    fn inject(&self, service: &ServiceObject) -> Result<(), String> {
        let view = service.get::<T>().ok_or_else(missing_view::<T>)?;
        (self.add)(view);
        Ok(())
    }

    fn eject(&self, service: &ServiceObject) -> Result<(), String> {
        let view = service.get::<T>().ok_or_else(missing_view::<T>)?;
        (self.remove)(view);
        Ok(())
    }
}

/// Accepts any service without storing it.
pub(crate) struct Presence;

impl Injector for Presence {
    fn inject(&self, _: &ServiceObject) -> Result<(), String> {
        Ok(())
    }

    fn eject(&self, _: &ServiceObject) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Store: Send + Sync {
        fn label(&self) -> &str;
    }

    struct Memory(&'static str);

    impl Store for Memory {
        fn label(&self) -> &str {
            self.0
        }
    }

    fn store(label: &'static str) -> ServiceObject {
        let svc = Arc::new(Memory(label));
        ServiceObject::new(svc.clone()).with::<dyn Store>(svc)
    }

    #[test]
    fn test_dependency_keeps_newest() {
        let slot: Dependency<dyn Store> = Dependency::new();
        let a = store("a");
        let b = store("b");
        slot.inject(&a).unwrap();
        slot.inject(&b).unwrap();
        slot.eject(&a).unwrap();
        assert_eq!(slot.get().unwrap().label(), "b");
        slot.eject(&b).unwrap();
        assert!(!slot.is_set());
    }

    #[test]
    fn test_dependencies_ignore_repeats() {
        let slot: Dependencies<dyn Store> = Dependencies::new();
        let a = store("a");
        slot.inject(&a).unwrap();
        slot.inject(&a).unwrap();
        slot.inject(&store("b")).unwrap();
        assert_eq!(slot.len(), 2);
        slot.eject(&a).unwrap();
        assert_eq!(slot.get()[0].label(), "b");
    }

    #[test]
    fn test_wrong_view_is_reported() {
        let slot: Dependency<dyn Store> = Dependency::new();
        let err = slot.inject(&ServiceObject::new(Arc::new(7u32))).unwrap_err();
        assert!(err.contains("Store"));
    }

    #[test]
    fn test_fn_injector() {
        let seen = Arc::new(RwLock::new(Vec::new()));
        let (add, remove) = (Arc::clone(&seen), Arc::clone(&seen));
        let injector = FnInjector::<dyn Store, _, _>::new(
            move |s: Arc<dyn Store>| add.write().push(format!("+{}", s.label())),
            move |s: Arc<dyn Store>| remove.write().push(format!("-{}", s.label())),
        );
        let a = store("a");
        injector.inject(&a).unwrap();
        injector.eject(&a).unwrap();
        assert_eq!(*seen.read(), vec!["+a".to_string(), "-a".to_string()]);
    }
}
