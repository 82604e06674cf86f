//! Published records and query-by-example templates.

use crate::capability::{Capability, ServiceObject};
use crate::entry::Entry;
use crate::id::ServiceId;

/// A service as stored in the registry.
#[derive(Debug, Clone)]
pub struct ServiceItem {
    /// Set by the registry on first registration.
    pub service_id: Option<ServiceId>,
    pub service: ServiceObject,
    pub attributes: Vec<Entry>,
}

impl ServiceItem {
    /// Creates an unregistered item with no attributes.
    pub fn new(service: ServiceObject) -> Self {
        Self {
            service_id: None,
            service,
            attributes: Vec::new(),
        }
    }

    /// Appends an attribute.
    pub fn with_attribute(mut self, entry: impl Into<Entry>) -> Self {
        self.attributes.push(entry.into());
        self
    }
}

/// A query pattern.
///
/// Every `None` means "don't care". A template with all three fields unset
/// matches every item.
#[derive(Debug, Clone, Default)]
pub struct ServiceTemplate {
    pub service_id: Option<ServiceId>,
    pub types: Option<Vec<Capability>>,
    pub attributes: Option<Vec<Entry>>,
}

impl ServiceTemplate {
    /// A template matching every item.
    pub fn any() -> Self {
        Self::default()
    }

    /// A template matching items exposing capability `C`.
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self::any().with_type(Capability::of::<C>())
    }

    /// A template matching exactly the item with `id`.
    pub fn by_id(id: ServiceId) -> Self {
        Self {
            service_id: Some(id),
            ..Self::default()
        }
    }

    /// Requires an additional capability.
    pub fn with_type(mut self, capability: Capability) -> Self {
        self.types.get_or_insert_with(Vec::new).push(capability);
        self
    }

    /// Requires an additional attribute.
    pub fn with_attribute(mut self, entry: impl Into<Entry>) -> Self {
        self.attributes.get_or_insert_with(Vec::new).push(entry.into());
        self
    }

    /// Builds the template that selects `item` by every field it carries.
    pub fn from_item(item: &ServiceItem) -> Self {
        Self {
            service_id: item.service_id.clone(),
            types: Some(vec![item.service.primary()]),
            attributes: Some(item.attributes.clone()),
        }
    }

    /// Returns `true` when `item` satisfies this template.
    ///
    /// - the IDs agree, if the template carries one;
    /// - the item exposes every required capability;
    /// - every template entry is matched by some item entry.
    pub fn matches(&self, item: &ServiceItem) -> bool {
        let id_ok = match &self.service_id {
            Some(id) => item.service_id.as_ref() == Some(id),
            None => true,
        };

        let types_ok = self
            .types
            .as_ref()
            .is_none_or(|types| types.iter().all(|t| item.service.satisfies(t)));

        let attributes_ok = self.attributes.as_ref().is_none_or(|attributes| {
            attributes
                .iter()
                .all(|te| item.attributes.iter().any(|ie| te.matches(ie)))
        });

        id_ok && types_ok && attributes_ok
    }
}
