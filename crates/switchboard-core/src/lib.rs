//! # Switchboard Core
//!
//! The in-process service registry every Switchboard module is wired through.
//!
//! ## Building Blocks
//!
//! - **Identity**: registry-minted [`ServiceId`]s
//! - **Attributes**: [`Entry`] tags with per-field wildcards, plus the
//!   standard [`Name`], [`ServiceInfo`] and [`Comment`] entries
//! - **Capabilities**: [`Capability`] types and the opaque [`ServiceObject`]
//!   handle that exposes them
//! - **Records**: [`ServiceItem`] and the query-by-example [`ServiceTemplate`]
//! - **Registry**: [`ServiceLookup`] with its [`ServiceRegistration`] and
//!   [`EventRegistration`] handles
//! - **Tracking**: [`ServiceTracker`] turning transitions into add/remove calls
//!
//! ## Transitions
//!
//! A subscription is told when an item's match state against its template
//! changes:
//!
//! ```text
//!            register / set_attributes
//!   NOMATCH ───────────────────────────▶ MATCH      NOMATCH_MATCH
//!   MATCH   ───────────────────────────▶ NOMATCH    MATCH_NOMATCH
//!   MATCH   ───────────────────────────▶ MATCH      MATCH_MATCH
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use switchboard_core::{ServiceItem, ServiceLookup, ServiceObject, ServiceTemplate};
//!
//! trait Clock: Send + Sync {
//!     fn now(&self) -> u64;
//! }
//!
//! struct SystemClock;
//!
//! impl Clock for SystemClock {
//!     fn now(&self) -> u64 {
//!         0
//!     }
//! }
//!
//! let lookup = ServiceLookup::new();
//! let clock = Arc::new(SystemClock);
//! let registration = lookup.register(ServiceItem::new(
//!     ServiceObject::new(clock.clone()).with::<dyn Clock>(clock),
//! ))?;
//!
//! let found: Arc<dyn Clock> = lookup.lookup_service::<dyn Clock>().unwrap();
//! registration.cancel();
//! ```

pub mod capability;
pub mod entry;
pub mod error;
pub mod event;
pub mod id;
pub mod item;
pub mod lookup;
pub mod tracker;

pub use capability::{Capability, ServiceObject};
pub use entry::{
    AttrValue, COMMENT_ENTRY, Comment, Entry, NAME_ENTRY, Name, SERVICE_INFO_ENTRY, ServiceInfo,
};
pub use error::{LookupError, LookupResult, NotifyError};
pub use event::{ServiceEvent, ServiceEventListener, Transitions};
pub use id::ServiceId;
pub use item::{ServiceItem, ServiceTemplate};
pub use lookup::{EventRegistration, ServiceLookup, ServiceMatches, ServiceRegistration};
pub use tracker::{ServiceTracker, TrackerCallback};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        Capability, Entry, Name, ServiceEvent, ServiceItem, ServiceLookup, ServiceObject,
        ServiceTemplate, TrackerCallback, Transitions,
    };
}
