//! Procedural macros for the Switchboard server.
//!
//! Plugin manifests name their implementation by class name. These
//! attributes add a constructor to the host's link-time plugin catalog under
//! that name:
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! #[export_module("org.example.muc")]
//! fn muc() -> Arc<MucModule> {
//!     MucModule::new()
//! }
//!
//! #[export_plugin("org.example.motd")]
//! fn motd() -> Arc<MotdPlugin> {
//!     Arc::new(MotdPlugin::default())
//! }
//! ```
//!
//! The decorated function must take no arguments and return an `Arc` of a
//! type implementing `Module` (for `export_module`) or `Plugin` (for
//! `export_plugin`).

mod export;

use proc_macro::TokenStream;

use export::Kind;

/// Adds a `Module` constructor to the plugin catalog.
#[proc_macro_attribute]
pub fn export_module(attr: TokenStream, item: TokenStream) -> TokenStream {
    export::export(Kind::Module, attr, item)
}

/// Adds a `Plugin` constructor to the plugin catalog.
#[proc_macro_attribute]
pub fn export_plugin(attr: TokenStream, item: TokenStream) -> TokenStream {
    export::export(Kind::Plugin, attr, item)
}
