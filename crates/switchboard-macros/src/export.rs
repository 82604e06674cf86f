use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Ident, ItemFn, LitStr, parse_macro_input};

/// Which `PluginInstance` variant the constructor feeds.
#[derive(Clone, Copy)]
pub enum Kind {
    Module,
    Plugin,
}

/// Implementation of `#[export_module("..")]` and `#[export_plugin("..")]`.
///
/// Leaves the decorated constructor unchanged and appends a
/// `#[::switchboard_runtime::linkme::distributed_slice]` static that adds it
/// to `PLUGIN_CLASSES` under the given class name.
pub fn export(kind: Kind, attr: TokenStream, item: TokenStream) -> TokenStream {
    let class_name = parse_macro_input!(attr as LitStr);
    let func = parse_macro_input!(item as ItemFn);

    if !func.sig.inputs.is_empty() {
        return syn::Error::new_spanned(
            &func.sig.inputs,
            "plugin class constructors must not take arguments",
        )
        .into_compile_error()
        .into();
    }
    if class_name.value().trim().is_empty() {
        return syn::Error::new(class_name.span(), "plugin class name must not be empty")
            .into_compile_error()
            .into();
    }

    let fn_name = &func.sig.ident;
    let fn_name_upper = fn_name.to_string().to_uppercase();
    let static_name = Ident::new(
        &format!("_PLUGIN_CLASS_{fn_name_upper}"),
        Span::call_site(),
    );

    let variant = match kind {
        Kind::Module => quote!(Module),
        Kind::Plugin => quote!(Plugin),
    };

    quote! {
        #func

        #[::switchboard_runtime::linkme::distributed_slice(::switchboard_runtime::PLUGIN_CLASSES)]
        #[linkme(crate = ::switchboard_runtime::linkme)]
        static #static_name: ::switchboard_runtime::PluginClass = ::switchboard_runtime::PluginClass {
            name: #class_name,
            create: || ::switchboard_runtime::PluginInstance::#variant(#fn_name()),
        };
    }
    .into()
}
