//! Marker macros for singular
//!
//! These macros are the build step that turns plain Rust items into the
//! marker descriptors the resolvers read:
//!
//! - `#[derive(Service)]` - service marker and parameter fields
//! - `#[controller(...)]` - controller marker plus the method table of an `impl` block
//! - `#[methods]` - method table only, for services exporting converters or filters
//!
//! # Service Example
//!
//! ```rust,ignore
//! use singular::{Service, methods, Result, Value};
//!
//! #[derive(Default, Service)]
//! #[service(shared, default, methods)]
//! #[parameter(per_page = 20)]
//! struct Pager;
//!
//! #[methods]
//! impl Pager {
//!     fn page(&self, raw: &str) -> Result<Value> {
//!         raw.parse::<u64>()
//!             .map(Value::from)
//!             .map_err(|e| singular::SingularError::conversion_failed("page", e))
//!     }
//! }
//! ```
//!
//! # Controller Example
//!
//! ```rust,ignore
//! use singular::{controller, Request, Response, Result};
//!
//! #[derive(Default)]
//! struct Orders;
//!
//! #[controller(default, before(check_auth))]
//! impl Orders {
//!     #[route(get)]
//!     #[assert(id = r"\d+")]
//!     fn show(&self, request: &Request, id: u64) -> Result<Response> {
//!         Ok(Response::new(format!("order {id}").into()))
//!     }
//!
//!     // exported as a before filter by signature
//!     fn check_auth(&self, _request: &Request) -> Result<Option<Response>> {
//!         Ok(None)
//!     }
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Expr, FnArg, Ident, ImplItem, ImplItemFn,
    ItemImpl, LitStr, Pat, ReturnType, Token, Type,
};

// =============================================================================
// Service Derive Macro
// =============================================================================

/// Derive the service marker.
///
/// # Attributes
///
/// - `#[service(shared)]`, `#[service(factory)]`, `#[service(deferred)]` - lifetime
///   (`shared` when omitted)
/// - `#[service(default)]` - construct through `Default` instead of a
///   hand-written `FromPack`
/// - `#[service(methods)]` - include the method table generated by `#[methods]`
/// - `#[parameter(name = <expr>, ...)]` - expose `<service key>.<name>`; the
///   expression is evaluated on every lookup
///
/// # Generated Code
///
/// ```rust,ignore
/// impl singular::Describe for Pager {
///     fn describe(builder: TypeBuilder<Self>) -> TypeBuilder<Self> {
///         builder
///             .service(Lifetime::Shared)
///             .parameter("per_page", || Value::from(20))
///     }
/// }
/// ```
#[proc_macro_derive(Service, attributes(service, parameter))]
pub fn derive_service(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_service(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct ServiceArgs {
    lifetime: Ident,
    default: bool,
    methods: bool,
}

fn expand_service(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !matches!(input.data, Data::Struct(_)) {
        return Err(syn::Error::new_spanned(
            input,
            "Service can only be derived for structs",
        ));
    }

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let args = service_args(&input.attrs)?;
    let lifetime = &args.lifetime;

    let mut parameters = Vec::new();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("parameter")) {
        for (param, value) in name_values(attr)? {
            parameters.push(quote! {
                .parameter(#param, || ::singular::Value::from(#value))
            });
        }
    }

    let methods = args.methods.then(|| {
        quote! { let builder = <Self as ::singular::Methods>::methods(builder); }
    });

    let from_pack = args
        .default
        .then(|| default_from_pack(quote! { #name #ty_generics }, &input.generics));

    Ok(quote! {
        #from_pack

        impl #impl_generics ::singular::Describe for #name #ty_generics #where_clause {
            fn describe(builder: ::singular::TypeBuilder<Self>) -> ::singular::TypeBuilder<Self> {
                #methods
                builder
                    .service(::singular::Lifetime::#lifetime)
                    #(#parameters)*
            }
        }
    })
}

fn service_args(attrs: &[Attribute]) -> syn::Result<ServiceArgs> {
    let mut args = ServiceArgs {
        lifetime: format_ident!("Shared"),
        default: false,
        methods: false,
    };

    for attr in attrs.iter().filter(|a| a.path().is_ident("service")) {
        if attr.meta.require_path_only().is_ok() {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let lifetime = if meta.path.is_ident("shared") {
                "Shared"
            } else if meta.path.is_ident("factory") {
                "Factory"
            } else if meta.path.is_ident("deferred") || meta.path.is_ident("protected") {
                "Deferred"
            } else if meta.path.is_ident("default") {
                args.default = true;
                return Ok(());
            } else if meta.path.is_ident("methods") {
                args.methods = true;
                return Ok(());
            } else {
                return Err(meta.error(
                    "expected `shared`, `factory`, `deferred`, `default` or `methods`",
                ));
            };
            args.lifetime = format_ident!("{}", lifetime);
            Ok(())
        })?;
    }

    Ok(args)
}

fn default_from_pack(self_ty: TokenStream2, generics: &syn::Generics) -> TokenStream2 {
    let (impl_generics, _, where_clause) = generics.split_for_impl();
    quote! {
        impl #impl_generics ::singular::FromPack for #self_ty #where_clause {
            fn from_pack(
                _app: &::singular::Application,
                _pack: &::std::sync::Arc<::singular::Pack>,
            ) -> ::singular::Result<Self> {
                Ok(::std::default::Default::default())
            }
        }
    }
}

// =============================================================================
// Method Table Attributes
// =============================================================================

/// Mark an `impl` block as a controller and export its methods.
///
/// # Arguments
///
/// - `mount = "/path"` - mount prefix (default `<pack>/<controller>`)
/// - `before(a, "service.key:method")`, `after(...)` - class-level filters
/// - `default` - construct through `Default`
///
/// # Method Attributes
///
/// - `#[route(get, post, pattern = "/x/{id}", name = "x.show")]`
/// - `#[before(...)]`, `#[after(...)]` - method-level filters
/// - `#[convert(param = "service.key:method")]`
/// - `#[assert(param = r"\d+")]`
/// - `#[value(param = <expr>)]`
///
/// Route handler arguments typed `&Request` or `&Application` are injected;
/// every other argument is a path value read with `Call::param`. Unmarked
/// methods taking `(&Request)`, `(&Request, &mut Response)` or `(&str)` are
/// exported as before filters, after filters and converters.
#[proc_macro_attribute]
pub fn controller(args: TokenStream, item: TokenStream) -> TokenStream {
    let mut controller = ControllerArgs::default();
    let parser = syn::meta::parser(|meta| controller.parse(meta));
    parse_macro_input!(args with parser);

    let item = parse_macro_input!(item as ItemImpl);
    match expand_methods(item, Some(controller)) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Export the methods of an `impl` block without a controller marker.
///
/// Pair with `#[service(methods)]`.
#[proc_macro_attribute]
pub fn methods(args: TokenStream, item: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return syn::Error::new(Span::call_site(), "`#[methods]` takes no arguments")
            .to_compile_error()
            .into();
    }

    let item = parse_macro_input!(item as ItemImpl);
    match expand_methods(item, None) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct ControllerArgs {
    mount: Option<LitStr>,
    before: Vec<LitStr>,
    after: Vec<LitStr>,
    default: bool,
}

impl ControllerArgs {
    fn parse(&mut self, meta: syn::meta::ParseNestedMeta<'_>) -> syn::Result<()> {
        if meta.path.is_ident("mount") {
            self.mount = Some(meta.value()?.parse()?);
        } else if meta.path.is_ident("before") {
            self.before.extend(filter_list(meta.input)?);
        } else if meta.path.is_ident("after") {
            self.after.extend(filter_list(meta.input)?);
        } else if meta.path.is_ident("default") {
            self.default = true;
        } else {
            return Err(meta.error("expected `mount`, `before`, `after` or `default`"));
        }
        Ok(())
    }

    fn marker(&self) -> TokenStream2 {
        let mount = self.mount.as_ref().map(|m| quote! { .mount(#m) });
        let before = (!self.before.is_empty()).then(|| {
            let refs = &self.before;
            quote! { .before([#(#refs),*]) }
        });
        let after = (!self.after.is_empty()).then(|| {
            let refs = &self.after;
            quote! { .after([#(#refs),*]) }
        });
        quote! {
            ::singular::ControllerMarker::new() #mount #before #after
        }
    }
}

/// A filter reference: a bare method name or a `"service.key:method"` string
struct FilterRef(LitStr);

impl Parse for FilterRef {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitStr) {
            return Ok(Self(input.parse()?));
        }
        let ident: Ident = input.parse()?;
        Ok(Self(LitStr::new(&ident.to_string(), ident.span())))
    }
}

fn filter_list(input: ParseStream) -> syn::Result<Vec<LitStr>> {
    let content;
    syn::parenthesized!(content in input);
    let refs = Punctuated::<FilterRef, Token![,]>::parse_terminated(&content)?;
    Ok(refs.into_iter().map(|r| r.0).collect())
}

fn filter_args(attr: &Attribute) -> syn::Result<Vec<LitStr>> {
    let refs = attr.parse_args_with(Punctuated::<FilterRef, Token![,]>::parse_terminated)?;
    Ok(refs.into_iter().map(|r| r.0).collect())
}

/// `name = <expr>` pairs, names turned into string literals
fn name_values(attr: &Attribute) -> syn::Result<Vec<(LitStr, Expr)>> {
    let pairs =
        attr.parse_args_with(Punctuated::<syn::MetaNameValue, Token![,]>::parse_terminated)?;
    pairs
        .into_iter()
        .map(|nv| {
            let ident = nv
                .path
                .get_ident()
                .ok_or_else(|| syn::Error::new_spanned(&nv.path, "expected a parameter name"))?;
            Ok((LitStr::new(&ident.to_string(), ident.span()), nv.value))
        })
        .collect()
}

fn expand_methods(
    mut item: ItemImpl,
    controller: Option<ControllerArgs>,
) -> syn::Result<TokenStream2> {
    if item.trait_.is_some() {
        return Err(syn::Error::new_spanned(
            &item.self_ty,
            "method tables are exported from inherent impl blocks only",
        ));
    }

    let self_ty = item.self_ty.clone();
    let mut exported = Vec::new();
    for impl_item in item.items.iter_mut() {
        if let ImplItem::Fn(method) = impl_item {
            if let Some(tokens) = export_method(method)? {
                exported.push(tokens);
            }
        }
    }

    let (impl_generics, _, where_clause) = item.generics.split_for_impl();

    let describe = controller.as_ref().map(|args| {
        let marker = args.marker();
        quote! {
            impl #impl_generics ::singular::Describe for #self_ty #where_clause {
                fn describe(builder: ::singular::TypeBuilder<Self>) -> ::singular::TypeBuilder<Self> {
                    <Self as ::singular::Methods>::methods(builder.controller(#marker))
                }
            }
        }
    });

    let from_pack = controller
        .as_ref()
        .filter(|args| args.default)
        .map(|_| default_from_pack(quote! { #self_ty }, &item.generics));

    Ok(quote! {
        #item

        impl #impl_generics ::singular::Methods for #self_ty #where_clause {
            fn methods(builder: ::singular::TypeBuilder<Self>) -> ::singular::TypeBuilder<Self> {
                builder #(#exported)*
            }
        }

        #describe
        #from_pack
    })
}

enum ArgKind {
    Request,
    Application,
    Response,
    Str,
    Path(Box<Type>),
}

fn arg_kind(ty: &Type) -> ArgKind {
    if let Type::Reference(reference) = ty {
        let last = match &*reference.elem {
            Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
            _ => None,
        };
        match (last.as_deref(), reference.mutability.is_some()) {
            (Some("Request"), false) => return ArgKind::Request,
            (Some("Application"), false) => return ArgKind::Application,
            (Some("Response"), true) => return ArgKind::Response,
            (Some("str"), false) => return ArgKind::Str,
            _ => {}
        }
    }
    ArgKind::Path(Box::new(ty.clone()))
}

fn verb(ident: &Ident) -> Option<Ident> {
    let upper = match ident.to_string().as_str() {
        "get" => "GET",
        "post" => "POST",
        "put" => "PUT",
        "patch" => "PATCH",
        "delete" => "DELETE",
        "head" => "HEAD",
        "options" => "OPTIONS",
        _ => return None,
    };
    Some(Ident::new(upper, ident.span()))
}

fn route_marker(attr: &Attribute) -> syn::Result<TokenStream2> {
    let mut verbs = Vec::new();
    let mut calls = Vec::new();
    if attr.meta.require_path_only().is_err() {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("pattern") {
                let value: LitStr = meta.value()?.parse()?;
                calls.push(quote! { .pattern(#value) });
            } else if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                calls.push(quote! { .name(#value) });
            } else if let Some(method) = meta.path.get_ident().and_then(verb) {
                verbs.push(method);
            } else {
                return Err(meta.error("expected an HTTP verb, `pattern` or `name`"));
            }
            Ok(())
        })?;
    }

    let verbs = (!verbs.is_empty()).then(|| {
        quote! { .methods([#(::singular::http::Method::#verbs),*]) }
    });
    Ok(quote! { ::singular::RouteMarker::new() #verbs #(#calls)* })
}

/// Strip marker attributes from `method` and build its `Method` registration
fn export_method(method: &mut ImplItemFn) -> syn::Result<Option<TokenStream2>> {
    let mut route = None;
    let mut markers = Vec::new();
    let mut kept = Vec::new();

    for attr in std::mem::take(&mut method.attrs) {
        let name = attr.path().get_ident().map(Ident::to_string);
        match name.as_deref() {
            Some("route") => route = Some(route_marker(&attr)?),
            Some("before") => {
                let refs = filter_args(&attr)?;
                markers.push(quote! { .before([#(#refs),*]) });
            }
            Some("after") => {
                let refs = filter_args(&attr)?;
                markers.push(quote! { .after([#(#refs),*]) });
            }
            Some("convert") => {
                for (param, function) in name_values(&attr)? {
                    markers.push(quote! { .convert(#param, #function) });
                }
            }
            Some("assert") => {
                for (param, expression) in name_values(&attr)? {
                    markers.push(quote! { .assert(#param, #expression) });
                }
            }
            Some("value") => {
                for (param, value) in name_values(&attr)? {
                    markers.push(quote! { .value(#param, ::singular::Value::from(#value)) });
                }
            }
            _ => kept.push(attr),
        }
    }
    method.attrs = kept;

    let marked = route.is_some() || !markers.is_empty();
    let fn_name = method.sig.ident.clone();
    let label = LitStr::new(&fn_name.to_string(), fn_name.span());

    let has_self_ref = matches!(
        method.sig.inputs.first(),
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none()
    );
    if !has_self_ref || method.sig.asyncness.is_some() || !method.sig.generics.params.is_empty() {
        if marked {
            return Err(syn::Error::new_spanned(
                &method.sig,
                "marked methods must be plain `fn(&self, ...)`",
            ));
        }
        return Ok(None);
    }

    let mut args = Vec::new();
    for input in method.sig.inputs.iter().skip(1) {
        let FnArg::Typed(typed) = input else { continue };
        let Pat::Ident(pat) = &*typed.pat else {
            return Err(syn::Error::new_spanned(
                &typed.pat,
                "method arguments must be plain identifiers",
            ));
        };
        args.push((pat.ident.clone(), arg_kind(&typed.ty)));
    }

    if let Some(route) = route {
        let mut declare = Vec::new();
        let mut pass = Vec::new();
        for (ident, kind) in args {
            let param = LitStr::new(&ident.to_string(), ident.span());
            match kind {
                ArgKind::Request => {
                    declare.push(quote! { .request(#param) });
                    pass.push(quote! { call.request() });
                }
                ArgKind::Application => {
                    declare.push(quote! { .application(#param) });
                    pass.push(quote! { call.app() });
                }
                ArgKind::Path(ty) => {
                    declare.push(quote! { .param(#param) });
                    pass.push(quote! { call.param::<#ty>(#param)? });
                }
                ArgKind::Str | ArgKind::Response => {
                    return Err(syn::Error::new_spanned(
                        &ident,
                        "route handlers take `&Request`, `&Application` or owned path values",
                    ));
                }
            }
        }

        let call = if pass.is_empty() {
            format_ident!("_call")
        } else {
            format_ident!("call")
        };

        return Ok(Some(quote! {
            .method(
                ::singular::Method::<Self>::handler(
                    #label,
                    |this: &Self, #call: &::singular::Call<'_>| this.#fn_name(#(#pass),*),
                )
                #(#declare)*
                .route(#route)
                #(#markers)*
            )
        }));
    }

    if marked {
        // markers without a route: declared only, never callable as a filter
        return Ok(Some(quote! {
            .method(::singular::Method::<Self>::opaque(#label) #(#markers)*)
        }));
    }

    let kinds: Vec<&ArgKind> = args.iter().map(|(_, kind)| kind).collect();
    let body = match kinds.as_slice() {
        [ArgKind::Request] if returns_option(&method.sig.output) => {
            quote! { ::singular::Method::<Self>::before_filter(#label, Self::#fn_name) }
        }
        [ArgKind::Request, ArgKind::Response] => {
            quote! { ::singular::Method::<Self>::after_filter(#label, Self::#fn_name) }
        }
        [ArgKind::Str] => {
            quote! { ::singular::Method::<Self>::converter(#label, Self::#fn_name) }
        }
        _ => return Ok(None),
    };

    Ok(Some(quote! { .method(#body) }))
}

/// Whether the return type mentions `Option` (before filters return `Result<Option<Response>>`)
fn returns_option(output: &ReturnType) -> bool {
    match output {
        ReturnType::Default => false,
        ReturnType::Type(_, ty) => quote! { #ty }.to_string().contains("Option"),
    }
}
