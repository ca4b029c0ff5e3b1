//! # Singular - Lazy Service and Route Resolution for Modular Web Apps
//!
//! Packs (feature modules) describe their services and controllers with
//! markers. Nothing is registered up front: the first lookup of a key, or the
//! first request for a controller path, turns the key back into a type by
//! naming convention and wires it into the application.
//!
//! ## Features
//!
//! - **Convention over registration** - `shop.service.cart_item` resolves `Shop::Service::CartItem`
//! - **Three lifetimes** - per-call factories, shared singletons and deferred callables
//! - **Route synthesis** - patterns derived from handler signatures, verb sets, names
//! - **Filter chains** - class-level then method-level before/after filters, resolved once
//! - **Converters, assertions and defaults** - per path parameter
//! - **Lock-free registry** - `DashMap` slots, first registration wins
//! - **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use singular::{
//!     Application, Call, ControllerMarker, FromPack, Lifetime, Manifest, Method, Pack,
//!     PackModule, Request, Response, Result, RouteMarker, TypeBuilder,
//! };
//! use std::sync::Arc;
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! impl FromPack for Greeter {
//!     fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
//!         Ok(Greeter { greeting: "hello".into() })
//!     }
//! }
//!
//! struct Hello;
//!
//! impl FromPack for Hello {
//!     fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
//!         Ok(Hello)
//!     }
//! }
//!
//! impl Hello {
//!     fn greet(&self, call: &Call<'_>) -> Result<Response> {
//!         let greeter = call.app().get_as::<Greeter>("site.service.greeter")?;
//!         let name: String = call.param("name")?;
//!         Ok(Response::new(format!("{} {name}", greeter.greeting).into()))
//!     }
//! }
//!
//! struct Site;
//!
//! impl PackModule for Site {
//!     fn pack(&self) -> Pack {
//!         Pack::new("site", "Site", "/srv/site")
//!     }
//!
//!     fn manifest(&self, manifest: &mut Manifest) {
//!         manifest
//!             .define(TypeBuilder::<Greeter>::new("Service::Greeter").service(Lifetime::Shared))
//!             .define(
//!                 TypeBuilder::<Hello>::new("Controller::Hello")
//!                     .controller(ControllerMarker::new())
//!                     .method(
//!                         Method::handler("greet", Hello::greet)
//!                             .param("name")
//!                             .route(RouteMarker::get()),
//!                     ),
//!             );
//!     }
//! }
//!
//! let app = Application::new();
//! app.register_pack(Site).unwrap();
//!
//! let mut request = Request::new(Default::default());
//! *request.uri_mut() = "/site/hello/greet/world".parse().unwrap();
//!
//! let response = app.handle(&request).unwrap();
//! assert_eq!(response.body().as_ref(), b"hello world");
//! ```
//!
//! ## Registry Entries
//!
//! ```rust
//! use singular::{Application, Entry};
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! static COUNTER: AtomicU64 = AtomicU64::new(0);
//!
//! let app = Application::new();
//!
//! // Resolved value
//! app.set("site.name", Entry::value(String::from("demo"))).unwrap();
//!
//! // Shared - built on first lookup, then cached
//! app.set("site.db", Entry::shared(|_app| Ok(String::from("postgres://localhost")))).unwrap();
//!
//! // Factory - new instance every lookup
//! let next_id = |_app: &Application| -> singular::Result<u64> {
//!     Ok(COUNTER.fetch_add(1, Ordering::SeqCst))
//! };
//! app.set("site.request_id", Entry::factory(next_id)).unwrap();
//!
//! let a = app.get("site.db").unwrap();
//! let b = app.get("site.db").unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! ```

mod application;
mod catalog;
mod codec;
mod config;
mod controller_locator;
mod dispatch;
mod error;
mod factory;
#[cfg(test)]
mod fixtures;
mod locator;
#[cfg(feature = "logging")]
pub mod logging;
mod metadata;
mod pack;
mod register;
mod registry;
pub mod resolver;
mod routing;
mod storage;

pub use application::Application;
pub use catalog::{
    ConstructFn, Describe, FieldDescriptor, FromPack, Instance, Manifest, Method, MethodBody,
    MethodDescriptor, Methods, TypeBuilder, TypeCatalog, TypeDescriptor,
};
pub use codec::{AliasMap, IdentifierCodec, PATH_SEPARATOR};
pub use config::{LocatorTrigger, SingularConfig};
pub use controller_locator::{ControllerLocator, CONTROLLER_SEGMENT};
pub use dispatch::Dispatcher;
pub use error::*;
pub use factory::{Deferred, Entry, FactoryFn, SharedFactory};
pub use locator::{Located, ServiceLocator};
pub use metadata::{
    AssertSpec, ClassMarker, ControllerMarker, ConvertSpec, DefaultSpec, FieldMarker, FilterKind,
    FilterMarker, Lifetime, MetadataReader, MethodMarker, ParamDescriptor, ParamKind, RouteMarker,
    ServiceMarker,
};
pub use pack::{Pack, PackModule, Resolution};
pub use register::{EagerRegister, RegisterReport};
pub use registry::ServiceRegistry;
pub use resolver::Resolver;
pub use routing::{
    join_pattern, Assertion, Call, FilterRef, Request, Response, RouteBinding, RouteParams,
    RouteTable,
};
pub use storage::{RegistryStorage, Slot};

// Re-exported for handler signatures and the derive macros
pub use bytes::Bytes;
pub use http;
pub use serde_json::Value;

#[cfg(feature = "derive")]
pub use singular_derive::{controller, methods, Service};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Application, Call, ControllerMarker, Entry, FromPack, Lifetime, Manifest, Method, Pack,
        PackModule, Request, Resolution, Response, Result, RouteMarker, SingularError, TypeBuilder,
        Value,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{request, shop_app};
    use http::Method as HttpMethod;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    #[test]
    fn test_shared_entry_built_once_across_threads() {
        static BUILT: AtomicU32 = AtomicU32::new(0);

        let app = Application::new();
        app.set(
            "site.db",
            Entry::shared(|_app| {
                BUILT.fetch_add(1, Ordering::SeqCst);
                Ok(String::from("db"))
            }),
        )
        .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let app = app.clone();
                thread::spawn(move || app.get_as::<String>("site.db").unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_str(), "db");
        }
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_requests_route_once() {
        let (app, _) = shop_app();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let app = app.clone();
                thread::spawn(move || {
                    let path = format!("/shop/user_account/edit/{}", i + 1);
                    app.handle(&request(HttpMethod::GET, &path)).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().status(), http::StatusCode::OK);
        }

        let names: Vec<_> = app.routes().snapshot().iter().map(|r| r.name().to_string()).collect();
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(names.len(), unique.len());
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_lookup_chain_through_handler() {
        let (app, _) = shop_app();
        let response = app.handle(&request(HttpMethod::GET, "/shop/user_account/list/2")).unwrap();
        assert_eq!(response.body().as_ref(), b"page 2 of 20");
        assert!(app.has("shop.service.pager"));
        assert!(app.has("shop.service.pager.per_page"));
    }
}
