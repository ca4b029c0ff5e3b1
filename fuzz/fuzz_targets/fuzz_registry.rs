#![no_main]

//! Fuzz target for registry lookups and location
//!
//! Drives `set`, `get`, `has`, `locate` and `handle` with arbitrary keys and
//! paths against an application with one pack, checking that bound keys stay
//! bound and that first registration wins.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use singular::{
    Application, Bytes, Call, ControllerMarker, Entry, FromPack, Lifetime, Manifest, Method, Pack,
    PackModule, Request, Response, Result, RouteMarker, SingularError, TypeBuilder,
};
use std::collections::HashSet;
use std::sync::Arc;

struct Thing;

impl FromPack for Thing {
    fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
        Ok(Thing)
    }
}

impl Thing {
    fn show(&self, call: &Call<'_>) -> Result<Response> {
        let id: String = call.param("id")?;
        Ok(Response::new(Bytes::from(id)))
    }
}

struct Fuzz;

impl PackModule for Fuzz {
    fn pack(&self) -> Pack {
        Pack::new("fz", "Fz", "/nonexistent")
    }

    fn manifest(&self, manifest: &mut Manifest) {
        manifest
            .define(TypeBuilder::<Thing>::new("Service::Thing").service(Lifetime::Shared))
            .define(
                TypeBuilder::<Thing>::new("Controller::Thing")
                    .controller(ControllerMarker::new())
                    .method(
                        Method::handler("show", Thing::show)
                            .param("id")
                            .route(RouteMarker::get()),
                    ),
            );
    }
}

#[derive(Debug, Arbitrary)]
enum Op {
    Set(String, u32),
    Get(String),
    Has(String),
    Locate(String),
    Handle(String),
    Alias(String, String),
}

fuzz_target!(|ops: Vec<Op>| {
    let app = Application::new();
    app.register_pack(Fuzz).unwrap();

    let mut bound: HashSet<String> = HashSet::new();

    for op in ops {
        match op {
            Op::Set(key, value) => match app.set(key.clone(), Entry::value(value)) {
                Ok(()) => assert!(bound.insert(key)),
                Err(SingularError::AlreadyRegistered { .. }) => assert!(app.has(&key)),
                Err(err) => panic!("unexpected set error: {err}"),
            },
            Op::Get(key) => {
                let _ = app.get(&key);
            }
            Op::Has(key) => {
                if bound.contains(&key) {
                    assert!(app.has(&key));
                }
            }
            Op::Locate(key) => {
                let _ = app.locate(&key);
            }
            Op::Handle(path) => {
                let mut request = Request::new(Bytes::new());
                if let Ok(uri) = path.parse() {
                    *request.uri_mut() = uri;
                    let _ = app.handle(&request);
                }
            }
            Op::Alias(from, to) => app.alias(from, to),
        }
    }

    for key in &bound {
        assert!(app.has(key));
    }
});
