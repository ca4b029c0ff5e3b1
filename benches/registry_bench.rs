//! Benchmarks for lookup, location and dispatch

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use singular::{
    Application, Bytes, Call, ControllerMarker, Entry, FromPack, IdentifierCodec, Lifetime,
    Manifest, Method, Pack, PackModule, Request, Response, Result, RouteMarker, TypeBuilder,
};
use std::hint::black_box;
use std::sync::Arc;

struct Catalog;

impl FromPack for Catalog {
    fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
        Ok(Catalog)
    }
}

struct Products;

impl FromPack for Products {
    fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
        Ok(Products)
    }
}

impl Products {
    fn show(&self, call: &Call<'_>) -> Result<Response> {
        let id: u64 = call.param("id")?;
        Ok(Response::new(Bytes::from(id.to_string())))
    }
}

struct Store;

impl PackModule for Store {
    fn pack(&self) -> Pack {
        Pack::new("store", "Store", "/srv/store")
    }

    fn manifest(&self, manifest: &mut Manifest) {
        manifest
            .define(
                TypeBuilder::<Catalog>::new("Service::ProductCatalog").service(Lifetime::Shared),
            )
            .define(TypeBuilder::<Catalog>::new("Service::PriceList").service(Lifetime::Factory))
            .define(
                TypeBuilder::<Products>::new("Controller::Products")
                    .controller(ControllerMarker::new())
                    .method(
                        Method::handler("show", Products::show)
                            .param("id")
                            .route(RouteMarker::get())
                            .assert("id", r"\d+"),
                    ),
            );
    }
}

fn app() -> Application {
    let app = Application::new();
    app.register_pack(Store).unwrap();
    app
}

fn request(path: &str) -> Request {
    let mut request = Request::new(Bytes::new());
    *request.uri_mut() = path.parse().unwrap();
    request
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let codec = IdentifierCodec::plain();

    group.bench_function("to_type_name", |b| {
        b.iter(|| black_box(codec.to_type_name(black_box("admin::user_account_settings"), true)))
    });

    group.bench_function("to_key", |b| {
        b.iter(|| black_box(codec.to_key(black_box("Admin::UserAccountSettings"))))
    });

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(1));

    group.bench_function("value", |b| {
        let app = Application::new();
        app.set("site.name", Entry::value(String::from("bench"))).unwrap();
        b.iter(|| black_box(app.get("site.name")))
    });

    group.bench_function("shared_cached", |b| {
        let app = app();
        app.get("store.service.product_catalog").unwrap();
        b.iter(|| black_box(app.get("store.service.product_catalog")))
    });

    group.bench_function("factory", |b| {
        let app = app();
        app.get("store.service.price_list").unwrap();
        b.iter(|| black_box(app.get("store.service.price_list")))
    });

    group.bench_function("unknown_pack_miss", |b| {
        let app = app();
        b.iter(|| black_box(app.get("nowhere.service.thing").is_err()))
    });

    group.finish();
}

fn bench_locate(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate");

    group.bench_function("service_first_lookup", |b| {
        b.iter(|| {
            let app = app();
            black_box(app.get("store.service.product_catalog").unwrap())
        })
    });

    group.bench_function("controller_first_request", |b| {
        let req = request("/store/products/show/42");
        b.iter(|| {
            let app = app();
            black_box(app.handle(&req).unwrap())
        })
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    let app = app();
    let req = request("/store/products/show/42");
    app.handle(&req).unwrap();

    group.bench_function("routed", |b| b.iter(|| black_box(app.handle(&req).unwrap())));

    let miss = request("/store/products/show/abc");
    group.bench_function("assertion_miss", |b| {
        b.iter(|| black_box(app.handle(&miss).is_err()))
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_reads_4", |b| {
        let app = app();
        app.get("store.service.product_catalog").unwrap();

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let app = app.clone();
                    thread::spawn(move || {
                        for _ in 0..100 {
                            let _ = app.get("store.service.product_catalog").unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_codec,
    bench_lookup,
    bench_locate,
    bench_dispatch,
    bench_concurrent,
);

criterion_main!(benches);
