//! Marker macros end to end

use singular::http::{Method as HttpMethod, StatusCode};
use singular::{
    controller, methods, Application, Bytes, Manifest, Pack, PackModule, Request, Response, Result,
    Service, SingularError, Value,
};
use std::sync::atomic::{AtomicU64, Ordering};

static PAGE_SIZE: AtomicU64 = AtomicU64::new(25);

#[derive(Default, Service)]
#[service(shared, default, methods)]
#[parameter(page_size = PAGE_SIZE.load(Ordering::SeqCst), currency = "EUR")]
struct Catalog;

#[methods]
impl Catalog {
    fn sku(&self, raw: &str) -> Result<Value> {
        Ok(Value::from(raw.to_ascii_uppercase()))
    }
}

#[derive(Default, Service)]
#[service(factory, default)]
struct Receipt;

#[derive(Default)]
struct Products;

#[controller(default, before(check_token), after(stamp))]
impl Products {
    #[route(get)]
    #[convert(sku = "store.service.catalog:sku")]
    fn show(&self, sku: String) -> Result<Response> {
        Ok(Response::new(Bytes::from(format!("product {sku}"))))
    }

    #[route(get, post)]
    #[assert(page = r"\d+")]
    #[value(page = 1)]
    fn list(&self, request: &Request, page: u64) -> Result<Response> {
        Ok(Response::new(Bytes::from(format!("{} page {page}", request.method()))))
    }

    #[route(get, pattern = "/health", name = "store.health")]
    fn health(&self) -> Result<Response> {
        Ok(Response::new(Bytes::from_static(b"ok")))
    }

    fn check_token(&self, request: &Request) -> Result<Option<Response>> {
        if request.headers().contains_key("x-deny") {
            let mut response = Response::new(Bytes::new());
            *response.status_mut() = StatusCode::UNAUTHORIZED;
            return Ok(Some(response));
        }
        Ok(None)
    }

    fn stamp(&self, _request: &Request, response: &mut Response) -> Result<()> {
        response
            .headers_mut()
            .insert("x-store", singular::http::HeaderValue::from_static("derive"));
        Ok(())
    }

    // not exported: no marker and no filter signature
    #[allow(dead_code)]
    fn helper(&self, n: u32) -> u32 {
        n + 1
    }
}

struct StorePack;

impl PackModule for StorePack {
    fn pack(&self) -> Pack {
        Pack::new("store", "Store", "/srv/store")
    }

    fn manifest(&self, manifest: &mut Manifest) {
        manifest
            .describe::<Catalog>("Service::Catalog")
            .describe::<Receipt>("Service::Receipt")
            .describe::<Products>("Controller::Products");
    }
}

fn app() -> Application {
    let app = Application::new();
    app.register_pack(StorePack).unwrap();
    app
}

fn request(method: HttpMethod, path: &str) -> Request {
    let mut request = Request::new(Bytes::new());
    *request.method_mut() = method;
    *request.uri_mut() = path.parse().unwrap();
    request
}

#[test]
fn test_service_lifetimes() {
    let app = app();

    let a = app.get("store.service.catalog").unwrap();
    let b = app.get("store.service.catalog").unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));

    let c = app.get("store.service.receipt").unwrap();
    let d = app.get("store.service.receipt").unwrap();
    assert!(!std::sync::Arc::ptr_eq(&c, &d));
}

#[test]
fn test_parameters_read_current_value() {
    let app = app();
    assert_eq!(app.parameter("store.service.catalog.currency").unwrap(), "EUR");
    assert_eq!(app.parameter("store.service.catalog.page_size").unwrap(), 25);

    PAGE_SIZE.store(50, Ordering::SeqCst);
    assert_eq!(app.parameter("store.service.catalog.page_size").unwrap(), 50);
    PAGE_SIZE.store(25, Ordering::SeqCst);
}

#[test]
fn test_synthesized_routes() {
    let app = app();
    app.get("store.controller.products").unwrap();

    let show = app.routes().get("store.controller.products.show").unwrap();
    assert_eq!(show.pattern(), "/store/products/show/{sku}");
    assert_eq!(show.converter("sku").unwrap().service, "store.service.catalog");

    let list = app.routes().get("store.controller.products.list").unwrap();
    assert_eq!(list.pattern(), "/store/products/list/{page}");
    assert_eq!(list.methods(), &[HttpMethod::GET, HttpMethod::POST]);

    let health = app.routes().get("store.health").unwrap();
    assert_eq!(health.pattern(), "/health");
    assert!(app.routes().get("store.controller.products.helper").is_none());
}

#[test]
fn test_dispatch_through_generated_table() {
    let app = app();

    let response = app.handle(&request(HttpMethod::GET, "/store/products/show/ab12")).unwrap();
    assert_eq!(response.body().as_ref(), b"product AB12");
    assert_eq!(response.headers()["x-store"], "derive");

    let response = app.handle(&request(HttpMethod::POST, "/store/products/list")).unwrap();
    assert_eq!(response.body().as_ref(), b"POST page 1");

    let err = app.handle(&request(HttpMethod::GET, "/store/products/list/x")).unwrap_err();
    assert!(matches!(err, SingularError::RouteNotFound { .. }));
}

#[test]
fn test_class_filter_short_circuits() {
    let app = app();
    let mut denied = request(HttpMethod::GET, "/store/products/show/a1");
    denied
        .headers_mut()
        .insert("x-deny", singular::http::HeaderValue::from_static("1"));

    let response = app.handle(&denied).unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["x-store"], "derive");
}
