//! A lazy shop pack and an eagerly registered admin pack
//!
//! Run with:
//!   cargo run --example shop

use singular::{
    Application, Bytes, Call, ControllerMarker, FromPack, Lifetime, Manifest, Method, Pack,
    PackModule, Request, Response, Result, RouteMarker, SingularConfig, SingularError,
    TypeBuilder, Value,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static VAT_PERCENT: AtomicU64 = AtomicU64::new(20);

// =============================================================================
// Shop (lazy)
// =============================================================================

struct Pricing;

impl FromPack for Pricing {
    fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
        println!("  [shop] Pricing created");
        Ok(Pricing)
    }
}

impl Pricing {
    fn cents(&self, raw: &str) -> Result<Value> {
        let (units, cents) = raw.split_once('.').unwrap_or((raw, "0"));
        let units: u64 = units
            .parse()
            .map_err(|e| SingularError::conversion_failed("price", e))?;
        let cents: u64 = cents
            .parse()
            .map_err(|e| SingularError::conversion_failed("price", e))?;
        Ok(Value::from(units * 100 + cents))
    }
}

struct Basket;

impl FromPack for Basket {
    fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
        Ok(Basket)
    }
}

impl Basket {
    fn add(&self, call: &Call<'_>) -> Result<Response> {
        let price: u64 = call.param("price")?;
        let vat = call.app().parameter("shop.service.pricing.vat_percent")?;
        let vat = vat.as_u64().unwrap_or_default();
        let total = price + price * vat / 100;
        Ok(Response::new(Bytes::from(format!(
            "added {} cents, {} with VAT",
            price, total
        ))))
    }

    fn require_session(&self, request: &Request) -> Result<Option<Response>> {
        println!("  [shop] before: {}", request.uri().path());
        Ok(None)
    }
}

struct Shop;

impl PackModule for Shop {
    fn pack(&self) -> Pack {
        Pack::new("shop", "Shop", "/srv/shop")
    }

    fn manifest(&self, manifest: &mut Manifest) {
        manifest
            .define(
                TypeBuilder::<Pricing>::new("Service::Pricing")
                    .service(Lifetime::Shared)
                    .parameter("vat_percent", || Value::from(VAT_PERCENT.load(Ordering::SeqCst)))
                    .method(Method::converter("cents", Pricing::cents)),
            )
            .define(
                TypeBuilder::<Basket>::new("Controller::Basket")
                    .controller(ControllerMarker::new().before(["require_session"]))
                    .method(
                        Method::handler("add", Basket::add)
                            .param("price")
                            .route(RouteMarker::post())
                            .assert("price", r"\d+(\.\d{1,2})?")
                            .convert("price", "shop.service.pricing:cents"),
                    )
                    .method(Method::before_filter("require_session", Basket::require_session)),
            );
    }
}

// =============================================================================
// Admin (eager)
// =============================================================================

struct Audit;

impl FromPack for Audit {
    fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
        Ok(Audit)
    }
}

struct Admin {
    dir: PathBuf,
}

impl PackModule for Admin {
    fn pack(&self) -> Pack {
        Pack::new("admin", "Admin", self.dir.clone())
    }

    fn manifest(&self, manifest: &mut Manifest) {
        manifest.define(TypeBuilder::<Audit>::new("Service::AuditLog").service(Lifetime::Factory));
    }
}

fn main() -> Result<()> {
    println!("=== Shop Demo ===\n");

    let dir = tempfile::tempdir().map_err(|source| SingularError::Io {
        path: std::env::temp_dir(),
        source,
    })?;
    let service_dir = dir.path().join("service");
    std::fs::create_dir_all(&service_dir)
        .and_then(|_| std::fs::write(service_dir.join("audit_log.rs"), ""))
        .map_err(|source| SingularError::Io {
            path: service_dir.clone(),
            source,
        })?;

    let config = SingularConfig::from_toml_str(
        r#"
        eager_packs = ["admin"]
        extensions = ["rs"]

        [aliases]
        prices = "pricing"
        "#,
    )?;

    let app = Application::with_config(config);
    app.register_pack(Shop)?;
    app.register_pack(Admin {
        dir: dir.path().to_path_buf(),
    })?;

    let audit = "admin.service.audit_log";
    println!("  before boot: {audit} bound = {}", app.has(audit));
    app.boot()?;
    println!("  after boot:  {audit} bound = {}", app.has(audit));
    println!(
        "  before the first request: shop.controller.basket bound = {}",
        app.has("shop.controller.basket")
    );

    let mut request = Request::new(Bytes::new());
    *request.method_mut() = singular::http::Method::POST;
    *request.uri_mut() = "/shop/basket/add/12.50".parse().expect("static uri");

    let response = app.handle(&request)?;
    println!("\n  POST /shop/basket/add/12.50 -> {}", String::from_utf8_lossy(response.body()));

    VAT_PERCENT.store(10, Ordering::SeqCst);
    *request.uri_mut() = "/shop/basket/add/3".parse().expect("static uri");
    let response = app.handle(&request)?;
    println!("  POST /shop/basket/add/3     -> {}", String::from_utf8_lossy(response.body()));

    // `prices` is aliased to the pricing service and forwards to the same instance
    let direct = app.get("shop.service.pricing")?;
    let aliased = app.get("shop.service.prices")?;
    println!("\n  shop.service.prices is shop.service.pricing: {}", Arc::ptr_eq(&direct, &aliased));

    println!("\n  registry keys: {:?}", app.registry().keys());
    println!("\n=== Demo Complete ===");
    Ok(())
}
