//! Example demonstrating the marker macros
//!
//! Run with:
//!   cargo run --example derive --features derive

use singular::{
    controller, Application, Bytes, Manifest, Pack, PackModule, Request, Response, Result,
    Service,
};
use std::sync::Arc;

#[derive(Default, Service)]
#[service(shared, default)]
#[parameter(motd = "welcome back")]
struct Banner;

struct Account {
    pack: String,
}

impl singular::FromPack for Account {
    fn from_pack(_app: &Application, pack: &Arc<Pack>) -> Result<Self> {
        Ok(Account {
            pack: pack.name().to_string(),
        })
    }
}

#[controller(mount = "/me", after(sign))]
impl Account {
    #[route(get)]
    fn profile(&self, app: &Application) -> Result<Response> {
        let motd = app.parameter("portal.service.banner.motd")?;
        Ok(Response::new(Bytes::from(format!("{} ({motd})", self.pack))))
    }

    #[route(get)]
    #[value(tab = "overview")]
    fn settings(&self, tab: String) -> Result<Response> {
        Ok(Response::new(Bytes::from(format!("settings: {tab}"))))
    }

    fn sign(&self, _request: &Request, response: &mut Response) -> Result<()> {
        response
            .headers_mut()
            .insert("x-served-by", singular::http::HeaderValue::from_static("portal"));
        Ok(())
    }
}

struct Portal;

impl PackModule for Portal {
    fn pack(&self) -> Pack {
        Pack::new("portal", "Portal", "/srv/portal")
    }

    fn manifest(&self, manifest: &mut Manifest) {
        manifest
            .describe::<Banner>("Service::Banner")
            .describe::<Account>("Controller::Account");
    }
}

fn get(app: &Application, path: &str) -> Result<Response> {
    let mut request = Request::new(Bytes::new());
    *request.uri_mut() = path.parse().expect("static uri");
    app.handle(&request)
}

fn main() -> Result<()> {
    println!("=== Marker Macros Demo ===\n");

    let app = Application::new();
    app.register_pack(Portal)?;

    // the mount override moves the routes away from /portal/account, so the
    // path no longer names the controller: resolve it by key first
    app.get("portal.controller.account")?;

    for route in app.routes().snapshot() {
        println!("  {:<36} {:?} {}", route.name(), route.methods(), route.pattern());
    }

    let profile = get(&app, "/me/profile")?;
    println!("\n  GET /me/profile -> {}", String::from_utf8_lossy(profile.body()));
    println!("  x-served-by: {:?}", profile.headers().get("x-served-by"));

    let settings = get(&app, "/me/settings")?;
    println!("  GET /me/settings -> {}", String::from_utf8_lossy(settings.body()));

    println!("\n=== Demo Complete ===");
    Ok(())
}
