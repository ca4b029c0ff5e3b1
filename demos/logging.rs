//! Resolution and dispatch with logging enabled
//!
//! Run with JSON logging (production):
//! ```bash
//! cargo run --example logging --features logging-json
//! ```
//!
//! Run with pretty logging (development):
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```

use singular::{
    Application, Bytes, Call, ControllerMarker, FromPack, Lifetime, Manifest, Method, Pack,
    PackModule, Request, Response, Result, RouteMarker, TypeBuilder,
};
use std::sync::Arc;

struct Mailer;

impl FromPack for Mailer {
    fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
        println!("  [App] Mailer being created...");
        Ok(Mailer)
    }
}

struct Inbox;

impl FromPack for Inbox {
    fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
        Ok(Inbox)
    }
}

impl Inbox {
    fn read(&self, call: &Call<'_>) -> Result<Response> {
        call.app().get_as::<Mailer>("mail.service.mailer")?;
        let id: u32 = call.param("id")?;
        Ok(Response::new(Bytes::from(format!("message {id}"))))
    }
}

struct MailPack;

impl PackModule for MailPack {
    fn pack(&self) -> Pack {
        Pack::new("mail", "Mail", "/srv/mail")
    }

    fn manifest(&self, manifest: &mut Manifest) {
        manifest
            .define(TypeBuilder::<Mailer>::new("Service::Mailer").service(Lifetime::Shared))
            .define(
                TypeBuilder::<Inbox>::new("Controller::Inbox")
                    .controller(ControllerMarker::new())
                    .method(
                        Method::handler("read", Inbox::read)
                            .param("id")
                            .route(RouteMarker::get())
                            .assert("id", r"\d+"),
                    ),
            );
    }
}

fn main() -> Result<()> {
    // JSON if logging-json is enabled, pretty otherwise
    singular::logging::init();

    println!("=== Singular Logging Demo ===\n");

    // logs: "Creating application", "Pack registered"
    let app = Application::new();
    app.register_pack(MailPack)?;
    app.boot()?;

    // logs: "Controller located", "Controller resolved", then the lookup
    // the handler makes locates the mailer
    let mut request = Request::new(Bytes::new());
    *request.uri_mut() = "/mail/inbox/read/7".parse().expect("static uri");
    let response = app.handle(&request)?;
    println!("  [App] {}", String::from_utf8_lossy(response.body()));

    // unknown packs leave the key unbound
    let missing = app.get("nowhere.service.thing");
    println!("  [App] unknown pack: {}", missing.is_err());

    println!("\n=== Demo Complete ===");
    Ok(())
}
