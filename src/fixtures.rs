//! Shared test pack

use crate::catalog::{Manifest, Method, TypeBuilder};
use crate::metadata::{ControllerMarker, Lifetime, RouteMarker};
use crate::routing::{Call, Request, Response};
use crate::{Application, Pack, PackModule, Result, SingularError};
use bytes::Bytes;
use http::{HeaderValue, Method as HttpMethod, StatusCode};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Ordered record of filter and handler calls
#[derive(Clone, Default)]
pub(crate) struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub(crate) fn push(&self, entry: &str) {
        self.0.lock().push(entry.to_string());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

pub(crate) fn request(method: HttpMethod, path: &str) -> Request {
    let mut request = Request::new(Bytes::new());
    *request.method_mut() = method;
    *request.uri_mut() = path.parse().unwrap();
    request
}

pub(crate) struct UserAccount {
    pack: String,
    log: Log,
}

impl UserAccount {
    fn edit(&self, call: &Call<'_>) -> Result<Response> {
        self.log.push("edit");
        let id: i64 = call.param("id")?;
        Ok(Response::new(Bytes::from(format!("edit {id}"))))
    }

    fn list(&self, call: &Call<'_>) -> Result<Response> {
        let page: u64 = call.param("page")?;
        let per_page = call.app().parameter("shop.service.pager.per_page")?;
        Ok(Response::new(Bytes::from(format!("page {page} of {per_page}"))))
    }

    fn about(&self, _call: &Call<'_>) -> Result<Response> {
        Ok(Response::new(Bytes::from(format!("about {}", self.pack))))
    }

    fn check_auth(&self, _request: &Request) -> Result<Option<Response>> {
        self.log.push("check_auth");
        Ok(None)
    }

    fn check_ownership(&self, request: &Request) -> Result<Option<Response>> {
        self.log.push("check_ownership");
        if request.uri().path().ends_with("/0") {
            let mut response = Response::new(Bytes::from_static(b"forbidden"));
            *response.status_mut() = StatusCode::FORBIDDEN;
            return Ok(Some(response));
        }
        Ok(None)
    }

    fn stamp(&self, _request: &Request, response: &mut Response) -> Result<()> {
        self.log.push("stamp");
        let value = HeaderValue::from_str(&self.pack)
            .map_err(|e| SingularError::creation_failed("x-edited-by", e.to_string()))?;
        response.headers_mut().insert("x-edited-by", value);
        Ok(())
    }
}

pub(crate) struct Pager;

impl Pager {
    fn page(&self, raw: &str) -> Result<Value> {
        raw.parse::<u64>()
            .map(Value::from)
            .map_err(|e| SingularError::conversion_failed("page", e))
    }
}

/// `shop` pack: one controller with filters and converters, one service
pub(crate) struct ShopPack {
    log: Log,
}

impl ShopPack {
    pub(crate) fn new(log: Log) -> Self {
        Self { log }
    }
}

impl PackModule for ShopPack {
    fn pack(&self) -> Pack {
        Pack::new("shop", "Shop", "/srv/shop")
    }

    fn manifest(&self, manifest: &mut Manifest) {
        let log = self.log.clone();

        let controller = TypeBuilder::with_constructor(
            "Controller::UserAccount",
            move |_app: &Application, pack: &Arc<Pack>| {
                Ok(UserAccount {
                    pack: pack.name().to_string(),
                    log: log.clone(),
                })
            },
        )
        .controller(ControllerMarker::new().before(["check_auth"]).after(["stamp"]))
        .method(
            Method::handler("edit", UserAccount::edit)
                .request("request")
                .param("id")
                .route(RouteMarker::get())
                .before(["check_ownership"]),
        )
        .method(
            Method::handler("list", UserAccount::list)
                .param("page")
                .route(RouteMarker::get())
                .assert("page", r"\d+")
                .value("page", "1")
                .convert("page", "shop.service.pager:page"),
        )
        .method(
            Method::handler("about", UserAccount::about)
                .route(RouteMarker::get().pattern("/about").name("shop.about")),
        )
        .method(Method::before_filter("check_auth", UserAccount::check_auth))
        .method(Method::before_filter("check_ownership", UserAccount::check_ownership))
        .method(Method::after_filter("stamp", UserAccount::stamp));

        let pager = TypeBuilder::with_constructor(
            "Service::Pager",
            |_app: &Application, _pack: &Arc<Pack>| Ok(Pager),
        )
        .service(Lifetime::Shared)
        .parameter("per_page", || Value::from(20))
        .method(Method::converter("page", Pager::page));

        manifest.define(controller).define(pager);
    }
}

/// Application with the `shop` pack registered and nothing resolved yet
pub(crate) fn shop_app() -> (Application, Log) {
    let log = Log::default();
    let app = Application::new();
    app.register_pack(ShopPack::new(log.clone()))
        .expect("shop pack registers");
    (app, log)
}
