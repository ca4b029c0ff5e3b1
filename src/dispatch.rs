//! Reference dispatcher
//!
//! Matches a request against published bindings in registration order, then
//! runs the binding: before filters, converters, handler, after filters.

use crate::routing::{RawValue, Request, Response, RouteBinding, RouteParams};
use crate::{Application, Result, SingularError};
use serde_json::Value;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Dispatches requests to the application's route table
pub struct Dispatcher<'a> {
    app: &'a Application,
}

impl<'a> Dispatcher<'a> {
    pub fn new(app: &'a Application) -> Self {
        Self { app }
    }

    /// Dispatch to the first binding matching verb and path
    pub fn dispatch(&self, request: &Request) -> Result<Response> {
        let path = request.uri().path();

        let Some((binding, raw)) = self.app.routes().find(request.method(), path) else {
            #[cfg(feature = "logging")]
            debug!(
                target: "singular",
                method = %request.method(),
                path = %path,
                "No route matches"
            );

            return Err(SingularError::RouteNotFound {
                method: request.method().to_string(),
                path: path.to_string(),
            });
        };

        #[cfg(feature = "logging")]
        debug!(
            target: "singular",
            route = %binding.name(),
            method = %request.method(),
            path = %path,
            "Dispatching"
        );

        self.run(&binding, request, raw)
    }

    fn run(
        &self,
        binding: &RouteBinding,
        request: &Request,
        raw: Vec<(String, RawValue)>,
    ) -> Result<Response> {
        let mut response = match self.before(binding, request)? {
            Some(response) => response,
            None => {
                let params = self.convert(binding, raw)?;
                let controller = self.app.get(binding.controller())?;
                let call = crate::routing::Call::new(self.app, request, &params, binding.name());
                (binding.handler.call)(&controller, &call)?
            }
        };

        for filter in &binding.after {
            #[cfg(feature = "logging")]
            trace!(target: "singular", filter = %filter.target.reference, "Running after filter");

            let instance = self.app.get(&filter.target.service)?;
            (filter.call)(&instance, request, &mut response)?;
        }

        Ok(response)
    }

    /// Run before filters; the first one returning a response short-circuits
    fn before(&self, binding: &RouteBinding, request: &Request) -> Result<Option<Response>> {
        for filter in &binding.before {
            #[cfg(feature = "logging")]
            trace!(target: "singular", filter = %filter.target.reference, "Running before filter");

            let instance = self.app.get(&filter.target.service)?;
            if let Some(response) = (filter.call)(&instance, request)? {
                #[cfg(feature = "logging")]
                debug!(
                    target: "singular",
                    route = %binding.name(),
                    filter = %filter.target.reference,
                    "Before filter short-circuited the route"
                );

                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Apply converters. String defaults go through the converter like path values.
    fn convert(&self, binding: &RouteBinding, raw: Vec<(String, RawValue)>) -> Result<RouteParams> {
        let mut params = RouteParams::new();

        for (name, value) in raw {
            let converted = match (binding.converters.get(&name), value) {
                (Some(converter), RawValue::Path(s))
                | (Some(converter), RawValue::Default(Value::String(s))) => {
                    let instance = self.app.get(&converter.target.service)?;
                    (converter.call)(&instance, &s)?
                }
                (_, RawValue::Path(s)) => Value::String(s),
                (_, RawValue::Default(v)) => v,
            };
            params.insert(name, converted);
        }

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use crate::fixtures::{request, shop_app};
    use crate::SingularError;
    use http::Method;

    #[test]
    fn test_dispatch_runs_filters_in_order() {
        let (app, log) = shop_app();
        let response = app.handle(&request(Method::GET, "/shop/user_account/edit/7")).unwrap();

        assert_eq!(response.body().as_ref(), b"edit 7");
        assert_eq!(response.headers()["x-edited-by"], "shop");
        assert_eq!(
            log.entries(),
            vec!["check_auth", "check_ownership", "edit", "stamp"]
        );
    }

    #[test]
    fn test_dispatch_short_circuit_still_runs_after_filters() {
        let (app, log) = shop_app();
        let response = app
            .handle(&request(Method::GET, "/shop/user_account/edit/0"))
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
        assert_eq!(log.entries(), vec!["check_auth", "check_ownership", "stamp"]);
    }

    #[test]
    fn test_dispatch_default_goes_through_converter() {
        let (app, _) = shop_app();
        let response = app.handle(&request(Method::GET, "/shop/user_account/list")).unwrap();
        assert_eq!(response.body().as_ref(), b"page 1 of 20");

        let response = app.handle(&request(Method::GET, "/shop/user_account/list/3")).unwrap();
        assert_eq!(response.body().as_ref(), b"page 3 of 20");
    }

    #[test]
    fn test_dispatch_rejects_failed_assertion() {
        let (app, _) = shop_app();
        let err = app
            .handle(&request(Method::GET, "/shop/user_account/list/abc"))
            .unwrap_err();
        assert!(matches!(err, SingularError::RouteNotFound { .. }));
    }

    #[test]
    fn test_dispatch_wrong_verb_is_not_found() {
        let (app, _) = shop_app();
        let err = app
            .handle(&request(Method::DELETE, "/shop/user_account/edit/7"))
            .unwrap_err();
        assert!(matches!(err, SingularError::RouteNotFound { .. }));
    }
}
