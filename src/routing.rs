//! Route bindings and the route table
//!
//! A [`RouteBinding`] is the complete description of one HTTP endpoint. The
//! controller resolver builds bindings into a local [`RouteCollection`] and
//! publishes the finished set into the application's [`RouteTable`] in one
//! step, so readers never see a partially built controller.

use crate::catalog::{AfterFn, BeforeFn, ConvertFn, HandlerFn};
use crate::{Application, Result, SingularError};
use bytes::Bytes;
use http::Method as HttpMethod;
use parking_lot::RwLock;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Inbound request
pub type Request = http::Request<Bytes>;

/// Outbound response
pub type Response = http::Response<Bytes>;

/// Converted path values by parameter name
pub type RouteParams = BTreeMap<String, Value>;

// =============================================================================
// Call context
// =============================================================================

/// Everything a route handler receives.
pub struct Call<'a> {
    app: &'a Application,
    request: &'a Request,
    params: &'a RouteParams,
    route: &'a str,
}

impl<'a> Call<'a> {
    pub(crate) fn new(
        app: &'a Application,
        request: &'a Request,
        params: &'a RouteParams,
        route: &'a str,
    ) -> Self {
        Self {
            app,
            request,
            params,
            route,
        }
    }

    #[inline]
    pub fn app(&self) -> &'a Application {
        self.app
    }

    #[inline]
    pub fn request(&self) -> &'a Request {
        self.request
    }

    #[inline]
    pub fn params(&self) -> &'a RouteParams {
        self.params
    }

    /// Name of the matched route
    #[inline]
    pub fn route(&self) -> &'a str {
        self.route
    }

    /// Raw value of a path parameter after conversion
    pub fn value(&self, name: &str) -> Option<&'a Value> {
        self.params.get(name)
    }

    /// Path parameter deserialized into `T`.
    ///
    /// String values that do not deserialize directly are parsed as JSON, so
    /// `"42"` binds to a `u64`.
    pub fn param<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .params
            .get(name)
            .ok_or_else(|| SingularError::conversion_failed(name, "parameter not bound"))?;

        match serde_json::from_value::<T>(value.clone()) {
            Ok(v) => Ok(v),
            Err(err) => match value {
                Value::String(raw) => serde_json::from_str::<T>(raw)
                    .map_err(|_| SingularError::conversion_failed(name, err)),
                _ => Err(SingularError::conversion_failed(name, err)),
            },
        }
    }
}

// =============================================================================
// Filters, converters, handlers
// =============================================================================

/// A filter or converter reference resolved at registration time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRef {
    /// Reference as written on the marker
    pub reference: String,
    /// Registry key of the instance the method is called on
    pub service: String,
    pub method: String,
}

#[derive(Clone)]
pub(crate) struct BeforeFilter {
    pub(crate) target: FilterRef,
    pub(crate) call: BeforeFn,
}

#[derive(Clone)]
pub(crate) struct AfterFilter {
    pub(crate) target: FilterRef,
    pub(crate) call: AfterFn,
}

#[derive(Clone)]
pub(crate) struct Converter {
    pub(crate) target: FilterRef,
    pub(crate) call: ConvertFn,
}

/// Full-match validation rule for a path parameter
#[derive(Debug, Clone)]
pub struct Assertion {
    expression: String,
    regex: Regex,
}

impl Assertion {
    pub fn new(param: &str, expression: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{expression})$")).map_err(|err| {
            SingularError::InvalidAssertion {
                param: param.to_string(),
                pattern: expression.to_string(),
                reason: err.to_string(),
            }
        })?;
        Ok(Self {
            expression: expression.to_string(),
            regex,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    #[inline]
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

#[derive(Clone)]
pub(crate) struct Handler {
    pub(crate) controller: String,
    pub(crate) method: String,
    pub(crate) call: HandlerFn,
}

// =============================================================================
// Patterns
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Static(String),
    Param(String),
}

fn parse_segments(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
            _ => Segment::Static(s.to_string()),
        })
        .collect()
}

/// Join a mount prefix and a relative pattern into an absolute pattern
pub fn join_pattern(prefix: &str, pattern: &str) -> String {
    let parts: Vec<&str> = prefix
        .split('/')
        .chain(pattern.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", parts.join("/"))
}

/// A path value before conversion
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawValue {
    Path(String),
    Default(Value),
}

// =============================================================================
// Route binding
// =============================================================================

/// One published HTTP endpoint. Immutable once built.
#[derive(Clone)]
pub struct RouteBinding {
    pub(crate) name: String,
    pub(crate) pattern: String,
    pub(crate) segments: Vec<Segment>,
    pub(crate) methods: Vec<HttpMethod>,
    pub(crate) before: Vec<BeforeFilter>,
    pub(crate) after: Vec<AfterFilter>,
    pub(crate) converters: BTreeMap<String, Converter>,
    pub(crate) assertions: BTreeMap<String, Assertion>,
    pub(crate) defaults: BTreeMap<String, Value>,
    pub(crate) handler: Handler,
}

impl RouteBinding {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute pattern (`/shop/user_account/edit/{id}`)
    #[inline]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[inline]
    pub fn methods(&self) -> &[HttpMethod] {
        &self.methods
    }

    /// Registry key of the controller the handler belongs to
    #[inline]
    pub fn controller(&self) -> &str {
        &self.handler.controller
    }

    #[inline]
    pub fn action(&self) -> &str {
        &self.handler.method
    }

    /// Before filters in execution order
    pub fn before_filters(&self) -> impl Iterator<Item = &FilterRef> {
        self.before.iter().map(|f| &f.target)
    }

    /// After filters in execution order
    pub fn after_filters(&self) -> impl Iterator<Item = &FilterRef> {
        self.after.iter().map(|f| &f.target)
    }

    pub fn converter(&self, param: &str) -> Option<&FilterRef> {
        self.converters.get(param).map(|c| &c.target)
    }

    pub fn assertion(&self, param: &str) -> Option<&Assertion> {
        self.assertions.get(param)
    }

    pub fn default_value(&self, param: &str) -> Option<&Value> {
        self.defaults.get(param)
    }

    /// Names of the path parameters, in pattern order
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Static(_) => None,
        })
    }

    #[inline]
    pub fn allows(&self, method: &HttpMethod) -> bool {
        self.methods.contains(method)
    }

    /// Match `path` against the pattern.
    ///
    /// Supplied values must pass their assertion. Missing trailing
    /// parameters are filled from defaults; a missing parameter without a
    /// default fails the match.
    pub(crate) fn match_path(&self, path: &str) -> Option<Vec<(String, RawValue)>> {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        let mut values = Vec::new();

        for segment in &self.segments {
            match (segment, parts.next()) {
                (Segment::Static(expected), Some(part)) => {
                    if expected != part {
                        return None;
                    }
                }
                (Segment::Static(_), None) => return None,
                (Segment::Param(name), Some(part)) => {
                    if let Some(assertion) = self.assertions.get(name) {
                        if !assertion.is_match(part) {
                            return None;
                        }
                    }
                    values.push((name.clone(), RawValue::Path(part.to_string())));
                }
                (Segment::Param(name), None) => {
                    let default = self.defaults.get(name)?;
                    values.push((name.clone(), RawValue::Default(default.clone())));
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }

        Some(values)
    }
}

impl std::fmt::Debug for RouteBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteBinding")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("methods", &self.methods)
            .field("before", &self.before.iter().map(|b| &b.target.reference).collect::<Vec<_>>())
            .field("after", &self.after.iter().map(|a| &a.target.reference).collect::<Vec<_>>())
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .field("assertions", &self.assertions)
            .field("defaults", &self.defaults)
            .finish()
    }
}

// =============================================================================
// Route collection (local builder)
// =============================================================================

/// A route before it is mounted
pub(crate) struct RouteDraft {
    pub(crate) name: String,
    pub(crate) pattern: String,
    pub(crate) methods: Vec<HttpMethod>,
    pub(crate) before: Vec<BeforeFilter>,
    pub(crate) after: Vec<AfterFilter>,
    pub(crate) converters: BTreeMap<String, Converter>,
    pub(crate) assertions: BTreeMap<String, Assertion>,
    pub(crate) defaults: BTreeMap<String, Value>,
    pub(crate) handler: Handler,
}

/// Routes sharing a mount point and its collection-level filters.
#[derive(Default)]
pub(crate) struct RouteCollection {
    before: Vec<BeforeFilter>,
    after: Vec<AfterFilter>,
    routes: Vec<RouteDraft>,
}

impl RouteCollection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn before(&mut self, filter: BeforeFilter) {
        self.before.push(filter);
    }

    pub(crate) fn after(&mut self, filter: AfterFilter) {
        self.after.push(filter);
    }

    pub(crate) fn add(&mut self, route: RouteDraft) {
        self.routes.push(route);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Mount under `prefix`; collection filters run ahead of each route's own
    pub(crate) fn mount(self, prefix: &str) -> Vec<RouteBinding> {
        let RouteCollection {
            before,
            after,
            routes,
        } = self;

        routes
            .into_iter()
            .map(|draft| {
                let pattern = join_pattern(prefix, &draft.pattern);
                RouteBinding {
                    name: draft.name,
                    segments: parse_segments(&pattern),
                    pattern,
                    methods: draft.methods,
                    before: before.iter().cloned().chain(draft.before).collect(),
                    after: after.iter().cloned().chain(draft.after).collect(),
                    converters: draft.converters,
                    assertions: draft.assertions,
                    defaults: draft.defaults,
                    handler: draft.handler,
                }
            })
            .collect()
    }
}

// =============================================================================
// Route table
// =============================================================================

#[derive(Default)]
struct TableInner {
    routes: Vec<Arc<RouteBinding>>,
    names: HashMap<String, usize>,
}

/// Append-only table of published bindings, kept in registration order.
#[derive(Default)]
pub struct RouteTable {
    inner: RwLock<TableInner>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a batch of bindings atomically.
    ///
    /// Either every binding becomes visible or none does.
    pub fn publish(&self, bindings: Vec<RouteBinding>) -> Result<usize> {
        let mut inner = self.inner.write();

        let mut batch = HashSet::with_capacity(bindings.len());
        for binding in &bindings {
            if inner.names.contains_key(&binding.name) || !batch.insert(binding.name.as_str()) {
                return Err(SingularError::RouteNameConflict {
                    name: binding.name.clone(),
                });
            }
        }

        let count = bindings.len();
        for binding in bindings {
            #[cfg(feature = "logging")]
            debug!(
                target: "singular",
                route = %binding.name,
                pattern = %binding.pattern,
                methods = ?binding.methods,
                "Publishing route"
            );

            let index = inner.routes.len();
            inner.names.insert(binding.name.clone(), index);
            inner.routes.push(Arc::new(binding));
        }

        Ok(count)
    }

    /// Binding by route name
    pub fn get(&self, name: &str) -> Option<Arc<RouteBinding>> {
        let inner = self.inner.read();
        inner.names.get(name).map(|&i| Arc::clone(&inner.routes[i]))
    }

    /// First binding matching `method` and `path`
    pub(crate) fn find(
        &self,
        method: &HttpMethod,
        path: &str,
    ) -> Option<(Arc<RouteBinding>, Vec<(String, RawValue)>)> {
        let inner = self.inner.read();
        inner.routes.iter().find_map(|route| {
            if !route.allows(method) {
                return None;
            }
            route
                .match_path(path)
                .map(|values| (Arc::clone(route), values))
        })
    }

    /// All bindings in registration order
    pub fn snapshot(&self) -> Vec<Arc<RouteBinding>> {
        self.inner.read().routes.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().routes.is_empty()
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable").field("routes", &self.len()).finish()
    }
}
