//! Declarative markers and the metadata reader
//!
//! Markers are plain data attached to type descriptors: class markers tell the
//! resolver *what* a type is, method markers describe routes and their
//! filter/converter/assertion/default decorations, and field markers expose
//! constants as registry parameters. They are produced by pack manifests
//! (by hand or through the `derive` macros) and read back through
//! [`MetadataReader`].

use crate::catalog::{FieldDescriptor, MethodDescriptor, TypeDescriptor};
use http::Method as HttpMethod;
use serde_json::Value;

// =============================================================================
// Class markers
// =============================================================================

/// Registry entry lifetime for a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// New instance on every lookup
    Factory,

    /// Constructed once on first lookup, then cached
    #[default]
    Shared,

    /// The constructor itself is stored; callers invoke it
    Deferred,
}

impl Lifetime {
    /// Name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifetime::Factory => "factory",
            Lifetime::Shared => "shared",
            Lifetime::Deferred => "deferred",
        }
    }
}

impl std::str::FromStr for Lifetime {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "factory" => Ok(Lifetime::Factory),
            "shared" => Ok(Lifetime::Shared),
            "deferred" | "protected" => Ok(Lifetime::Deferred),
            other => Err(format!("unknown lifetime '{other}'")),
        }
    }
}

/// Marks a type as a plain service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceMarker {
    pub lifetime: Lifetime,
}

impl ServiceMarker {
    pub fn new(lifetime: Lifetime) -> Self {
        Self { lifetime }
    }
}

/// Which side of the handler a filter runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Before,
    After,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Before => "before",
            FilterKind::After => "after",
        }
    }
}

/// A list of filter references sharing one kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMarker {
    pub kind: FilterKind,
    pub methods: Vec<String>,
}

/// Marks a type as an HTTP controller
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControllerMarker {
    /// Mount path override; empty means `<pack>/<snake_case_name>`
    pub mount: String,
    /// Class-level filters, in declaration order
    pub filters: Vec<FilterMarker>,
}

impl ControllerMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the mount path
    pub fn mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into();
        self
    }

    /// Add class-level before filters
    pub fn before<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.push(FilterMarker {
            kind: FilterKind::Before,
            methods: methods.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add class-level after filters
    pub fn after<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters.push(FilterMarker {
            kind: FilterKind::After,
            methods: methods.into_iter().map(Into::into).collect(),
        });
        self
    }
}

/// Markers attachable to a type
#[derive(Debug, Clone, PartialEq)]
pub enum ClassMarker {
    Service(ServiceMarker),
    Controller(ControllerMarker),
}

// =============================================================================
// Method markers
// =============================================================================

/// Declares a method as a route handler
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteMarker {
    /// Single verb; takes precedence over `methods`
    pub method: Option<HttpMethod>,
    pub methods: Vec<HttpMethod>,
    /// Explicit pattern, mounted at the application root
    pub pattern: Option<String>,
    /// Explicit route name
    pub name: Option<String>,
}

impl RouteMarker {
    /// Route marker without any verb
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get() -> Self {
        Self::new().method(HttpMethod::GET)
    }

    pub fn post() -> Self {
        Self::new().method(HttpMethod::POST)
    }

    pub fn put() -> Self {
        Self::new().method(HttpMethod::PUT)
    }

    pub fn delete() -> Self {
        Self::new().method(HttpMethod::DELETE)
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn methods<I>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = HttpMethod>,
    {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Verb set, or `None` when the marker declares none
    pub fn verbs(&self) -> Option<Vec<HttpMethod>> {
        match &self.method {
            Some(method) => Some(vec![method.clone()]),
            None if !self.methods.is_empty() => {
                let mut verbs: Vec<HttpMethod> = Vec::with_capacity(self.methods.len());
                for method in &self.methods {
                    if !verbs.contains(method) {
                        verbs.push(method.clone());
                    }
                }
                Some(verbs)
            }
            None => None,
        }
    }
}

/// `param` is converted by calling `function` (`method` or `service:method`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertSpec {
    pub param: String,
    pub function: String,
}

/// `param` must fully match `expression`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertSpec {
    pub param: String,
    pub expression: String,
}

/// `param` falls back to `value` when absent
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultSpec {
    pub param: String,
    pub value: Value,
}

/// Markers attachable to a method
#[derive(Debug, Clone, PartialEq)]
pub enum MethodMarker {
    Route(RouteMarker),
    Before(Vec<String>),
    After(Vec<String>),
    Convert(Vec<ConvertSpec>),
    Assert(Vec<AssertSpec>),
    Value(Vec<DefaultSpec>),
}

/// How a method parameter is supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Injected inbound request
    Request,
    /// Injected application handle
    Application,
    /// Bound from the path
    Path,
}

/// One declared method parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub kind: ParamKind,
}

impl ParamDescriptor {
    pub fn path(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Path,
        }
    }

    /// Whether the parameter is injected rather than path-bound
    pub fn is_injected(&self) -> bool {
        !matches!(self.kind, ParamKind::Path)
    }
}

// =============================================================================
// Field markers
// =============================================================================

/// Markers attachable to a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMarker {
    /// Expose the field's value as `<service key>.<field>`
    Parameter,
}

// =============================================================================
// Reader
// =============================================================================

/// Introspection facade over type descriptors.
///
/// All marker queries used by the resolvers go through here, so descriptor
/// layout is free to change without touching resolution logic.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataReader;

impl MetadataReader {
    pub fn new() -> Self {
        Self
    }

    /// Class-level markers in declaration order
    pub fn class_markers<'a>(&self, ty: &'a TypeDescriptor) -> &'a [ClassMarker] {
        ty.markers()
    }

    pub fn service_markers<'a>(
        &self,
        ty: &'a TypeDescriptor,
    ) -> impl Iterator<Item = &'a ServiceMarker> + 'a {
        ty.markers().iter().filter_map(|m| match m {
            ClassMarker::Service(s) => Some(s),
            _ => None,
        })
    }

    pub fn controller_markers<'a>(
        &self,
        ty: &'a TypeDescriptor,
    ) -> impl Iterator<Item = &'a ControllerMarker> + 'a {
        ty.markers().iter().filter_map(|m| match m {
            ClassMarker::Controller(c) => Some(c),
            _ => None,
        })
    }

    /// All methods in declaration order
    pub fn methods<'a>(&self, ty: &'a TypeDescriptor) -> &'a [MethodDescriptor] {
        ty.methods()
    }

    pub fn method_markers<'a>(&self, method: &'a MethodDescriptor) -> &'a [MethodMarker] {
        method.markers()
    }

    /// First route marker on a method
    pub fn route<'a>(&self, method: &'a MethodDescriptor) -> Option<&'a RouteMarker> {
        method.markers().iter().find_map(|m| match m {
            MethodMarker::Route(r) => Some(r),
            _ => None,
        })
    }

    /// Method-level filter references of one kind, in declaration order
    pub fn filters<'a>(
        &self,
        method: &'a MethodDescriptor,
        kind: FilterKind,
    ) -> impl Iterator<Item = &'a str> + 'a {
        method
            .markers()
            .iter()
            .filter_map(move |m| match (m, kind) {
                (MethodMarker::Before(list), FilterKind::Before) => Some(list),
                (MethodMarker::After(list), FilterKind::After) => Some(list),
                _ => None,
            })
            .flatten()
            .map(String::as_str)
    }

    pub fn converters<'a>(
        &self,
        method: &'a MethodDescriptor,
    ) -> impl Iterator<Item = &'a ConvertSpec> + 'a {
        method
            .markers()
            .iter()
            .filter_map(|m| match m {
                MethodMarker::Convert(list) => Some(list),
                _ => None,
            })
            .flatten()
    }

    pub fn assertions<'a>(
        &self,
        method: &'a MethodDescriptor,
    ) -> impl Iterator<Item = &'a AssertSpec> + 'a {
        method
            .markers()
            .iter()
            .filter_map(|m| match m {
                MethodMarker::Assert(list) => Some(list),
                _ => None,
            })
            .flatten()
    }

    pub fn defaults<'a>(
        &self,
        method: &'a MethodDescriptor,
    ) -> impl Iterator<Item = &'a DefaultSpec> + 'a {
        method
            .markers()
            .iter()
            .filter_map(|m| match m {
                MethodMarker::Value(list) => Some(list),
                _ => None,
            })
            .flatten()
    }

    /// Fields carrying the parameter marker
    pub fn parameter_fields<'a>(
        &self,
        ty: &'a TypeDescriptor,
    ) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
        ty.fields()
            .iter()
            .filter(|f| f.markers().contains(&FieldMarker::Parameter))
    }
}
