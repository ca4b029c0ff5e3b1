//! Type catalog: the registration table behind symbol-path resolution
//!
//! Rust has no runtime class loading, so every type a pack wants to be
//! resolvable by name is described up front in a [`TypeDescriptor`]: its
//! symbol path, its markers, its methods (with callable bodies stored as
//! closures) and its parameter fields. Packs publish descriptors through
//! their [`Manifest`]; the [`TypeCatalog`] answers "is this symbol loadable"
//! and hands descriptors to the resolvers.

use crate::codec;
use crate::metadata::{
    AssertSpec, ClassMarker, ControllerMarker, ConvertSpec, DefaultSpec, FieldMarker, Lifetime,
    MethodMarker, ParamDescriptor, ParamKind, RouteMarker, ServiceMarker,
};
use crate::routing::{Call, Request, Response};
use crate::{Application, Pack, Result, SingularError};
use ahash::RandomState;
use dashmap::DashMap;
use serde_json::Value;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Type-erased service or controller instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Type-erased constructor taking the two fixed construction arguments
pub type ConstructFn = Arc<dyn Fn(&Application, &Arc<Pack>) -> Result<Instance> + Send + Sync>;

/// Route handler body
pub type HandlerFn = Arc<dyn Fn(&Instance, &Call<'_>) -> Result<Response> + Send + Sync>;

/// Before filter body; `Some(response)` short-circuits the route
pub type BeforeFn = Arc<dyn Fn(&Instance, &Request) -> Result<Option<Response>> + Send + Sync>;

/// After filter body; may rewrite the response
pub type AfterFn = Arc<dyn Fn(&Instance, &Request, &mut Response) -> Result<()> + Send + Sync>;

/// Converter body; raw path value in, converted value out
pub type ConvertFn = Arc<dyn Fn(&Instance, &str) -> Result<Value> + Send + Sync>;

/// Reads a parameter field's current value
pub type ReadFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Types constructible with `(application, pack)`.
pub trait FromPack: Sized + Send + Sync + 'static {
    fn from_pack(app: &Application, pack: &Arc<Pack>) -> Result<Self>;
}

/// Types that describe their own markers (implemented by the derive macros).
pub trait Describe: FromPack {
    fn describe(builder: TypeBuilder<Self>) -> TypeBuilder<Self>;
}

/// Exported method table of a type (implemented by `#[controller]` and `#[methods]`).
pub trait Methods: Sized + Send + Sync + 'static {
    fn methods(builder: TypeBuilder<Self>) -> TypeBuilder<Self>;
}

// =============================================================================
// Descriptors
// =============================================================================

/// Callable capability of a method
#[derive(Clone)]
pub enum MethodBody {
    Handler(HandlerFn),
    Before(BeforeFn),
    After(AfterFn),
    Converter(ConvertFn),
    /// Declared but not callable through the registry
    Opaque,
}

impl MethodBody {
    /// Capability name used in errors
    pub fn kind(&self) -> &'static str {
        match self {
            MethodBody::Handler(_) => "a route handler",
            MethodBody::Before(_) => "a before filter",
            MethodBody::After(_) => "an after filter",
            MethodBody::Converter(_) => "a converter",
            MethodBody::Opaque => "an opaque method",
        }
    }
}

/// One method of a described type
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    params: Vec<ParamDescriptor>,
    markers: Vec<MethodMarker>,
    body: MethodBody,
}

impl MethodDescriptor {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters in declaration order
    #[inline]
    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    #[inline]
    pub fn markers(&self) -> &[MethodMarker] {
        &self.markers
    }

    #[inline]
    pub fn body(&self) -> &MethodBody {
        &self.body
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("markers", &self.markers)
            .field("body", &self.body.kind())
            .finish()
    }
}

/// One field of a described type
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    markers: Vec<FieldMarker>,
    read: Option<ReadFn>,
}

impl FieldDescriptor {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn markers(&self) -> &[FieldMarker] {
        &self.markers
    }

    /// Current value of the field, if it is readable without an instance
    pub fn read(&self) -> Option<Value> {
        self.read.as_ref().map(|read| read())
    }

    pub(crate) fn reader(&self) -> Option<ReadFn> {
        self.read.clone()
    }
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("markers", &self.markers)
            .finish()
    }
}

/// Full description of a loadable type
pub struct TypeDescriptor {
    symbol: String,
    type_name: &'static str,
    markers: Vec<ClassMarker>,
    methods: Vec<MethodDescriptor>,
    fields: Vec<FieldDescriptor>,
    construct: ConstructFn,
}

impl TypeDescriptor {
    /// Fully-qualified symbol path (`Shop::Controller::UserAccount`)
    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Last symbol path segment (`UserAccount`)
    #[inline]
    pub fn short_name(&self) -> &str {
        codec::short_name(&self.symbol)
    }

    /// Rust type name of the described type
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn markers(&self) -> &[ClassMarker] {
        &self.markers
    }

    #[inline]
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a method by name
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Construct an instance with the fixed construction arguments
    pub fn construct(&self, app: &Application, pack: &Arc<Pack>) -> Result<Instance> {
        (self.construct)(app, pack)
    }

    pub(crate) fn constructor(&self) -> ConstructFn {
        Arc::clone(&self.construct)
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("symbol", &self.symbol)
            .field("type_name", &self.type_name)
            .field("markers", &self.markers)
            .field("methods", &self.methods)
            .field("fields", &self.fields)
            .finish()
    }
}

// =============================================================================
// Builders
// =============================================================================

fn downcast<'a, T: 'static>(instance: &'a Instance, method: &str) -> Result<&'a T> {
    (**instance)
        .downcast_ref::<T>()
        .ok_or_else(|| SingularError::type_mismatch::<T>(method))
}

/// Builder for one method of `T`.
///
/// ```rust
/// use singular::{Method, Call, Response, RouteMarker, Result};
///
/// struct Orders;
///
/// impl Orders {
///     fn show(&self, id: u64) -> Result<Response> {
///         Ok(Response::new(format!("order {id}").into()))
///     }
/// }
///
/// let show = Method::handler("show", |this: &Orders, call: &Call<'_>| this.show(call.param("id")?))
///     .request("request")
///     .param("id")
///     .route(RouteMarker::get());
/// assert_eq!(show.name(), "show");
/// ```
pub struct Method<T> {
    name: String,
    params: Vec<ParamDescriptor>,
    markers: Vec<MethodMarker>,
    body: MethodBody,
    _type: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Method<T> {
    fn with_body(name: impl Into<String>, body: MethodBody) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            markers: Vec::new(),
            body,
            _type: PhantomData,
        }
    }

    /// Route handler method
    pub fn handler<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T, &Call<'_>) -> Result<Response> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        Self::with_body(
            name,
            MethodBody::Handler(Arc::new(move |instance: &Instance, call: &Call<'_>| {
                f(downcast::<T>(instance, &label)?, call)
            })),
        )
    }

    /// Before filter method
    pub fn before_filter<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T, &Request) -> Result<Option<Response>> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        Self::with_body(
            name,
            MethodBody::Before(Arc::new(move |instance: &Instance, request: &Request| {
                f(downcast::<T>(instance, &label)?, request)
            })),
        )
    }

    /// After filter method
    pub fn after_filter<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T, &Request, &mut Response) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        Self::with_body(
            name,
            MethodBody::After(Arc::new(
                move |instance: &Instance, request: &Request, response: &mut Response| {
                    f(downcast::<T>(instance, &label)?, request, response)
                },
            )),
        )
    }

    /// Converter method
    pub fn converter<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T, &str) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        Self::with_body(
            name,
            MethodBody::Converter(Arc::new(move |instance: &Instance, raw: &str| {
                f(downcast::<T>(instance, &label)?, raw)
            })),
        )
    }

    /// Method that is only declared (markers, parameters) with no callable body
    pub fn opaque(name: impl Into<String>) -> Self {
        Self::with_body(name, MethodBody::Opaque)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn push_param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    /// Declare an injected request parameter
    pub fn request(self, name: impl Into<String>) -> Self {
        self.push_param(name, ParamKind::Request)
    }

    /// Declare an injected application parameter
    pub fn application(self, name: impl Into<String>) -> Self {
        self.push_param(name, ParamKind::Application)
    }

    /// Declare a path-bound parameter
    pub fn param(self, name: impl Into<String>) -> Self {
        self.push_param(name, ParamKind::Path)
    }

    /// Attach a raw marker
    pub fn marker(mut self, marker: MethodMarker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn route(self, route: RouteMarker) -> Self {
        self.marker(MethodMarker::Route(route))
    }

    pub fn before<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.marker(MethodMarker::Before(methods.into_iter().map(Into::into).collect()))
    }

    pub fn after<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.marker(MethodMarker::After(methods.into_iter().map(Into::into).collect()))
    }

    pub fn convert(self, param: impl Into<String>, function: impl Into<String>) -> Self {
        self.marker(MethodMarker::Convert(vec![ConvertSpec {
            param: param.into(),
            function: function.into(),
        }]))
    }

    pub fn assert(self, param: impl Into<String>, expression: impl Into<String>) -> Self {
        self.marker(MethodMarker::Assert(vec![AssertSpec {
            param: param.into(),
            expression: expression.into(),
        }]))
    }

    pub fn value(self, param: impl Into<String>, value: impl Into<Value>) -> Self {
        self.marker(MethodMarker::Value(vec![DefaultSpec {
            param: param.into(),
            value: value.into(),
        }]))
    }

    fn erase(self) -> MethodDescriptor {
        MethodDescriptor {
            name: self.name,
            params: self.params,
            markers: self.markers,
            body: self.body,
        }
    }
}

/// Builder for a [`TypeDescriptor`] of `T`.
pub struct TypeBuilder<T> {
    symbol: String,
    markers: Vec<ClassMarker>,
    methods: Vec<MethodDescriptor>,
    fields: Vec<FieldDescriptor>,
    construct: ConstructFn,
    _type: PhantomData<fn() -> T>,
}

impl<T: FromPack> TypeBuilder<T> {
    /// Builder constructing `T` through [`FromPack`]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_constructor(symbol, T::from_pack)
    }
}

impl<T: Send + Sync + 'static> TypeBuilder<T> {
    /// Builder with an explicit constructor
    pub fn with_constructor<F>(symbol: impl Into<String>, construct: F) -> Self
    where
        F: Fn(&Application, &Arc<Pack>) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            symbol: symbol.into(),
            markers: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            construct: Arc::new(move |app: &Application, pack: &Arc<Pack>| {
                construct(app, pack).map(|value| Arc::new(value) as Instance)
            }),
            _type: PhantomData,
        }
    }

    pub fn marker(mut self, marker: ClassMarker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Mark as a service with `lifetime`
    pub fn service(self, lifetime: Lifetime) -> Self {
        self.marker(ClassMarker::Service(ServiceMarker::new(lifetime)))
    }

    /// Mark as a controller
    pub fn controller(self, marker: ControllerMarker) -> Self {
        self.marker(ClassMarker::Controller(marker))
    }

    /// Parameter field read through `read` whenever the key is evaluated
    pub fn parameter<F>(mut self, name: impl Into<String>, read: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            markers: vec![FieldMarker::Parameter],
            read: Some(Arc::new(read)),
        });
        self
    }

    /// Unmarked field
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            markers: Vec::new(),
            read: None,
        });
        self
    }

    pub fn method(mut self, method: Method<T>) -> Self {
        self.methods.push(method.erase());
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor {
            symbol: self.symbol,
            type_name: std::any::type_name::<T>(),
            markers: self.markers,
            methods: self.methods,
            fields: self.fields,
            construct: self.construct,
        }
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// A pack's registration table.
///
/// Symbols given to the manifest are relative to the pack namespace root.
pub struct Manifest {
    namespace: String,
    types: Vec<TypeDescriptor>,
}

impl Manifest {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            types: Vec::new(),
        }
    }

    /// Namespace root every symbol is prefixed with
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Absolute symbol path for a relative one
    pub fn symbol(&self, relative: &str) -> String {
        codec::join_symbol([self.namespace.as_str(), relative])
    }

    /// Define a type from a builder holding a relative symbol
    pub fn define<T: Send + Sync + 'static>(&mut self, mut builder: TypeBuilder<T>) -> &mut Self {
        builder.symbol = self.symbol(&builder.symbol);
        self.types.push(builder.build());
        self
    }

    /// Define a self-describing type
    pub fn describe<T: Describe>(&mut self, relative: &str) -> &mut Self {
        self.define(T::describe(TypeBuilder::<T>::new(relative)))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub(crate) fn into_types(self) -> Vec<TypeDescriptor> {
        self.types
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Symbol path → descriptor table (the "type loader").
pub struct TypeCatalog {
    types: DashMap<String, Arc<TypeDescriptor>, RandomState>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self {
            types: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// Add a descriptor; a symbol can be defined once
    pub fn define(&self, descriptor: TypeDescriptor) -> Result<Arc<TypeDescriptor>> {
        use dashmap::mapref::entry::Entry;

        match self.types.entry(descriptor.symbol.clone()) {
            Entry::Occupied(_) => Err(SingularError::DuplicateType {
                symbol: descriptor.symbol,
            }),
            Entry::Vacant(slot) => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "singular",
                    symbol = %descriptor.symbol,
                    methods = descriptor.methods.len(),
                    "Defining type"
                );

                let descriptor = Arc::new(descriptor);
                slot.insert(Arc::clone(&descriptor));
                Ok(descriptor)
            }
        }
    }

    /// Load all types of a manifest; on a duplicate none of them stay defined
    pub fn define_all(&self, manifest: Manifest) -> Result<usize> {
        let types = manifest.into_types();
        let mut defined: Vec<String> = Vec::with_capacity(types.len());

        for descriptor in types {
            let symbol = descriptor.symbol.clone();
            if let Err(err) = self.define(descriptor) {
                for symbol in &defined {
                    self.types.remove(symbol);
                }
                return Err(err);
            }
            defined.push(symbol);
        }

        Ok(defined.len())
    }

    /// Descriptor for a symbol, if loadable
    #[inline]
    pub fn load(&self, symbol: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(symbol).map(|d| Arc::clone(d.value()))
    }

    /// Descriptor for a symbol, or `TypeNotFound`
    pub fn require(&self, symbol: &str) -> Result<Arc<TypeDescriptor>> {
        self.load(symbol)
            .ok_or_else(|| SingularError::type_not_found(symbol))
    }

    #[inline]
    pub fn is_loadable(&self, symbol: &str) -> bool {
        self.types.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeCatalog")
            .field("types", &self.types.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataReader;

    struct Mailer;

    impl FromPack for Mailer {
        fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
            Ok(Mailer)
        }
    }

    #[test]
    fn test_manifest_prefixes_namespace() {
        let mut manifest = Manifest::new("Shop");
        manifest.define(TypeBuilder::<Mailer>::new("Service::Mailer").service(Lifetime::Shared));

        let catalog = TypeCatalog::new();
        assert_eq!(catalog.define_all(manifest).unwrap(), 1);
        assert!(catalog.is_loadable("Shop::Service::Mailer"));
        assert!(!catalog.is_loadable("Service::Mailer"));

        let ty = catalog.load("Shop::Service::Mailer").unwrap();
        assert_eq!(ty.short_name(), "Mailer");
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let catalog = TypeCatalog::new();
        catalog
            .define(TypeBuilder::<Mailer>::new("Shop::Mailer").build())
            .unwrap();
        let err = catalog
            .define(TypeBuilder::<Mailer>::new("Shop::Mailer").build())
            .unwrap_err();
        assert!(matches!(err, SingularError::DuplicateType { .. }));
    }

    #[test]
    fn test_define_all_rolls_back_on_duplicate() {
        let catalog = TypeCatalog::new();
        catalog
            .define(TypeBuilder::<Mailer>::new("Shop::Service::Taken").build())
            .unwrap();

        let mut manifest = Manifest::new("Shop");
        manifest
            .define(TypeBuilder::<Mailer>::new("Service::Mailer"))
            .define(TypeBuilder::<Mailer>::new("Service::Taken"))
            .define(TypeBuilder::<Mailer>::new("Service::Queue"));

        let err = catalog.define_all(manifest).unwrap_err();
        assert!(matches!(
            err,
            SingularError::DuplicateType { ref symbol } if symbol == "Shop::Service::Taken"
        ));
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.is_loadable("Shop::Service::Mailer"));
        assert!(!catalog.is_loadable("Shop::Service::Queue"));
    }

    #[test]
    fn test_parameter_fields_read_current_value() {
        use std::sync::atomic::{AtomicU64, Ordering};
        static LIMIT: AtomicU64 = AtomicU64::new(10);

        let ty = TypeBuilder::<Mailer>::new("Shop::Mailer")
            .parameter("limit", || Value::from(LIMIT.load(Ordering::SeqCst)))
            .field("transport")
            .build();

        let reader = MetadataReader::new();
        let params: Vec<_> = reader.parameter_fields(&ty).collect();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].read(), Some(Value::from(10)));

        LIMIT.store(25, Ordering::SeqCst);
        assert_eq!(params[0].read(), Some(Value::from(25)));
    }

    #[test]
    fn test_method_lookup_and_markers() {
        let ty = TypeBuilder::<Mailer>::new("Shop::Controller::Mailer")
            .method(Method::opaque("send").param("to").route(RouteMarker::post()).before(["auth"]))
            .method(Method::before_filter("auth", |_: &Mailer, _| Ok(None)))
            .build();

        let reader = MetadataReader::new();
        let send = ty.method("send").unwrap();
        assert!(reader.route(send).is_some());
        assert_eq!(
            reader.filters(send, crate::metadata::FilterKind::Before).collect::<Vec<_>>(),
            vec!["auth"]
        );
        assert!(ty.method("auth").unwrap().markers().is_empty());
        assert!(ty.method("missing").is_none());
    }
}
