//! Application root
//!
//! The [`Application`] owns the registry, the type catalog, the registered
//! packs, the alias map, the route table and the configuration. It is a cheap
//! clonable handle; every clone sees the same state.

use crate::catalog::{Instance, Manifest, TypeCatalog, TypeDescriptor};
use crate::codec::AliasMap;
use crate::config::SingularConfig;
use crate::controller_locator::ControllerLocator;
use crate::dispatch::Dispatcher;
use crate::factory::{Deferred, Entry};
use crate::locator::{Located, ServiceLocator};
use crate::pack::{Pack, PackModule, Resolution};
use crate::register::{EagerRegister, RegisterReport};
use crate::registry::ServiceRegistry;
use crate::routing::{Request, Response, RouteTable};
use crate::{Result, SingularError};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, info, trace};

struct Inner {
    registry: ServiceRegistry,
    catalog: TypeCatalog,
    packs: DashMap<String, Arc<Pack>, RandomState>,
    modules: RwLock<Vec<Arc<dyn PackModule>>>,
    aliases: AliasMap,
    routes: RouteTable,
    config: SingularConfig,
    booted: AtomicBool,
}

/// Application root.
///
/// # Examples
///
/// ```rust
/// use singular::{Application, Entry};
///
/// let app = Application::new();
/// app.set("site.name", Entry::value(String::from("demo"))).unwrap();
///
/// let name = app.get_as::<String>("site.name").unwrap();
/// assert_eq!(name.as_str(), "demo");
/// ```
#[derive(Clone)]
pub struct Application {
    inner: Arc<Inner>,
}

impl Application {
    /// Create an application with default configuration
    pub fn new() -> Self {
        Self::with_config(SingularConfig::default())
    }

    /// Create an application; config aliases are merged into the alias map
    pub fn with_config(config: SingularConfig) -> Self {
        let aliases = AliasMap::new();
        for (from, to) in &config.aliases {
            aliases.insert(from.clone(), to.clone());
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "singular",
            aliases = aliases.len(),
            locator = ?config.controller_locator,
            "Creating application"
        );

        Self {
            inner: Arc::new(Inner {
                registry: ServiceRegistry::new(),
                catalog: TypeCatalog::new(),
                packs: DashMap::with_hasher(RandomState::new()),
                modules: RwLock::new(Vec::new()),
                aliases,
                routes: RouteTable::new(),
                config,
                booted: AtomicBool::new(false),
            }),
        }
    }

    // =========================================================================
    // Packs
    // =========================================================================

    /// Register a pack module: load its manifest and run its `register` hook.
    ///
    /// Registering after [`boot`](Self::boot) boots the module immediately.
    pub fn register_pack<M: PackModule>(&self, module: M) -> Result<Arc<Pack>> {
        use dashmap::mapref::entry::Entry as PackEntry;

        let module: Arc<dyn PackModule> = Arc::new(module);
        let pack = Arc::new(module.pack());

        let mut manifest = Manifest::new(pack.namespace());
        module.manifest(&mut manifest);

        let types = match self.inner.packs.entry(pack.name().to_string()) {
            PackEntry::Occupied(_) => return Err(SingularError::already_registered(pack.name())),
            PackEntry::Vacant(slot) => {
                let types = self.inner.catalog.define_all(manifest)?;
                slot.insert(Arc::clone(&pack));
                types
            }
        };
        self.inner.modules.write().push(Arc::clone(&module));

        #[cfg(feature = "logging")]
        info!(
            target: "singular",
            pack = %pack.name(),
            namespace = %pack.namespace(),
            types = types,
            "Pack registered"
        );
        #[cfg(not(feature = "logging"))]
        let _ = types;

        module.register(self)?;

        if self.is_booted() {
            self.boot_module(module.as_ref(), &pack)?;
        }

        Ok(pack)
    }

    /// Registered pack by name
    pub fn pack(&self, name: &str) -> Option<Arc<Pack>> {
        self.inner.packs.get(name).map(|p| Arc::clone(p.value()))
    }

    /// Names of registered packs, sorted
    pub fn packs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.packs.iter().map(|p| p.key().clone()).collect();
        names.sort();
        names
    }

    /// Add a key alias
    pub fn alias(&self, from: impl Into<String>, to: impl Into<String>) {
        self.inner.aliases.insert(from, to);
    }

    #[inline]
    pub fn aliases(&self) -> &AliasMap {
        &self.inner.aliases
    }

    #[inline]
    pub fn catalog(&self) -> &TypeCatalog {
        &self.inner.catalog
    }

    #[inline]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.inner.registry
    }

    #[inline]
    pub fn routes(&self) -> &RouteTable {
        &self.inner.routes
    }

    #[inline]
    pub fn config(&self) -> &SingularConfig {
        &self.inner.config
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Bind `key`; fails if the key is already bound
    pub fn set(&self, key: impl Into<String>, entry: Entry) -> Result<()> {
        self.inner.registry.set(key, entry)
    }

    /// Whether `key` is bound. Never triggers location.
    #[inline]
    pub fn has(&self, key: &str) -> bool {
        self.inner.registry.has(key)
    }

    /// Evaluate `key`, locating it first if it is not bound
    pub fn get(&self, key: &str) -> Result<Instance> {
        if let Some(instance) = self.inner.registry.resolve(self, key)? {
            return Ok(instance);
        }

        #[cfg(feature = "logging")]
        trace!(target: "singular", key = %key, "Registry miss, locating");

        self.locate(key)?;

        match self.inner.registry.resolve(self, key)? {
            Some(instance) => Ok(instance),
            None => {
                #[cfg(feature = "logging")]
                debug!(target: "singular", key = %key, "Key not found");

                Err(SingularError::not_found(key))
            }
        }
    }

    /// Evaluate `key` and downcast to `T`
    pub fn get_as<T: Send + Sync + 'static>(&self, key: &str) -> Result<Arc<T>> {
        self.get(key)?
            .downcast::<T>()
            .map_err(|_| SingularError::type_mismatch::<T>(key))
    }

    /// Evaluate a parameter key
    pub fn parameter(&self, key: &str) -> Result<Value> {
        self.get_as::<Value>(key).map(|v| (*v).clone())
    }

    /// The stored callable of a deferred entry
    pub fn deferred(&self, key: &str) -> Result<Arc<Deferred>> {
        self.get_as::<Deferred>(key)
    }

    /// Run the Service Locator for `key`
    pub fn locate(&self, key: &str) -> Result<Located> {
        ServiceLocator::new(self).locate(key)
    }

    /// Type a key names. Nothing is bound; the type's markers are not read.
    pub fn descriptor_for(&self, key: &str) -> Result<Arc<TypeDescriptor>> {
        ServiceLocator::new(self).descriptor(key)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Boot every registered module once. Idempotent.
    ///
    /// Packs that ask for eager resolution, or are listed in
    /// `eager_packs`, are registered in full here.
    pub fn boot(&self) -> Result<()> {
        if self.inner.booted.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let modules: Vec<Arc<dyn PackModule>> = self.inner.modules.read().clone();

        #[cfg(feature = "logging")]
        info!(target: "singular", packs = modules.len(), "Booting application");

        for module in modules {
            let name = module.pack().name().to_string();
            let pack = self
                .pack(&name)
                .ok_or(SingularError::PackNotFound { pack: name })?;
            self.boot_module(module.as_ref(), &pack)?;
        }

        Ok(())
    }

    #[inline]
    pub fn is_booted(&self) -> bool {
        self.inner.booted.load(Ordering::Acquire)
    }

    fn boot_module(
        &self,
        module: &dyn PackModule,
        pack: &Arc<Pack>,
    ) -> Result<Option<RegisterReport>> {
        module.boot(self)?;

        if module.resolution() == Resolution::Eager || self.inner.config.is_eager(pack.name()) {
            return EagerRegister::new(self).register(pack).map(Some);
        }
        Ok(None)
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Locate the request's controller (per `controller_locator`), then dispatch
    pub fn handle(&self, request: &Request) -> Result<Response> {
        if self.inner.config.controller_locator.applies_to(request) {
            ControllerLocator::new(self).locate_controller(request.uri().path())?;
        }
        Dispatcher::new(self).dispatch(request)
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("packs", &self.packs())
            .field("registry", &self.inner.registry.len())
            .field("types", &self.inner.catalog.len())
            .field("routes", &self.inner.routes.len())
            .field("booted", &self.is_booted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FromPack, TypeBuilder};
    use crate::fixtures::{request, shop_app, Log, ShopPack};
    use crate::metadata::{ControllerMarker, Lifetime};
    use http::Method;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_get_unknown_key_is_not_found() {
        let app = Application::new();
        assert!(matches!(
            app.get("nothing.here"),
            Err(SingularError::NotFound { .. })
        ));
    }

    #[test]
    fn test_get_triggers_locate() {
        let (app, _) = shop_app();
        assert!(!app.has("shop.service.pager"));

        let a = app.get("shop.service.pager").unwrap();
        let b = app.get("shop.service.pager").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_get_as_wrong_type() {
        let app = Application::new();
        app.set("n", Entry::value(1u32)).unwrap();
        assert!(matches!(
            app.get_as::<String>("n"),
            Err(SingularError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_duplicate_pack_rejected() {
        let (app, log) = shop_app();
        let err = app.register_pack(ShopPack::new(log)).unwrap_err();
        assert!(matches!(err, SingularError::AlreadyRegistered { .. }));
    }

    #[test]
    fn test_concurrent_pack_registration_admits_one() {
        let app = Application::new();
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| app.register_pack(ShopPack::new(Log::default()))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, SingularError::AlreadyRegistered { .. })));
        assert!(app.pack("shop").is_some());
    }

    struct ClashPack;

    impl PackModule for ClashPack {
        fn pack(&self) -> Pack {
            Pack::new("clash", "Shop", "/srv/clash")
        }

        fn manifest(&self, manifest: &mut Manifest) {
            manifest
                .define(TypeBuilder::<Counted>::new("Service::Ledger").service(Lifetime::Shared))
                .define(TypeBuilder::<Counted>::new("Service::Pager").service(Lifetime::Shared));
        }
    }

    #[test]
    fn test_pack_with_duplicate_type_is_not_registered() {
        let (app, _) = shop_app();
        let err = app.register_pack(ClashPack).unwrap_err();
        assert!(matches!(err, SingularError::DuplicateType { .. }));
        assert!(app.pack("clash").is_none());
        assert!(!app.catalog().is_loadable("Shop::Service::Ledger"));
        // the namespace owner keeps its own types
        assert!(app.catalog().is_loadable("Shop::Service::Pager"));
    }

    #[test]
    fn test_handle_locates_then_dispatches() {
        let (app, _) = shop_app();
        assert!(app.routes().is_empty());

        let response = app.handle(&request(Method::GET, "/shop/user_account/edit/9")).unwrap();
        assert_eq!(response.body().as_ref(), b"edit 9");
    }

    #[test]
    fn test_explicit_route_served_after_location() {
        let (app, _) = shop_app();

        // the root pattern only exists once its controller is known
        assert!(app.handle(&request(Method::GET, "/about")).is_err());
        app.get("shop.controller.user_account").unwrap();
        let response = app.handle(&request(Method::GET, "/about")).unwrap();
        assert_eq!(response.body().as_ref(), b"about shop");
    }

    #[test]
    fn test_json_trigger_skips_plain_requests() {
        let config = SingularConfig::from_toml_str(r#"controller_locator = "json""#).unwrap();
        let app = Application::with_config(config);
        app.register_pack(ShopPack::new(Default::default())).unwrap();

        let plain = request(Method::GET, "/shop/user_account/edit/9");
        assert!(matches!(app.handle(&plain), Err(SingularError::RouteNotFound { .. })));

        let mut json = request(Method::GET, "/shop/user_account/edit/9");
        json.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        assert!(app.handle(&json).is_ok());
        // routes stay published for later requests
        assert!(app.handle(&plain).is_ok());
    }

    struct Counted;

    static BOOTS: AtomicU32 = AtomicU32::new(0);

    impl FromPack for Counted {
        fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
            Ok(Counted)
        }
    }

    struct EagerPack {
        dir: std::path::PathBuf,
    }

    impl PackModule for EagerPack {
        fn pack(&self) -> Pack {
            Pack::new("admin", "Admin", self.dir.clone())
        }

        fn manifest(&self, manifest: &mut Manifest) {
            manifest
                .define(TypeBuilder::<Counted>::new("Service::Audit").service(Lifetime::Shared))
                .define(
                    TypeBuilder::<Counted>::new("Controller::Dashboard")
                        .controller(ControllerMarker::new()),
                );
        }

        fn boot(&self, _app: &Application) -> Result<()> {
            BOOTS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn resolution(&self) -> Resolution {
            Resolution::Eager
        }
    }

    #[test]
    fn test_boot_is_idempotent_and_eager() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("service")).unwrap();
        std::fs::create_dir_all(dir.path().join("controller")).unwrap();
        std::fs::write(dir.path().join("service/audit.rs"), "").unwrap();
        std::fs::write(dir.path().join("controller/dashboard.rs"), "").unwrap();

        let app = Application::new();
        app.register_pack(EagerPack {
            dir: dir.path().to_path_buf(),
        })
        .unwrap();
        assert!(!app.has("admin.service.audit"));

        let before = BOOTS.load(Ordering::SeqCst);
        app.boot().unwrap();
        app.boot().unwrap();
        assert_eq!(BOOTS.load(Ordering::SeqCst) - before, 1);

        assert!(app.is_booted());
        assert!(app.has("admin.service.audit"));
        assert!(app.has("admin.controller.dashboard"));
    }

    #[test]
    fn test_descriptor_for_binds_nothing() {
        let (app, _) = shop_app();
        let ty = app.descriptor_for("shop.service.pager").unwrap();
        assert_eq!(ty.symbol(), "Shop::Service::Pager");
        assert!(!app.has("shop.service.pager"));
        assert!(matches!(
            app.descriptor_for("shop.service.ghost"),
            Err(SingularError::TypeNotFound { .. })
        ));
        assert!(matches!(
            app.descriptor_for("nowhere.service.pager"),
            Err(SingularError::PackNotFound { .. })
        ));
    }
}
