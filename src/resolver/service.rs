//! Service registration from service markers

use crate::catalog::TypeDescriptor;
use crate::codec::{IdentifierCodec, PATH_SEPARATOR};
use crate::factory::Entry;
use crate::metadata::{MetadataReader, ServiceMarker};
use crate::{Application, Pack, Result, SingularError};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Registers a marked type as a registry entry plus its parameter keys
pub struct ServiceResolver<'a> {
    app: &'a Application,
    reader: MetadataReader,
}

impl<'a> ServiceResolver<'a> {
    pub fn new(app: &'a Application) -> Self {
        Self {
            app,
            reader: MetadataReader::new(),
        }
    }

    /// Register `ty` under its service key. Returns the key.
    ///
    /// Every parameter key is checked before anything is bound, and the
    /// service key is bound last, so a reader that sees the service also
    /// sees its parameters. A conflict leaves the service unbound and is
    /// reported again on the next lookup.
    pub fn resolve(
        &self,
        marker: &ServiceMarker,
        ty: &Arc<TypeDescriptor>,
        pack: &Arc<Pack>,
    ) -> Result<String> {
        let key = service_key(ty, pack)?;
        if is_bound_for(self.app, &key, ty)? {
            #[cfg(feature = "logging")]
            trace!(target: "singular", key = %key, "Service already resolved");

            return Ok(key);
        }

        self.register_parameters(ty, &key)?;

        let entry = Entry::from_constructor(marker.lifetime, ty.constructor(), Arc::clone(pack));
        claim(self.app, &key, entry, ty)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "singular",
            key = %key,
            symbol = %ty.symbol(),
            lifetime = marker.lifetime.as_str(),
            "Service resolved"
        );

        Ok(key)
    }

    /// Register `<service key>.<field>` for every parameter field.
    ///
    /// Parameter keys are evaluated on every lookup and read the field's
    /// current value.
    pub fn register_parameters(
        &self,
        ty: &Arc<TypeDescriptor>,
        service_key: &str,
    ) -> Result<usize> {
        let parameters = self.parameter_entries(ty, service_key);
        for (param, _) in &parameters {
            is_bound_for(self.app, param, ty)?;
        }

        let count = parameters.len();
        for (param, entry) in parameters {
            claim(self.app, &param, entry, ty)?;

            #[cfg(feature = "logging")]
            trace!(target: "singular", key = %param, "Parameter registered");
        }
        Ok(count)
    }

    fn parameter_entries(
        &self,
        ty: &Arc<TypeDescriptor>,
        service_key: &str,
    ) -> Vec<(String, Entry)> {
        self.reader
            .parameter_fields(ty)
            .filter_map(|field| {
                let read = field.reader()?;
                let key = format!("{service_key}.{}", field.name());
                let entry = Entry::Factory(Arc::new(move |_: &Application| {
                    Ok(Arc::new(read()) as crate::catalog::Instance)
                }));
                Some((key, entry))
            })
            .collect()
    }
}

/// Whether `key` is already bound for `ty`; bound for anything else is an error
fn is_bound_for(app: &Application, key: &str, ty: &TypeDescriptor) -> Result<bool> {
    match app.registry().slot(key) {
        None => Ok(false),
        Some(slot) if slot.is_from(ty.symbol()) => Ok(true),
        Some(_) => Err(SingularError::already_registered(key)),
    }
}

/// Bind `key` for `ty`, treating an existing binding for the same type as done
fn claim(app: &Application, key: &str, entry: Entry, ty: &Arc<TypeDescriptor>) -> Result<()> {
    if app.registry().bind(key, entry, Some(Arc::clone(ty))) {
        return Ok(());
    }
    is_bound_for(app, key, ty).map(|_| ())
}

/// `pack.<category path>.<snake name>`, namespace root stripped
pub fn service_key(ty: &TypeDescriptor, pack: &Pack) -> Result<String> {
    let codec = IdentifierCodec::plain();
    let symbol = ty.symbol();

    let relative = symbol
        .strip_prefix(pack.namespace())
        .and_then(|rest| rest.strip_prefix(PATH_SEPARATOR))
        .unwrap_or(symbol);

    let mut segments: Vec<&str> = relative.split(PATH_SEPARATOR).collect();
    let short = segments.pop().unwrap_or(relative);

    let mut key = String::from(pack.name());
    for segment in segments {
        key.push('.');
        key.push_str(&codec.to_key(segment)?);
    }
    key.push('.');
    key.push_str(&codec.to_key(short)?);

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FromPack, Manifest, TypeBuilder};
    use crate::metadata::Lifetime;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU64, Ordering};

    static PER_PAGE: AtomicU64 = AtomicU64::new(20);

    struct Cart {
        pack: String,
    }

    impl FromPack for Cart {
        fn from_pack(_app: &Application, pack: &Arc<Pack>) -> Result<Self> {
            Ok(Cart {
                pack: pack.name().to_string(),
            })
        }
    }

    fn setup(lifetime: Lifetime) -> (Application, Arc<Pack>, Arc<TypeDescriptor>) {
        let mut manifest = Manifest::new("Shop");
        manifest.define(
            TypeBuilder::<Cart>::new("Service::OrderCart")
                .service(lifetime)
                .parameter("per_page", || Value::from(PER_PAGE.load(Ordering::SeqCst))),
        );
        let app = Application::new();
        app.catalog().define_all(manifest).unwrap();
        let ty = app.catalog().require("Shop::Service::OrderCart").unwrap();
        (app, Arc::new(Pack::new("shop", "Shop", "/srv/shop")), ty)
    }

    #[test]
    fn test_service_key_strips_namespace() {
        let (_, pack, ty) = setup(Lifetime::Shared);
        assert_eq!(service_key(&ty, &pack).unwrap(), "shop.service.order_cart");
    }

    #[test]
    fn test_service_key_nested_category() {
        let ty = TypeBuilder::<Cart>::new("Shop::Admin::Service::AuditLog").build();
        let pack = Pack::new("shop", "Shop", "/srv/shop");
        assert_eq!(service_key(&ty, &pack).unwrap(), "shop.admin.service.audit_log");
    }

    #[test]
    fn test_shared_constructed_once_with_pack() {
        let (app, pack, ty) = setup(Lifetime::Shared);
        let key = ServiceResolver::new(&app)
            .resolve(&ServiceMarker::new(Lifetime::Shared), &ty, &pack)
            .unwrap();

        let a = app.get_as::<Cart>(&key).unwrap();
        let b = app.get_as::<Cart>(&key).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.pack, "shop");
    }

    #[test]
    fn test_deferred_hands_out_callable() {
        let (app, pack, ty) = setup(Lifetime::Deferred);
        let key = ServiceResolver::new(&app)
            .resolve(&ServiceMarker::new(Lifetime::Deferred), &ty, &pack)
            .unwrap();

        let deferred = app.deferred(&key).unwrap();
        let cart = deferred.invoke_as::<Cart>(&app).unwrap();
        assert_eq!(cart.pack, "shop");
    }

    #[test]
    fn test_parameter_reads_current_value() {
        let (app, pack, ty) = setup(Lifetime::Factory);
        ServiceResolver::new(&app)
            .resolve(&ServiceMarker::new(Lifetime::Factory), &ty, &pack)
            .unwrap();

        let key = "shop.service.order_cart.per_page";
        let first = app.parameter(key).unwrap();
        assert!(first.is_u64());

        PER_PAGE.store(50, Ordering::SeqCst);
        assert_eq!(app.parameter(key).unwrap(), Value::from(50));
    }

    #[test]
    fn test_resolving_twice_is_idempotent() {
        let (app, pack, ty) = setup(Lifetime::Shared);
        let resolver = ServiceResolver::new(&app);
        let marker = ServiceMarker::new(Lifetime::Shared);

        resolver.resolve(&marker, &ty, &pack).unwrap();
        let size = app.registry().len();
        resolver.resolve(&marker, &ty, &pack).unwrap();
        assert_eq!(app.registry().len(), size);
    }

    #[test]
    fn test_taken_parameter_key_binds_nothing() {
        let app = Application::new();
        app.register_pack(LabPack).unwrap();
        app.set("lab.service.cfg.a", Entry::value(0u8)).unwrap();

        for _ in 0..2 {
            let err = app.get("lab.service.cfg").unwrap_err();
            assert!(matches!(
                err,
                SingularError::AlreadyRegistered { ref key } if key == "lab.service.cfg.a"
            ));
        }
        assert!(!app.has("lab.service.cfg"));
        assert!(!app.has("lab.service.cfg.b"));
    }

    struct LabPack;

    impl crate::PackModule for LabPack {
        fn pack(&self) -> Pack {
            Pack::new("lab", "Lab", "/srv/lab")
        }

        fn manifest(&self, manifest: &mut Manifest) {
            manifest.define(
                TypeBuilder::<Cart>::new("Service::Cfg")
                    .service(Lifetime::Shared)
                    .parameter("a", || Value::from(1))
                    .parameter("b", || Value::from(2)),
            );
        }
    }

    #[test]
    fn test_key_taken_by_other_binding_is_error() {
        let (app, pack, ty) = setup(Lifetime::Shared);
        app.set("shop.service.order_cart", Entry::value(1u8)).unwrap();

        let err = ServiceResolver::new(&app)
            .resolve(&ServiceMarker::new(Lifetime::Shared), &ty, &pack)
            .unwrap_err();
        assert!(matches!(err, SingularError::AlreadyRegistered { .. }));
    }
}
