//! Registry entry kinds
//!
//! An [`Entry`] fixes how a registry slot produces its value. The lifetime is
//! chosen at registration time and never changes afterwards:
//!
//! - [`Entry::Value`]: a resolved value, returned as-is
//! - [`Entry::Factory`]: invoked on every lookup, new instance per call
//! - [`Entry::Shared`]: invoked at most once, cached thereafter
//! - [`Entry::Deferred`]: the callable itself is the value; callers invoke it

use crate::catalog::{ConstructFn, Instance};
use crate::metadata::Lifetime;
use crate::{Application, Pack, Result, SingularError};
use once_cell::sync::OnceCell;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Type-erased factory function
pub type FactoryFn = Arc<dyn Fn(&Application) -> Result<Instance> + Send + Sync>;

// =============================================================================
// Shared Factory
// =============================================================================

/// Shared factory - creates the instance on first access
pub struct SharedFactory {
    init: FactoryFn,
    instance: OnceCell<Instance>,
}

impl SharedFactory {
    #[inline]
    pub fn new(init: FactoryFn) -> Self {
        Self {
            init,
            instance: OnceCell::new(),
        }
    }

    /// Get the instance, creating it if necessary
    #[inline]
    pub fn resolve(&self, app: &Application) -> Result<Instance> {
        #[cfg(feature = "logging")]
        if self.instance.get().is_some() {
            trace!(
                target: "singular",
                "Shared entry already initialized, returning cached instance"
            );
        }

        self.instance
            .get_or_try_init(|| {
                #[cfg(feature = "logging")]
                debug!(target: "singular", "Shared entry initializing on first access");

                (self.init)(app)
            })
            .map(Arc::clone)
    }

    /// Whether the instance has been created
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.instance.get().is_some()
    }
}

// =============================================================================
// Deferred callable
// =============================================================================

/// A stored constructor handed out uninvoked.
pub struct Deferred {
    call: FactoryFn,
}

impl Deferred {
    #[inline]
    pub fn new(call: FactoryFn) -> Self {
        Self { call }
    }

    /// Invoke the callable
    #[inline]
    pub fn invoke(&self, app: &Application) -> Result<Instance> {
        (self.call)(app)
    }

    /// Invoke and downcast to `T`
    pub fn invoke_as<T: Send + Sync + 'static>(&self, app: &Application) -> Result<Arc<T>> {
        self.invoke(app)?
            .downcast::<T>()
            .map_err(|_| SingularError::type_mismatch::<T>("<deferred>"))
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

// =============================================================================
// Entry
// =============================================================================

/// Registry entry
pub enum Entry {
    /// Resolved value
    Value(Instance),
    /// New instance per lookup
    Factory(FactoryFn),
    /// Created on first lookup, then cached
    Shared(SharedFactory),
    /// Holds an `Arc<Deferred>`, returned as-is
    Deferred(Instance),
}

impl Entry {
    /// Entry holding a resolved value
    #[inline]
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Entry::Value(Arc::new(value))
    }

    /// Per-call factory
    #[inline]
    pub fn factory<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Application) -> Result<T> + Send + Sync + 'static,
    {
        Entry::Factory(Arc::new(move |app: &Application| {
            f(app).map(|v| Arc::new(v) as Instance)
        }))
    }

    /// Shared factory
    #[inline]
    pub fn shared<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Application) -> Result<T> + Send + Sync + 'static,
    {
        Entry::Shared(SharedFactory::new(Arc::new(move |app: &Application| {
            f(app).map(|v| Arc::new(v) as Instance)
        })))
    }

    /// Deferred callable
    #[inline]
    pub fn deferred<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Application) -> Result<T> + Send + Sync + 'static,
    {
        let call: FactoryFn = Arc::new(move |app: &Application| {
            f(app).map(|v| Arc::new(v) as Instance)
        });
        Entry::Deferred(Arc::new(Deferred::new(call)))
    }

    /// Entry of the given lifetime around a type constructor
    pub(crate) fn from_constructor(
        lifetime: Lifetime,
        construct: ConstructFn,
        pack: Arc<Pack>,
    ) -> Self {
        let call: FactoryFn = Arc::new(move |app: &Application| construct(app, &pack));
        match lifetime {
            Lifetime::Factory => Entry::Factory(call),
            Lifetime::Shared => Entry::Shared(SharedFactory::new(call)),
            Lifetime::Deferred => Entry::Deferred(Arc::new(Deferred::new(call))),
        }
    }

    /// Resolve the entry's value
    #[inline]
    pub fn resolve(&self, app: &Application) -> Result<Instance> {
        match self {
            Entry::Value(v) => Ok(Arc::clone(v)),
            Entry::Factory(f) => f(app),
            Entry::Shared(f) => f.resolve(app),
            Entry::Deferred(d) => Ok(Arc::clone(d)),
        }
    }

    /// Lifetime name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::Value(_) => "value",
            Entry::Factory(_) => "factory",
            Entry::Shared(_) => "shared",
            Entry::Deferred(_) => "deferred",
        }
    }

    /// Whether resolving may run a constructor
    #[inline]
    pub(crate) fn constructs(&self) -> bool {
        match self {
            Entry::Factory(_) => true,
            Entry::Shared(f) => !f.is_initialized(),
            Entry::Value(_) | Entry::Deferred(_) => false,
        }
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Entry").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone)]
    struct TestService {
        id: u32,
    }

    #[test]
    fn test_value_entry() {
        let app = Application::new();
        let entry = Entry::value(TestService { id: 42 });

        let a = entry.resolve(&app).unwrap().downcast::<TestService>().unwrap();
        let b = entry.resolve(&app).unwrap().downcast::<TestService>().unwrap();

        assert_eq!(a.id, 42);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_shared_entry() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let app = Application::new();
        let entry = Entry::shared(|_| {
            Ok(TestService {
                id: COUNTER.fetch_add(1, Ordering::SeqCst),
            })
        });

        assert_eq!(COUNTER.load(Ordering::SeqCst), 0);
        assert!(entry.constructs());

        let a = entry.resolve(&app).unwrap().downcast::<TestService>().unwrap();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        assert!(!entry.constructs());

        let b = entry.resolve(&app).unwrap().downcast::<TestService>().unwrap();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_factory_entry() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let app = Application::new();
        let entry = Entry::factory(|_| {
            Ok(TestService {
                id: COUNTER.fetch_add(1, Ordering::SeqCst),
            })
        });

        let a = entry.resolve(&app).unwrap().downcast::<TestService>().unwrap();
        let b = entry.resolve(&app).unwrap().downcast::<TestService>().unwrap();

        assert_eq!(a.id, 0);
        assert_eq!(b.id, 1);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_deferred_entry_is_not_invoked() {
        static CALLS: AtomicU32 = AtomicU32::new(0);

        let app = Application::new();
        let entry = Entry::deferred(|_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(TestService { id: 7 })
        });

        let deferred = entry.resolve(&app).unwrap().downcast::<Deferred>().unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        let service = deferred.invoke_as::<TestService>(&app).unwrap();
        assert_eq!(service.id, 7);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_shared_init_is_retried() {
        static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

        let app = Application::new();
        let entry = Entry::shared(|_| {
            if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SingularError::creation_failed("flaky", "first attempt"))
            } else {
                Ok(TestService { id: 1 })
            }
        });

        assert!(entry.resolve(&app).is_err());
        assert!(entry.resolve(&app).is_ok());
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
    }
}
