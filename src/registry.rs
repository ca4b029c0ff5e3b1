//! Service registry
//!
//! The registry maps string keys to [`Entry`] values. It is the single store
//! of services, parameters and controllers; lookups that miss are turned into
//! locator runs by [`Application::get`](crate::Application::get).

use crate::catalog::{Instance, TypeDescriptor};
use crate::factory::Entry;
use crate::storage::{RegistryStorage, Slot};
use crate::{Application, Result, SingularError};
use std::cell::RefCell;
use std::sync::Arc;
use std::thread::LocalKey;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

thread_local! {
    /// Keys whose constructor is running on this thread
    static CONSTRUCTING: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Pops its key from a thread-local in-flight stack when dropped.
pub(crate) struct InFlight {
    stack: &'static LocalKey<RefCell<Vec<String>>>,
}

impl InFlight {
    /// Push `key`, or return `None` if it is already in flight on this thread
    pub(crate) fn enter(stack: &'static LocalKey<RefCell<Vec<String>>>, key: &str) -> Option<Self> {
        let entered = stack.with(|keys| {
            let mut keys = keys.borrow_mut();
            if keys.iter().any(|k| k == key) {
                false
            } else {
                keys.push(key.to_string());
                true
            }
        });
        entered.then_some(Self { stack })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.stack.with(|keys| {
            keys.borrow_mut().pop();
        });
    }
}

/// Key → entry store.
///
/// Keys bind once. Re-registering an existing key is rejected by [`set`]
/// and ignored by [`bind`], so a lifetime never changes after the fact.
///
/// [`set`]: ServiceRegistry::set
/// [`bind`]: ServiceRegistry::bind
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    storage: RegistryStorage,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            storage: RegistryStorage::new(),
        }
    }

    /// Bind `key` to `entry`, failing if it is already bound
    pub fn set(&self, key: impl Into<String>, entry: Entry) -> Result<()> {
        let key = key.into();

        #[cfg(feature = "logging")]
        let kind = entry.kind();

        if !self.storage.insert_if_absent(&key, Slot::new(entry, None)) {
            return Err(SingularError::already_registered(key));
        }

        #[cfg(feature = "logging")]
        debug!(target: "singular", key = %key, lifetime = kind, "Registered entry");

        Ok(())
    }

    /// Bind `key` for `origin` unless it is already bound. Returns whether this call won.
    pub fn bind(&self, key: &str, entry: Entry, origin: Option<Arc<TypeDescriptor>>) -> bool {
        #[cfg(feature = "logging")]
        let kind = entry.kind();

        let inserted = self.storage.insert_if_absent(key, Slot::new(entry, origin));

        #[cfg(feature = "logging")]
        if inserted {
            debug!(target: "singular", key = %key, lifetime = kind, "Bound entry");
        } else {
            trace!(target: "singular", key = %key, "Key already bound, keeping existing entry");
        }

        inserted
    }

    /// Bind `key` after `publish` succeeds, atomically with respect to readers
    /// of `key`. Returns `None` if the key was already bound and `publish` did
    /// not run.
    pub fn bind_with<R, F>(
        &self,
        key: &str,
        entry: Entry,
        origin: Option<Arc<TypeDescriptor>>,
        publish: F,
    ) -> Result<Option<R>>
    where
        F: FnOnce() -> Result<R>,
    {
        let published = self.storage.insert_with(key, Slot::new(entry, origin), publish)?;

        #[cfg(feature = "logging")]
        if published.is_none() {
            trace!(target: "singular", key = %key, "Key already bound, keeping existing entry");
        }

        Ok(published)
    }

    #[inline]
    pub fn has(&self, key: &str) -> bool {
        self.storage.contains(key)
    }

    #[inline]
    pub fn slot(&self, key: &str) -> Option<Arc<Slot>> {
        self.storage.get(key)
    }

    /// Type a key was registered for
    pub fn origin(&self, key: &str) -> Option<Arc<TypeDescriptor>> {
        self.storage.get(key).and_then(|s| s.origin().cloned())
    }

    /// Evaluate a bound key; `Ok(None)` if nothing is bound.
    ///
    /// Constructors run with no shard guard held, so they are free to look up
    /// other keys. A constructor that re-enters its own key fails with
    /// `CircularDependency` instead of deadlocking.
    pub fn resolve(&self, app: &Application, key: &str) -> Result<Option<Instance>> {
        let Some(slot) = self.storage.get(key) else {
            return Ok(None);
        };

        if !slot.entry().constructs() {
            return slot.entry().resolve(app).map(Some);
        }

        let _guard = InFlight::enter(&CONSTRUCTING, key).ok_or_else(|| {
            #[cfg(feature = "logging")]
            debug!(target: "singular", key = %key, "Constructor re-entered its own key");

            SingularError::circular(key)
        })?;

        #[cfg(feature = "logging")]
        trace!(target: "singular", key = %key, lifetime = slot.entry().kind(), "Constructing");

        slot.entry().resolve(app).map(Some)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Bound keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.storage.keys()
    }
}
