//! Pack descriptors and pack modules
//!
//! A pack is a feature module with a name (first segment of every registry
//! key it owns), a namespace root (prefix of every symbol path it defines)
//! and a directory root (scanned by the eager register).

use crate::catalog::Manifest;
use crate::{Application, Result};
use std::path::{Path, PathBuf};

/// Static identity of a feature module.
///
/// Immutable once registered on an [`Application`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pack {
    name: String,
    namespace: String,
    directory: PathBuf,
}

impl Pack {
    /// Create a pack descriptor
    ///
    /// ```rust
    /// use singular::Pack;
    ///
    /// let pack = Pack::new("shop", "Shop", "packs/shop");
    /// assert_eq!(pack.service_key("service", "cart"), "shop.service.cart");
    /// ```
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            directory: directory.into(),
        }
    }

    /// Pack name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace root for symbol paths
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Directory root
    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `<pack>.<category>.<name>`
    pub fn service_key(&self, category: &str, name: &str) -> String {
        if category.is_empty() {
            format!("{}.{}", self.name, name)
        } else {
            format!("{}.{}.{}", self.name, category, name)
        }
    }

    /// Registry key of a controller
    pub fn controller_key(&self, name: &str) -> String {
        self.service_key("controller", name)
    }

    /// Registry key under which a controller's `Store` is expected
    pub fn store_key(&self, name: &str) -> String {
        self.service_key("store", name)
    }
}

impl std::fmt::Display for Pack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.namespace)
    }
}

/// How a pack's services and routes come into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    /// Registered on first lookup / first request
    #[default]
    Lazy,
    /// Registered in full at boot
    Eager,
}

/// A pack implementation plugged into an [`Application`].
///
/// `manifest` is the pack's explicit registration table: every type the pack
/// wants to be loadable by symbol path must be defined there.
pub trait PackModule: Send + Sync + 'static {
    /// Descriptor of this pack
    fn pack(&self) -> Pack;

    /// Define the pack's types
    fn manifest(&self, manifest: &mut Manifest);

    /// Called once when the pack is registered
    fn register(&self, _app: &Application) -> Result<()> {
        Ok(())
    }

    /// Called once when the application boots
    fn boot(&self, _app: &Application) -> Result<()> {
        Ok(())
    }

    /// Resolution strategy
    fn resolution(&self) -> Resolution {
        Resolution::Lazy
    }
}
