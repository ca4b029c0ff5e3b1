//! Service Locator
//!
//! Turns a registry key that missed into a type symbol and resolves it:
//! `shop.service.cart_item` → `Shop::Service::CartItem`.

use crate::catalog::TypeDescriptor;
use crate::codec::{IdentifierCodec, PATH_SEPARATOR};
use crate::factory::Entry;
use crate::registry::InFlight;
use crate::resolver::Resolver;
use crate::{Application, Result, SingularError};
use std::cell::RefCell;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

thread_local! {
    /// Keys being located on this thread
    static LOCATING: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Outcome of a locate run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Located {
    /// The key was already bound; nothing ran
    Present,
    /// The type was found and resolved; `markers` class markers were handled
    Resolved { symbol: String, markers: usize },
    /// First segment is not a registered pack
    UnknownPack,
    /// No loadable type for the derived symbol
    Missing { symbol: String },
    /// The key is already being located further up this thread's stack
    InFlight,
}

impl Located {
    /// Whether the run bound anything
    pub fn is_resolved(&self) -> bool {
        matches!(self, Located::Resolved { markers, .. } if *markers > 0)
    }
}

/// Locates services by registry key
pub struct ServiceLocator<'a> {
    app: &'a Application,
}

impl<'a> ServiceLocator<'a> {
    pub fn new(app: &'a Application) -> Self {
        Self { app }
    }

    /// Locate `key`.
    ///
    /// Unknown packs and unloadable symbols are not errors; the key is
    /// simply left unbound. Locating a key that is already bound is a no-op.
    pub fn locate(&self, key: &str) -> Result<Located> {
        if self.app.has(key) {
            return Ok(Located::Present);
        }

        let Some(_guard) = InFlight::enter(&LOCATING, key) else {
            #[cfg(feature = "logging")]
            trace!(target: "singular", key = %key, "Key already being located");

            return Ok(Located::InFlight);
        };

        let parts: Vec<&str> = key.split('.').collect();
        let Some(pack) = parts.first().and_then(|name| self.app.pack(name)) else {
            #[cfg(feature = "logging")]
            trace!(target: "singular", key = %key, "Key does not name a pack");

            return Ok(Located::UnknownPack);
        };

        if parts.len() < 2 {
            return Ok(Located::Missing {
                symbol: pack.namespace().to_string(),
            });
        }

        let symbol = self.symbol_for(pack.namespace(), &parts[1..])?;

        if !self.app.catalog().is_loadable(&symbol) {
            #[cfg(feature = "logging")]
            debug!(target: "singular", key = %key, symbol = %symbol, "No loadable type for key");

            return self.locate_parameter(key, &parts, symbol);
        }

        let markers = Resolver::new(self.app).resolve(&symbol, &pack)?;
        if markers > 0 && !self.app.has(key) {
            self.forward_alias(key, &parts, &symbol)?;
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "singular",
            key = %key,
            symbol = %symbol,
            pack = %pack.name(),
            markers = markers,
            "Located"
        );

        Ok(Located::Resolved { symbol, markers })
    }

    /// Type `key` names, without binding anything.
    ///
    /// A bound key answers with the type it was registered for.
    pub fn descriptor(&self, key: &str) -> Result<Arc<TypeDescriptor>> {
        if let Some(origin) = self.app.registry().origin(key) {
            return Ok(origin);
        }

        let parts: Vec<&str> = key.split('.').collect();
        let pack = self
            .app
            .pack(parts[0])
            .ok_or_else(|| SingularError::PackNotFound {
                pack: parts[0].to_string(),
            })?;
        if parts.len() < 2 {
            return Err(SingularError::type_not_found(key));
        }

        let symbol = self.symbol_for(pack.namespace(), &parts[1..])?;
        self.app.catalog().require(&symbol)
    }

    /// `<ns>::<Mid>::...::<Name>`; the alias map applies to the last segment
    fn symbol_for(&self, namespace: &str, rest: &[&str]) -> Result<String> {
        let plain = IdentifierCodec::plain();
        let aliased = IdentifierCodec::with_aliases(self.app.aliases());

        let mut symbol = String::from(namespace);
        if let Some((last, location)) = rest.split_last() {
            for segment in location {
                symbol.push_str(PATH_SEPARATOR);
                symbol.push_str(&plain.to_type_name(segment, true)?);
            }
            symbol.push_str(PATH_SEPARATOR);
            symbol.push_str(&aliased.to_type_name(last, true)?);
        }
        Ok(symbol)
    }

    /// An aliased key resolves a type registered under its own key; bind the
    /// requested key as a forward to it.
    fn forward_alias(&self, key: &str, parts: &[&str], symbol: &str) -> Result<()> {
        let short = IdentifierCodec::plain().to_key(crate::codec::short_name(symbol))?;
        let mut canonical = parts[..parts.len() - 1].join(".");
        canonical.push('.');
        canonical.push_str(&short);

        if canonical == key || !self.app.has(&canonical) {
            return Ok(());
        }

        #[cfg(feature = "logging")]
        debug!(target: "singular", key = %key, canonical = %canonical, "Forwarding aliased key");

        let entry = Entry::Factory(Arc::new(move |app: &Application| app.get(&canonical)));
        self.app.registry().bind(key, entry, None);
        Ok(())
    }

    /// A parameter key (`<service key>.<field>`) exists once its service is
    /// resolved, so locate the parent key and look again.
    fn locate_parameter(&self, key: &str, parts: &[&str], symbol: String) -> Result<Located> {
        if parts.len() < 3 {
            return Ok(Located::Missing { symbol });
        }

        let parent = parts[..parts.len() - 1].join(".");
        match self.locate(&parent)? {
            Located::Resolved { symbol, markers } if self.app.has(key) => {
                Ok(Located::Resolved { symbol, markers })
            }
            Located::Present if self.app.has(key) => Ok(Located::Present),
            _ => Ok(Located::Missing { symbol }),
        }
    }
}
