//! Marker-driven resolution
//!
//! The [`Resolver`] loads a type by symbol path, reads its class markers and
//! hands each one to the matching specialized resolver:
//! [`ServiceResolver`] for service markers, [`ControllerResolver`] for
//! controller markers.

pub mod controller;
pub mod service;

pub use controller::ControllerResolver;
pub use service::ServiceResolver;

use crate::catalog::TypeDescriptor;
use crate::metadata::{ClassMarker, MetadataReader};
use crate::{Application, Pack, Result};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Which class markers a resolution pass acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kinds {
    Services,
    Controllers,
    All,
}

impl Kinds {
    fn accepts(self, marker: &ClassMarker) -> bool {
        matches!(
            (self, marker),
            (Kinds::All, _)
                | (Kinds::Services, ClassMarker::Service(_))
                | (Kinds::Controllers, ClassMarker::Controller(_))
        )
    }
}

/// Dispatches class markers to the specialized resolvers
pub struct Resolver<'a> {
    app: &'a Application,
    reader: MetadataReader,
}

impl<'a> Resolver<'a> {
    pub fn new(app: &'a Application) -> Self {
        Self {
            app,
            reader: MetadataReader::new(),
        }
    }

    /// Resolve the service markers of `symbol`. Returns the number of markers handled.
    pub fn resolve_service(&self, symbol: &str, pack: &Arc<Pack>) -> Result<usize> {
        self.resolve_kinds(symbol, pack, Kinds::Services)
    }

    /// Resolve the controller markers of `symbol`. Returns the number of markers handled.
    pub fn resolve_controller(&self, symbol: &str, pack: &Arc<Pack>) -> Result<usize> {
        self.resolve_kinds(symbol, pack, Kinds::Controllers)
    }

    /// Resolve every class marker of `symbol`
    pub fn resolve(&self, symbol: &str, pack: &Arc<Pack>) -> Result<usize> {
        self.resolve_kinds(symbol, pack, Kinds::All)
    }

    fn resolve_kinds(&self, symbol: &str, pack: &Arc<Pack>, kinds: Kinds) -> Result<usize> {
        let ty = self.app.catalog().require(symbol)?;
        self.resolve_type(&ty, pack, kinds)
    }

    fn resolve_type(
        &self,
        ty: &Arc<TypeDescriptor>,
        pack: &Arc<Pack>,
        kinds: Kinds,
    ) -> Result<usize> {
        let mut handled = 0;

        for marker in self.reader.class_markers(ty) {
            if !kinds.accepts(marker) {
                continue;
            }

            match marker {
                ClassMarker::Service(service) => {
                    ServiceResolver::new(self.app).resolve(service, ty, pack)?;
                }
                ClassMarker::Controller(controller) => {
                    ControllerResolver::new(self.app).resolve(controller, ty, pack)?;
                }
            }
            handled += 1;
        }

        #[cfg(feature = "logging")]
        if handled == 0 {
            trace!(
                target: "singular",
                symbol = %ty.symbol(),
                kinds = ?kinds,
                "Type carries no matching markers"
            );
        } else {
            debug!(
                target: "singular",
                symbol = %ty.symbol(),
                pack = %pack.name(),
                markers = handled,
                "Resolved type"
            );
        }

        Ok(handled)
    }
}
