//! Eager Register
//!
//! Walks a pack's directory and resolves every file whose relative path maps
//! to a loadable type: `controller/user_account.rs` →
//! `<namespace>::Controller::UserAccount`.

use crate::codec::{self, IdentifierCodec};
use crate::resolver::Resolver;
use crate::{Application, Pack, Result, SingularError};
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Counts from one eager registration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterReport {
    /// Files considered
    pub scanned: usize,
    /// Files mapping to a loadable type
    pub loadable: usize,
    /// Loadable types that carried at least one class marker
    pub resolved: usize,
}

/// Registers every marker-bearing type of a pack up front
pub struct EagerRegister<'a> {
    app: &'a Application,
}

impl<'a> EagerRegister<'a> {
    pub fn new(app: &'a Application) -> Self {
        Self { app }
    }

    pub fn register(&self, pack: &Arc<Pack>) -> Result<RegisterReport> {
        let root = pack.directory();
        let extensions = &self.app.config().extensions;
        let resolver = Resolver::new(self.app);
        let mut report = RegisterReport::default();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|err| walk_error(root, err))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !extensions.is_empty() {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
                if !extensions.iter().any(|allowed| allowed == ext) {
                    continue;
                }
            }
            report.scanned += 1;

            let Some(symbol) = symbol_for(pack, root, path) else {
                #[cfg(feature = "logging")]
                trace!(target: "singular", path = %path.display(), "File does not map to a symbol");

                continue;
            };

            if !self.app.catalog().is_loadable(&symbol) {
                continue;
            }
            report.loadable += 1;

            if resolver.resolve(&symbol, pack)? > 0 {
                report.resolved += 1;
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "singular",
            pack = %pack.name(),
            scanned = report.scanned,
            loadable = report.loadable,
            resolved = report.resolved,
            "Eager registration complete"
        );

        Ok(report)
    }
}

/// Symbol path for a file relative to the pack root, extension stripped
fn symbol_for(pack: &Pack, root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let codec = IdentifierCodec::plain();

    let mut segments = vec![pack.namespace().to_string()];
    for component in relative.components() {
        let segment = component.as_os_str().to_str()?;
        segments.push(codec.to_type_name(segment, true).ok()?);
    }

    Some(codec::join_symbol(segments.iter().map(String::as_str)))
}

fn walk_error(root: &Path, err: walkdir::Error) -> SingularError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    SingularError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FromPack, Manifest, TypeBuilder};
    use crate::config::SingularConfig;
    use crate::metadata::{ControllerMarker, Lifetime};
    use std::fs;

    struct Stub;

    impl FromPack for Stub {
        fn from_pack(_app: &Application, _pack: &Arc<Pack>) -> Result<Self> {
            Ok(Stub)
        }
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn setup(config: SingularConfig) -> (tempfile::TempDir, Application, Arc<Pack>) {
        let dir = tempfile::tempdir().unwrap();
        for file in [
            "controller/user_account.rs",
            "service/cart.rs",
            "service/Mailer.rs",
            "model/order.rs",
            "model/order_line.rs",
            "README.md",
        ] {
            touch(dir.path(), file);
        }

        let mut manifest = Manifest::new("Shop");
        manifest
            .define(
                TypeBuilder::<Stub>::new("Controller::UserAccount")
                    .controller(ControllerMarker::new()),
            )
            .define(TypeBuilder::<Stub>::new("Service::Cart").service(Lifetime::Shared))
            .define(TypeBuilder::<Stub>::new("Service::Mailer").service(Lifetime::Factory))
            .define(TypeBuilder::<Stub>::new("Model::Order"))
            .define(TypeBuilder::<Stub>::new("Model::OrderLine"));

        let app = Application::with_config(config);
        app.catalog().define_all(manifest).unwrap();
        let pack = Arc::new(Pack::new("shop", "Shop", dir.path()));
        (dir, app, pack)
    }

    #[test]
    fn test_registers_only_marked_types() {
        let (_dir, app, pack) = setup(SingularConfig::default());
        let report = EagerRegister::new(&app).register(&pack).unwrap();

        assert_eq!(report.scanned, 6);
        assert_eq!(report.loadable, 5);
        assert_eq!(report.resolved, 3);
        assert!(app.has("shop.controller.user_account"));
        assert!(app.has("shop.service.cart"));
        assert!(app.has("shop.service.mailer"));
        assert!(!app.has("shop.model.order"));
        assert_eq!(app.registry().len(), 3);
    }

    #[test]
    fn test_extension_filter() {
        let config = SingularConfig {
            extensions: vec!["md".to_string()],
            ..SingularConfig::default()
        };
        let (_dir, app, pack) = setup(config);
        let report = EagerRegister::new(&app).register(&pack).unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.resolved, 0);
    }

    #[test]
    fn test_running_twice_is_idempotent() {
        let (_dir, app, pack) = setup(SingularConfig::default());
        let register = EagerRegister::new(&app);

        register.register(&pack).unwrap();
        let size = app.registry().len();
        register.register(&pack).unwrap();
        assert_eq!(app.registry().len(), size);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let app = Application::new();
        let pack = Arc::new(Pack::new("ghost", "Ghost", "/definitely/not/here"));
        let err = EagerRegister::new(&app).register(&pack).unwrap_err();
        assert!(matches!(err, SingularError::Io { .. }));
    }

    #[test]
    fn test_symbol_for_relative_path() {
        let pack = Pack::new("shop", "Shop", "/srv/shop");
        assert_eq!(
            symbol_for(&pack, Path::new("/srv/shop"), Path::new("/srv/shop/admin/user_account.rs")),
            Some("Shop::Admin::UserAccount".to_string())
        );
    }
}
