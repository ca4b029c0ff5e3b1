//! Controller Locator
//!
//! Runs once per request before dispatch: `/shop/user_account/edit/7` brings
//! `Shop::Controller::UserAccount` and its routes into existence if they are
//! not registered yet.

use crate::codec::{self, IdentifierCodec};
use crate::resolver::Resolver;
use crate::{Application, Result};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Symbol path segment under which a pack's controllers live
pub const CONTROLLER_SEGMENT: &str = "Controller";

/// Locates controllers from request paths
pub struct ControllerLocator<'a> {
    app: &'a Application,
}

impl<'a> ControllerLocator<'a> {
    pub fn new(app: &'a Application) -> Self {
        Self { app }
    }

    /// Resolve the controller named by `/pack/controller/...`.
    ///
    /// Returns whether a controller was resolved. Paths that do not name a
    /// registered pack, or name no loadable controller, are left alone.
    pub fn locate_controller(&self, path: &str) -> Result<bool> {
        let mut parts = path.split('/').skip(1);
        let pack_name = parts.next().unwrap_or_default();
        let controller = parts.next().unwrap_or_default();

        let Some(pack) = self.app.pack(pack_name) else {
            #[cfg(feature = "logging")]
            trace!(target: "singular", path = %path, "Path does not name a pack");

            return Ok(false);
        };

        if controller.is_empty() {
            return Ok(false);
        }

        let name =
            IdentifierCodec::with_aliases(self.app.aliases()).to_type_name(controller, true)?;
        let symbol = codec::join_symbol([pack.namespace(), CONTROLLER_SEGMENT, name.as_str()]);

        if !self.app.catalog().is_loadable(&symbol) {
            #[cfg(feature = "logging")]
            trace!(target: "singular", path = %path, symbol = %symbol, "No controller for path");

            return Ok(false);
        }

        let handled = Resolver::new(self.app).resolve_controller(&symbol, &pack)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "singular",
            path = %path,
            symbol = %symbol,
            markers = handled,
            "Controller located"
        );

        Ok(handled > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::shop_app;

    #[test]
    fn test_unknown_pack_does_nothing() {
        let (app, _) = shop_app();
        let locator = ControllerLocator::new(&app);

        assert!(!locator.locate_controller("/foo/x/y").unwrap());
        assert!(app.registry().is_empty());
        assert!(app.routes().is_empty());
    }

    #[test]
    fn test_locates_controller_from_path() {
        let (app, _) = shop_app();
        assert!(
            ControllerLocator::new(&app)
                .locate_controller("/shop/user_account/edit")
                .unwrap()
        );
        assert!(app.has("shop.controller.user_account"));
        assert!(app.routes().get("shop.controller.user_account.edit").is_some());
    }

    #[test]
    fn test_short_paths_are_tolerated() {
        let (app, _) = shop_app();
        let locator = ControllerLocator::new(&app);

        assert!(!locator.locate_controller("").unwrap());
        assert!(!locator.locate_controller("/").unwrap());
        assert!(!locator.locate_controller("/shop").unwrap());
        assert!(!locator.locate_controller("/shop/").unwrap());
        assert!(!locator.locate_controller("/shop/nothing_here").unwrap());
        assert!(app.registry().is_empty());
    }

    #[test]
    fn test_alias_applies_to_controller_segment() {
        let (app, _) = shop_app();
        app.alias("account", "user_account");

        assert!(ControllerLocator::new(&app).locate_controller("/shop/account").unwrap());
        assert!(app.has("shop.controller.user_account"));
    }

    #[test]
    fn test_second_locate_adds_nothing() {
        let (app, _) = shop_app();
        let locator = ControllerLocator::new(&app);

        locator.locate_controller("/shop/user_account/edit/1").unwrap();
        let routes = app.routes().len();
        locator.locate_controller("/shop/user_account/list").unwrap();
        assert_eq!(app.routes().len(), routes);
    }
}
