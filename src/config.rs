//! Application configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! controller_locator = "json"
//! eager_packs = ["admin"]
//! extensions = ["rs"]
//!
//! [aliases]
//! basket = "cart"
//! ```

use crate::routing::Request;
use crate::{Result, SingularError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// When the Controller Locator runs for an inbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorTrigger {
    /// Every request
    #[default]
    Always,
    /// Requests whose `Content-Type` is `application/json`
    Json,
    /// Never; only eagerly registered or already located routes are served
    Never,
}

impl LocatorTrigger {
    /// Whether the locator should run for `request`
    pub fn applies_to(&self, request: &Request) -> bool {
        match self {
            LocatorTrigger::Always => true,
            LocatorTrigger::Never => false,
            LocatorTrigger::Json => request
                .headers()
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.trim_start().starts_with("application/json")),
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SingularConfig {
    pub controller_locator: LocatorTrigger,

    /// Merged into the alias map when the application is created
    pub aliases: BTreeMap<String, String>,

    /// Packs registered eagerly at boot regardless of their own resolution
    pub eager_packs: Vec<String>,

    /// File extensions the eager register considers; empty means all
    pub extensions: Vec<String>,
}

impl SingularConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SingularError::Config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SingularError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Whether `pack` is forced onto the eager path
    pub fn is_eager(&self, pack: &str) -> bool {
        self.eager_packs.iter().any(|p| p == pack)
    }
}
