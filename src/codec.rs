//! Naming-convention transforms between registry keys and type names
//!
//! Registry keys are dotted, snake_case strings (`shop.service.cart_item`);
//! type names are CamelCase symbol paths (`Shop::Service::CartItem`). The
//! [`IdentifierCodec`] converts one into the other, optionally consulting an
//! [`AliasMap`] first so a key can resolve to a differently-named type.

use crate::{Result, SingularError};
use ahash::RandomState;
use dashmap::DashMap;

/// Separator between symbol path segments.
pub const PATH_SEPARATOR: &str = "::";

/// Key → key override table.
///
/// Consulted before any case conversion: `aliases.insert("basket", "cart")`
/// makes `shop.service.basket` resolve to the type `Cart`.
#[derive(Default)]
pub struct AliasMap {
    entries: DashMap<String, String, RandomState>,
}

impl AliasMap {
    /// Create an empty alias map
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Add or replace an alias
    pub fn insert(&self, from: impl Into<String>, to: impl Into<String>) {
        self.entries.insert(from.into(), to.into());
    }

    /// Substitute the alias for `segment`, or return it untouched
    pub fn resolve(&self, segment: &str) -> String {
        self.entries
            .get(segment)
            .map(|to| to.value().clone())
            .unwrap_or_else(|| segment.to_string())
    }

    /// Check if an alias exists
    pub fn contains(&self, segment: &str) -> bool {
        self.entries.contains_key(segment)
    }

    /// Number of aliases
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for AliasMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasMap")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Identifier codec.
///
/// Pure apart from reading the alias map. Inputs containing `::` are
/// transformed segment by segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierCodec<'a> {
    aliases: Option<&'a AliasMap>,
}

impl<'a> IdentifierCodec<'a> {
    /// Codec without any alias substitution
    #[inline]
    pub fn plain() -> Self {
        Self { aliases: None }
    }

    /// Codec that consults `aliases` before converting
    #[inline]
    pub fn with_aliases(aliases: &'a AliasMap) -> Self {
        Self {
            aliases: Some(aliases),
        }
    }

    /// Convert `snake_case` to `CamelCase` (`camelCase` if `capitalize_first` is false).
    ///
    /// ```rust
    /// use singular::IdentifierCodec;
    ///
    /// let codec = IdentifierCodec::plain();
    /// assert_eq!(codec.to_type_name("user_account", true).unwrap(), "UserAccount");
    /// assert_eq!(codec.to_type_name("admin::user_account", true).unwrap(), "Admin::UserAccount");
    /// ```
    pub fn to_type_name(&self, input: &str, capitalize_first: bool) -> Result<String> {
        self.map_segments(input, |segment| {
            let segment = match self.aliases {
                Some(aliases) => aliases.resolve(segment),
                None => segment.to_string(),
            };
            Ok(camelize(&segment, capitalize_first))
        })
    }

    /// Convert `CamelCase` to `snake_case`, splitting before every capital.
    ///
    /// ```rust
    /// use singular::IdentifierCodec;
    ///
    /// let codec = IdentifierCodec::plain();
    /// assert_eq!(codec.to_key("UserAccount").unwrap(), "user_account");
    /// ```
    pub fn to_key(&self, input: &str) -> Result<String> {
        self.map_segments(input, |segment| Ok(snakeize(segment)))
    }

    fn map_segments<F>(&self, input: &str, mut f: F) -> Result<String>
    where
        F: FnMut(&str) -> Result<String>,
    {
        if input.is_empty() {
            return Err(SingularError::empty_segment(input));
        }

        let mut out = Vec::new();
        for segment in input.split(PATH_SEPARATOR) {
            if segment.is_empty() {
                return Err(SingularError::empty_segment(input));
            }
            let converted = f(segment)?;
            if converted.is_empty() {
                return Err(SingularError::empty_segment(input));
            }
            out.push(converted);
        }

        Ok(out.join(PATH_SEPARATOR))
    }
}

fn camelize(segment: &str, capitalize_first: bool) -> String {
    let mut name = String::with_capacity(segment.len());
    for (index, part) in segment.split('_').filter(|p| !p.is_empty()).enumerate() {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            if index == 0 && !capitalize_first {
                name.push(first);
            } else {
                name.push(first.to_ascii_uppercase());
            }
            name.push_str(chars.as_str());
        }
    }
    name
}

fn snakeize(segment: &str) -> String {
    let mut key = String::with_capacity(segment.len() + 4);
    for (index, c) in segment.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if index > 0 {
                key.push('_');
            }
            key.push(c.to_ascii_lowercase());
        } else {
            key.push(c);
        }
    }
    key
}

/// Join symbol path segments with [`PATH_SEPARATOR`], skipping empty ones.
pub fn join_symbol<'s, I>(segments: I) -> String
where
    I: IntoIterator<Item = &'s str>,
{
    segments
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

/// Last segment of a symbol path.
pub fn short_name(symbol: &str) -> &str {
    symbol.rsplit(PATH_SEPARATOR).next().unwrap_or(symbol)
}
