//! Process-wide emoji and emoji-translation store.

use std::collections::HashMap;

use sha1::{Digest, Sha1};

/// Keyed store for plugin-registered emoji and translated emoji codes,
/// shared across all plugin instances with no per-plugin namespace.
///
/// Every successful registration advances a cache token computed as a hash
/// chain over the previous token and the new key. The token is
/// order-dependent but reproducible for a fixed registration sequence, which
/// lets downstream HTTP caching of emoji data key off a single string.
#[derive(Debug, Default)]
pub struct EmojiStore {
    emojis: HashMap<String, String>,
    translations: HashMap<String, String>,
    cache_token: String,
}

impl EmojiStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an emoji name pointing at an image URL.
    ///
    /// Re-registering a name overwrites the URL and still advances the
    /// cache token.
    pub fn register(&mut self, name: impl Into<String>, url: impl Into<String>) {
        let name = name.into();
        self.advance_token(&name);
        self.emojis.insert(name, url.into());
    }

    /// Register a translation from a locale emoji code to a canonical code.
    pub fn translate(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        self.advance_token(&from);
        self.translations.insert(from, to.into());
    }

    /// Look up an emoji URL by name.
    pub fn url(&self, name: &str) -> Option<&str> {
        self.emojis.get(name).map(String::as_str)
    }

    /// Look up a translated code.
    pub fn translation(&self, from: &str) -> Option<&str> {
        self.translations.get(from).map(String::as_str)
    }

    /// Current cache-invalidation token. Empty until the first registration.
    pub fn cache_token(&self) -> &str {
        &self.cache_token
    }

    /// Number of registered emojis.
    pub fn len(&self) -> usize {
        self.emojis.len()
    }

    /// Whether no emojis are registered.
    pub fn is_empty(&self) -> bool {
        self.emojis.is_empty()
    }

    fn advance_token(&mut self, key: &str) {
        let mut hasher = Sha1::new();
        hasher.update(self.cache_token.as_bytes());
        hasher.update(key.as_bytes());
        self.cache_token = hex::encode(hasher.finalize());
    }
}
