//! Site settings store and plugin enablement predicates.
//!
//! Enablement is evaluated at call time, not at registration time: a handler
//! registered while its plugin was enabled becomes inert the moment the
//! backing site setting flips to false, without any re-registration.

use std::sync::Arc;

use dashmap::DashMap;

/// Process-wide boolean site settings.
///
/// Written during startup and by admin actions; read per request by
/// [`EnabledCheck`]. Concurrent reads are safe; there is no startup-time
/// concurrent writer.
#[derive(Debug, Default)]
pub struct SiteSettings {
    values: DashMap<String, bool>,
}

impl SiteSettings {
    /// Create an empty settings store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a boolean setting.
    pub fn set(&self, name: impl Into<String>, value: bool) {
        self.values.insert(name.into(), value);
    }

    /// Read a boolean setting. Absent settings read false.
    pub fn get(&self, name: &str) -> bool {
        self.values.get(name).map(|v| *v).unwrap_or(false)
    }

    /// Check whether a setting has been defined at all.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

/// How a plugin decides whether it is currently enabled.
#[derive(Debug, Clone)]
pub enum EnabledState {
    /// The plugin is always enabled.
    Always,
    /// Enablement delegates to a named boolean site setting.
    Setting(String),
}

impl Default for EnabledState {
    fn default() -> Self {
        Self::Always
    }
}

/// Optional filter applied on top of the raw enabled value.
pub type EnabledOverride = Arc<dyn Fn(bool) -> bool + Send + Sync>;

/// Call-time enablement predicate handed to every registered handler.
///
/// Cheap to clone; holds the settings store by `Arc` so the check always
/// reads the live value.
#[derive(Clone)]
pub struct EnabledCheck {
    state: EnabledState,
    settings: Arc<SiteSettings>,
    filter: Option<EnabledOverride>,
}

impl EnabledCheck {
    /// Create a predicate from a state and the shared settings store.
    pub fn new(state: EnabledState, settings: Arc<SiteSettings>) -> Self {
        Self {
            state,
            settings,
            filter: None,
        }
    }

    /// Create a predicate that is always true.
    pub fn always(settings: Arc<SiteSettings>) -> Self {
        Self::new(EnabledState::Always, settings)
    }

    /// Attach an override filter.
    pub fn with_filter(mut self, filter: EnabledOverride) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Evaluate the predicate against the current settings.
    pub fn enabled(&self) -> bool {
        let raw = match &self.state {
            EnabledState::Always => true,
            EnabledState::Setting(name) => self.settings.get(name),
        };

        match &self.filter {
            Some(filter) => filter(raw),
            None => raw,
        }
    }
}

impl std::fmt::Debug for EnabledCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnabledCheck")
            .field("state", &self.state)
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default_false() {
        let settings = SiteSettings::new();
        assert!(!settings.get("poll_enabled"));
        assert!(!settings.contains("poll_enabled"));

        settings.set("poll_enabled", true);
        assert!(settings.get("poll_enabled"));
        assert!(settings.contains("poll_enabled"));
    }

    #[test]
    fn test_enabled_always() {
        let settings = Arc::new(SiteSettings::new());
        let check = EnabledCheck::always(settings);
        assert!(check.enabled());
    }

    #[test]
    fn test_enabled_tracks_setting() {
        let settings = Arc::new(SiteSettings::new());
        let check = EnabledCheck::new(
            EnabledState::Setting("chat_enabled".into()),
            settings.clone(),
        );

        assert!(!check.enabled());
        settings.set("chat_enabled", true);
        assert!(check.enabled());
        settings.set("chat_enabled", false);
        assert!(!check.enabled());
    }

    #[test]
    fn test_enabled_override_filter() {
        let settings = Arc::new(SiteSettings::new());
        settings.set("chat_enabled", true);

        let check = EnabledCheck::new(
            EnabledState::Setting("chat_enabled".into()),
            settings.clone(),
        )
        .with_filter(Arc::new(|_| false));

        // Filter wins over the raw setting value.
        assert!(!check.enabled());
    }
}
