//! Host-wide registries populated during plugin activation.
//!
//! All of these are single-writer-at-startup: plugins flush into them
//! sequentially while the process boots, then the host calls [`freeze`] and
//! the registries become read-only snapshots for the serving phase. Entries
//! persist regardless of later plugin disablement; enablement is checked at
//! call time by the handlers themselves, not at registration time.
//!
//! [`freeze`]: HostRegistries::freeze

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::emoji::EmojiStore;
use crate::error::{Error, Result};
use crate::extension::ExtensionPoints;
use crate::instance::{AdminRoute, AuthProvider, ColorScheme, CspExtension, FieldType, HtmlBuilderFn};
use crate::locales::LocaleEntry;
use crate::settings::EnabledCheck;

/// A front-end asset registered by a plugin, tagged with the plugin's
/// directory-derived namespace to avoid collisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Absolute path of the asset file.
    pub path: PathBuf,
    /// Namespace, derived from the plugin directory name.
    pub namespace: String,
}

/// An HTML builder with its call-time gate.
pub struct GatedHtmlBuilder {
    /// Owning plugin name.
    pub plugin: String,
    enabled: EnabledCheck,
    func: HtmlBuilderFn,
}

/// Host-wide mutable registries, owned by the host process.
pub struct HostRegistries {
    frozen: AtomicBool,

    assets: RwLock<Vec<AssetEntry>>,
    locales: RwLock<Vec<LocaleEntry>>,
    service_workers: RwLock<Vec<PathBuf>>,
    seed_data: RwLock<Vec<(String, Value)>>,
    color_schemes: RwLock<Vec<ColorScheme>>,
    csp_extensions: RwLock<Vec<CspExtension>>,
    admin_routes: RwLock<Vec<(String, AdminRoute)>>,
    auth_providers: RwLock<Vec<AuthProvider>>,
    svg_icons: RwLock<Vec<String>>,
    reports: RwLock<Vec<String>>,
    flag_settings: RwLock<Vec<String>>,
    reviewable_types: RwLock<Vec<String>>,
    post_payload_attributes: RwLock<Vec<String>>,
    html_builders: RwLock<HashMap<String, GatedHtmlBuilder>>,
    custom_fields: DashMap<String, Vec<(String, FieldType)>>,
    asset_paths: RwLock<Vec<PathBuf>>,
    migration_paths: RwLock<Vec<PathBuf>>,

    emoji: RwLock<EmojiStore>,
    extensions: ExtensionPoints,
}

impl HostRegistries {
    /// Create empty registries.
    pub fn new() -> Self {
        Self {
            frozen: AtomicBool::new(false),
            assets: RwLock::new(Vec::new()),
            locales: RwLock::new(Vec::new()),
            service_workers: RwLock::new(Vec::new()),
            seed_data: RwLock::new(Vec::new()),
            color_schemes: RwLock::new(Vec::new()),
            csp_extensions: RwLock::new(Vec::new()),
            admin_routes: RwLock::new(Vec::new()),
            auth_providers: RwLock::new(Vec::new()),
            svg_icons: RwLock::new(Vec::new()),
            reports: RwLock::new(Vec::new()),
            flag_settings: RwLock::new(Vec::new()),
            reviewable_types: RwLock::new(Vec::new()),
            post_payload_attributes: RwLock::new(Vec::new()),
            html_builders: RwLock::new(HashMap::new()),
            custom_fields: DashMap::new(),
            asset_paths: RwLock::new(Vec::new()),
            migration_paths: RwLock::new(Vec::new()),
            emoji: RwLock::new(EmojiStore::new()),
            extensions: ExtensionPoints::new(),
        }
    }

    fn check_mutable(&self, registry: &str) -> Result<()> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(Error::frozen(registry));
        }
        Ok(())
    }

    /// Freeze every registry for the serving phase. Reads stay allowed;
    /// further mutation is rejected.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
        self.extensions.freeze();
    }

    /// Whether the registries are frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// The extension-point table.
    pub fn extensions(&self) -> &ExtensionPoints {
        &self.extensions
    }

    /// Register an asset under a plugin namespace.
    pub fn add_asset(&self, path: impl Into<PathBuf>, namespace: impl Into<String>) -> Result<()> {
        self.check_mutable("assets")?;
        self.assets.write().push(AssetEntry {
            path: path.into(),
            namespace: namespace.into(),
        });
        Ok(())
    }

    /// Registered assets, in flush order.
    pub fn assets(&self) -> Vec<AssetEntry> {
        self.assets.read().clone()
    }

    /// Register a validated locale.
    pub fn add_locale(&self, entry: LocaleEntry) -> Result<()> {
        self.check_mutable("locales")?;
        self.locales.write().push(entry);
        Ok(())
    }

    /// Registered locales.
    pub fn locales(&self) -> Vec<LocaleEntry> {
        self.locales.read().clone()
    }

    /// Register a service worker script.
    pub fn add_service_worker(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.check_mutable("service workers")?;
        self.service_workers.write().push(path.into());
        Ok(())
    }

    /// Registered service workers.
    pub fn service_workers(&self) -> Vec<PathBuf> {
        self.service_workers.read().clone()
    }

    /// Register a seed-data pair.
    pub fn add_seed_data(&self, key: impl Into<String>, value: Value) -> Result<()> {
        self.check_mutable("seed data")?;
        self.seed_data.write().push((key.into(), value));
        Ok(())
    }

    /// Look up a seed value by key. Later registrations win.
    pub fn seed_value(&self, key: &str) -> Option<Value> {
        self.seed_data
            .read()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// All seed-data pairs, in flush order.
    pub fn seed_data(&self) -> Vec<(String, Value)> {
        self.seed_data.read().clone()
    }

    /// Register a color scheme.
    pub fn add_color_scheme(&self, scheme: ColorScheme) -> Result<()> {
        self.check_mutable("color schemes")?;
        self.color_schemes.write().push(scheme);
        Ok(())
    }

    /// Registered color schemes.
    pub fn color_schemes(&self) -> Vec<ColorScheme> {
        self.color_schemes.read().clone()
    }

    /// Append a CSP extension.
    pub fn add_csp_extension(&self, ext: CspExtension) -> Result<()> {
        self.check_mutable("csp extensions")?;
        self.csp_extensions.write().push(ext);
        Ok(())
    }

    /// Registered CSP extensions.
    pub fn csp_extensions(&self) -> Vec<CspExtension> {
        self.csp_extensions.read().clone()
    }

    /// Register a plugin admin route.
    pub fn add_admin_route(&self, plugin: impl Into<String>, route: AdminRoute) -> Result<()> {
        self.check_mutable("admin routes")?;
        self.admin_routes.write().push((plugin.into(), route));
        Ok(())
    }

    /// Registered admin routes as `(plugin, route)` pairs.
    pub fn admin_routes(&self) -> Vec<(String, AdminRoute)> {
        self.admin_routes.read().clone()
    }

    /// Register an auth provider.
    pub fn add_auth_provider(&self, provider: AuthProvider) -> Result<()> {
        self.check_mutable("auth providers")?;
        self.auth_providers.write().push(provider);
        Ok(())
    }

    /// Registered auth providers.
    pub fn auth_providers(&self) -> Vec<AuthProvider> {
        self.auth_providers.read().clone()
    }

    /// Register an SVG icon name.
    pub fn add_svg_icon(&self, name: impl Into<String>) -> Result<()> {
        self.check_mutable("svg icons")?;
        self.svg_icons.write().push(name.into());
        Ok(())
    }

    /// Registered SVG icon names.
    pub fn svg_icons(&self) -> Vec<String> {
        self.svg_icons.read().clone()
    }

    /// Register a report name.
    pub fn add_report(&self, name: impl Into<String>) -> Result<()> {
        self.check_mutable("reports")?;
        self.reports.write().push(name.into());
        Ok(())
    }

    /// Registered report names.
    pub fn reports(&self) -> Vec<String> {
        self.reports.read().clone()
    }

    /// Register a flag setting name.
    pub fn add_flag_setting(&self, name: impl Into<String>) -> Result<()> {
        self.check_mutable("flag settings")?;
        self.flag_settings.write().push(name.into());
        Ok(())
    }

    /// Registered flag setting names.
    pub fn flag_settings(&self) -> Vec<String> {
        self.flag_settings.read().clone()
    }

    /// Register a reviewable type.
    pub fn add_reviewable_type(&self, name: impl Into<String>) -> Result<()> {
        self.check_mutable("reviewable types")?;
        self.reviewable_types.write().push(name.into());
        Ok(())
    }

    /// Registered reviewable types.
    pub fn reviewable_types(&self) -> Vec<String> {
        self.reviewable_types.read().clone()
    }

    /// Add a new-post payload attribute.
    pub fn add_post_payload_attribute(&self, name: impl Into<String>) -> Result<()> {
        self.check_mutable("post payload attributes")?;
        self.post_payload_attributes.write().push(name.into());
        Ok(())
    }

    /// Registered new-post payload attributes.
    pub fn post_payload_attributes(&self) -> Vec<String> {
        self.post_payload_attributes.read().clone()
    }

    /// Register a named HTML builder, gated by its plugin's enablement.
    pub fn add_html_builder(
        &self,
        name: impl Into<String>,
        plugin: impl Into<String>,
        enabled: EnabledCheck,
        func: HtmlBuilderFn,
    ) -> Result<()> {
        self.check_mutable("html builders")?;
        self.html_builders.write().insert(
            name.into(),
            GatedHtmlBuilder {
                plugin: plugin.into(),
                enabled,
                func,
            },
        );
        Ok(())
    }

    /// Render a named HTML builder. Returns `None` when the builder is
    /// missing or its plugin is disabled; the body is not executed when
    /// disabled.
    pub fn build_html(&self, name: &str) -> Option<String> {
        let builders = self.html_builders.read();
        let builder = builders.get(name)?;
        if !builder.enabled.enabled() {
            tracing::debug!(
                plugin = builder.plugin.as_str(),
                builder = name,
                "skipping disabled html builder"
            );
            return None;
        }
        Some((builder.func)())
    }

    /// Register a custom field type on an entity.
    pub fn add_custom_field_type(
        &self,
        entity: impl Into<String>,
        field: impl Into<String>,
        field_type: FieldType,
    ) -> Result<()> {
        self.check_mutable("custom fields")?;
        self.custom_fields
            .entry(entity.into())
            .or_default()
            .push((field.into(), field_type));
        Ok(())
    }

    /// Custom field types registered on an entity.
    pub fn custom_field_types(&self, entity: &str) -> Vec<(String, FieldType)> {
        self.custom_fields
            .get(entity)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Append a static/asset search path.
    pub fn add_asset_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.check_mutable("asset paths")?;
        self.asset_paths.write().push(path.into());
        Ok(())
    }

    /// Registered asset search paths.
    pub fn asset_paths(&self) -> Vec<PathBuf> {
        self.asset_paths.read().clone()
    }

    /// Append a database migration search path.
    pub fn add_migration_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.check_mutable("migration paths")?;
        self.migration_paths.write().push(path.into());
        Ok(())
    }

    /// Registered migration search paths.
    pub fn migration_paths(&self) -> Vec<PathBuf> {
        self.migration_paths.read().clone()
    }

    /// Run a closure with mutable access to the emoji store.
    pub fn with_emoji_mut<R>(&self, f: impl FnOnce(&mut EmojiStore) -> R) -> Result<R> {
        self.check_mutable("emoji")?;
        Ok(f(&mut self.emoji.write()))
    }

    /// Run a closure with read access to the emoji store.
    pub fn with_emoji<R>(&self, f: impl FnOnce(&EmojiStore) -> R) -> R {
        f(&self.emoji.read())
    }

    /// Current emoji cache token.
    pub fn emoji_cache_token(&self) -> String {
        self.emoji.read().cache_token().to_string()
    }
}

impl Default for HostRegistries {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostRegistries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRegistries")
            .field("frozen", &self.is_frozen())
            .field("asset_count", &self.assets.read().len())
            .field("locale_count", &self.locales.read().len())
            .finish()
    }
}
