//! Plugin instance: identity, enablement, and the registration surface.
//!
//! One instance exists per discovered plugin for the lifetime of the
//! process. Its collections are populated by the plugin's own setup code
//! (the entry point runs with the instance as receiver) and are consumed by
//! the activation protocol, which flushes them into the host-wide
//! registries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::activation::ActivationState;
use crate::error::{Error, Result};
use crate::extension::{CallbackEvent, HandlerFn, HandlerId};
use crate::metadata::PluginMetadata;
use crate::settings::{EnabledCheck, EnabledOverride, EnabledState, SiteSettings};

/// Shared marker for the pre-auth phase.
///
/// Once the host builds its authentication middleware the phase closes and
/// pre-auth hook registration becomes a load-time error.
#[derive(Debug, Default)]
pub struct AuthGate {
    closed: AtomicBool,
}

impl AuthGate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate. Called once by the pre-auth phase.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether the pre-auth phase has completed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Admin UI route contributed by a plugin.
#[derive(Debug, Clone)]
pub struct AdminRoute {
    /// Sidebar label translation key.
    pub label: String,
    /// Route location segment.
    pub location: String,
    /// Whether the route renders as a full page rather than a panel.
    pub full_page: bool,
}

/// Color scheme contributed by a plugin.
#[derive(Debug, Clone)]
pub struct ColorScheme {
    /// Scheme name shown in the admin UI.
    pub name: String,
    /// Color slot assignments, `slot -> hex`.
    pub colors: Vec<(String, String)>,
}

/// Content-security-policy extension contributed by a plugin.
#[derive(Debug, Clone)]
pub struct CspExtension {
    /// CSP directive, e.g. `script_src`.
    pub directive: String,
    /// Source expressions to append.
    pub sources: Vec<String>,
}

/// Authentication provider contributed by a plugin.
#[derive(Debug, Clone)]
pub struct AuthProvider {
    /// Provider name, used as the route segment.
    pub name: String,
    /// Display title; defaults to the name at render time when unset.
    pub title: Option<String>,
    /// Icon name for the login button.
    pub icon: Option<String>,
}

/// Options for a registered locale.
#[derive(Debug, Clone, Default)]
pub struct LocaleOpts {
    /// Optional fallback locale consulted when format data is missing.
    pub fallback: Option<String>,
}

/// Value type of a custom field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// UTF-8 string field.
    String,
    /// Integer field.
    Integer,
    /// Boolean field.
    Boolean,
    /// Arbitrary JSON field.
    Json,
}

/// Startup initializer callback.
pub type Initializer = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// HTML builder callback, gated by the owning plugin's enablement.
pub type HtmlBuilderFn = Box<dyn Fn() -> String + Send + Sync>;

/// Extension handler accumulated during setup, flushed at activation.
pub struct PendingHandler {
    /// Target extension point name.
    pub point: String,
    /// Generated handler id.
    pub id: HandlerId,
    /// Handler body.
    pub func: HandlerFn,
}

/// Model callback accumulated during setup, flushed at activation.
pub struct PendingCallback {
    /// Target model name.
    pub model: String,
    /// Lifecycle event.
    pub event: CallbackEvent,
    /// Generated handler id.
    pub id: HandlerId,
    /// Callback body.
    pub func: HandlerFn,
}

/// Named HTML builder accumulated during setup.
pub struct PendingHtmlBuilder {
    /// Builder name the host renders by.
    pub name: String,
    /// Builder body.
    pub func: HtmlBuilderFn,
}

/// Best-effort external library request.
#[derive(Debug, Clone)]
pub struct ExternalDependency {
    /// Library name.
    pub name: String,
    /// Requested version.
    pub version: String,
    /// Loader options.
    pub opts: HashMap<String, String>,
}

/// One discovered plugin.
pub struct PluginInstance {
    metadata: PluginMetadata,
    path: PathBuf,
    settings: Arc<SiteSettings>,
    auth_gate: Arc<AuthGate>,

    enabled_state: EnabledState,
    enabled_filter: Option<EnabledOverride>,

    /// Feeds generated handler ids; guarantees uniqueness within the
    /// instance, the plugin-name prefix guarantees it across plugins.
    handler_counter: u64,

    pub(crate) state: ActivationState,

    pub(crate) assets: Vec<String>,
    pub(crate) globbed_assets: Vec<PathBuf>,
    pub(crate) styles: Vec<String>,
    pub(crate) scripts: Vec<String>,
    pub(crate) locales: Vec<(String, LocaleOpts)>,
    pub(crate) service_workers: Vec<String>,
    pub(crate) color_schemes: Vec<ColorScheme>,
    pub(crate) csp_extensions: Vec<CspExtension>,
    pub(crate) admin_route: Option<AdminRoute>,
    pub(crate) auth_providers: Vec<AuthProvider>,
    pub(crate) seed_data: Vec<(String, Value)>,
    pub(crate) emojis: Vec<(String, String)>,
    pub(crate) emoji_translations: Vec<(String, String)>,
    pub(crate) svg_icons: Vec<String>,
    pub(crate) reports: Vec<String>,
    pub(crate) flag_settings: Vec<String>,
    pub(crate) reviewable_types: Vec<String>,
    pub(crate) post_payload_attributes: Vec<String>,
    pub(crate) custom_fields: Vec<(String, String, FieldType)>,
    pub(crate) before_auth_initializers: Vec<Initializer>,
    pub(crate) after_auth_initializers: Vec<Initializer>,
    pub(crate) pending_handlers: Vec<PendingHandler>,
    pub(crate) pending_callbacks: Vec<PendingCallback>,
    pub(crate) pending_html_builders: Vec<PendingHtmlBuilder>,
    pub(crate) external_deps: Vec<ExternalDependency>,
}

impl PluginInstance {
    /// Create an instance from parsed metadata and its directory path.
    pub fn new(
        metadata: PluginMetadata,
        path: impl Into<PathBuf>,
        settings: Arc<SiteSettings>,
        auth_gate: Arc<AuthGate>,
    ) -> Self {
        Self {
            metadata,
            path: path.into(),
            settings,
            auth_gate,
            enabled_state: EnabledState::Always,
            enabled_filter: None,
            handler_counter: 0,
            state: ActivationState::Discovered,
            assets: Vec::new(),
            globbed_assets: Vec::new(),
            styles: Vec::new(),
            scripts: Vec::new(),
            locales: Vec::new(),
            service_workers: Vec::new(),
            color_schemes: Vec::new(),
            csp_extensions: Vec::new(),
            admin_route: None,
            auth_providers: Vec::new(),
            seed_data: Vec::new(),
            emojis: Vec::new(),
            emoji_translations: Vec::new(),
            svg_icons: Vec::new(),
            reports: Vec::new(),
            flag_settings: Vec::new(),
            reviewable_types: Vec::new(),
            post_payload_attributes: Vec::new(),
            custom_fields: Vec::new(),
            before_auth_initializers: Vec::new(),
            after_auth_initializers: Vec::new(),
            pending_handlers: Vec::new(),
            pending_callbacks: Vec::new(),
            pending_html_builders: Vec::new(),
            external_deps: Vec::new(),
        }
    }

    /// Plugin name: the metadata declaration, falling back to the directory
    /// name.
    pub fn name(&self) -> &str {
        self.metadata
            .name
            .as_deref()
            .unwrap_or_else(|| self.directory_name())
    }

    /// Plugin directory name, used as the asset namespace.
    pub fn directory_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
    }

    /// Plugin directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed metadata.
    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Current activation state.
    pub fn state(&self) -> ActivationState {
        self.state
    }

    /// Front-end asset files found by the conventional glob step.
    pub fn globbed_assets(&self) -> &[PathBuf] {
        &self.globbed_assets
    }

    /// Delegate enablement to a named boolean site setting.
    pub fn enabled_site_setting(&mut self, name: impl Into<String>) {
        self.enabled_state = EnabledState::Setting(name.into());
    }

    /// Attach an enablement override filter.
    pub fn enabled_filter(&mut self, filter: EnabledOverride) {
        self.enabled_filter = Some(filter);
    }

    /// Evaluate the plugin's enablement right now.
    pub fn enabled(&self) -> bool {
        self.enabled_check().enabled()
    }

    /// Build the call-time enablement predicate handed to handlers.
    pub fn enabled_check(&self) -> EnabledCheck {
        let check = EnabledCheck::new(self.enabled_state.clone(), self.settings.clone());
        match &self.enabled_filter {
            Some(filter) => check.with_filter(filter.clone()),
            None => check,
        }
    }

    /// Generate the next handler id for a target/event pair.
    ///
    /// Ids are `<plugin>_<target>_<event>_<n>`, lower-cased with
    /// non-alphanumerics collapsed to underscores.
    pub fn next_handler_id(&mut self, target: &str, event: &str) -> HandlerId {
        self.handler_counter += 1;
        let raw = format!(
            "{}_{}_{}_{}",
            self.name(),
            target,
            event,
            self.handler_counter
        );
        let id: String = raw
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        HandlerId(id)
    }

    // Registration surface. Called from the plugin's setup code; every
    // collection is append-only and ordered.

    /// Register a front-end asset file, relative to the plugin directory.
    pub fn register_asset(&mut self, path: impl Into<String>) {
        self.assets.push(path.into());
    }

    /// Register an inline stylesheet fragment.
    pub fn register_css(&mut self, css: impl Into<String>) {
        self.styles.push(css.into());
    }

    /// Register an inline script fragment.
    pub fn register_js(&mut self, js: impl Into<String>) {
        self.scripts.push(js.into());
    }

    /// Register a locale the plugin ships strings for.
    pub fn register_locale(&mut self, locale: impl Into<String>, opts: LocaleOpts) {
        self.locales.push((locale.into(), opts));
    }

    /// Register a service worker script, relative to the plugin directory.
    pub fn register_service_worker(&mut self, path: impl Into<String>) {
        self.service_workers.push(path.into());
    }

    /// Register a color scheme.
    pub fn register_color_scheme(&mut self, scheme: ColorScheme) {
        self.color_schemes.push(scheme);
    }

    /// Extend the site content-security policy.
    pub fn extend_csp(&mut self, extension: CspExtension) {
        self.csp_extensions.push(extension);
    }

    /// Declare the plugin's admin route. Last call wins.
    pub fn register_admin_route(&mut self, route: AdminRoute) {
        self.admin_route = Some(route);
    }

    /// Register an authentication provider.
    pub fn register_auth_provider(&mut self, provider: AuthProvider) {
        self.auth_providers.push(provider);
    }

    /// Register a seed-data key/value pair.
    pub fn register_seed_data(&mut self, key: impl Into<String>, value: Value) {
        self.seed_data.push((key.into(), value));
    }

    /// Register a custom emoji.
    pub fn register_emoji(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.emojis.push((name.into(), url.into()));
    }

    /// Register an emoji code translation.
    pub fn translate_emoji(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.emoji_translations.push((from.into(), to.into()));
    }

    /// Register an SVG icon name for spriting.
    pub fn register_svg_icon(&mut self, name: impl Into<String>) {
        self.svg_icons.push(name.into());
    }

    /// Register a report by name.
    pub fn register_report(&mut self, name: impl Into<String>) {
        self.reports.push(name.into());
    }

    /// Register a flag setting name.
    pub fn register_flag_setting(&mut self, name: impl Into<String>) {
        self.flag_settings.push(name.into());
    }

    /// Register a reviewable type.
    pub fn register_reviewable_type(&mut self, name: impl Into<String>) {
        self.reviewable_types.push(name.into());
    }

    /// Add an attribute to the new-post payload.
    pub fn add_post_payload_attribute(&mut self, name: impl Into<String>) {
        self.post_payload_attributes.push(name.into());
    }

    /// Register a custom field type on an entity.
    pub fn register_custom_field_type(
        &mut self,
        entity: impl Into<String>,
        field: impl Into<String>,
        field_type: FieldType,
    ) {
        self.custom_fields
            .push((entity.into(), field.into(), field_type));
    }

    /// Register a named HTML builder, gated by this plugin's enablement.
    pub fn register_html_builder(&mut self, name: impl Into<String>, func: HtmlBuilderFn) {
        self.pending_html_builders.push(PendingHtmlBuilder {
            name: name.into(),
            func,
        });
    }

    /// Register a handler against a host extension point.
    ///
    /// The handler only runs while this plugin is enabled; the returned id
    /// can be used to unregister it before the registries freeze.
    pub fn register_extension_handler(
        &mut self,
        point: impl Into<String>,
        func: HandlerFn,
    ) -> HandlerId {
        let point = point.into();
        let id = self.next_handler_id(&point, "handler");
        self.pending_handlers.push(PendingHandler {
            point,
            id: id.clone(),
            func,
        });
        id
    }

    /// Register a model lifecycle callback.
    ///
    /// The callback is skipped while this plugin is disabled.
    pub fn register_model_callback(
        &mut self,
        model: impl Into<String>,
        event: CallbackEvent,
        func: HandlerFn,
    ) -> HandlerId {
        let model = model.into();
        let id = self.next_handler_id(&model, event.as_str());
        self.pending_callbacks.push(PendingCallback {
            model,
            event,
            id: id.clone(),
            func,
        });
        id
    }

    /// Register a hook to run during the pre-auth phase.
    ///
    /// Fails loudly once that phase has completed: auth middleware is
    /// immutable after it is built.
    pub fn before_auth(&mut self, f: Initializer) -> Result<()> {
        if self.auth_gate.is_closed() {
            return Err(Error::before_auth_closed(self.name()));
        }
        self.before_auth_initializers.push(f);
        Ok(())
    }

    /// Register a hook to run during the post-auth phase.
    pub fn after_auth(&mut self, f: Initializer) {
        self.after_auth_initializers.push(f);
    }

    /// Request a best-effort external library load.
    ///
    /// No cross-plugin conflict detection is attempted.
    pub fn require_external(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        opts: HashMap<String, String>,
    ) {
        self.external_deps.push(ExternalDependency {
            name: name.into(),
            version: version.into(),
            opts,
        });
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name())
            .field("path", &self.path)
            .field("enabled_state", &self.enabled_state)
            .field("asset_count", &self.assets.len())
            .finish()
    }
}
