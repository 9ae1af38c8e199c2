//! Activation protocol: the boot-time driver for every plugin.
//!
//! Activation runs exactly once per plugin per process, strictly
//! sequentially in discovery order. There is no transition back to an
//! earlier state and no concurrency between plugins; later plugins may
//! depend on registry entries flushed by earlier ones.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::assets;
use crate::discovery;
use crate::error::{Error, Result};
use crate::extension::Handler;
use crate::instance::{AuthGate, ExternalDependency, PluginInstance};
use crate::locales::{resolve_locale, HostLocaleSource, NoHostLocales};
use crate::metadata::HostVersion;
use crate::registries::HostRegistries;
use crate::settings::SiteSettings;

/// Activation state of a plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationState {
    /// Discovered on disk, metadata parsed, source not yet executed.
    Discovered,
    /// Entry-point setup code has run; collections are populated.
    SourceExecuted,
    /// Generated assets materialized and reconciled.
    AssetsGenerated,
    /// Collections flushed into the host-wide registries.
    RegistriesFlushed,
    /// Asset paths, migrations, and manifest wired into the host framework.
    /// Terminal.
    FrameworkIntegrated,
}

impl ActivationState {
    /// Check whether activation can begin from this state.
    pub fn can_activate(&self) -> bool {
        matches!(self, Self::Discovered)
    }

    /// Check whether this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FrameworkIntegrated)
    }
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Discovered => "discovered",
            Self::SourceExecuted => "source-executed",
            Self::AssetsGenerated => "assets-generated",
            Self::RegistriesFlushed => "registries-flushed",
            Self::FrameworkIntegrated => "framework-integrated",
        };
        write!(f, "{}", name)
    }
}

/// Entry-point setup code for a plugin.
///
/// The activation protocol invokes this with the plugin instance as
/// receiver; the body calls the instance's `register_*` surface. Errors are
/// not caught — a broken plugin aborts startup rather than leaving the host
/// half-initialized.
pub trait PluginSetup: Send + Sync {
    /// Run the plugin's registration code.
    fn setup(&self, plugin: &mut PluginInstance) -> Result<()>;
}

impl<F> PluginSetup for F
where
    F: Fn(&mut PluginInstance) -> Result<()> + Send + Sync,
{
    fn setup(&self, plugin: &mut PluginInstance) -> Result<()> {
        self(plugin)
    }
}

struct NoopSetup;

impl PluginSetup for NoopSetup {
    fn setup(&self, _plugin: &mut PluginInstance) -> Result<()> {
        Ok(())
    }
}

/// Setup code keyed by plugin directory name.
///
/// Plugins without registered setup code (pure-asset plugins) activate with
/// a no-op entry point.
#[derive(Default)]
pub struct SetupRegistry {
    setups: HashMap<String, Box<dyn PluginSetup>>,
}

impl SetupRegistry {
    /// Create an empty setup registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register setup code for a plugin directory name.
    pub fn register(&mut self, directory_name: impl Into<String>, setup: Box<dyn PluginSetup>) {
        self.setups.insert(directory_name.into(), setup);
    }

    /// Look up setup code.
    pub fn get(&self, directory_name: &str) -> Option<&dyn PluginSetup> {
        self.setups.get(directory_name).map(Box::as_ref)
    }
}

impl std::fmt::Debug for SetupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupRegistry")
            .field("count", &self.setups.len())
            .finish()
    }
}

/// Best-effort loader for external library dependencies.
///
/// Failures log and never abort activation; no cross-plugin version
/// conflict detection is attempted.
pub trait ExternalLibLoader: Send + Sync {
    /// Attempt to load one dependency.
    fn load(&self, dep: &ExternalDependency) -> Result<()>;
}

/// An external loader that accepts everything without loading anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExternalLibs;

impl ExternalLibLoader for NoExternalLibs {
    fn load(&self, _dep: &ExternalDependency) -> Result<()> {
        Ok(())
    }
}

/// Configuration for the activator.
pub struct ActivatorConfig {
    /// Directory scanned for plugin subdirectories.
    pub plugin_root: PathBuf,
    /// Host directory receiving generated front-end manifests.
    pub js_assets_dir: PathBuf,
    /// Shared public directory receiving plugin `public` symlinks.
    pub public_root: PathBuf,
    /// Host version checked against plugin `required_version` constraints.
    pub host_version: HostVersion,
    /// Suppress the deferred post-deployment migration path.
    pub skip_post_deployment_migrations: bool,
}

impl Default for ActivatorConfig {
    fn default() -> Self {
        Self {
            plugin_root: "plugins".into(),
            js_assets_dir: "app/assets/javascripts/plugins".into(),
            public_root: "public/plugins".into(),
            host_version: HostVersion::new(1, 0, 0),
            skip_post_deployment_migrations: false,
        }
    }
}

impl ActivatorConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the plugin root directory.
    pub fn with_plugin_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.plugin_root = path.into();
        self
    }

    /// Set the generated-manifest directory.
    pub fn with_js_assets_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.js_assets_dir = path.into();
        self
    }

    /// Set the shared public directory.
    pub fn with_public_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_root = path.into();
        self
    }

    /// Set the host version.
    pub fn with_host_version(mut self, version: HostVersion) -> Self {
        self.host_version = version;
        self
    }

    /// Suppress post-deployment migration paths.
    pub fn with_skip_post_deployment_migrations(mut self, skip: bool) -> Self {
        self.skip_post_deployment_migrations = skip;
        self
    }
}

impl std::fmt::Debug for ActivatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivatorConfig")
            .field("plugin_root", &self.plugin_root)
            .field("host_version", &self.host_version)
            .finish()
    }
}

/// Drives plugins through discovery, the auth phases, and activation.
pub struct Activator {
    config: ActivatorConfig,
    settings: Arc<SiteSettings>,
    registries: Arc<HostRegistries>,
    auth_gate: Arc<AuthGate>,
    locale_source: Box<dyn HostLocaleSource>,
    lib_loader: Box<dyn ExternalLibLoader>,
}

impl Activator {
    /// Create an activator with fresh settings and registries.
    pub fn new(config: ActivatorConfig) -> Self {
        Self {
            config,
            settings: Arc::new(SiteSettings::new()),
            registries: Arc::new(HostRegistries::new()),
            auth_gate: Arc::new(AuthGate::new()),
            locale_source: Box::new(NoHostLocales),
            lib_loader: Box::new(NoExternalLibs),
        }
    }

    /// Create with default configuration.
    pub fn default_config() -> Self {
        Self::new(ActivatorConfig::default())
    }

    /// Use a host locale source for format-data fallbacks.
    pub fn with_locale_source(mut self, source: Box<dyn HostLocaleSource>) -> Self {
        self.locale_source = source;
        self
    }

    /// Use an external library loader.
    pub fn with_lib_loader(mut self, loader: Box<dyn ExternalLibLoader>) -> Self {
        self.lib_loader = loader;
        self
    }

    /// The activator configuration.
    pub fn config(&self) -> &ActivatorConfig {
        &self.config
    }

    /// The shared site settings store.
    pub fn settings(&self) -> &Arc<SiteSettings> {
        &self.settings
    }

    /// The host-wide registries.
    pub fn registries(&self) -> &Arc<HostRegistries> {
        &self.registries
    }

    /// The shared pre-auth gate.
    pub fn auth_gate(&self) -> &Arc<AuthGate> {
        &self.auth_gate
    }

    /// Discover plugins under the configured root.
    pub fn discover(&self) -> Result<Vec<PluginInstance>> {
        discovery::find_all(
            &self.config.plugin_root,
            self.settings.clone(),
            self.auth_gate.clone(),
        )
    }

    /// Run every plugin's pre-auth hooks exactly once, then close the
    /// phase. Must run before the host builds its authentication
    /// middleware; hook errors propagate and abort startup.
    pub fn notify_before_auth(&self, plugins: &mut [PluginInstance]) -> Result<()> {
        if self.auth_gate.is_closed() {
            return Err(Error::invalid_state("before-auth phase open", "closed"));
        }

        for plugin in plugins.iter_mut() {
            for hook in std::mem::take(&mut plugin.before_auth_initializers) {
                hook().map_err(|e| {
                    Error::initializer_failed(plugin.name(), e.to_string())
                })?;
            }
        }

        self.auth_gate.close();
        Ok(())
    }

    /// Run every plugin's post-auth hooks.
    ///
    /// The pre-migration schema condition is swallowed with a warning;
    /// every other error propagates and aborts startup.
    pub fn notify_after_auth(&self, plugins: &mut [PluginInstance]) -> Result<()> {
        for plugin in plugins.iter_mut() {
            for hook in std::mem::take(&mut plugin.after_auth_initializers) {
                match hook() {
                    Ok(()) => {}
                    Err(e) if e.is_tolerated_at_startup() => {
                        tracing::warn!(
                            plugin = plugin.name(),
                            "initializer deferred until migration: {}",
                            e
                        );
                    }
                    Err(e) => {
                        return Err(Error::initializer_failed(plugin.name(), e.to_string()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Activate every plugin sequentially in the given (discovery) order.
    pub fn activate_all(
        &self,
        plugins: &mut [PluginInstance],
        setups: &SetupRegistry,
    ) -> Result<()> {
        for plugin in plugins.iter_mut() {
            match setups.get(plugin.directory_name()) {
                Some(setup) => self.activate(plugin, setup)?,
                None => self.activate(plugin, &NoopSetup)?,
            }
        }
        Ok(())
    }

    /// Freeze the registries for the serving phase. Call after both auth
    /// phases and every activation have completed.
    pub fn finish(&self) {
        self.registries.freeze();
        tracing::info!("plugin registries frozen for serving");
    }

    /// Activate one plugin: execute its entry point and wire its
    /// contributions into the host.
    pub fn activate(&self, plugin: &mut PluginInstance, setup: &dyn PluginSetup) -> Result<()> {
        if !plugin.state().can_activate() {
            return Err(Error::invalid_state(
                ActivationState::Discovered.to_string(),
                plugin.state().to_string(),
            ));
        }

        if !plugin.metadata().compatible_with_host(&self.config.host_version) {
            tracing::warn!(
                plugin = plugin.name(),
                required = plugin.metadata().required_version.as_deref().unwrap_or(""),
                host = %self.config.host_version,
                "plugin requires a newer host version"
            );
        }

        // Conventional front-end assets, general and admin-scoped.
        plugin.globbed_assets = assets::glob_frontend_assets(plugin.path())?;

        // Entry-point execution. Errors propagate as activation failures.
        setup
            .setup(plugin)
            .map_err(|e| Error::source_execution(plugin.name(), e.to_string()))?;
        plugin.state = ActivationState::SourceExecuted;

        self.load_external_deps(plugin);

        // Automatic assets: content-addressed, written only if absent.
        let css = assets::generate_css(plugin.path(), &plugin.styles)?;
        let js = assets::generate_js(plugin.path(), &plugin.scripts)?;
        let generated: Vec<PathBuf> =
            css.into_iter().chain(js).collect();
        plugin.state = ActivationState::AssetsGenerated;

        assets::reconcile_generated(plugin.path(), &generated)?;

        self.flush_registries(plugin, &generated)?;
        plugin.state = ActivationState::RegistriesFlushed;

        self.integrate_framework(plugin)?;
        plugin.state = ActivationState::FrameworkIntegrated;

        tracing::info!(plugin = plugin.name(), "plugin activated");
        Ok(())
    }

    fn load_external_deps(&self, plugin: &PluginInstance) {
        for dep in &plugin.external_deps {
            if let Err(e) = self.lib_loader.load(dep) {
                tracing::warn!(
                    plugin = plugin.name(),
                    library = dep.name.as_str(),
                    version = dep.version.as_str(),
                    "external library load failed: {}",
                    e
                );
            }
        }
    }

    /// Flush the instance's accumulated collections into the host-wide
    /// registries. Asset entries are tagged with the plugin's
    /// directory-derived namespace.
    fn flush_registries(
        &self,
        plugin: &mut PluginInstance,
        generated: &[PathBuf],
    ) -> Result<()> {
        let registries = &self.registries;
        let namespace = plugin.directory_name().to_string();

        for path in &plugin.globbed_assets {
            registries.add_asset(path.clone(), namespace.clone())?;
        }
        for rel in &plugin.assets {
            registries.add_asset(plugin.path().join(rel), namespace.clone())?;
        }
        for path in generated {
            registries.add_asset(path.clone(), namespace.clone())?;
        }

        for (locale, opts) in &plugin.locales {
            if let Some(entry) = resolve_locale(
                plugin.path(),
                plugin.name(),
                locale,
                opts,
                self.locale_source.as_ref(),
            ) {
                registries.add_locale(entry)?;
            }
        }

        for rel in &plugin.service_workers {
            registries.add_service_worker(plugin.path().join(rel))?;
        }

        registries.with_emoji_mut(|store| {
            for (name, url) in &plugin.emojis {
                store.register(name.clone(), url.clone());
            }
            for (from, to) in &plugin.emoji_translations {
                store.translate(from.clone(), to.clone());
            }
        })?;

        for (key, value) in plugin.seed_data.drain(..) {
            registries.add_seed_data(key, value)?;
        }

        for scheme in plugin.color_schemes.drain(..) {
            registries.add_color_scheme(scheme)?;
        }
        for ext in plugin.csp_extensions.drain(..) {
            registries.add_csp_extension(ext)?;
        }
        if let Some(route) = plugin.admin_route.take() {
            registries.add_admin_route(plugin.name(), route)?;
        }
        for provider in plugin.auth_providers.drain(..) {
            registries.add_auth_provider(provider)?;
        }
        for icon in plugin.svg_icons.drain(..) {
            registries.add_svg_icon(icon)?;
        }
        for report in plugin.reports.drain(..) {
            registries.add_report(report)?;
        }
        for flag in plugin.flag_settings.drain(..) {
            registries.add_flag_setting(flag)?;
        }
        for reviewable in plugin.reviewable_types.drain(..) {
            registries.add_reviewable_type(reviewable)?;
        }
        for attr in plugin.post_payload_attributes.drain(..) {
            registries.add_post_payload_attribute(attr)?;
        }
        for (entity, field, field_type) in plugin.custom_fields.drain(..) {
            registries.add_custom_field_type(entity, field, field_type)?;
        }

        let plugin_name = plugin.name().to_string();
        let enabled = plugin.enabled_check();

        for builder in plugin.pending_html_builders.drain(..) {
            registries.add_html_builder(
                builder.name,
                plugin_name.clone(),
                enabled.clone(),
                builder.func,
            )?;
        }

        for pending in plugin.pending_handlers.drain(..) {
            registries.extensions().register(
                &pending.point,
                Handler::new(pending.id, plugin_name.clone(), enabled.clone(), pending.func),
            )?;
        }
        for pending in plugin.pending_callbacks.drain(..) {
            let point = pending.event.point_name(&pending.model);
            registries.extensions().register(
                &point,
                Handler::new(pending.id, plugin_name.clone(), enabled.clone(), pending.func),
            )?;
        }

        Ok(())
    }

    /// Wire asset search paths, migrations, and the front-end manifest into
    /// the host framework.
    fn integrate_framework(&self, plugin: &mut PluginInstance) -> Result<()> {
        let registries = &self.registries;

        let generated_dir = assets::auto_generated_dir(plugin.path());
        if generated_dir.is_dir() {
            registries.add_asset_path(generated_dir)?;
        }
        let assets_dir = plugin.path().join("assets");
        if assets_dir.is_dir() {
            registries.add_asset_path(assets_dir)?;
        }
        if let Some(link) =
            assets::link_public_dir(plugin.path(), plugin.name(), &self.config.public_root)?
        {
            registries.add_asset_path(link)?;
        }

        for path in assets::migration_paths(
            plugin.path(),
            self.config.skip_post_deployment_migrations,
        ) {
            registries.add_migration_path(path)?;
        }

        let mut manifest_assets = plugin.globbed_assets.clone();
        manifest_assets.extend(plugin.assets.iter().map(|rel| plugin.path().join(rel)));
        let watch_dirs = vec![
            plugin.path().join("assets/javascripts"),
            plugin.path().join("admin/assets/javascripts"),
        ];
        assets::write_manifest(
            &self.config.js_assets_dir,
            plugin.directory_name(),
            &manifest_assets,
            &watch_dirs,
        )?;

        Ok(())
    }
}

impl std::fmt::Debug for Activator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activator")
            .field("config", &self.config)
            .field("frozen", &self.registries.is_frozen())
            .finish()
    }
}
