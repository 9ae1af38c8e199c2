//! # agora-plugin-runtime
//!
//! Plugin discovery, activation, and extension registration for the Agora
//! platform, with per-plugin conditional enablement and content-addressed
//! generated assets.
//!
//! This crate provides:
//! - **Discovery** - Find plugins on disk in deterministic order
//! - **Metadata Parsing** - Read declaration headers without executing code
//! - **Extension Points** - Data-driven handler lists gated by enablement
//! - **Activation Protocol** - Drive each plugin through source execution,
//!   asset materialization, and registry flush in a fixed order
//! - **Asset Materialization** - Content-addressed generated files with
//!   stale-file garbage collection
//! - **Locale Registration** - Convention-based locale resolution with
//!   fallback chains
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agora_plugin_runtime::{Activator, ActivatorConfig, SetupRegistry};
//!
//! let activator = Activator::new(
//!     ActivatorConfig::new().with_plugin_root("plugins"),
//! );
//!
//! let mut plugins = activator.discover()?;
//! activator.notify_before_auth(&mut plugins)?;
//! activator.activate_all(&mut plugins, &SetupRegistry::new())?;
//! activator.notify_after_auth(&mut plugins)?;
//! activator.finish();
//! ```
//!
//! Activation is strictly sequential and single-threaded: plugins activate
//! in discovery order during process startup, and the registries freeze
//! into read-only snapshots before any request is served. Enablement is the
//! one thing evaluated per call — a registered handler goes inert the
//! moment its plugin's site setting flips off, with no re-registration.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod activation;
mod assets;
mod discovery;
mod emoji;
mod error;
mod extension;
mod instance;
mod locales;
mod metadata;
mod registries;
mod settings;

pub use activation::{
    ActivationState, Activator, ActivatorConfig, ExternalLibLoader, NoExternalLibs, PluginSetup,
    SetupRegistry,
};
pub use assets::{
    auto_generated_dir, generate_css, generate_js, glob_frontend_assets, link_public_dir,
    migration_paths, reconcile_generated, write_manifest, AUTO_GENERATED_DIR,
};
pub use discovery::{find_all, ENTRY_FILE, RESERVED_PLUGIN_DIR};
pub use emoji::EmojiStore;
pub use error::{Error, Result};
pub use extension::{CallbackEvent, ExtensionPoints, Handler, HandlerFn, HandlerId};
pub use instance::{
    AdminRoute, AuthGate, AuthProvider, ColorScheme, CspExtension, ExternalDependency, FieldType,
    HtmlBuilderFn, Initializer, LocaleOpts, PluginInstance,
};
pub use locales::{resolve_locale, HostLocaleSource, LocaleEntry, NoHostLocales};
pub use metadata::{HostVersion, PluginMetadata};
pub use registries::{AssetEntry, HostRegistries};
pub use settings::{EnabledCheck, EnabledOverride, EnabledState, SiteSettings};

/// Crate version for compatibility checks.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
