//! Locale resolution and registration.
//!
//! A plugin registers a locale by name; the files backing it are resolved
//! purely by convention. Locales with incomplete backing files are logged
//! and skipped, never fatal — a plugin missing one translation must not
//! keep the site from booting.

use std::path::{Path, PathBuf};

use crate::instance::LocaleOpts;

/// Host-side lookup for locale format data a plugin does not ship itself.
///
/// The host resolves message-format and date/time-format files from its own
/// locale bundle; plugins only override them when they ship a file under
/// `lib/javascripts/locale/`.
pub trait HostLocaleSource: Send + Sync {
    /// Host path for message-format data, if the host ships it.
    fn message_format(&self, _locale: &str) -> Option<PathBuf> {
        None
    }

    /// Host path for date/time-format data, if the host ships it.
    fn moment_js(&self, _locale: &str) -> Option<PathBuf> {
        None
    }

    /// Host path for timezone data, if the host ships it.
    fn moment_js_timezones(&self, _locale: &str) -> Option<PathBuf> {
        None
    }
}

/// A host locale source that resolves nothing. Plugins must then ship all
/// format data themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHostLocales;

impl HostLocaleSource for NoHostLocales {}

/// A fully resolved, valid locale ready for the host locale registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleEntry {
    /// Locale code, e.g. `pt_BR`.
    pub locale: String,
    /// Owning plugin name.
    pub plugin: String,
    /// Client strings file.
    pub client_file: PathBuf,
    /// Server strings file.
    pub server_file: PathBuf,
    /// Compiled locale script.
    pub js_file: PathBuf,
    /// Resolved message-format data.
    pub message_format: PathBuf,
    /// Resolved date/time-format data.
    pub moment_js: PathBuf,
    /// Resolved timezone data, when available.
    pub moment_js_timezones: Option<PathBuf>,
}

fn plugin_format_file(plugin_dir: &Path, kind: &str, locale: &str) -> PathBuf {
    plugin_dir
        .join("lib/javascripts/locale")
        .join(kind)
        .join(format!("{}.js", locale))
}

/// Resolve format data through the locale chain: the locale itself, then the
/// optional fallback, preferring a plugin-local override over the host
/// lookup at each step.
fn resolve_format(
    plugin_dir: &Path,
    kind: &str,
    chain: &[&str],
    host_lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Option<PathBuf> {
    for locale in chain {
        let local = plugin_format_file(plugin_dir, kind, locale);
        if local.is_file() {
            return Some(local);
        }
        if let Some(host) = host_lookup(locale) {
            return Some(host);
        }
    }
    None
}

/// Resolve a registered locale against its plugin directory.
///
/// Returns `None` (with a diagnostic) unless the client file, server file,
/// and compiled script all exist on disk and both format lookups succeed.
pub fn resolve_locale(
    plugin_dir: &Path,
    plugin_name: &str,
    locale: &str,
    opts: &LocaleOpts,
    host: &dyn HostLocaleSource,
) -> Option<LocaleEntry> {
    let client_file = plugin_dir
        .join("config/locales")
        .join(format!("client.{}.yml", locale));
    let server_file = plugin_dir
        .join("config/locales")
        .join(format!("server.{}.yml", locale));
    let js_file = plugin_dir
        .join("assets/locales")
        .join(format!("{}.js.erb", locale));

    let mut chain = vec![locale];
    if let Some(fallback) = opts.fallback.as_deref() {
        chain.push(fallback);
    }

    let message_format =
        resolve_format(plugin_dir, "message_format", &chain, |l| host.message_format(l));
    let moment_js = resolve_format(plugin_dir, "moment_js", &chain, |l| host.moment_js(l));
    let moment_js_timezones = resolve_format(plugin_dir, "moment_js_timezones", &chain, |l| {
        host.moment_js_timezones(l)
    });

    let files_present = client_file.is_file() && server_file.is_file() && js_file.is_file();

    match (files_present, message_format, moment_js) {
        (true, Some(message_format), Some(moment_js)) => Some(LocaleEntry {
            locale: locale.to_string(),
            plugin: plugin_name.to_string(),
            client_file,
            server_file,
            js_file,
            message_format,
            moment_js,
            moment_js_timezones,
        }),
        _ => {
            tracing::warn!(
                plugin = plugin_name,
                locale,
                "skipping locale with incomplete files"
            );
            None
        }
    }
}
