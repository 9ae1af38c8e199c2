//! Plugin discovery on disk.
//!
//! Discovery order is activation order, and later activations can observe
//! registry state left by earlier ones, so the order must be stable and
//! reproducible: lexicographic path sort, every time.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::instance::{AuthGate, PluginInstance};
use crate::metadata::PluginMetadata;
use crate::settings::SiteSettings;

/// Entry-point file that marks a subdirectory as a plugin.
pub const ENTRY_FILE: &str = "plugin.js";

/// Directory name reserved for built-in functionality, always excluded
/// from discovery.
pub const RESERVED_PLUGIN_DIR: &str = "builtin";

/// Find every plugin under `root`: each subdirectory containing the
/// entry-point file, symlinks followed, lexicographically sorted, the
/// reserved built-in directory excluded.
///
/// A missing root yields an empty list with a diagnostic, not an error.
pub fn find_all(
    root: &Path,
    settings: Arc<SiteSettings>,
    auth_gate: Arc<AuthGate>,
) -> Result<Vec<PluginInstance>> {
    if !root.is_dir() {
        tracing::warn!(root = %root.display(), "plugin root does not exist");
        return Ok(Vec::new());
    }

    let pattern = root.join("*").join(ENTRY_FILE);
    let pattern = pattern.to_string_lossy();

    let mut entry_files = Vec::new();
    for entry in glob::glob(&pattern)? {
        match entry {
            Ok(path) => entry_files.push(path),
            Err(e) => tracing::warn!("unreadable path during discovery: {}", e),
        }
    }
    entry_files.sort();

    let mut plugins = Vec::new();
    for entry_file in entry_files {
        let Some(plugin_dir) = entry_file.parent() else {
            continue;
        };
        let dir_name = plugin_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if dir_name == RESERVED_PLUGIN_DIR {
            continue;
        }

        let metadata = PluginMetadata::parse_file(&entry_file)?;
        tracing::debug!(plugin = %metadata, dir = dir_name, "discovered plugin");

        plugins.push(PluginInstance::new(
            metadata,
            plugin_dir,
            settings.clone(),
            auth_gate.clone(),
        ));
    }

    tracing::info!(count = plugins.len(), root = %root.display(), "plugin discovery complete");
    Ok(plugins)
}
