//! Asset materialization: generated files, garbage collection, manifests.
//!
//! Inline style/script contributions are materialized into
//! content-addressed files under `<plugin>/auto_generated/`. The directory
//! is reconciled on every activation so it holds exactly the files for the
//! current contribution set — no stale leftovers, no missing entries.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::error::Result;

/// Subdirectory holding content-addressed generated assets.
pub const AUTO_GENERATED_DIR: &str = "auto_generated";

/// Extensions treated as script/template assets in the manifest.
const SCRIPT_EXTENSIONS: [&str; 3] = ["js", "hbs", "es6"];

/// The generated-asset directory for a plugin.
pub fn auto_generated_dir(plugin_dir: &Path) -> PathBuf {
    plugin_dir.join(AUTO_GENERATED_DIR)
}

fn content_name(content: &str, extension: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content.as_bytes());
    format!("plugin_{}.{}", hex::encode(hasher.finalize()), extension)
}

/// Write a content-addressed generated asset, creating the directory on
/// first use. The write is idempotent: an existing file is left untouched,
/// since its name already pins its content.
fn write_generated(plugin_dir: &Path, content: &str, extension: &str) -> Result<PathBuf> {
    let dir = auto_generated_dir(plugin_dir);
    fs::create_dir_all(&dir)?;

    let path = dir.join(content_name(content, extension));
    if !path.exists() {
        fs::write(&path, content)?;
    }
    Ok(path)
}

/// Materialize the combined stylesheet asset from inline style fragments.
///
/// Returns `None` when there are no contributions.
pub fn generate_css(plugin_dir: &Path, styles: &[String]) -> Result<Option<PathBuf>> {
    if styles.is_empty() {
        return Ok(None);
    }
    let content = styles.join("\n");
    if content.is_empty() {
        return Ok(None);
    }
    write_generated(plugin_dir, &content, "css").map(Some)
}

/// Materialize the combined script asset from inline script fragments,
/// wrapped in one self-invoking function.
pub fn generate_js(plugin_dir: &Path, scripts: &[String]) -> Result<Option<PathBuf>> {
    if scripts.is_empty() {
        return Ok(None);
    }
    let body = scripts.join("\n");
    if body.is_empty() {
        return Ok(None);
    }
    let content = format!("(function() {{\n{}\n}})();\n", body);
    write_generated(plugin_dir, &content, "js").map(Some)
}

/// Delete every file in the generated-asset directory whose name is not in
/// `keep`. A missing directory is skipped, not an error.
pub fn reconcile_generated(plugin_dir: &Path, keep: &[PathBuf]) -> Result<()> {
    let dir = auto_generated_dir(plugin_dir);
    if !dir.is_dir() {
        return Ok(());
    }

    let keep_names: HashSet<&std::ffi::OsStr> =
        keep.iter().filter_map(|p| p.file_name()).collect();

    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name() else {
            continue;
        };
        if path.is_file() && !keep_names.contains(name) {
            tracing::debug!(path = %path.display(), "removing stale generated asset");
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Glob the conventional front-end asset directories of a plugin.
///
/// Covers both the general and the admin-scoped javascript trees; results
/// are lexicographically sorted for deterministic manifests.
pub fn glob_frontend_assets(plugin_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for subdir in ["assets/javascripts", "admin/assets/javascripts"] {
        let pattern = plugin_dir.join(subdir).join("**/*");
        let pattern = pattern.to_string_lossy();

        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(path) if path.is_file() => found.push(path),
                Ok(_) => {}
                Err(e) => tracing::warn!("unreadable path during asset glob: {}", e),
            }
        }
    }

    found.sort();
    Ok(found)
}

fn is_script_asset(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SCRIPT_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Regenerate the plugin's combined front-end manifest.
///
/// Any previous manifest is deleted first; a new one is written only when
/// at least one script/template asset exists. Files become `require_asset`
/// directives (bundle inclusion), directories become `depend_on` (rebuild
/// trigger).
pub fn write_manifest(
    js_assets_dir: &Path,
    plugin_directory_name: &str,
    assets: &[PathBuf],
    watch_dirs: &[PathBuf],
) -> Result<Option<PathBuf>> {
    let manifest_path = js_assets_dir.join(format!("{}.js.erb", plugin_directory_name));
    if manifest_path.exists() {
        fs::remove_file(&manifest_path)?;
    }

    let scripts: Vec<&PathBuf> = assets.iter().filter(|p| is_script_asset(p)).collect();
    if scripts.is_empty() {
        return Ok(None);
    }

    let mut contents = String::from("<%\n");
    for dir in watch_dirs {
        if dir.is_dir() {
            contents.push_str(&format!("depend_on('{}')\n", dir.display()));
        }
    }
    for asset in &scripts {
        contents.push_str(&format!("require_asset('{}')\n", asset.display()));
    }
    contents.push_str("%>\n");

    fs::create_dir_all(js_assets_dir)?;
    fs::write(&manifest_path, contents)?;
    Ok(Some(manifest_path))
}

/// Symlink the plugin's `public` directory into the shared public root
/// under the plugin's whitespace-stripped name.
///
/// Idempotent replacement: any existing link or target at the destination
/// is removed first, then the link is created fresh. Returns `None` when
/// the plugin has no public directory.
pub fn link_public_dir(
    plugin_dir: &Path,
    plugin_name: &str,
    public_root: &Path,
) -> Result<Option<PathBuf>> {
    let source = plugin_dir.join("public");
    if !source.is_dir() {
        return Ok(None);
    }

    let link_name: String = plugin_name.chars().filter(|c| !c.is_whitespace()).collect();
    let dest = public_root.join(link_name);

    fs::create_dir_all(public_root)?;
    if let Ok(meta) = dest.symlink_metadata() {
        // A symlink's own metadata is never a directory, so links (even to
        // directories) are removed as files.
        if meta.file_type().is_dir() {
            fs::remove_dir_all(&dest)?;
        } else {
            fs::remove_file(&dest)?;
        }
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(&source, &dest)?;
    #[cfg(windows)]
    std::os::windows::fs::symlink_dir(&source, &dest)?;

    Ok(Some(dest))
}

/// Migration search paths a plugin contributes: `db/migrate` plus the
/// deferred `db/post_migrate` unless post-deployment migrations are
/// suppressed. Only existing directories are returned.
pub fn migration_paths(plugin_dir: &Path, skip_post_deployment: bool) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    let migrate = plugin_dir.join("db/migrate");
    if migrate.is_dir() {
        paths.push(migrate);
    }

    if !skip_post_deployment {
        let post = plugin_dir.join("db/post_migrate");
        if post.is_dir() {
            paths.push(post);
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_css_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let styles = vec!["body{color:red}".to_string()];

        let path = generate_css(dir.path(), &styles).unwrap().unwrap();
        assert!(path.starts_with(auto_generated_dir(dir.path())));

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("plugin_"));
        assert!(name.ends_with(".css"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "body{color:red}");
    }

    #[test]
    fn test_generate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let styles = vec!["body{color:red}".to_string()];

        let first = generate_css(dir.path(), &styles).unwrap().unwrap();

        // Overwrite out of band: a second generation with unchanged
        // contributions must not rewrite the existing file.
        fs::write(&first, "sentinel").unwrap();
        let second = generate_css(dir.path(), &styles).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&second).unwrap(), "sentinel");
    }

    #[test]
    fn test_generate_js_wraps_in_iife() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = vec!["console.log(1);".to_string(), "console.log(2);".to_string()];

        let path = generate_js(dir.path(), &scripts).unwrap().unwrap();
        let content = fs::read_to_string(&path).unwrap();

        assert!(content.starts_with("(function() {\n"));
        assert!(content.ends_with("})();\n"));
        assert!(content.contains("console.log(1);\nconsole.log(2);"));
    }

    #[test]
    fn test_empty_contributions_generate_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(generate_css(dir.path(), &[]).unwrap().is_none());
        assert!(generate_js(dir.path(), &[]).unwrap().is_none());
        assert!(!auto_generated_dir(dir.path()).exists());
    }

    #[test]
    fn test_reconcile_keeps_current_set_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let generated = auto_generated_dir(dir.path());
        fs::create_dir_all(&generated).unwrap();

        for name in ["plugin_a.css", "plugin_b.css", "plugin_c.js"] {
            fs::write(generated.join(name), "x").unwrap();
        }

        let keep = vec![generated.join("plugin_b.css"), generated.join("plugin_d.js")];
        fs::write(&keep[1], "fresh").unwrap();

        reconcile_generated(dir.path(), &keep).unwrap();

        let mut remaining: Vec<String> = fs::read_dir(&generated)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["plugin_b.css", "plugin_d.js"]);
        assert_eq!(fs::read_to_string(generated.join("plugin_b.css")).unwrap(), "x");
    }

    #[test]
    fn test_reconcile_missing_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        reconcile_generated(dir.path(), &[]).unwrap();
    }

    #[test]
    fn test_glob_frontend_assets_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let js = dir.path().join("assets/javascripts/widgets");
        fs::create_dir_all(&js).unwrap();
        fs::write(js.join("b.js"), "").unwrap();
        fs::write(js.join("a.js"), "").unwrap();

        let admin = dir.path().join("admin/assets/javascripts");
        fs::create_dir_all(&admin).unwrap();
        fs::write(admin.join("admin-panel.js"), "").unwrap();

        let found = glob_frontend_assets(dir.path()).unwrap();
        assert_eq!(found.len(), 3);
        let sorted: Vec<PathBuf> = {
            let mut v = found.clone();
            v.sort();
            v
        };
        assert_eq!(found, sorted);
    }

    #[test]
    fn test_manifest_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let js_dir = dir.path().join("javascripts");
        fs::create_dir_all(&js_dir).unwrap();

        let watch = dir.path().join("assets/javascripts");
        fs::create_dir_all(&watch).unwrap();

        let assets = vec![watch.join("poll.js"), watch.join("poll.hbs"), watch.join("poll.css")];
        let manifest = write_manifest(&js_dir, "poll", &assets, &[watch.clone()])
            .unwrap()
            .unwrap();

        assert_eq!(manifest, js_dir.join("poll.js.erb"));
        let content = fs::read_to_string(&manifest).unwrap();
        assert!(content.starts_with("<%\n"));
        assert!(content.ends_with("%>\n"));
        assert!(content.contains(&format!("depend_on('{}')", watch.display())));
        assert!(content.contains("require_asset("));
        // The stylesheet is not a script asset.
        assert!(!content.contains("poll.css"));

        // No script assets: previous manifest removed, none written.
        let result = write_manifest(&js_dir, "poll", &[], &[]).unwrap();
        assert!(result.is_none());
        assert!(!manifest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_public_dir_symlink_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let public_root = tempfile::tempdir().unwrap();

        fs::create_dir_all(dir.path().join("public")).unwrap();
        fs::write(dir.path().join("public/logo.png"), "img").unwrap();

        let link = link_public_dir(dir.path(), "my poll", public_root.path())
            .unwrap()
            .unwrap();
        assert_eq!(link, public_root.path().join("mypoll"));
        assert_eq!(fs::read_to_string(link.join("logo.png")).unwrap(), "img");

        // Second run replaces the link without error.
        let link2 = link_public_dir(dir.path(), "my poll", public_root.path())
            .unwrap()
            .unwrap();
        assert_eq!(link, link2);
    }

    #[test]
    fn test_public_dir_absent() {
        let dir = tempfile::tempdir().unwrap();
        let public_root = tempfile::tempdir().unwrap();
        assert!(link_public_dir(dir.path(), "poll", public_root.path())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_migration_paths() {
        let dir = tempfile::tempdir().unwrap();
        assert!(migration_paths(dir.path(), false).is_empty());

        fs::create_dir_all(dir.path().join("db/migrate")).unwrap();
        fs::create_dir_all(dir.path().join("db/post_migrate")).unwrap();

        let paths = migration_paths(dir.path(), false);
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("db/migrate"));
        assert!(paths[1].ends_with("db/post_migrate"));

        let paths = migration_paths(dir.path(), true);
        assert_eq!(paths.len(), 1);
    }
}
