//! Integration tests for agora-plugin-runtime.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agora_plugin_runtime::{
    auto_generated_dir, ActivationState, Activator, ActivatorConfig, CallbackEvent, EmojiStore,
    Error, HostLocaleSource, LocaleOpts, PluginInstance, Result, SetupRegistry, ENTRY_FILE,
    RESERVED_PLUGIN_DIR,
};

fn make_plugin(root: &Path, dir: &str, header: &str) {
    let plugin_dir = root.join(dir);
    fs::create_dir_all(&plugin_dir).unwrap();
    fs::write(plugin_dir.join(ENTRY_FILE), header).unwrap();
}

fn make_activator(root: &Path) -> Activator {
    Activator::new(
        ActivatorConfig::new()
            .with_plugin_root(root.join("plugins"))
            .with_js_assets_dir(root.join("host/javascripts"))
            .with_public_root(root.join("host/public")),
    )
}

#[test]
fn test_discovery_is_deterministic_and_excludes_builtin() {
    let root = tempfile::tempdir().unwrap();
    let plugins_root = root.path().join("plugins");
    make_plugin(&plugins_root, "zulu", "// name: zulu\n");
    make_plugin(&plugins_root, "alpha", "// name: alpha\n");
    make_plugin(&plugins_root, RESERVED_PLUGIN_DIR, "// name: builtin\n");

    let activator = make_activator(root.path());

    for _ in 0..3 {
        let names: Vec<String> = activator
            .discover()
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "zulu"]);
    }
}

#[test]
fn test_idempotent_automatic_asset_generation() {
    let root = tempfile::tempdir().unwrap();
    make_plugin(&root.path().join("plugins"), "poll", "// name: poll\n");

    let styles = vec!["body{color:red}".to_string()];
    let plugin_dir = root.path().join("plugins/poll");

    let first = agora_plugin_runtime::generate_css(&plugin_dir, &styles)
        .unwrap()
        .unwrap();
    let before = fs::metadata(&first).unwrap().modified().unwrap();

    let second = agora_plugin_runtime::generate_css(&plugin_dir, &styles)
        .unwrap()
        .unwrap();
    let after = fs::metadata(&second).unwrap().modified().unwrap();

    assert_eq!(first, second);
    assert_eq!(before, after);
    assert_eq!(fs::read_to_string(&second).unwrap(), "body{color:red}");
}

#[test]
fn test_garbage_collection_reaches_exact_target_set() {
    let root = tempfile::tempdir().unwrap();
    let plugin_dir = root.path().join("plugins/poll");
    let generated = auto_generated_dir(&plugin_dir);
    fs::create_dir_all(&generated).unwrap();

    // Start with {A, B, C}; the current contribution set is {B, D}.
    for name in ["plugin_aaa.css", "plugin_bbb.css", "plugin_ccc.js"] {
        fs::write(generated.join(name), "old").unwrap();
    }
    let d = generated.join("plugin_ddd.js");
    fs::write(&d, "new").unwrap();

    let keep = vec![generated.join("plugin_bbb.css"), d.clone()];
    agora_plugin_runtime::reconcile_generated(&plugin_dir, &keep).unwrap();

    let mut remaining: Vec<String> = fs::read_dir(&generated)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["plugin_bbb.css", "plugin_ddd.js"]);

    // B was left untouched, not rewritten.
    assert_eq!(fs::read_to_string(generated.join("plugin_bbb.css")).unwrap(), "old");
}

#[test]
fn test_emoji_token_depends_on_registration_order() {
    let mut forward = EmojiStore::new();
    forward.register("foo", "/foo.png");
    forward.register("bar", "/bar.png");

    let mut reverse = EmojiStore::new();
    reverse.register("bar", "/bar.png");
    reverse.register("foo", "/foo.png");

    let mut replay = EmojiStore::new();
    replay.register("foo", "/foo.png");
    replay.register("bar", "/bar.png");

    assert_ne!(forward.cache_token(), reverse.cache_token());
    assert_eq!(forward.cache_token(), replay.cache_token());
    assert_ne!(forward.cache_token(), "");
}

#[test]
fn test_conditional_gating_through_activation() {
    let root = tempfile::tempdir().unwrap();
    make_plugin(&root.path().join("plugins"), "poll", "// name: poll\n");

    let activator = make_activator(root.path());
    activator.registries().extensions().define("post.cooked");
    activator
        .registries()
        .extensions()
        .define(CallbackEvent::BeforeSave.point_name("post"));

    let mut plugins = activator.discover().unwrap();

    let body_runs = Arc::new(AtomicUsize::new(0));
    let body_runs_setup = body_runs.clone();

    let setup = move |plugin: &mut PluginInstance| -> Result<()> {
        plugin.enabled_site_setting("poll_enabled");

        let runs = body_runs_setup.clone();
        plugin.register_extension_handler(
            "post.cooked",
            Box::new(move |_| {
                runs.fetch_add(1, Ordering::Relaxed);
                serde_json::json!("cooked-by-poll")
            }),
        );
        plugin.register_model_callback(
            "post",
            CallbackEvent::BeforeSave,
            Box::new(|_| serde_json::Value::Null),
        );
        Ok(())
    };

    activator.activate(&mut plugins[0], &setup).unwrap();
    let extensions = activator.registries().extensions();

    // Disabled: dispatch returns None, the hidden body never executes, the
    // callback is skipped.
    let value = extensions
        .dispatch_first("post.cooked", &serde_json::Value::Null)
        .unwrap();
    assert!(value.is_none());
    assert_eq!(body_runs.load(Ordering::Relaxed), 0);
    assert_eq!(
        extensions
            .notify("post.before_save", &serde_json::Value::Null)
            .unwrap(),
        0
    );

    // Flip the setting: registrations persist, behavior turns on.
    activator.settings().set("poll_enabled", true);
    let value = extensions
        .dispatch_first("post.cooked", &serde_json::Value::Null)
        .unwrap();
    assert_eq!(value, Some(serde_json::json!("cooked-by-poll")));
    assert_eq!(body_runs.load(Ordering::Relaxed), 1);
    assert_eq!(
        extensions
            .notify("post.before_save", &serde_json::Value::Null)
            .unwrap(),
        1
    );
}

#[test]
fn test_before_auth_ordering() {
    let root = tempfile::tempdir().unwrap();
    make_plugin(&root.path().join("plugins"), "sso", "// name: sso\n");

    let activator = make_activator(root.path());
    let mut plugins = activator.discover().unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let runs_clone = runs.clone();
    plugins[0]
        .before_auth(Box::new(move || {
            runs_clone.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }))
        .unwrap();

    activator.notify_before_auth(&mut plugins).unwrap();
    assert_eq!(runs.load(Ordering::Relaxed), 1);

    // Late registration fails loudly; the hook count stays at one.
    let result = plugins[0].before_auth(Box::new(|| Ok(())));
    assert!(matches!(result, Err(Error::BeforeAuthClosed { .. })));
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

struct HostLocales;

impl HostLocaleSource for HostLocales {
    fn message_format(&self, locale: &str) -> Option<std::path::PathBuf> {
        Some(format!("/host/message_format/{}.js", locale).into())
    }

    fn moment_js(&self, locale: &str) -> Option<std::path::PathBuf> {
        Some(format!("/host/moment_js/{}.js", locale).into())
    }
}

#[test]
fn test_locale_registered_iff_fully_resolved() {
    let root = tempfile::tempdir().unwrap();
    let plugins_root = root.path().join("plugins");
    make_plugin(&plugins_root, "poll", "// name: poll\n");

    let plugin_dir = plugins_root.join("poll");
    fs::create_dir_all(plugin_dir.join("config/locales")).unwrap();
    fs::create_dir_all(plugin_dir.join("assets/locales")).unwrap();

    // pt_BR is complete; fr is missing its server strings.
    for locale in ["pt_BR", "fr"] {
        fs::write(
            plugin_dir.join(format!("config/locales/client.{}.yml", locale)),
            "{}",
        )
        .unwrap();
        fs::write(plugin_dir.join(format!("assets/locales/{}.js.erb", locale)), "").unwrap();
    }
    fs::write(plugin_dir.join("config/locales/server.pt_BR.yml"), "{}").unwrap();

    let activator = make_activator(root.path()).with_locale_source(Box::new(HostLocales));
    let mut plugins = activator.discover().unwrap();

    let setup = |plugin: &mut PluginInstance| -> Result<()> {
        plugin.register_locale("pt_BR", LocaleOpts::default());
        plugin.register_locale("fr", LocaleOpts::default());
        Ok(())
    };
    activator.activate(&mut plugins[0], &setup).unwrap();

    // The invalid locale was skipped, activation continued.
    let locales = activator.registries().locales();
    assert_eq!(locales.len(), 1);
    assert_eq!(locales[0].locale, "pt_BR");
    assert_eq!(plugins[0].state(), ActivationState::FrameworkIntegrated);
}

#[test]
fn test_end_to_end_single_stylesheet_plugin() {
    let root = tempfile::tempdir().unwrap();
    make_plugin(&root.path().join("plugins"), "poll", "// name: poll\n// version: 1.0.0\n");

    let activator = make_activator(root.path());
    let mut plugins = activator.discover().unwrap();

    let setup = |plugin: &mut PluginInstance| -> Result<()> {
        plugin.register_css("body{color:red}");
        Ok(())
    };
    activator.activate(&mut plugins[0], &setup).unwrap();

    let generated_dir = auto_generated_dir(plugins[0].path());
    let files: Vec<_> = fs::read_dir(&generated_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();

    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("plugin_"));
    assert!(name.ends_with(".css"));
    assert_eq!(fs::read_to_string(&files[0]).unwrap(), "body{color:red}");

    let matching: Vec<_> = activator
        .registries()
        .assets()
        .into_iter()
        .filter(|e| e.path == files[0])
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].namespace, "poll");
}

#[test]
fn test_full_boot_sequence_and_freeze() {
    let root = tempfile::tempdir().unwrap();
    let plugins_root = root.path().join("plugins");
    make_plugin(&plugins_root, "chat", "// name: chat\n");
    make_plugin(&plugins_root, "poll", "// name: poll\n");

    // poll ships migrations and a public directory.
    fs::create_dir_all(plugins_root.join("poll/db/migrate")).unwrap();
    fs::create_dir_all(plugins_root.join("poll/db/post_migrate")).unwrap();
    fs::create_dir_all(plugins_root.join("poll/public")).unwrap();
    fs::write(plugins_root.join("poll/public/icon.png"), "img").unwrap();

    // chat ships a conventional front-end asset.
    let chat_js = plugins_root.join("chat/assets/javascripts");
    fs::create_dir_all(&chat_js).unwrap();
    fs::write(chat_js.join("chat.js"), "// widget").unwrap();

    let activator = make_activator(root.path());
    let mut plugins = activator.discover().unwrap();

    let mut setups = SetupRegistry::new();
    setups.register(
        "poll",
        Box::new(|plugin: &mut PluginInstance| -> Result<()> {
            plugin.register_emoji("ballot", "/images/ballot.png");
            plugin.register_seed_data("poll_default_close_hours", serde_json::json!(72));
            plugin.register_svg_icon("chart-bar");
            Ok(())
        }),
    );
    setups.register(
        "chat",
        Box::new(|plugin: &mut PluginInstance| -> Result<()> {
            plugin.register_js("console.log('chat');");
            Ok(())
        }),
    );

    activator.notify_before_auth(&mut plugins).unwrap();
    activator.activate_all(&mut plugins, &setups).unwrap();
    activator.notify_after_auth(&mut plugins).unwrap();
    activator.finish();

    let registries = activator.registries();

    // Discovery order: chat activated before poll.
    assert!(plugins.iter().all(|p| p.state().is_terminal()));

    // chat's manifest lists its globbed asset.
    let manifest = root.path().join("host/javascripts/chat.js.erb");
    let contents = fs::read_to_string(&manifest).unwrap();
    assert!(contents.contains("require_asset("));
    assert!(contents.contains("chat.js"));

    // poll contributed emoji, seed data, icon, migrations, public link.
    assert!(!registries.emoji_cache_token().is_empty());
    assert_eq!(
        registries.seed_value("poll_default_close_hours"),
        Some(serde_json::json!(72))
    );
    assert_eq!(registries.svg_icons(), vec!["chart-bar"]);
    assert_eq!(registries.migration_paths().len(), 2);

    #[cfg(unix)]
    {
        let link = root.path().join("host/public/poll");
        assert_eq!(fs::read_to_string(link.join("icon.png")).unwrap(), "img");
    }

    // Frozen: late registration is rejected, reads keep working.
    assert!(matches!(
        registries.add_svg_icon("late"),
        Err(Error::RegistryFrozen(_))
    ));
    assert_eq!(registries.assets().is_empty(), false);
}

#[test]
fn test_changing_contributions_reconcile_on_disk() {
    let root = tempfile::tempdir().unwrap();
    make_plugin(&root.path().join("plugins"), "theme", "// name: theme\n");
    let plugin_dir = root.path().join("plugins/theme");

    // First activation: one stylesheet.
    {
        let activator = make_activator(root.path());
        let mut plugins = activator.discover().unwrap();
        let setup = |plugin: &mut PluginInstance| -> Result<()> {
            plugin.register_css("body{color:red}");
            Ok(())
        };
        activator.activate(&mut plugins[0], &setup).unwrap();
    }
    let generated = auto_generated_dir(&plugin_dir);
    assert_eq!(fs::read_dir(&generated).unwrap().count(), 1);

    // Next boot with a changed stylesheet: old file collected, new written.
    {
        let activator = make_activator(root.path());
        let mut plugins = activator.discover().unwrap();
        let setup = |plugin: &mut PluginInstance| -> Result<()> {
            plugin.register_css("body{color:blue}");
            Ok(())
        };
        activator.activate(&mut plugins[0], &setup).unwrap();
    }

    let files: Vec<_> = fs::read_dir(&generated)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    assert_eq!(fs::read_to_string(&files[0]).unwrap(), "body{color:blue}");
}
