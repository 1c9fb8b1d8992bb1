#![allow(clippy::unwrap_used)]

use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use meater_config::{Config, ConfigError, init_config, load_config_from, save_config_to};

/// Run under figment's env lock so parallel tests never observe each
/// other's `MEATER_*` variables.
fn isolated(f: impl FnOnce()) {
    figment::Jail::expect_with(|_| {
        f();
        Ok(())
    });
}

fn write(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn missing_file_loads_defaults() {
    isolated(|| {
        let dir = TempDir::new().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    });
}

#[test]
fn adapter_style_keys_load() {
    isolated(|| {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"
    username = "cook@example.com"
    password = "hunter2"
    language = "de"
    tempUnit = "°F"
    clearOldValues = true
    updateIdle = 300
    updateCook = 20
    "#,
        );

        let cfg = load_config_from(&path).unwrap();

        assert_eq!(cfg.username, "cook@example.com");
        assert_eq!(cfg.password.as_deref(), Some("hunter2"));
        assert_eq!(cfg.language, "de");
        assert_eq!(cfg.temp_unit, "°F");
        assert!(cfg.clear_old_values);
        assert_eq!(cfg.update_idle, 300);
        assert_eq!(cfg.update_cook, 20);
    });
}

#[test]
fn zero_interval_in_file_is_rejected() {
    isolated(|| {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "update_idle = 0\n");

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "update_idle"));
    });
}

#[test]
fn malformed_toml_is_a_load_error() {
    isolated(|| {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "update_idle = [\n");

        assert!(matches!(
            load_config_from(&path),
            Err(ConfigError::Figment(_))
        ));
    });
}

#[test]
fn env_overrides_file_but_not_password() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("config.toml", "update_cook = 45\npassword = \"from-file\"\n")?;
        jail.set_env("MEATER_UPDATE_COOK", 12);
        jail.set_env("MEATER_USERNAME", "env@example.com");
        jail.set_env("MEATER_PASSWORD", "from-env");

        let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;

        assert_eq!(cfg.update_cook, 12);
        assert_eq!(cfg.username, "env@example.com");
        // The env password is resolved at login time, never merged into the file view.
        assert_eq!(cfg.password.as_deref(), Some("from-file"));
        Ok(())
    });
}

#[test]
fn env_overrides_camel_case_file_keys() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("config.toml", "updateIdle = 300\ntempUnit = \"°F\"\n")?;
        jail.set_env("MEATER_UPDATE_IDLE", 90);

        let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;

        assert_eq!(cfg.update_idle, 90);
        assert_eq!(cfg.temp_unit, "°F");
        Ok(())
    });
}

#[test]
fn snake_case_key_wins_over_camel_case_twin() {
    isolated(|| {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "update_cook = 20\nupdateCook = 45\n");

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.update_cook, 20);
    });
}

#[test]
fn init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let created = init_config(&path, false).unwrap();
    assert_eq!(created, Config::default());
    assert!(path.exists());

    assert!(matches!(
        init_config(&path, false),
        Err(ConfigError::AlreadyExists { .. })
    ));
    init_config(&path, true).unwrap();
}

#[test]
fn saved_config_loads_back() {
    isolated(|| {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config {
            username: "cook@example.com".into(),
            update_cook: 15,
            clear_old_values: true,
            ..Config::default()
        };

        save_config_to(&path, &cfg).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();

        assert!(!text.contains("password"));
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    });
}
