//! Settings, flake layout and file writes working together.

use nixpam::config::{load_from_path, save_to_path, ConfigError, Settings, ValidationIssue};
use nixpam::template::{ensure_mkapp, fill_package_template};
use nixpam::{
    write_atomic, FlakeLayout, LayoutError, ModuleTarget, PackageInfo, SafetyError, SectionEnd,
    UpsertOutcome,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const HOST: &str = "{ config, pkgs, ... }:\n{\n  apps = {\n    browsers = {\n      chromium.enable = true;\n    };\n  };\n}\n";

/// Helper to create a flake with two hosts and three categories
fn setup_test_flake() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    for category in ["browsers", "editors", "shells"] {
        fs::create_dir_all(root.join("modules/apps").join(category)).unwrap();
    }
    for host in ["desktop", "laptop"] {
        let host_dir = root.join("hosts").join(host);
        fs::create_dir_all(&host_dir).unwrap();
        fs::write(host_dir.join("configuration.nix"), HOST).unwrap();
    }
    fs::write(root.join("flake.nix"), "{ outputs = { ... }: { }; }\n").unwrap();

    dir
}

fn write_settings(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_settings_drive_layout() {
    let flake = setup_test_flake();
    let config_dir = TempDir::new().unwrap();
    let path = write_settings(
        config_dir.path(),
        &format!("flake_path = {:?}\n", flake.path().display().to_string()),
    );

    let settings = load_from_path(&path).unwrap();
    let layout = FlakeLayout::from_settings(&settings);

    assert_eq!(layout.hosts().unwrap(), vec!["desktop", "laptop"]);
    assert_eq!(
        layout.categories().unwrap(),
        vec!["browsers", "editors", "shells"]
    );
}

#[test]
fn test_custom_directories() {
    let flake = setup_test_flake();
    fs::rename(flake.path().join("hosts"), flake.path().join("machines")).unwrap();

    let settings = Settings {
        flake_path: flake.path().display().to_string(),
        host_dir: "machines".to_string(),
        ..Settings::default()
    };
    settings.validate().unwrap();

    let layout = FlakeLayout::from_settings(&settings);
    assert_eq!(layout.hosts().unwrap(), vec!["desktop", "laptop"]);
    assert!(layout.host_config("desktop").is_ok());
}

#[test]
fn test_enable_on_host_config() {
    let flake = setup_test_flake();
    let settings = Settings {
        flake_path: flake.path().display().to_string(),
        ..Settings::default()
    };
    let path = FlakeLayout::from_settings(&settings)
        .host_config("laptop")
        .unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let mut editor = settings.editor(content);
    assert_eq!(
        editor.upsert("editors", "helix").unwrap(),
        UpsertOutcome::CreatedSection
    );
    assert_eq!(
        editor.upsert("browsers", "firefox").unwrap(),
        UpsertOutcome::AddedEntry
    );
    write_atomic(&path, editor.content().as_bytes()).unwrap();

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("helix.enable = true;"));
    assert!(written.contains("firefox.enable = true;"));
    assert!(written.contains("chromium.enable = true;"));

    // The other host is untouched
    let desktop = flake.path().join("hosts/desktop/configuration.nix");
    assert_eq!(fs::read_to_string(desktop).unwrap(), HOST);

    // Rerunning against the written file changes nothing
    let mut editor = settings.editor(written.clone());
    assert_eq!(
        editor.upsert("editors", "helix").unwrap(),
        UpsertOutcome::Unchanged
    );
    assert_eq!(editor.content(), written);
}

#[test]
fn test_settings_indent_and_strategy() {
    let flake = setup_test_flake();
    let config_dir = TempDir::new().unwrap();
    let body = format!(
        "flake_path = {:?}\nsection_end = \"brace-depth\"\n\n[indent]\ncontainer = 2\nsection = 4\nentry = 8\n",
        flake.path().display().to_string()
    );
    let settings = load_from_path(write_settings(config_dir.path(), &body)).unwrap();
    assert_eq!(settings.section_end, SectionEnd::BraceDepth);

    let mut editor = settings.editor(HOST);
    editor.upsert("browsers", "firefox").unwrap();
    assert!(editor.content().contains("\n        firefox.enable = true;\n"));
}

#[test]
fn test_save_and_reload() {
    let flake = setup_test_flake();
    let config_dir = TempDir::new().unwrap();
    let path = config_dir.path().join("nixpam/config.toml");

    let settings = Settings {
        flake_path: flake.path().display().to_string(),
        default_system: Some("aarch64-darwin".to_string()),
        container: "programs".to_string(),
        ..Settings::default()
    };
    save_to_path(&settings, &path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("default_system = \"aarch64-darwin\""));
    assert!(text.contains("[indent]"));
    assert_eq!(load_from_path(&path).unwrap(), settings);
}

#[test]
fn test_load_rejects_missing_flake() {
    let config_dir = TempDir::new().unwrap();
    let path = write_settings(
        config_dir.path(),
        "flake_path = \"/definitely/not/a/flake\"\n",
    );

    match load_from_path(&path) {
        Err(ConfigError::Validation { source, .. }) => {
            assert!(matches!(
                source.issues.as_slice(),
                [ValidationIssue::FlakeNotFound { .. }]
            ));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_missing_host() {
    let flake = setup_test_flake();
    let settings = Settings {
        flake_path: flake.path().display().to_string(),
        ..Settings::default()
    };
    let err = FlakeLayout::from_settings(&settings)
        .host_config("server")
        .unwrap_err();
    assert!(matches!(err, LayoutError::HostNotFound { ref host, .. } if host == "server"));
}

#[test]
#[cfg(unix)]
fn test_host_symlink_outside_flake() {
    use std::os::unix::fs::symlink;

    let flake = setup_test_flake();
    let outside = TempDir::new().unwrap();
    let target = outside.path().join("configuration.nix");
    fs::write(&target, HOST).unwrap();

    let host_dir = flake.path().join("hosts/remote");
    fs::create_dir_all(&host_dir).unwrap();
    symlink(&target, host_dir.join("configuration.nix")).unwrap();

    let settings = Settings {
        flake_path: flake.path().display().to_string(),
        ..Settings::default()
    };
    let err = FlakeLayout::from_settings(&settings)
        .host_config("remote")
        .unwrap_err();
    assert!(matches!(
        err,
        LayoutError::Safety(SafetyError::OutsideFlake { .. })
    ));
}

#[test]
#[cfg(unix)]
fn test_module_symlink_outside_flake() {
    use std::os::unix::fs::symlink;

    let flake = setup_test_flake();
    let outside = TempDir::new().unwrap();
    symlink(outside.path(), flake.path().join("modules/apps/games")).unwrap();

    let settings = Settings {
        flake_path: flake.path().display().to_string(),
        ..Settings::default()
    };
    let layout = FlakeLayout::from_settings(&settings);

    let err = layout.module_path("games", "steam").unwrap_err();
    assert!(matches!(
        err,
        LayoutError::Safety(SafetyError::OutsideFlake { .. })
    ));

    let path = layout.module_path("browsers", "firefox").unwrap();
    assert!(path.starts_with(flake.path()));
    assert!(!path.exists());
}

#[test]
fn test_module_for_custom_container() {
    let flake = setup_test_flake();
    let settings = Settings {
        flake_path: flake.path().display().to_string(),
        module_dir: "nix/modules/apps".to_string(),
        container: "programs".to_string(),
        ..Settings::default()
    };

    let target = ModuleTarget::new(&settings.container, "shells", &settings.module_dir).unwrap();
    let package = PackageInfo {
        pname: "zsh".to_string(),
        attr_path: "zsh".to_string(),
        system: "x86_64-linux".to_string(),
        ..PackageInfo::default()
    };
    let text = fill_package_template(&package, &target, false);

    assert!(text.contains("mkApp = import ../../../../lib/mkApp.nix;"));
    assert!(text.contains("optionPath = [ \"programs\" \"shells\" \"zsh\" ];"));
    assert!(ensure_mkapp(&settings.flake_root()).unwrap());
    assert!(flake.path().join("lib/mkApp.nix").is_file());
}
