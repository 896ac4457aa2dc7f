use crate::config::schema::{Settings, ValidationError};
use crate::edit::{write_atomic, EditError};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use toml_edit::{value, DocumentMut, Item, Table};

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "NIXPAM_CONFIG";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    Save {
        path: PathBuf,
        source: EditError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read settings from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse settings TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse settings TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid settings ({}): {}", path.display(), source),
                None => write!(f, "invalid settings: {}", source),
            },
            ConfigError::Save { path, source } => {
                write!(f, "failed to save settings to {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::Save { source, .. } => Some(source),
        }
    }
}

/// Parse settings without validating them.
///
/// Callers that apply overrides (CLI flags, environment) validate afterwards.
pub fn parse_from_str(input: &str) -> Result<Settings, ConfigError> {
    toml_edit::de::from_str(input).map_err(|source| ConfigError::Toml { path: None, source })
}

pub fn read_from_path(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_from_str(&contents).map_err(|error| error.with_path(path))
}

pub fn load_from_str(input: &str) -> Result<Settings, ConfigError> {
    let settings = parse_from_str(input)?;
    settings
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(settings)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let settings = read_from_path(path)?;
    settings.validate().map_err(|source| ConfigError::Validation {
        path: Some(path.to_path_buf()),
        source,
    })?;
    Ok(settings)
}

/// Write `settings` to `path`, creating parent directories as needed.
pub fn save_to_path(settings: &Settings, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let document = to_document(settings);
    write_atomic(path, document.to_string().as_bytes()).map_err(|source| ConfigError::Save {
        path: path.to_path_buf(),
        source,
    })
}

fn to_document(settings: &Settings) -> DocumentMut {
    let mut doc = DocumentMut::new();
    doc["flake_path"] = value(settings.flake_path.as_str());
    if let Some(system) = &settings.default_system {
        doc["default_system"] = value(system.as_str());
    }
    doc["module_dir"] = value(settings.module_dir.as_str());
    doc["host_dir"] = value(settings.host_dir.as_str());
    doc["container"] = value(settings.container.as_str());
    doc["section_end"] = value(settings.section_end.as_str());

    let mut indent = Table::new();
    indent["container"] = value(settings.indent.container as i64);
    indent["section"] = value(settings.indent.section as i64);
    indent["entry"] = value(settings.indent.entry as i64);
    doc["indent"] = Item::Table(indent);

    doc
}

/// Settings file location: `$NIXPAM_CONFIG`, else `~/.config/nixpam/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    home::home_dir().map(|home| home.join(".config").join("nixpam").join("config.toml"))
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };
    let Some(home) = home::home_dir() else {
        return PathBuf::from(path);
    };
    if rest.is_empty() {
        return home;
    }
    match rest.strip_prefix('/') {
        Some(tail) => home.join(tail),
        // `~user` forms are left alone
        None => PathBuf::from(path),
    }
}
