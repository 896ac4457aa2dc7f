//! Flake directory layout: hosts and app categories.
//!
//! ```text
//! <flake>/
//!   <host_dir>/<host>/configuration.nix
//!   <module_dir>/<category>/<package>.nix
//! ```

use crate::config::Settings;
use crate::safety::{FlakeGuard, SafetyError};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File name of a host's configuration inside its directory.
pub const HOST_CONFIG_FILE: &str = "configuration.nix";

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("failed to read {dir}: {source}")]
    Scan {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("host '{host}' not found (looked for {path})")]
    HostNotFound { host: String, path: PathBuf },

    #[error("'{name}' is not a single path component")]
    InvalidComponent { name: String },

    #[error(transparent)]
    Safety(#[from] SafetyError),
}

#[derive(Debug, Clone)]
pub struct FlakeLayout {
    root: PathBuf,
    module_dir: PathBuf,
    host_dir: PathBuf,
}

impl FlakeLayout {
    pub fn new(
        root: impl Into<PathBuf>,
        module_dir: impl AsRef<Path>,
        host_dir: impl AsRef<Path>,
    ) -> Self {
        let root = root.into();
        Self {
            module_dir: root.join(module_dir),
            host_dir: root.join(host_dir),
            root,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.flake_root(),
            &settings.module_dir,
            &settings.host_dir,
        )
    }

    /// Host names: directories directly under the host dir, sorted.
    pub fn hosts(&self) -> Result<Vec<String>, LayoutError> {
        list_dirs(&self.host_dir)
    }

    /// Category names: directories directly under the module dir, sorted.
    pub fn categories(&self) -> Result<Vec<String>, LayoutError> {
        list_dirs(&self.module_dir)
    }

    /// Canonical path of `host`'s configuration file, checked to lie inside the flake.
    pub fn host_config(&self, host: &str) -> Result<PathBuf, LayoutError> {
        let path = self.host_dir.join(host).join(HOST_CONFIG_FILE);
        if !path.is_file() {
            return Err(LayoutError::HostNotFound {
                host: host.to_string(),
                path,
            });
        }

        let guard = FlakeGuard::new(&self.root)?;
        Ok(guard.validate_path(&path)?)
    }

    /// Path of the module for `package` under `category`. The file need not exist.
    ///
    /// The deepest existing ancestor must lie inside the flake, so a symlinked
    /// category directory cannot redirect the write.
    pub fn module_path(&self, category: &str, package: &str) -> Result<PathBuf, LayoutError> {
        let path = self
            .module_dir
            .join(single_component(category)?)
            .join(format!("{}.nix", single_component(package)?));

        let guard = FlakeGuard::new(&self.root)?;
        if let Some(existing) = path.ancestors().find(|p| p.exists()) {
            guard.validate_path(existing)?;
        }
        Ok(path)
    }
}

fn single_component(name: &str) -> Result<&str, LayoutError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(name),
        _ => Err(LayoutError::InvalidComponent {
            name: name.to_string(),
        }),
    }
}

fn list_dirs(dir: &Path) -> Result<Vec<String>, LayoutError> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| LayoutError::Scan {
            dir: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }

    names.sort();
    tracing::debug!(dir = %dir.display(), count = names.len(), "scanned directory");
    Ok(names)
}
