use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories inside a flake that are never edited: git internals and
/// `nix build` result links pointing into the store.
const FORBIDDEN_DIRS: &[&str] = &[".git", "result"];

/// Boundary checks that keep edits inside the flake being managed.
#[derive(Debug, Clone)]
pub struct FlakeGuard {
    /// Canonical flake root
    flake_root: PathBuf,
    /// Canonical paths to forbidden directories
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside the flake: {path} (flake: {flake})")]
    OutsideFlake { path: PathBuf, flake: PathBuf },

    #[error("path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl FlakeGuard {
    /// Create a guard rooted at `flake_root`.
    ///
    /// The root is canonicalized so symlinked checkouts compare correctly.
    pub fn new(flake_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let flake_root = flake_root.as_ref().canonicalize()?;

        let forbidden_paths = FORBIDDEN_DIRS
            .iter()
            .filter_map(|dir| flake_root.join(dir).canonicalize().ok())
            .collect();

        Ok(Self {
            flake_root,
            forbidden_paths,
        })
    }

    /// Check that `path` is safe to edit, returning its canonical form.
    ///
    /// Relative paths resolve against the flake root.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.flake_root.join(path)
        };

        // Resolves symlinks and `..`
        let canonical = absolute.canonicalize()?;

        if !canonical.starts_with(&self.flake_root) {
            return Err(SafetyError::OutsideFlake {
                path: canonical,
                flake: self.flake_root.clone(),
            });
        }

        if let Some(forbidden) = self
            .forbidden_paths
            .iter()
            .find(|forbidden| canonical.starts_with(forbidden))
        {
            return Err(SafetyError::ForbiddenPath {
                path: canonical.clone(),
                forbidden: forbidden.clone(),
            });
        }

        Ok(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_validate_path_inside_flake() {
        let temp_dir = tempfile::tempdir().unwrap();
        let flake = temp_dir.path();
        let file = flake.join("hosts/desktop/configuration.nix");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"{ }").unwrap();

        let guard = FlakeGuard::new(flake).unwrap();
        assert!(guard.validate_path(&file).is_ok());
        assert!(guard.validate_path("hosts/desktop/configuration.nix").is_ok());
    }

    #[test]
    fn test_validate_path_outside_flake() {
        let temp_dir = tempfile::tempdir().unwrap();
        let flake = temp_dir.path().join("flake");
        fs::create_dir_all(&flake).unwrap();
        let outside = temp_dir.path().join("configuration.nix");
        fs::write(&outside, b"{ }").unwrap();

        let guard = FlakeGuard::new(&flake).unwrap();
        let result = guard.validate_path(&outside);
        assert!(matches!(result, Err(SafetyError::OutsideFlake { .. })));

        let result = guard.validate_path("../configuration.nix");
        assert!(matches!(result, Err(SafetyError::OutsideFlake { .. })));
    }

    #[test]
    fn test_validate_path_forbidden() {
        let temp_dir = tempfile::tempdir().unwrap();
        let flake = temp_dir.path();
        let file = flake.join(".git/config");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();

        let guard = FlakeGuard::new(flake).unwrap();
        let result = guard.validate_path(&file);
        assert!(matches!(result, Err(SafetyError::ForbiddenPath { .. })));
    }

    #[test]
    fn test_missing_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let guard = FlakeGuard::new(temp_dir.path()).unwrap();
        let result = guard.validate_path("hosts/none/configuration.nix");
        assert!(matches!(result, Err(SafetyError::Canonicalize(_))));
    }

    #[test]
    #[cfg(unix)]
    fn test_validate_symlink_escape() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let flake = temp_dir.path().join("flake");
        fs::create_dir_all(&flake).unwrap();
        let outside = temp_dir.path().join("outside.nix");
        fs::write(&outside, b"{ }").unwrap();
        let link = flake.join("escape.nix");
        symlink(&outside, &link).unwrap();

        let guard = FlakeGuard::new(&flake).unwrap();
        let result = guard.validate_path(&link);
        assert!(matches!(result, Err(SafetyError::OutsideFlake { .. })));
    }
}
