//! Package modules and the shared `mkApp.nix` constructor.
//!
//! Enabling `firefox` under `browsers` in a host file only takes effect when
//! some module declares `apps.browsers.firefox.enable`. `nixpam` writes one
//! such module per package:
//!
//! ```text
//! <flake>/lib/mkApp.nix                       (shared, written once)
//! <flake>/<module_dir>/<category>/<name>.nix  (one per package)
//! ```

use crate::edit::{write_atomic, EditError};
use crate::safety::{FlakeGuard, SafetyError};
use crate::search::PackageInfo;
use regex::{Captures, Regex};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Template for a single package module. Placeholders are `@key@`.
pub const PACKAGE_TEMPLATE: &str = include_str!("../templates/package.nix");

/// The constructor every package module imports.
pub const MKAPP_NIX: &str = include_str!("../templates/mkApp.nix");

/// Location of `mkApp.nix` relative to the flake root.
pub const MKAPP_PATH: &str = "lib/mkApp.nix";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z]+)@").expect("placeholder pattern is valid"));

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("flake not found: {path}")]
    FlakeNotFound { path: PathBuf },

    #[error("module dir must be a plain relative path: {path}")]
    ModuleDir { path: PathBuf },

    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Safety(#[from] SafetyError),
}

/// Where a generated module lives and what it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleTarget {
    pub container: String,
    pub category: String,
    /// Nix path expression for `mkApp.nix`, relative to the module file
    pub mkapp: String,
}

impl ModuleTarget {
    /// Target for a module under `<module_dir>/<category>/`.
    pub fn new(
        container: impl Into<String>,
        category: impl Into<String>,
        module_dir: impl AsRef<Path>,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            container: container.into(),
            category: category.into(),
            mkapp: mkapp_import(module_dir.as_ref())?,
        })
    }
}

/// Render the package module for `package`.
///
/// The package goes into the list matching its `system`: `linuxPackages` for
/// Linux, `darwinPackages` (or a Homebrew cask when `use_homebrew`) for
/// Darwin. Any other system leaves every list empty.
pub fn fill_package_template(
    package: &PackageInfo,
    target: &ModuleTarget,
    use_homebrew: bool,
) -> String {
    let attr = format!("pkgs.{}", package.attr_path);
    let (linux, darwin, casks) = if package.system.contains("linux") {
        (vec![attr], vec![], vec![])
    } else if package.system.contains("darwin") {
        if use_homebrew {
            (vec![], vec![], vec![nix_string(&package.pname)])
        } else {
            (vec![], vec![attr], vec![])
        }
    } else {
        tracing::warn!(
            package = %package.pname,
            system = %package.system,
            "unknown system, module installs nothing"
        );
        (vec![], vec![], vec![])
    };

    PLACEHOLDER
        .replace_all(PACKAGE_TEMPLATE, |caps: &Captures<'_>| match &caps[1] {
            "mkApp" => target.mkapp.clone(),
            "name" => escape_string(&package.pname),
            "description" => escape_string(&package.description),
            "container" => escape_string(&target.container),
            "category" => escape_string(&target.category),
            "linuxPackages" => nix_list(&linux),
            "darwinPackages" => nix_list(&darwin),
            "homebrewCasks" => nix_list(&casks),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Nix path from `<module_dir>/<category>/` back to `lib/mkApp.nix`.
pub fn mkapp_import(module_dir: &Path) -> Result<String, TemplateError> {
    let mut depth = 1;
    for component in module_dir.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            _ => {
                return Err(TemplateError::ModuleDir {
                    path: module_dir.to_path_buf(),
                })
            }
        }
    }

    Ok(format!("{}{MKAPP_PATH}", "../".repeat(depth)))
}

/// Nix system double for the running machine, e.g. `x86_64-linux`.
pub fn current_system() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{}-{os}", std::env::consts::ARCH)
}

/// Write `lib/mkApp.nix` into the flake unless it is already there.
///
/// Returns whether the file was created. An existing file is never touched.
pub fn ensure_mkapp(flake_root: &Path) -> Result<bool, TemplateError> {
    if !flake_root.is_dir() {
        return Err(TemplateError::FlakeNotFound {
            path: flake_root.to_path_buf(),
        });
    }

    let path = flake_root.join(MKAPP_PATH);
    let lib_dir = path.parent().unwrap_or(flake_root);
    std::fs::create_dir_all(lib_dir).map_err(|source| TemplateError::Io {
        path: lib_dir.to_path_buf(),
        source,
    })?;
    FlakeGuard::new(flake_root)?.validate_path(lib_dir)?;

    if path.exists() {
        tracing::debug!(path = %path.display(), "mkApp.nix already present");
        return Ok(false);
    }

    write_atomic(&path, MKAPP_NIX.as_bytes())?;
    tracing::debug!(path = %path.display(), "wrote mkApp.nix");
    Ok(true)
}

fn nix_list(items: &[String]) -> String {
    if items.is_empty() {
        "[ ]".to_string()
    } else {
        format!("[ {} ]", items.join(" "))
    }
}

fn nix_string(text: &str) -> String {
    format!("\"{}\"", escape_string(text))
}

/// Escape text for the inside of a double-quoted Nix string.
fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            _ => out.push(ch),
        }
    }
    out
}
