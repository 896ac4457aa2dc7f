use crate::config::loader::expand_tilde;
use crate::nix::{Layout, NixEditor, SectionEnd, DEFAULT_CONTAINER};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// User settings, stored as TOML.
///
/// ```toml
/// flake_path = "~/nixos"
/// default_system = "x86_64-linux"
/// module_dir = "modules/apps"
/// host_dir = "hosts"
/// container = "apps"
/// section_end = "first-terminator"
///
/// [indent]
/// container = 2
/// section = 4
/// entry = 6
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub flake_path: String,
    #[serde(default)]
    pub default_system: Option<String>,
    #[serde(default = "default_module_dir")]
    pub module_dir: String,
    #[serde(default = "default_host_dir")]
    pub host_dir: String,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default)]
    pub section_end: SectionEnd,
    #[serde(default)]
    pub indent: Indent,
}

fn default_module_dir() -> String {
    "modules/apps".to_string()
}

fn default_host_dir() -> String {
    "hosts".to_string()
}

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            flake_path: String::new(),
            default_system: None,
            module_dir: default_module_dir(),
            host_dir: default_host_dir(),
            container: default_container(),
            section_end: SectionEnd::default(),
            indent: Indent::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct Indent {
    pub container: usize,
    pub section: usize,
    pub entry: usize,
}

impl Default for Indent {
    fn default() -> Self {
        Self {
            container: 2,
            section: 4,
            entry: 6,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.flake_path.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "flake_path",
            });
        } else {
            let root = self.flake_root();
            if !root.is_dir() {
                issues.push(ValidationIssue::FlakeNotFound { path: root });
            }
        }

        for (field, dir) in [("module_dir", &self.module_dir), ("host_dir", &self.host_dir)] {
            if dir.trim().is_empty() {
                issues.push(ValidationIssue::MissingField { field });
            } else if Path::new(dir).is_absolute() {
                issues.push(ValidationIssue::InvalidValue {
                    field,
                    message: format!("'{dir}' must be relative to the flake"),
                });
            }
        }

        let container_ok = !self.container.is_empty()
            && self
                .container
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '\''));
        if !container_ok {
            issues.push(ValidationIssue::InvalidValue {
                field: "container",
                message: format!("'{}' is not a plain attribute name", self.container),
            });
        }

        if self.indent.entry <= self.indent.section {
            issues.push(ValidationIssue::InvalidValue {
                field: "indent.entry",
                message: "entries must be indented deeper than sections".to_string(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Flake root with `~` expanded.
    pub fn flake_root(&self) -> PathBuf {
        expand_tilde(self.flake_path.trim())
    }

    pub fn layout(&self) -> Layout {
        Layout::with_widths(self.indent.container, self.indent.section, self.indent.entry)
    }

    /// Editor over `content` configured with these settings.
    pub fn editor(&self, content: impl Into<String>) -> NixEditor {
        NixEditor::new(content)
            .with_container(self.container.clone())
            .with_section_end(self.section_end)
            .with_layout(self.layout())
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        field: &'static str,
    },
    FlakeNotFound {
        path: PathBuf,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "missing required setting '{field}'")
            }
            ValidationIssue::FlakeNotFound { path } => {
                write!(f, "flake_path '{}' does not exist", path.display())
            }
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "invalid setting '{field}': {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.module_dir, "modules/apps");
        assert_eq!(settings.host_dir, "hosts");
        assert_eq!(settings.container, "apps");
        assert_eq!(settings.section_end, SectionEnd::FirstTerminator);
        assert_eq!(settings.layout(), Layout::default());
    }

    #[test]
    fn missing_flake_path() {
        let err = Settings::default().validate().unwrap_err();
        assert!(matches!(
            err.issues.as_slice(),
            [ValidationIssue::MissingField {
                field: "flake_path"
            }]
        ));
    }

    #[test]
    fn collects_every_issue() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            flake_path: temp_dir.path().display().to_string(),
            module_dir: "/abs/modules".to_string(),
            host_dir: String::new(),
            container: "my apps".to_string(),
            indent: Indent {
                container: 2,
                section: 4,
                entry: 4,
            },
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert_eq!(err.issues.len(), 4, "{err}");
    }

    #[test]
    fn flake_must_exist() {
        let settings = Settings {
            flake_path: "/definitely/not/a/flake".to_string(),
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(
            err.issues.as_slice(),
            [ValidationIssue::FlakeNotFound { .. }]
        ));
    }

    #[test]
    fn editor_uses_settings() {
        let settings = Settings {
            container: "programs".to_string(),
            indent: Indent {
                container: 0,
                section: 2,
                entry: 4,
            },
            ..Settings::default()
        };
        let mut editor = settings.editor("programs = {\n};");
        editor.upsert("shells", "zsh").unwrap();
        assert_eq!(
            editor.content(),
            "programs = {\n  shells = {\n    zsh.enable = true;\n  };\n\n};"
        );
    }
}
