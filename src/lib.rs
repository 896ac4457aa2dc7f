//! nixpam: idempotent app enabling for NixOS / nix-darwin flakes
//!
//! Edits structures of the form
//!
//! ```text
//! apps = {
//!   browsers = {
//!     firefox.enable = true;
//!   };
//! };
//! ```
//!
//! with targeted regex searches and text splicing instead of a Nix parser.
//!
//! # Architecture
//!
//! All mutations compile down to a single primitive: [`Edit`], a verified
//! byte-span replacement over the document buffer. Intelligence lives in span
//! acquisition (the section locator and entry prober in [`nix`]), not in the
//! application logic.
//!
//! # Safety
//!
//! - Edits verify expected before-text before applying
//! - Batches are all-or-nothing
//! - Atomic file writes (tempfile + fsync + rename)
//! - Flake boundary enforcement for host configurations
//! - Repeating an operation never changes the document again
//!
//! # Example
//!
//! ```
//! use nixpam::{NixEditor, UpsertOutcome};
//!
//! let mut editor = NixEditor::new("apps = {\n  browsers = {\n    firefox.enable = false;\n  };\n}");
//!
//! assert_eq!(editor.upsert("browsers", "firefox").unwrap(), UpsertOutcome::Enabled);
//! assert_eq!(editor.upsert("browsers", "firefox").unwrap(), UpsertOutcome::Unchanged);
//! assert!(editor.content().contains("firefox.enable = true;"));
//! ```

pub mod config;
pub mod edit;
pub mod layout;
pub mod nix;
pub mod safety;
pub mod search;
pub mod template;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, Settings};
pub use edit::{write_atomic, Edit, EditError, EditResult, EditVerification};
pub use layout::{FlakeLayout, LayoutError};
pub use nix::{EntryState, Layout, NixEditor, NixError, SectionEnd, UpsertOutcome};
pub use safety::{FlakeGuard, SafetyError};
pub use search::{PackageInfo, SearchError};
pub use template::{ModuleTarget, TemplateError};
