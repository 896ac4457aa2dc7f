use crate::edit::{Edit, EditResult};
use crate::nix::errors::NixError;
use crate::nix::locator::{self, SectionEnd, SectionSpan};
use crate::nix::prober::{self, EntryState};
use regex::Regex;
use std::fmt;

/// Name of the top-level container unless configured otherwise.
pub const DEFAULT_CONTAINER: &str = "apps";

/// Fixed indentation used for spliced text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub container_indent: String,
    pub section_indent: String,
    pub entry_indent: String,
}

impl Layout {
    pub fn with_widths(container: usize, section: usize, entry: usize) -> Self {
        Self {
            container_indent: " ".repeat(container),
            section_indent: " ".repeat(section),
            entry_indent: " ".repeat(entry),
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::with_widths(2, 4, 6)
    }
}

/// What an upsert did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The category was missing and was created holding the entry
    CreatedSection,
    /// The category existed; the entry was appended to it
    AddedEntry,
    /// A disabled declaration was flipped to `true`
    Enabled,
    /// The entry was already declared and nothing needed to change
    Unchanged,
}

impl UpsertOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpsertOutcome::CreatedSection => write!(f, "created category"),
            UpsertOutcome::AddedEntry => write!(f, "added to category"),
            UpsertOutcome::Enabled => write!(f, "enabled"),
            UpsertOutcome::Unchanged => write!(f, "already enabled"),
        }
    }
}

/// Idempotent editor for `<container> = { <category> = { <entry>.enable = <bool>; }; };`
/// structures inside a Nix file, without parsing the Nix language.
///
/// The editor owns its document. Every mutation either applies fully or
/// leaves the text untouched.
#[derive(Debug, Clone)]
pub struct NixEditor {
    content: String,
    container: String,
    section_end: SectionEnd,
    layout: Layout,
}

impl NixEditor {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            container: DEFAULT_CONTAINER.to_string(),
            section_end: SectionEnd::default(),
            layout: Layout::default(),
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    pub fn with_section_end(mut self, section_end: SectionEnd) -> Self {
        self.section_end = section_end;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Current full document text.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Whether a block named `name` opens anywhere in the document.
    pub fn exists(&self, name: &str) -> bool {
        locator::locate(&self.content, name).is_some()
    }

    /// Whether `entry` is declared inside `category`, in any state.
    pub fn entry_exists(&self, category: &str, entry: &str) -> bool {
        match self.section(category) {
            Ok(Some(span)) => prober::probe(span.body(&self.content), entry),
            _ => false,
        }
    }

    /// Declared state of `entry` inside `category`.
    pub fn entry_state(&self, category: &str, entry: &str) -> Option<EntryState> {
        match self.section(category) {
            Ok(Some(span)) => prober::state(span.body(&self.content), entry),
            _ => None,
        }
    }

    /// Rewrite every `<entry>.enable = false;` to `<entry>.enable = true;`.
    ///
    /// Returns `false` when nothing matched, i.e. the entry is already enabled
    /// or not declared at all.
    pub fn enable(&mut self, entry: &str) -> bool {
        match self.try_enable(entry) {
            Ok(changed) => changed,
            Err(err) => {
                tracing::warn!(entry, %err, "failed to enable entry");
                false
            }
        }
    }

    fn try_enable(&mut self, entry: &str) -> Result<bool, NixError> {
        let pattern = format!(r"{}\.enable\s*=\s*false\s*;", regex::escape(entry));
        let re = Regex::new(&pattern).expect("escaped entry pattern is always valid");
        let replacement = format!("{entry}.enable = true;");

        let edits: Vec<Edit> = re
            .find_iter(&self.content)
            .filter(|m| locator::starts_name(&self.content, m.start()))
            .map(|m| Edit::new(m.start(), m.end(), replacement.clone(), m.as_str()))
            .collect();

        if edits.is_empty() {
            return Ok(false);
        }

        let results = Edit::apply_batch(&mut self.content, edits)?;
        let applied = results
            .iter()
            .filter(|result| matches!(result, EditResult::Applied { .. }))
            .count();
        tracing::debug!(entry, applied, "enabled entry");
        Ok(applied > 0)
    }

    /// Append `<entry>.enable = true;` just before the closing marker of `category`.
    pub fn add_entry(&mut self, category: &str, entry: &str) -> Result<(), NixError> {
        self.validate_category(category)?;
        validate_name(entry)?;

        let span = self
            .section(category)?
            .ok_or_else(|| NixError::SectionNotFound {
                category: category.to_string(),
            })?;

        let text = format!(
            "\n{}{entry}.enable = true;\n{}",
            self.layout.entry_indent, self.layout.section_indent
        );
        let result = Edit::insert(span.end, text).apply_to(&mut self.content)?;

        tracing::debug!(category, entry, offset = span.end, ?result, "added entry");
        Ok(())
    }

    /// Insert a new `category` block holding `entry` as the first child of the container.
    pub fn create_section(&mut self, category: &str, entry: &str) -> Result<(), NixError> {
        self.validate_category(category)?;
        validate_name(entry)?;

        let start = locator::locate(&self.content, &self.container).ok_or_else(|| {
            NixError::ContainerNotFound {
                container: self.container.clone(),
            }
        })?;

        let Layout {
            section_indent: s,
            entry_indent: e,
            ..
        } = &self.layout;
        let text = format!("\n{s}{category} = {{\n{e}{entry}.enable = true;\n{s}}};\n");
        let result = Edit::insert(start, text).apply_to(&mut self.content)?;

        tracing::debug!(
            category,
            entry,
            container = %self.container,
            ?result,
            "created category"
        );
        Ok(())
    }

    /// Make sure the container block exists, inserting an empty one before
    /// the last `}` of the document when it does not.
    pub fn ensure_container_exists(&mut self) -> Result<(), NixError> {
        if self.exists(&self.container) {
            return Ok(());
        }
        validate_name(&self.container)?;

        let last_brace = self
            .content
            .rfind('}')
            .ok_or_else(|| NixError::MalformedDocument {
                section: self.container.clone(),
            })?;

        let indent = &self.layout.container_indent;
        let text = format!("\n{indent}{} = {{\n{indent}}};\n\n", self.container);
        let result = Edit::insert(last_brace, text).apply_to(&mut self.content)?;

        tracing::debug!(container = %self.container, ?result, "created container");
        Ok(())
    }

    /// Ensure `entry` is declared and enabled under `category`.
    ///
    /// Exactly one mutator runs per call; errors surface unchanged and leave
    /// the document as it was.
    pub fn upsert(&mut self, category: &str, entry: &str) -> Result<UpsertOutcome, NixError> {
        self.validate_category(category)?;
        validate_name(entry)?;

        if !self.exists(category) {
            self.create_section(category, entry)?;
            return Ok(UpsertOutcome::CreatedSection);
        }

        if !self.entry_exists(category, entry) {
            self.add_entry(category, entry)?;
            return Ok(UpsertOutcome::AddedEntry);
        }

        if self.try_enable(entry)? {
            Ok(UpsertOutcome::Enabled)
        } else {
            Ok(UpsertOutcome::Unchanged)
        }
    }

    /// Categories live one level below the container, never at its level.
    fn validate_category(&self, category: &str) -> Result<(), NixError> {
        validate_name(category)?;
        if category == self.container {
            return Err(NixError::InvalidName {
                name: category.to_string(),
                reason: "category cannot be the container".to_string(),
            });
        }
        Ok(())
    }

    fn section(&self, category: &str) -> Result<Option<SectionSpan>, NixError> {
        locator::span(&self.content, category, self.section_end).map_err(|_| {
            NixError::MalformedDocument {
                section: category.to_string(),
            }
        })
    }
}

/// Reject names that would splice structural tokens into the document.
fn validate_name(name: &str) -> Result<(), NixError> {
    if name.is_empty() {
        return Err(NixError::InvalidName {
            name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }

    let forbidden =
        |ch: &char| ch.is_whitespace() || matches!(ch, '{' | '}' | '=' | ';' | '"' | '#');
    if let Some(ch) = name.chars().find(forbidden) {
        return Err(NixError::InvalidName {
            name: name.to_string(),
            reason: format!("contains {ch:?}"),
        });
    }

    Ok(())
}
