//! Section boundary discovery.
//!
//! A section opens with `<name> = {` (any whitespace around `=` and before
//! `{`) and, by default, closes at the first `};` that follows. Names are
//! escaped before being embedded in a pattern, and must not be the tail of a
//! longer identifier or attribute path.

use regex::Regex;
use serde::Deserialize;
use std::fmt;

/// Characters that may continue a Nix identifier or attribute path.
pub(crate) fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '\'' | '.' | '-')
}

/// Whether a name match at `offset` starts a name rather than ending a longer
/// one (`myapps = {`, `config.apps = {`).
pub(crate) fn starts_name(content: &str, offset: usize) -> bool {
    !content[..offset].chars().next_back().is_some_and(is_name_char)
}

/// How the end of a section is resolved once its opening brace is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionEnd {
    /// The first literal `};` after the opening brace. Assumes sections do
    /// not contain nested blocks.
    #[default]
    FirstTerminator,
    /// The `}` that balances the opening brace, followed by optional
    /// whitespace and `;`. Braces inside strings and comments are counted too.
    BraceDepth,
}

impl SectionEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionEnd::FirstTerminator => "first-terminator",
            SectionEnd::BraceDepth => "brace-depth",
        }
    }
}

impl fmt::Display for SectionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open byte range of a section body: just past `{` up to its closing marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    pub start: usize,
    pub end: usize,
}

impl SectionSpan {
    pub fn body<'a>(&self, content: &'a str) -> &'a str {
        &content[self.start..self.end]
    }
}

/// Build the whitespace-tolerant opening pattern for `name`.
pub fn opening_pattern(name: &str) -> Regex {
    let pattern = format!(r"{}\s*=\s*\{{", regex::escape(name));
    // The name is escaped and the rest is a fixed template
    Regex::new(&pattern).expect("escaped section pattern is always valid")
}

/// Offset immediately after the opening `{` of section `name`, if present.
pub fn locate(content: &str, name: &str) -> Option<usize> {
    let found = opening_pattern(name)
        .find_iter(content)
        .find(|m| starts_name(content, m.start()))
        .map(|m| m.end());
    if found.is_none() {
        tracing::debug!(section = name, "section not found");
    }
    found
}

/// Offset of the closing marker of the section whose body starts at `start`.
pub fn resolve_end(content: &str, start: usize, strategy: SectionEnd) -> Option<usize> {
    let rest = content.get(start..)?;
    match strategy {
        SectionEnd::FirstTerminator => rest.find("};").map(|pos| start + pos),
        SectionEnd::BraceDepth => balanced_close(rest).map(|pos| start + pos),
    }
}

/// Locate `name` and resolve its end in one step.
///
/// `Ok(None)` means the section is absent; `Err(start)` means it opens at
/// `start` but never closes.
pub fn span(
    content: &str,
    name: &str,
    strategy: SectionEnd,
) -> Result<Option<SectionSpan>, usize> {
    let Some(start) = locate(content, name) else {
        return Ok(None);
    };
    match resolve_end(content, start, strategy) {
        Some(end) => Ok(Some(SectionSpan { start, end })),
        None => Err(start),
    }
}

fn balanced_close(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in body.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            '}' => {
                let after = body[idx + 1..].trim_start();
                return after.starts_with(';').then_some(idx);
            }
            _ => {}
        }
    }
    None
}
