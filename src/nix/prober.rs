use crate::nix::locator::starts_name;
use regex::Regex;
use std::fmt;

/// Declared state of an entry's `enable` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Enabled,
    Disabled,
    /// Declared with a value other than a boolean literal (`lib.mkDefault true`, ...)
    Declared,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Enabled => write!(f, "enabled"),
            EntryState::Disabled => write!(f, "disabled"),
            EntryState::Declared => write!(f, "declared"),
        }
    }
}

fn entry_pattern(entry: &str, tail: &str) -> Regex {
    let pattern = format!(r"{}\.enable{tail}", regex::escape(entry));
    Regex::new(&pattern).expect("escaped entry pattern is always valid")
}

/// Whether `<entry>.enable` appears anywhere in `section`, in any state.
pub fn probe(section: &str, entry: &str) -> bool {
    entry_pattern(entry, r"\b")
        .find_iter(section)
        .any(|m| starts_name(section, m.start()))
}

/// Classify the first declaration of `entry` in `section`.
pub fn state(section: &str, entry: &str) -> Option<EntryState> {
    let assignment = entry_pattern(entry, r"\s*=\s*([^;]*);")
        .captures_iter(section)
        .find(|caps| starts_name(section, caps.get(0).map_or(0, |m| m.start())));

    match assignment {
        Some(caps) => Some(match caps[1].trim() {
            "true" => EntryState::Enabled,
            "false" => EntryState::Disabled,
            _ => EntryState::Declared,
        }),
        None if probe(section, entry) => Some(EntryState::Declared),
        None => None,
    }
}
