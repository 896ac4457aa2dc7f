//! `nix search` adapter.
//!
//! `nix search nixpkgs <query> --json` prints an object keyed by attribute
//! path (`legacyPackages.x86_64-linux.firefox`) whose values carry `pname`,
//! `version` and `description`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Command;
use thiserror::Error;

/// Attribute paths keyed to the packages they describe.
pub type SearchResults = BTreeMap<String, PackageInfo>;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PackageInfo {
    #[serde(default)]
    pub pname: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Attribute path below the system segment, e.g. `python311Packages.numpy`
    #[serde(skip)]
    pub attr_path: String,
    /// System segment of the full path, e.g. `x86_64-linux`
    #[serde(skip)]
    pub system: String,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("failed to run nix: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("nix search exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("failed to parse nix search output: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn parse_search_output(json: &str) -> Result<SearchResults, SearchError> {
    // `nix search` prints nothing at all when there are no hits
    if json.trim().is_empty() {
        return Ok(SearchResults::new());
    }
    Ok(serde_json::from_str(json)?)
}

/// Order results for selection: top-level packages first, then nested
/// (plugin) packages when `show_all` is set.
///
/// A full path splits on `.` into `<set>.<system>.<attr...>`; exactly one attr
/// segment is top-level, more is nested, fewer is malformed and skipped.
pub fn prioritize(results: SearchResults, show_all: bool) -> Vec<PackageInfo> {
    let mut top_level = Vec::new();
    let mut nested = Vec::new();

    for (full_path, mut package) in results {
        let parts: Vec<&str> = full_path.split('.').collect();
        if parts.len() < 3 {
            tracing::warn!(path = %full_path, "skipping malformed search result");
            continue;
        }

        package.system = parts[1].to_string();
        package.attr_path = parts[2..].join(".");
        if parts.len() == 3 {
            top_level.push(package);
        } else {
            nested.push(package);
        }
    }

    if show_all {
        top_level.extend(nested);
    }
    top_level
}

/// Run `nix search nixpkgs <query> --json [--system <system>]`.
pub fn run_search(query: &str, system: Option<&str>) -> Result<SearchResults, SearchError> {
    let mut command = Command::new("nix");
    command.args(["search", "nixpkgs", query, "--json"]);
    if let Some(system) = system.filter(|s| !s.is_empty()) {
        command.args(["--system", system]);
    }

    tracing::debug!(query, ?system, "running nix search");
    let output = command.output()?;
    if !output.status.success() {
        return Err(SearchError::Failed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_search_output(&String::from_utf8_lossy(&output.stdout))
}
