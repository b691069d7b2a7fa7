use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::types::Target;

/// Parse target list content into an ordered list of targets.
///
/// One address per line. Surrounding whitespace is trimmed and blank lines are
/// skipped. There is no comment syntax and duplicates are kept, so a repeated
/// address is scanned once per occurrence.
pub fn parse_targets_str(s: &str) -> Vec<Target> {
    s.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load a target list from a file path. Errors if the file cannot be read.
pub fn load_targets_from_path(path: impl AsRef<Path>) -> Result<Vec<Target>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read targets file: {}", path.as_ref().display()))?;
    Ok(parse_targets_str(&content))
}
