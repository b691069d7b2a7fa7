use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::types::ScanReport;

/// `<output_dir>/scan_report_<stamp>.json`.
pub fn report_path(output_dir: &Path, stamp: &str) -> PathBuf {
    output_dir.join(format!("scan_report_{stamp}.json"))
}

/// Write `report` as pretty JSON, creating the parent directory if needed.
pub fn write_report(path: &Path, report: &ScanReport) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("failed to create report file: {}", path.display()))?;
    serde_json::to_writer_pretty(file, report).context("failed to serialize report")?;
    Ok(())
}
