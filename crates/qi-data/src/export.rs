//! CSV export of a (possibly enriched) dataset.

use std::path::Path;

use qi_core::error::Result;
use qi_core::models::Dataset;
use tracing::info;

/// Render `dataset` as comma-separated text: header row in column order,
/// one line per row, empty cells left blank.
pub fn to_csv(dataset: &Dataset) -> String {
    let mut lines = Vec::with_capacity(dataset.len() + 1);
    lines.push(dataset.columns().join(","));
    for row in dataset.rows() {
        let fields: Vec<String> = dataset
            .columns()
            .iter()
            .map(|col| row.get(col).map(ToString::to_string).unwrap_or_default())
            .collect();
        lines.push(fields.join(","));
    }
    lines.join("\n")
}

/// Write [`to_csv`] output to `path`, creating parent directories.
pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_csv(dataset))?;
    info!(rows = dataset.len(), "exported dataset to {}", path.display());
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
