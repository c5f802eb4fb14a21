use crate::core::types::RoiList;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// Extension every output table ends up with.
pub const TABULAR_EXTENSION: &str = "csv";

/// Tabular extensions coerced to `TABULAR_EXTENSION`.
const RECOGNIZED_EXTENSIONS: [&str; 3] = ["csv", "tsv", "txt"];

/// One output row. Field names double as the header.
#[derive(Debug, Serialize)]
struct OutputRecord {
    #[serde(rename = "File")]
    file: String,
    #[serde(rename = "ROIs")]
    rois: String,
}

/// Coerces recognized tabular extensions to `.csv`; anything else is left as given.
pub fn normalize_output_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if RECOGNIZED_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)) => {
            path.with_extension(TABULAR_EXTENSION)
        }
        _ => path.to_path_buf(),
    }
}

/// Absolute form of `path` with `.` and `..` resolved textually. Symlinks are not followed.
pub fn lexical_absolute(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }
    Ok(resolved)
}

/// Appends `(absolute file_path, rois)` as one row of the table at `output`.
///
/// A new table gets a `File,ROIs` header first; an existing one only gets the row.
/// The ROI list is a single field holding its list literal.
///
/// # Returns
/// The normalized output path actually written.
pub fn append(file_path: &Path, rois: &RoiList, output: &Path) -> Result<PathBuf> {
    let output = normalize_output_path(output);
    let source = lexical_absolute(file_path)
        .with_context(|| format!("Cannot resolve an absolute path for {:?}", file_path))?;

    let is_new = !output.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&output)
        .with_context(|| format!("Cannot open output table {:?}", output))?;

    let mut writer = csv::WriterBuilder::new().has_headers(is_new).from_writer(file);
    writer
        .serialize(OutputRecord { file: source.display().to_string(), rois: rois.to_string() })
        .with_context(|| format!("Cannot write to output table {:?}", output))?;
    writer.flush().with_context(|| format!("Cannot flush output table {:?}", output))?;

    info!(output = %output.display(), rois = rois.len(), created = is_new, "row appended");
    Ok(output)
}
