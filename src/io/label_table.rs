use crate::core::types::LabelTable;
use crate::error::RoiError;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Reads an enumerated `id,name` label table for a volumetric atlas.
pub fn read_label_table(path: &Path) -> Result<LabelTable> {
    let contents = fs::read_to_string(path).with_context(|| format!("Could not read atlas info file: {:?}", path))?;
    parse_label_table(&contents, path)
}

/// Parses `id,name` records. A non-numeric first record is taken as a header.
/// Names containing commas must be quoted.
pub fn parse_label_table(contents: &str, path: &Path) -> Result<LabelTable> {
    if contents.contains('\r') {
        return Err(RoiError::CarriageReturn { path: path.to_path_buf() }.into());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(contents.as_bytes());

    let malformed = |line: u64, reason: String| RoiError::MalformedLabelTable { path: path.to_path_buf(), line, reason };

    let mut table = LabelTable::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed atlas info file: {:?}", path))?;
        let line = record.position().map_or(row as u64 + 1, |p| p.line());

        let (Some(id), Some(name)) = (record.get(0), record.get(1)) else {
            return Err(malformed(line, "expected `id,name`".to_string()).into());
        };

        let id: i32 = match id.parse() {
            Ok(id) => id,
            Err(_) if row == 0 => continue,
            Err(_) => return Err(malformed(line, format!("'{}' is not an integer label id", id)).into()),
        };
        if record.len() > 2 {
            return Err(malformed(line, format!("label id {} has {} fields; quote names that contain commas", id, record.len())).into());
        }
        if name.is_empty() {
            return Err(malformed(line, format!("label id {} has an empty name", id)).into());
        }

        if table.insert(id, name).is_some() {
            return Err(RoiError::DuplicateLabel { path: path.to_path_buf(), label: id }.into());
        }
    }

    Ok(table)
}
