use std::path::PathBuf;
use thiserror::Error;

/// Named failures of the overlap pipeline. Collaborator and I/O failures travel as
/// `anyhow::Error` with these values somewhere in the chain.
#[derive(Debug, Error)]
pub enum RoiError {
    #[error("cluster mask has {mask_len} elements but the atlas labels have {label_len}")]
    Alignment { mask_len: usize, label_len: usize },

    #[error("label id {label} occurs in the atlas data but is missing from its label table")]
    MissingLabel { label: i32 },

    #[error("atlas value {value} at element {index} is not an integer label")]
    NonIntegerLabel { index: usize, value: f64 },

    #[error("{path:?} contains carriage returns; convert it to Unix line endings")]
    CarriageReturn { path: PathBuf },

    #[error("{path:?} line {line}: {reason}")]
    MalformedLabelTable { path: PathBuf, line: u64, reason: String },

    #[error("{path:?} defines label id {label} more than once")]
    DuplicateLabel { path: PathBuf, label: i32 },

    #[error("built-in atlas {index} does not exist ({available} available, numbered from 1)")]
    UnknownAtlas { index: usize, available: usize },

    #[error("{what} numbers start at 1")]
    NumberedFromOne { what: &'static str },
}
