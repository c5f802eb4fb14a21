// ============================================================================
// MODULE DECLARATIONS
// ============================================================================
pub mod atlasquery;
pub mod gifti;
pub mod tools;
pub mod types;
pub mod volume;

pub use crate::gifti::{GiftiError, GiftiImage};
pub use crate::tools::ExternalTools;
pub use crate::types::{Structure, SurfaceLabels};
pub use crate::volume::{read_volume, Volume};

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use tempfile::{Builder, TempPath};
use tracing::debug;

// ============================================================================
// WORKBENCH OPERATIONS
// ============================================================================
//
// Every operation hands data back either decoded in memory or as a `TempPath`
// that deletes its file when dropped. Nothing is left in the working directory.

/// Creates an empty scratch file. Workbench picks the output format from the suffix.
fn scratch(suffix: &str) -> Result<TempPath> {
    Ok(Builder::new()
        .prefix("cifti_roi.")
        .suffix(suffix)
        .tempfile()
        .context("Cannot create a temporary file")?
        .into_temp_path())
}

/// Runs `wb_command -cifti-find-clusters` on a dense scalar file.
///
/// The same threshold and minimum size are used for surface and volume structures.
/// Returns the cluster-labelled CIFTI file, deleted when the returned path drops.
pub fn find_clusters(
    tools: &ExternalTools,
    stat_map: &Path,
    left_surface: &Path,
    right_surface: &Path,
    threshold: f64,
    min_size: f64,
) -> Result<TempPath> {
    let out = scratch(".dscalar.nii")?;
    let threshold = threshold.to_string();
    let min_size = min_size.to_string();

    tools
        .wb([
            OsStr::new("-cifti-find-clusters"),
            stat_map.as_os_str(),
            OsStr::new(&threshold),
            OsStr::new(&min_size),
            OsStr::new(&threshold),
            OsStr::new(&min_size),
            OsStr::new("COLUMN"),
            out.as_os_str(),
            OsStr::new("-left-surface"),
            left_surface.as_os_str(),
            OsStr::new("-right-surface"),
            right_surface.as_os_str(),
        ])
        .with_context(|| format!("Cluster extraction failed for {:?}", stat_map))?;

    crate::tools::ensure_output(&out, "wb_command -cifti-find-clusters")?;
    Ok(out)
}

/// Extracts one hemisphere of a dense scalar file as per-vertex values.
pub fn separate_metric(tools: &ExternalTools, cifti: &Path, structure: Structure) -> Result<Vec<f64>> {
    let gii = scratch(".func.gii")?;

    tools
        .wb([
            OsStr::new("-cifti-separate"),
            cifti.as_os_str(),
            OsStr::new("COLUMN"),
            OsStr::new("-metric"),
            OsStr::new(structure.as_str()),
            gii.as_os_str(),
        ])
        .with_context(|| format!("Could not separate {} metric from {:?}", structure, cifti))?;
    crate::tools::ensure_output(&gii, "wb_command -cifti-separate")?;

    let image = GiftiImage::read(&gii)?;
    let values = image.metric_union()?;
    debug!(%structure, vertices = values.len(), "separated metric");
    Ok(values)
}

/// Extracts one hemisphere of a dense label file: per-vertex keys of map `map_number`
/// (1-based) and the label table.
pub fn separate_labels(
    tools: &ExternalTools,
    dlabel: &Path,
    structure: Structure,
    map_number: usize,
) -> Result<SurfaceLabels> {
    let gii = scratch(".label.gii")?;

    tools
        .wb([
            OsStr::new("-cifti-separate"),
            dlabel.as_os_str(),
            OsStr::new("COLUMN"),
            OsStr::new("-label"),
            OsStr::new(structure.as_str()),
            gii.as_os_str(),
        ])
        .with_context(|| format!("Could not separate {} labels from {:?}", structure, dlabel))?;
    crate::tools::ensure_output(&gii, "wb_command -cifti-separate")?;

    let image = GiftiImage::read(&gii)?;
    let keys = image.label_map(map_number).with_context(|| format!("Reading labels from {:?}", dlabel))?;
    debug!(%structure, vertices = keys.len(), labels = image.labels.len(), "separated labels");
    Ok(SurfaceLabels { keys, names: image.labels })
}

/// Extracts every volume structure of a CIFTI file into a NIfTI volume.
pub fn separate_volume(tools: &ExternalTools, cifti: &Path) -> Result<TempPath> {
    let nii = scratch(".nii.gz")?;

    tools
        .wb([
            OsStr::new("-cifti-separate"),
            cifti.as_os_str(),
            OsStr::new("COLUMN"),
            OsStr::new("-volume-all"),
            nii.as_os_str(),
        ])
        .with_context(|| format!("Could not separate the volume from {:?}", cifti))?;
    crate::tools::ensure_output(&nii, "wb_command -cifti-separate")?;

    Ok(nii)
}
