use anyhow::{Context, Result};
use nifti::{IntoNdArray, NiftiObject, NiftiVolume, ReaderOptions};
use std::path::Path;

/// A NIfTI volume flattened into a single value sequence.
///
/// Two volumes with the same `dims` flatten in the same element order, which is all the
/// overlap computation relies on.
#[derive(Debug, Clone)]
pub struct Volume {
    pub dims: Vec<usize>,
    pub data: Vec<f64>,
}

/// Reads a `.nii` or `.nii.gz` file. Scaling (`scl_slope`/`scl_inter`) is applied.
pub fn read_volume(path: &Path) -> Result<Volume> {
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to open NIfTI file: {:?}", path))?;

    let volume = obj.into_volume();
    let dims: Vec<usize> = volume.dim().iter().map(|&d| d as usize).collect();

    let array = volume
        .into_ndarray::<f64>()
        .with_context(|| format!("Failed to decode NIfTI voxel data: {:?}", path))?;

    Ok(Volume { dims, data: array.iter().copied().collect() })
}
