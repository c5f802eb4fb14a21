use crate::analysis::overlap;
use crate::core::types::{AtlasLabels, ClusterMask, LabelTable, RoiList, VolumeMask};
use crate::error::RoiError;
use crate::io::label_table;
use crate::pipeline::orchestrator::VolumetricResolver;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use workbench_rust::read_volume;

/// Looks regions up in a user-supplied integer label volume.
///
/// The mask must already be in the atlas' voxel space.
pub struct LabelVolumeResolver {
    atlas_volume: PathBuf,
    table: LabelTable,
}

impl LabelVolumeResolver {
    pub fn new(atlas_volume: impl Into<PathBuf>, table: LabelTable) -> Self {
        Self { atlas_volume: atlas_volume.into(), table }
    }

    /// Reads the label table right away so a bad table fails before any tool runs.
    pub fn from_files(atlas_volume: &Path, atlas_info: &Path) -> Result<Self> {
        let table = label_table::read_label_table(atlas_info)?;
        debug!(labels = table.len(), info = %atlas_info.display(), "volume label table loaded");
        Ok(Self::new(atlas_volume, table))
    }
}

/// Converts voxel values to label ids; only whole numbers are valid labels.
pub fn labels_from_values(values: &[f64]) -> Result<AtlasLabels, RoiError> {
    values
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
                Err(RoiError::NonIntegerLabel { index, value })
            } else {
                Ok(value as i32)
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(AtlasLabels::from)
}

impl VolumetricResolver for LabelVolumeResolver {
    fn is_supported(&self) -> bool {
        true
    }

    fn resolve(&self, mask: &VolumeMask) -> Result<RoiList> {
        let clusters = read_volume(mask.path()).context("Reading subcortical cluster mask")?;
        let atlas = read_volume(&self.atlas_volume)
            .with_context(|| format!("Reading atlas volume {:?}", self.atlas_volume))?;

        if clusters.dims != atlas.dims {
            warn!(mask = ?clusters.dims, atlas = ?atlas.dims, "mask and atlas volumes have different dimensions");
        }

        let labels = labels_from_values(&atlas.data)
            .with_context(|| format!("Atlas volume {:?}", self.atlas_volume))?;
        let rois = overlap::resolve(&ClusterMask::from(clusters.data), &labels, &self.table)
            .with_context(|| format!("Matching clusters against {:?}", self.atlas_volume))?;
        Ok(rois)
    }
}
