use crate::analysis::overlap;
use crate::core::types::{AtlasLabels, ClusterMask, LabelTable, Modality, RoiList, VolumeMask};
use crate::error::RoiError;
use anyhow::{Context, Result};

// ============================================================================
// TRAITS
// ============================================================================

/// Cluster output of one extraction run, spanning every modality.
///
/// Implementations own whatever backs the dataset (for Workbench, a temporary CIFTI file)
/// and release it when dropped. Any per-modality intermediate they create is released
/// before the call returns.
pub trait ClusterDataset: Sync {
    /// Per-vertex cluster values for a surface modality.
    fn surface_mask(&self, modality: Modality) -> Result<ClusterMask>;

    /// The subcortical part of the clusters as a scoped file.
    fn volume_mask(&self) -> Result<VolumeMask>;
}

/// Loads the cortical atlas for one hemisphere.
pub trait AtlasSource: Sync {
    fn load_labels(&self, modality: Modality) -> Result<(AtlasLabels, LabelTable)>;
}

// ============================================================================
// ALIGNED DATA
// ============================================================================

/// A surface modality's cluster mask and atlas labels, guaranteed equal length.
#[derive(Debug, Clone)]
pub struct AlignedModality {
    pub modality: Modality,
    mask: ClusterMask,
    labels: AtlasLabels,
    table: LabelTable,
}

impl AlignedModality {
    pub fn new(modality: Modality, mask: ClusterMask, labels: AtlasLabels, table: LabelTable) -> Result<Self, RoiError> {
        if mask.len() != labels.len() {
            return Err(RoiError::Alignment { mask_len: mask.len(), label_len: labels.len() });
        }
        Ok(Self { modality, mask, labels, table })
    }

    /// Loads both sides for `modality` and checks that they line up.
    pub fn load(dataset: &dyn ClusterDataset, atlas: &dyn AtlasSource, modality: Modality) -> Result<Self> {
        let (labels, table) = atlas
            .load_labels(modality)
            .with_context(|| format!("Loading {} atlas labels", modality))?;
        let mask = dataset
            .surface_mask(modality)
            .with_context(|| format!("Extracting {} cluster mask", modality))?;

        Self::new(modality, mask, labels, table).with_context(|| format!("Aligning {} data", modality))
    }

    pub fn mask(&self) -> &ClusterMask {
        &self.mask
    }

    pub fn resolve(&self) -> Result<RoiList, RoiError> {
        overlap::resolve(&self.mask, &self.labels, &self.table)
    }
}
