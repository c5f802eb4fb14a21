//! Collaborators backed by Connectome Workbench.

use crate::core::accessor::{AtlasSource, ClusterDataset};
use crate::core::types::{AtlasLabels, ClusterMask, LabelTable, Modality, VolumeMask};
use crate::pipeline::orchestrator::{ClusterExtractor, ClusterRequest};
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tempfile::TempPath;
use workbench_rust::{ExternalTools, Structure};

fn surface_structure(modality: Modality) -> Result<Structure> {
    modality
        .structure()
        .ok_or_else(|| anyhow!("{} has no surface representation", modality))
}

/// Extracts clusters with `wb_command -cifti-find-clusters`.
pub struct WorkbenchExtractor<'a> {
    tools: &'a ExternalTools,
}

impl<'a> WorkbenchExtractor<'a> {
    pub fn new(tools: &'a ExternalTools) -> Self {
        Self { tools }
    }
}

impl<'a> ClusterExtractor for WorkbenchExtractor<'a> {
    type Dataset = WorkbenchClusters<'a>;

    fn find_clusters(&self, request: &ClusterRequest<'_>) -> Result<WorkbenchClusters<'a>> {
        let cifti = workbench_rust::find_clusters(
            self.tools,
            request.stat_map,
            request.left_surface,
            request.right_surface,
            request.threshold,
            request.min_separation,
        )?;
        Ok(WorkbenchClusters { tools: self.tools, cifti })
    }
}

/// A temporary cluster CIFTI file. Deleted when dropped.
pub struct WorkbenchClusters<'a> {
    tools: &'a ExternalTools,
    cifti: TempPath,
}

impl ClusterDataset for WorkbenchClusters<'_> {
    fn surface_mask(&self, modality: Modality) -> Result<ClusterMask> {
        let values = workbench_rust::separate_metric(self.tools, &self.cifti, surface_structure(modality)?)?;
        Ok(ClusterMask::from(values))
    }

    fn volume_mask(&self) -> Result<VolumeMask> {
        let nii = workbench_rust::separate_volume(self.tools, &self.cifti)?;
        Ok(VolumeMask::new(nii))
    }
}

/// Cortical atlas read from a dense label (`.dlabel.nii`) file.
pub struct CiftiAtlas<'a> {
    tools: &'a ExternalTools,
    dlabel: PathBuf,
    /// 1-based map index within the label file.
    map_number: usize,
}

impl<'a> CiftiAtlas<'a> {
    pub fn new(tools: &'a ExternalTools, dlabel: impl Into<PathBuf>, map_number: usize) -> Self {
        Self { tools, dlabel: dlabel.into(), map_number }
    }
}

impl AtlasSource for CiftiAtlas<'_> {
    fn load_labels(&self, modality: Modality) -> Result<(AtlasLabels, LabelTable)> {
        let surface = workbench_rust::separate_labels(
            self.tools,
            &self.dlabel,
            surface_structure(modality)?,
            self.map_number,
        )?;
        Ok((AtlasLabels::from(surface.keys), LabelTable::from(surface.names)))
    }
}
