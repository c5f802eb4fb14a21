use crate::core::accessor::{AlignedModality, AtlasSource, ClusterDataset};
use crate::core::types::{Modality, RoiList, VolumeMask};
use crate::io::writer;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_THRESHOLD: f64 = 1.77;
pub const DEFAULT_MIN_SEPARATION: f64 = 20.0;

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Inputs for one cluster extraction run.
#[derive(Debug, Clone, Copy)]
pub struct ClusterRequest<'a> {
    pub stat_map: &'a Path,
    pub left_surface: &'a Path,
    pub right_surface: &'a Path,
    pub threshold: f64,
    pub min_separation: f64,
}

/// Finds clusters in a statistical map, covering every modality in one call.
pub trait ClusterExtractor {
    type Dataset: ClusterDataset;

    fn find_clusters(&self, request: &ClusterRequest<'_>) -> Result<Self::Dataset>;
}

/// Names the regions overlapped by a subcortical cluster mask.
pub trait VolumetricResolver: Sync {
    /// False when the backing tool cannot run on this platform; the volume is then skipped.
    fn is_supported(&self) -> bool;

    fn resolve(&self, mask: &VolumeMask) -> Result<RoiList>;
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Cluster intensity threshold.
    pub threshold: f64,
    /// Minimum cluster size/separation handed to the extractor.
    pub min_separation: f64,
    /// Resolve the three modalities concurrently once clusters are extracted.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_separation: DEFAULT_MIN_SEPARATION,
            parallel: true,
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Runs one statistical map through extraction and per-modality resolution.
///
/// Results are always concatenated left cortex, right cortex, then volume, whatever
/// order the modalities finish in. Nothing is deduplicated across modalities.
pub struct ModalityOrchestrator<'a, E: ClusterExtractor> {
    extractor: &'a E,
    atlas: &'a dyn AtlasSource,
    volume: Option<&'a dyn VolumetricResolver>,
    config: PipelineConfig,
}

impl<'a, E: ClusterExtractor> ModalityOrchestrator<'a, E> {
    pub fn new(extractor: &'a E, atlas: &'a dyn AtlasSource, config: PipelineConfig) -> Self {
        Self { extractor, atlas, volume: None, config }
    }

    /// Enables the subcortical volume step.
    pub fn with_volume(mut self, resolver: &'a dyn VolumetricResolver) -> Self {
        self.volume = Some(resolver);
        self
    }

    /// Returns every ROI touched by a cluster in `stat_map`, possibly none.
    pub fn process(&self, stat_map: &Path, left_surface: &Path, right_surface: &Path) -> Result<RoiList> {
        let request = ClusterRequest {
            stat_map,
            left_surface,
            right_surface,
            threshold: self.config.threshold,
            min_separation: self.config.min_separation,
        };

        // 1. Extraction (single round-trip for all modalities)
        let dataset = self
            .extractor
            .find_clusters(&request)
            .with_context(|| format!("Finding clusters in {:?}", stat_map))?;
        debug!(stat_map = %stat_map.display(), "clusters extracted");

        let atlas = self.atlas;
        let volume = self.volume;

        // 2. Per-modality resolution
        let (left, right, subcortical) = if self.config.parallel {
            let (left, (right, subcortical)) = rayon::join(
                || resolve_cortex(&dataset, atlas, Modality::LeftCortex),
                || {
                    rayon::join(
                        || resolve_cortex(&dataset, atlas, Modality::RightCortex),
                        || resolve_volume(&dataset, volume),
                    )
                },
            );
            (left?, right?, subcortical?)
        } else {
            let left = resolve_cortex(&dataset, atlas, Modality::LeftCortex)?;
            let right = resolve_cortex(&dataset, atlas, Modality::RightCortex)?;
            let subcortical = resolve_volume(&dataset, volume)?;
            (left, right, subcortical)
        };

        // 3. Concatenation in fixed modality order
        let mut rois = RoiList::new();
        rois.extend(left);
        rois.extend(right);
        if let Some(subcortical) = subcortical {
            rois.extend(subcortical);
        }

        info!(stat_map = %stat_map.display(), rois = rois.len(), "overlap resolution complete");
        Ok(rois)
    }

    /// Processes `stat_map` and appends its row to `output`.
    ///
    /// Returns the path actually written, or `None` when no ROI was found; in that case
    /// the output table is neither created nor touched.
    pub fn run(
        &self,
        stat_map: &Path,
        left_surface: &Path,
        right_surface: &Path,
        output: &Path,
    ) -> Result<Option<PathBuf>> {
        let rois = self.process(stat_map, left_surface, right_surface)?;

        if rois.is_empty() {
            info!(stat_map = %stat_map.display(), "no ROIs found; output table left untouched");
            return Ok(None);
        }

        let written = writer::append(stat_map, &rois, output)?;
        Ok(Some(written))
    }
}

fn resolve_cortex(dataset: &dyn ClusterDataset, atlas: &dyn AtlasSource, modality: Modality) -> Result<RoiList> {
    let aligned = AlignedModality::load(dataset, atlas, modality)?;
    let rois = aligned
        .resolve()
        .with_context(|| format!("Resolving {} regions", modality))?;

    info!(
        %modality,
        elements = aligned.mask().len(),
        cluster_elements = aligned.mask().cluster_elements(),
        rois = rois.len(),
        "surface resolved"
    );
    Ok(rois)
}

fn resolve_volume(dataset: &dyn ClusterDataset, resolver: Option<&dyn VolumetricResolver>) -> Result<Option<RoiList>> {
    let Some(resolver) = resolver else {
        debug!("no volumetric lookup configured; skipping subcortical volume");
        return Ok(None);
    };

    if !resolver.is_supported() {
        warn!("volumetric lookup is not supported on this platform; skipping subcortical volume");
        return Ok(None);
    }

    let mask = dataset
        .volume_mask()
        .context("Extracting subcortical cluster mask")?;
    let rois = resolver
        .resolve(&mask)
        .context("Resolving subcortical volume regions")?;

    info!(modality = %Modality::SubcorticalVolume, rois = rois.len(), "volume resolved");
    Ok(Some(rois))
}
