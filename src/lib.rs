// ============================================================================
// MODULE DECLARATIONS
// ============================================================================
pub mod analysis;
pub mod core;
pub mod error;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod volume;

// ============================================================================
// RE-EXPORTS (Public API)
// ============================================================================
pub use crate::analysis::overlap::resolve;
pub use crate::core::accessor::{AlignedModality, AtlasSource, ClusterDataset};
pub use crate::core::types::{AtlasLabels, ClusterMask, LabelTable, Modality, RoiList, VolumeMask};
pub use crate::error::RoiError;
pub use crate::io::{label_table, writer};
pub use crate::pipeline::orchestrator::{
    ClusterExtractor, ClusterRequest, ModalityOrchestrator, PipelineConfig, VolumetricResolver,
};
pub use crate::pipeline::workbench::{CiftiAtlas, WorkbenchExtractor};
pub use crate::volume::builtin::BuiltinAtlasResolver;
pub use crate::volume::label_volume::LabelVolumeResolver;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use workbench_rust::ExternalTools;

// ============================================================================
// HIGH-LEVEL INTERFACE
// ============================================================================

/// How the subcortical volume is matched against an atlas.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeMode {
    /// One of FSL's bundled atlases, by 1-based position in `atlasquery --dump-atlases`.
    BuiltIn { atlas_number: usize },
    /// A label volume in the mask's space plus its `id,name` table.
    LabelVolume { atlas: PathBuf, info: PathBuf },
}

/// Configuration for one run over one statistical map.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Dense scalar statistical map (`.dscalar.nii`).
    pub stat_map: PathBuf,
    /// Output table; `.tsv`/`.txt` become `.csv`.
    pub output: PathBuf,
    pub left_surface: PathBuf,
    pub right_surface: PathBuf,
    /// Dense label atlas (`.dlabel.nii`) for both hemispheres.
    pub cifti_atlas: PathBuf,
    /// 1-based map within `cifti_atlas`.
    pub atlas_map: usize,
    pub volume: Option<VolumeMode>,
    pub pipeline: PipelineConfig,
}

/// The master pipeline function: clusters, ROIs, one appended row.
///
/// Returns the written table, or `None` when no cluster touched a labelled region.
pub fn find_cluster_rois(config: &RunConfig) -> Result<Option<PathBuf>> {
    // 0. Preconditions, before any external tool runs
    for (what, path) in [
        ("statistical map", &config.stat_map),
        ("left surface", &config.left_surface),
        ("right surface", &config.right_surface),
        ("CIFTI atlas", &config.cifti_atlas),
    ] {
        ensure_exists(what, path)?;
    }
    if config.atlas_map == 0 {
        return Err(RoiError::NumberedFromOne { what: "CIFTI atlas map" }.into());
    }
    match &config.volume {
        Some(VolumeMode::BuiltIn { atlas_number: 0 }) => {
            return Err(RoiError::NumberedFromOne { what: "Built-in volumetric atlas" }.into());
        }
        Some(VolumeMode::LabelVolume { atlas, info }) => {
            ensure_exists("volume atlas", atlas)?;
            ensure_exists("atlas info file", info)?;
        }
        _ => {}
    }

    let tools = ExternalTools::new()?;
    tools.wb_command()?;

    // 1. Volumetric lookup, settled before any cluster is extracted
    let builtin;
    let label_volume;
    let volume: Option<&dyn VolumetricResolver> = match &config.volume {
        Some(VolumeMode::BuiltIn { .. }) if cfg!(windows) => {
            warn!("FSL atlasquery does not run on Windows; the subcortical volume will be skipped");
            None
        }
        Some(VolumeMode::BuiltIn { atlas_number }) => {
            builtin = BuiltinAtlasResolver::select(&tools, *atlas_number)?;
            info!(atlas = builtin.atlas(), "using built-in volumetric atlas");
            Some(&builtin)
        }
        Some(VolumeMode::LabelVolume { atlas, info }) => {
            label_volume = LabelVolumeResolver::from_files(atlas, info)?;
            Some(&label_volume)
        }
        None => None,
    };

    // 2. Collaborators
    let extractor = WorkbenchExtractor::new(&tools);
    let atlas = CiftiAtlas::new(&tools, &config.cifti_atlas, config.atlas_map);

    let mut orchestrator = ModalityOrchestrator::new(&extractor, &atlas, config.pipeline);
    if let Some(volume) = volume {
        orchestrator = orchestrator.with_volume(volume);
    }

    // 3. Execution
    info!(
        stat_map = %config.stat_map.display(),
        threshold = config.pipeline.threshold,
        min_separation = config.pipeline.min_separation,
        "processing statistical map"
    );
    orchestrator.run(&config.stat_map, &config.left_surface, &config.right_surface, &config.output)
}

/// Lists FSL's bundled atlases; position `i` is selected with atlas number `i + 1`.
pub fn builtin_atlases() -> Result<Vec<String>> {
    let tools = ExternalTools::new()?;
    workbench_rust::atlasquery::dump_atlases(&tools)
}

fn ensure_exists(what: &str, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("{} not found: {:?}", what, path));
    }
    Ok(())
}
