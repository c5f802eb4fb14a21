use anyhow::{anyhow, Result};
use cifti_roi::{
    find_cluster_rois, AtlasLabels, AtlasSource, ClusterDataset, ClusterExtractor, ClusterMask, ClusterRequest,
    LabelTable, Modality, ModalityOrchestrator, PipelineConfig, RoiError, RoiList, RunConfig, VolumeMask, VolumeMode,
    VolumetricResolver,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// FAKE COLLABORATORS
// ============================================================================

#[derive(Clone, Default)]
struct FakeDataset {
    masks: HashMap<Modality, Vec<f64>>,
}

impl ClusterDataset for FakeDataset {
    fn surface_mask(&self, modality: Modality) -> Result<ClusterMask> {
        self.masks
            .get(&modality)
            .cloned()
            .map(ClusterMask::from)
            .ok_or_else(|| anyhow!("no mask for {}", modality))
    }

    fn volume_mask(&self) -> Result<VolumeMask> {
        let path = tempfile::NamedTempFile::new()?.into_temp_path();
        Ok(VolumeMask::new(path))
    }
}

struct FakeExtractor {
    dataset: FakeDataset,
    calls: AtomicUsize,
    seen_threshold: Mutex<Option<(f64, f64)>>,
}

impl FakeExtractor {
    fn new(dataset: FakeDataset) -> Self {
        Self { dataset, calls: AtomicUsize::new(0), seen_threshold: Mutex::new(None) }
    }
}

impl ClusterExtractor for FakeExtractor {
    type Dataset = FakeDataset;

    fn find_clusters(&self, request: &ClusterRequest<'_>) -> Result<FakeDataset> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_threshold.lock().unwrap() = Some((request.threshold, request.min_separation));
        Ok(self.dataset.clone())
    }
}

struct FailingExtractor;

impl ClusterExtractor for FailingExtractor {
    type Dataset = FakeDataset;

    fn find_clusters(&self, _request: &ClusterRequest<'_>) -> Result<FakeDataset> {
        Err(anyhow!("wb_command exited with status 1"))
    }
}

#[derive(Default)]
struct FakeAtlas {
    hemispheres: HashMap<Modality, (Vec<i32>, Vec<(i32, &'static str)>)>,
}

impl AtlasSource for FakeAtlas {
    fn load_labels(&self, modality: Modality) -> Result<(AtlasLabels, LabelTable)> {
        let (ids, names) = self.hemispheres.get(&modality).ok_or_else(|| anyhow!("no atlas for {}", modality))?;
        Ok((AtlasLabels::from(ids.clone()), names.iter().copied().collect()))
    }
}

struct FakeVolume {
    supported: bool,
    result: std::result::Result<Vec<&'static str>, &'static str>,
    seen_mask: Mutex<Option<PathBuf>>,
}

impl FakeVolume {
    fn returning(names: Vec<&'static str>) -> Self {
        Self { supported: true, result: Ok(names), seen_mask: Mutex::new(None) }
    }
}

impl VolumetricResolver for FakeVolume {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn resolve(&self, mask: &VolumeMask) -> Result<RoiList> {
        assert!(mask.path().exists(), "mask must exist while it is being resolved");
        *self.seen_mask.lock().unwrap() = Some(mask.path().to_path_buf());
        match &self.result {
            Ok(names) => Ok(RoiList::from(names.clone())),
            Err(msg) => Err(anyhow!(*msg)),
        }
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

fn two_hemispheres() -> (FakeDataset, FakeAtlas) {
    let mut dataset = FakeDataset::default();
    dataset.masks.insert(Modality::LeftCortex, vec![0.0, 1.0, 1.0, 0.0]);
    dataset.masks.insert(Modality::RightCortex, vec![2.0, 0.0, 0.0, 2.0]);

    let mut atlas = FakeAtlas::default();
    atlas.hemispheres.insert(
        Modality::LeftCortex,
        (vec![1, 3, 2, 1], vec![(1, "L_A"), (2, "L_B"), (3, "L_C")]),
    );
    atlas.hemispheres.insert(
        Modality::RightCortex,
        (vec![5, 4, 4, 4], vec![(4, "R_D"), (5, "R_E")]),
    );
    (dataset, atlas)
}

fn paths() -> (&'static Path, &'static Path, &'static Path) {
    (Path::new("stats.dscalar.nii"), Path::new("L.midthickness.surf.gii"), Path::new("R.midthickness.surf.gii"))
}

fn sequential() -> PipelineConfig {
    PipelineConfig { parallel: false, ..PipelineConfig::default() }
}

// ============================================================================
// TESTS
// ============================================================================

#[test]
fn concatenates_left_right_then_volume() {
    let (dataset, atlas) = two_hemispheres();
    let extractor = FakeExtractor::new(dataset);
    let volume = FakeVolume::returning(vec!["Left Thalamus"]);
    let (stat, left, right) = paths();

    for config in [PipelineConfig::default(), sequential()] {
        let orchestrator = ModalityOrchestrator::new(&extractor, &atlas, config).with_volume(&volume);
        let rois = orchestrator.process(stat, left, right).unwrap();
        assert_eq!(rois, RoiList::from(vec!["L_B", "L_C", "R_D", "R_E", "Left Thalamus"]));
    }
}

#[test]
fn extraction_runs_once_with_configured_parameters() {
    let (dataset, atlas) = two_hemispheres();
    let extractor = FakeExtractor::new(dataset);
    let config = PipelineConfig { threshold: 3.1, min_separation: 5.0, parallel: true };
    let (stat, left, right) = paths();

    ModalityOrchestrator::new(&extractor, &atlas, config).process(stat, left, right).unwrap();

    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*extractor.seen_threshold.lock().unwrap(), Some((3.1, 5.0)));
}

#[test]
fn duplicates_across_modalities_are_kept() {
    let mut dataset = FakeDataset::default();
    dataset.masks.insert(Modality::LeftCortex, vec![1.0]);
    dataset.masks.insert(Modality::RightCortex, vec![0.0]);
    let mut atlas = FakeAtlas::default();
    atlas.hemispheres.insert(Modality::LeftCortex, (vec![1], vec![(1, "Frontal")]));
    atlas.hemispheres.insert(Modality::RightCortex, (vec![1], vec![(1, "Frontal")]));

    let extractor = FakeExtractor::new(dataset);
    let volume = FakeVolume::returning(vec!["Frontal"]);
    let (stat, left, right) = paths();

    let rois = ModalityOrchestrator::new(&extractor, &atlas, PipelineConfig::default())
        .with_volume(&volume)
        .process(stat, left, right)
        .unwrap();
    assert_eq!(rois, RoiList::from(vec!["Frontal", "Frontal"]));
}

#[test]
fn unsupported_volume_lookup_is_skipped() {
    let (dataset, atlas) = two_hemispheres();
    let extractor = FakeExtractor::new(dataset);
    let volume = FakeVolume { supported: false, ..FakeVolume::returning(vec!["never"]) };
    let (stat, left, right) = paths();

    let rois = ModalityOrchestrator::new(&extractor, &atlas, sequential())
        .with_volume(&volume)
        .process(stat, left, right)
        .unwrap();
    assert_eq!(rois, RoiList::from(vec!["L_B", "L_C", "R_D", "R_E"]));
    assert!(volume.seen_mask.lock().unwrap().is_none());
}

#[test]
fn volume_failure_on_supported_platform_propagates() {
    let (dataset, atlas) = two_hemispheres();
    let extractor = FakeExtractor::new(dataset);
    let volume = FakeVolume { result: Err("atlasquery crashed"), ..FakeVolume::returning(vec![]) };
    let (stat, left, right) = paths();

    let err = ModalityOrchestrator::new(&extractor, &atlas, PipelineConfig::default())
        .with_volume(&volume)
        .process(stat, left, right)
        .unwrap_err();
    assert!(format!("{:#}", err).contains("atlasquery crashed"));
}

#[test]
fn volume_mask_is_released_after_resolution() {
    let (dataset, atlas) = two_hemispheres();
    let extractor = FakeExtractor::new(dataset);
    let volume = FakeVolume::returning(vec!["Brain-Stem"]);
    let (stat, left, right) = paths();

    ModalityOrchestrator::new(&extractor, &atlas, sequential())
        .with_volume(&volume)
        .process(stat, left, right)
        .unwrap();

    let seen = volume.seen_mask.lock().unwrap().clone().expect("volume resolver was called");
    assert!(!seen.exists());
}

#[test]
fn extraction_failure_is_propagated() {
    let (_, atlas) = two_hemispheres();
    let (stat, left, right) = paths();
    let err = ModalityOrchestrator::new(&FailingExtractor, &atlas, PipelineConfig::default())
        .process(stat, left, right)
        .unwrap_err();
    assert!(format!("{:#}", err).contains("wb_command exited"));
}

#[test]
fn misaligned_hemisphere_fails_with_alignment_error() {
    let (mut dataset, atlas) = two_hemispheres();
    dataset.masks.insert(Modality::RightCortex, vec![1.0, 1.0]);
    let extractor = FakeExtractor::new(dataset);
    let (stat, left, right) = paths();

    let err = ModalityOrchestrator::new(&extractor, &atlas, PipelineConfig::default())
        .process(stat, left, right)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RoiError>(),
        Some(RoiError::Alignment { mask_len: 2, label_len: 4 })
    ));
}

#[test]
fn missing_label_name_fails_the_whole_run() {
    let (dataset, mut atlas) = two_hemispheres();
    atlas.hemispheres.insert(Modality::LeftCortex, (vec![1, 3, 2, 1], vec![(1, "L_A"), (2, "L_B")]));
    let extractor = FakeExtractor::new(dataset);
    let (stat, left, right) = paths();

    let err = ModalityOrchestrator::new(&extractor, &atlas, sequential())
        .process(stat, left, right)
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<RoiError>(), Some(RoiError::MissingLabel { label: 3 })));
}

#[test]
fn empty_result_suppresses_the_write() {
    let mut dataset = FakeDataset::default();
    dataset.masks.insert(Modality::LeftCortex, vec![0.0, 0.0]);
    dataset.masks.insert(Modality::RightCortex, vec![1.0, 1.0]);
    let mut atlas = FakeAtlas::default();
    atlas.hemispheres.insert(Modality::LeftCortex, (vec![1, 2], vec![(1, "A"), (2, "B")]));
    atlas.hemispheres.insert(Modality::RightCortex, (vec![0, 0], vec![]));

    let extractor = FakeExtractor::new(dataset);
    let volume = FakeVolume::returning(vec![]);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("rois.csv");
    let (stat, left, right) = paths();

    let written = ModalityOrchestrator::new(&extractor, &atlas, PipelineConfig::default())
        .with_volume(&volume)
        .run(stat, left, right, &output)
        .unwrap();

    assert!(written.is_none());
    assert!(!output.exists());
}

#[test]
fn run_appends_one_row_per_input() {
    let (dataset, atlas) = two_hemispheres();
    let extractor = FakeExtractor::new(dataset);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("rois.tsv");
    let (_, left, right) = paths();
    let stat = dir.path().join("stats.dscalar.nii");

    let orchestrator = ModalityOrchestrator::new(&extractor, &atlas, PipelineConfig::default());
    let first = orchestrator.run(&stat, left, right, &output).unwrap().unwrap();
    let second = orchestrator.run(&stat, left, right, &output).unwrap().unwrap();

    assert_eq!(first, dir.path().join("rois.csv"));
    assert_eq!(first, second);

    let contents = fs::read_to_string(&first).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "File,ROIs");
    assert_eq!(lines[1], format!("{},\"['L_B', 'L_C', 'R_D', 'R_E']\"", stat.display()));
    assert_eq!(lines[1], lines[2]);
}

fn run_config(dir: &Path, volume: VolumeMode) -> RunConfig {
    let touch = |name: &str| {
        let path = dir.join(name);
        fs::write(&path, b"placeholder").unwrap();
        path
    };
    RunConfig {
        stat_map: touch("stats.dscalar.nii"),
        output: dir.join("rois.csv"),
        left_surface: touch("L.midthickness.surf.gii"),
        right_surface: touch("R.midthickness.surf.gii"),
        cifti_atlas: touch("atlas.dlabel.nii"),
        atlas_map: 1,
        volume: Some(volume),
        pipeline: PipelineConfig::default(),
    }
}

#[test]
fn zero_atlas_numbers_fail_before_any_tool_runs() {
    let dir = tempfile::tempdir().unwrap();

    // Numbering is checked ahead of tool discovery, so no Workbench install is needed here
    let config = run_config(dir.path(), VolumeMode::BuiltIn { atlas_number: 0 });
    let err = find_cluster_rois(&config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RoiError>(),
        Some(RoiError::NumberedFromOne { what: "Built-in volumetric atlas" })
    ));

    let config = RunConfig { atlas_map: 0, ..run_config(dir.path(), VolumeMode::BuiltIn { atlas_number: 1 }) };
    let err = find_cluster_rois(&config).unwrap_err();
    assert!(matches!(err.downcast_ref::<RoiError>(), Some(RoiError::NumberedFromOne { what: "CIFTI atlas map" })));

    assert!(!config.output.exists());
}

#[test]
fn missing_label_volume_files_fail_before_any_tool_runs() {
    let dir = tempfile::tempdir().unwrap();
    let volume = VolumeMode::LabelVolume { atlas: dir.path().join("atlas.nii.gz"), info: dir.path().join("atlas.csv") };

    let err = find_cluster_rois(&run_config(dir.path(), volume)).unwrap_err();
    assert!(err.to_string().contains("volume atlas not found"));
}
