use anyhow::Result;
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use std::path::PathBuf;
use std::time::Instant;

use cifti_roi::logging::init_logging;
use cifti_roi::pipeline::orchestrator::{DEFAULT_MIN_SEPARATION, DEFAULT_THRESHOLD};
use cifti_roi::{builtin_atlases, find_cluster_rois, PipelineConfig, RunConfig, VolumeMode};

/// Finds CIFTI surface and volume clusters and writes the overlapping ROIs to a CSV file.
///
/// Volume clusters are matched in one of two ways:
///
/// 1. A built-in FSL atlas chosen by number (`--vol-atlas-num`); the input must be in MNI space.
///
/// 2. A separate NIfTI atlas volume plus an enumerated `id,name` CSV (`--vol-atlas` and
///    `--atlas-info`); the input must be in that atlas' space.
///
/// See `--dump-vol-atlases` for the available built-in atlases. Atlas info files must not
/// contain Windows carriage returns, and the surfaces should match the input CIFTI file.
#[derive(Parser)]
#[command(author, version)]
struct Cli {
    /// CIFTI statistical map (dense scalar).
    #[arg(short = 'i', long = "input", visible_alias = "in", value_name = "STATS.dscalar.nii")]
    input: Option<PathBuf>,

    /// Output spreadsheet name.
    #[arg(short = 'o', long = "output", visible_alias = "out", value_name = "OUTPUT.csv")]
    output: Option<PathBuf>,

    /// Left GIFTI surface (preferably midthickness).
    #[arg(short = 'l', long = "left-surface", visible_alias = "left", value_name = "GII")]
    left_surface: Option<PathBuf>,

    /// Right GIFTI surface (preferably midthickness).
    #[arg(short = 'r', long = "right-surface", visible_alias = "right", value_name = "GII")]
    right_surface: Option<PathBuf>,

    /// CIFTI atlas (dense label) file.
    #[arg(short = 'c', long = "cii-atlas", value_name = "ATLAS.dlabel.nii")]
    cii_atlas: Option<PathBuf>,

    /// Map of the CIFTI atlas to use, starting at 1.
    #[arg(long, value_name = "INT", default_value_t = 1)]
    atlas_map: usize,

    /// Built-in volumetric atlas number. See '--dump-vol-atlases'.
    #[arg(long, value_name = "INT", help_heading = "Volumetric atlasquery options")]
    vol_atlas_num: Option<usize>,

    /// NIfTI atlas file.
    #[arg(long, value_name = "ATLAS.nii.gz", help_heading = "Stand-alone volumetric atlas options")]
    vol_atlas: Option<PathBuf>,

    /// Atlas information file (`id,name` pairs).
    #[arg(long, value_name = "ATLAS.info.csv", help_heading = "Stand-alone volumetric atlas options")]
    atlas_info: Option<PathBuf>,

    /// Cluster threshold.
    #[arg(short = 't', long = "thresh", visible_alias = "threshold", value_name = "FLOAT", default_value_t = DEFAULT_THRESHOLD)]
    thresh: f64,

    /// Minimum distance between clusters.
    #[arg(short = 'd', long = "distance", visible_alias = "dist", value_name = "FLOAT", default_value_t = DEFAULT_MIN_SEPARATION)]
    distance: f64,

    /// Print the available volumetric atlases with their numbers, then exit.
    #[arg(long)]
    dump_vol_atlases: bool,

    /// Resolve hemispheres and volume one after another instead of concurrently.
    #[arg(long)]
    sequential: bool,

    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Turns parsed flags into a run configuration.
    ///
    /// Flag combinations are checked here rather than by clap so that `--dump-vol-atlases`
    /// works whatever else is on the command line.
    fn into_run_config(self) -> Result<RunConfig, clap::Error> {
        let (Some(stat_map), Some(output), Some(left_surface), Some(right_surface), Some(cifti_atlas)) =
            (self.input, self.output, self.left_surface, self.right_surface, self.cii_atlas)
        else {
            return Err(Cli::command().error(
                ErrorKind::MissingRequiredArgument,
                "Not all valid options were specified: --input, --output, --left-surface, --right-surface and --cii-atlas are required.",
            ));
        };

        let volume = match (self.vol_atlas_num, self.vol_atlas, self.atlas_info) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(Cli::command().error(
                    ErrorKind::ArgumentConflict,
                    "--vol-atlas-num cannot be used with --vol-atlas or --atlas-info",
                ));
            }
            (Some(atlas_number), None, None) => VolumeMode::BuiltIn { atlas_number },
            (None, Some(atlas), Some(info)) => VolumeMode::LabelVolume { atlas, info },
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err(Cli::command().error(
                    ErrorKind::MissingRequiredArgument,
                    "--vol-atlas and --atlas-info must be given together",
                ));
            }
            (None, None, None) => {
                return Err(Cli::command().error(
                    ErrorKind::MissingRequiredArgument,
                    "A volumetric atlas is required: pass --vol-atlas-num, or --vol-atlas with --atlas-info.",
                ));
            }
        };

        Ok(RunConfig {
            stat_map,
            output,
            left_surface,
            right_surface,
            cifti_atlas,
            atlas_map: self.atlas_map,
            volume: Some(volume),
            pipeline: PipelineConfig {
                threshold: self.thresh,
                min_separation: self.distance,
                parallel: !self.sequential,
            },
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Diagnostic mode wins over everything else
    if cli.dump_vol_atlases {
        let atlases = builtin_atlases()?;
        println!("Available volumetric atlases:");
        for (i, name) in atlases.iter().enumerate() {
            println!("  {}: {}", i + 1, name);
        }
        return Ok(());
    }

    let config = cli.into_run_config().unwrap_or_else(|e| e.exit());
    let start_time = Instant::now();

    println!("--- CIFTI Cluster ROI Finder ---");
    println!("Finding clusters in {:?} (threshold {}, distance {})...", config.stat_map, config.pipeline.threshold, config.pipeline.min_separation);

    match find_cluster_rois(&config)? {
        Some(written) => println!("-> ROIs written to {:?}", written),
        None => println!("-> No ROIs found. Nothing written."),
    }

    println!("Done in {:.2?}", start_time.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 11] = [
        "cifti_roi",
        "-i",
        "stats.dscalar.nii",
        "-o",
        "rois.csv",
        "-l",
        "L.surf.gii",
        "-r",
        "R.surf.gii",
        "-c",
        "atlas.dlabel.nii",
    ];

    fn parse(extra: &[&str]) -> Cli {
        Cli::try_parse_from(REQUIRED.iter().chain(extra)).unwrap()
    }

    #[test]
    fn dump_mode_ignores_stray_volume_flags() {
        let cli = Cli::try_parse_from(["cifti_roi", "--dump-vol-atlases", "--vol-atlas", "x"]).unwrap();
        assert!(cli.dump_vol_atlases);

        let cli = Cli::try_parse_from([
            "cifti_roi",
            "--dump-vol-atlases",
            "--vol-atlas-num",
            "2",
            "--vol-atlas",
            "a.nii.gz",
            "--atlas-info",
            "b.csv",
        ])
        .unwrap();
        assert!(cli.dump_vol_atlases);
    }

    #[test]
    fn volume_modes_map_to_run_config() {
        let config = parse(&["--vol-atlas-num", "3"]).into_run_config().unwrap();
        assert_eq!(config.volume, Some(VolumeMode::BuiltIn { atlas_number: 3 }));
        assert_eq!(config.pipeline.threshold, DEFAULT_THRESHOLD);
        assert!(config.pipeline.parallel);

        let config = parse(&["--vol-atlas", "a.nii.gz", "--atlas-info", "a.csv", "--sequential"])
            .into_run_config()
            .unwrap();
        assert_eq!(
            config.volume,
            Some(VolumeMode::LabelVolume { atlas: PathBuf::from("a.nii.gz"), info: PathBuf::from("a.csv") })
        );
        assert!(!config.pipeline.parallel);
    }

    #[test]
    fn volume_flag_combinations_are_checked_after_parsing() {
        let err = parse(&["--vol-atlas", "a.nii.gz"]).into_run_config().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let err = parse(&["--atlas-info", "a.csv"]).into_run_config().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let err = parse(&["--vol-atlas-num", "1", "--vol-atlas", "a.nii.gz", "--atlas-info", "a.csv"])
            .into_run_config()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);

        let err = parse(&[]).into_run_config().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn missing_inputs_are_a_usage_error() {
        let cli = Cli::try_parse_from(["cifti_roi", "-i", "stats.dscalar.nii", "--vol-atlas-num", "1"]).unwrap();
        assert_eq!(cli.into_run_config().unwrap_err().kind(), ErrorKind::MissingRequiredArgument);
    }
}
