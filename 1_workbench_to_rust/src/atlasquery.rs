use crate::tools::ExternalTools;
use anyhow::{Context, Result};
use std::path::Path;

/// Lists the atlases FSL knows about, in `atlasquery --dump-atlases` order.
pub fn dump_atlases(tools: &ExternalTools) -> Result<Vec<String>> {
    let stdout = tools
        .run_cmd(tools.atlasquery()?, ["--dump-atlases"])
        .context("atlasquery could not list its atlases")?;
    Ok(parse_atlas_list(&stdout))
}

/// Returns the structures of `atlas` overlapped by the nonzero voxels of `mask`.
pub fn query_atlas(tools: &ExternalTools, atlas: &str, mask: &Path) -> Result<Vec<String>> {
    let mask_arg = mask.as_os_str().to_os_string();
    let stdout = tools
        .run_cmd(tools.atlasquery()?, ["-a".into(), atlas.into(), "-m".into(), mask_arg])
        .with_context(|| format!("atlasquery failed for atlas '{}'", atlas))?;
    Ok(parse_mask_report(&stdout))
}

pub fn parse_atlas_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `<structure>:<percentage>` lines, keeping structures with a positive share.
/// Names may themselves contain colons, so the split is on the last one.
pub fn parse_mask_report(stdout: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((name, share)) = line.rsplit_once(':') else { continue };
        let Ok(share) = share.trim().parse::<f64>() else { continue };
        let name = name.trim();
        if share > 0.0 && !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atlas_list_skips_blank_lines() {
        let out = "Harvard-Oxford Cortical Structural Atlas\n\nHarvard-Oxford Subcortical Structural Atlas\n";
        assert_eq!(
            parse_atlas_list(out),
            vec!["Harvard-Oxford Cortical Structural Atlas", "Harvard-Oxford Subcortical Structural Atlas"]
        );
    }

    #[test]
    fn mask_report_keeps_positive_shares_in_order() {
        let out = "Left Thalamus:42.1\nRight Caudate:0\nBrain-Stem:3.5\nLeft Thalamus:1.0\nnot a result line\n";
        assert_eq!(parse_mask_report(out), vec!["Left Thalamus", "Brain-Stem"]);
    }

    #[test]
    fn mask_report_splits_on_last_colon() {
        assert_eq!(parse_mask_report("Lobule VI: vermis:12.5"), vec!["Lobule VI: vermis"]);
    }
}
