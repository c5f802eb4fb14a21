use crate::core::types::{RoiList, VolumeMask};
use crate::error::RoiError;
use crate::pipeline::orchestrator::VolumetricResolver;
use anyhow::Result;
use tracing::debug;
use workbench_rust::atlasquery;
use workbench_rust::ExternalTools;

/// Looks regions up in one of FSL's bundled atlases via `atlasquery`.
pub struct BuiltinAtlasResolver<'a> {
    tools: &'a ExternalTools,
    atlas: String,
}

impl<'a> BuiltinAtlasResolver<'a> {
    pub fn new(tools: &'a ExternalTools, atlas: impl Into<String>) -> Self {
        Self { tools, atlas: atlas.into() }
    }

    /// Resolves a 1-based position in `atlasquery --dump-atlases` to its atlas.
    pub fn select(tools: &'a ExternalTools, atlas_number: usize) -> Result<Self> {
        let atlases = atlasquery::dump_atlases(tools)?;
        let atlas = select_atlas(&atlases, atlas_number)?;
        debug!(atlas_number, atlas, "built-in atlas selected");
        Ok(Self::new(tools, atlas))
    }

    pub fn atlas(&self) -> &str {
        &self.atlas
    }
}

/// Picks the `number`-th (1-based) atlas from a listing.
pub fn select_atlas(atlases: &[String], number: usize) -> Result<&str> {
    number
        .checked_sub(1)
        .and_then(|i| atlases.get(i))
        .map(String::as_str)
        .ok_or_else(|| RoiError::UnknownAtlas { index: number, available: atlases.len() }.into())
}

impl VolumetricResolver for BuiltinAtlasResolver<'_> {
    /// FSL does not run natively on Windows.
    fn is_supported(&self) -> bool {
        !cfg!(windows)
    }

    fn resolve(&self, mask: &VolumeMask) -> Result<RoiList> {
        debug!(atlas = %self.atlas, mask = %mask.path().display(), "querying built-in atlas");
        let names = atlasquery::query_atlas(self.tools, &self.atlas, mask.path())?;
        Ok(RoiList::from(names))
    }
}
