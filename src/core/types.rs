use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tempfile::TempPath;
use workbench_rust::Structure;

// ============================================================================
// MODALITIES
// ============================================================================

/// The anatomical data spaces of a dense (CIFTI) file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    LeftCortex,
    RightCortex,
    SubcorticalVolume,
}

impl Modality {
    /// The Workbench structure name, for surface modalities only.
    pub fn structure(self) -> Option<Structure> {
        match self {
            Modality::LeftCortex => Some(Structure::CortexLeft),
            Modality::RightCortex => Some(Structure::CortexRight),
            Modality::SubcorticalVolume => None,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Modality::LeftCortex => "left cortex",
            Modality::RightCortex => "right cortex",
            Modality::SubcorticalVolume => "subcortical volume",
        })
    }
}

// ============================================================================
// PER-ELEMENT DATA
// ============================================================================

/// One value per vertex or voxel. Zero is outside every cluster; any other value is inside one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterMask(Vec<f64>);

impl ClusterMask {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of elements that belong to some cluster.
    pub fn cluster_elements(&self) -> usize {
        self.0.iter().filter(|&&v| v != 0.0).count()
    }
}

impl From<Vec<f64>> for ClusterMask {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

/// Integer atlas label per element, index-aligned with a `ClusterMask`. Zero is background.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AtlasLabels(Vec<i32>);

impl AtlasLabels {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }
}

impl From<Vec<i32>> for AtlasLabels {
    fn from(ids: Vec<i32>) -> Self {
        Self(ids)
    }
}

/// Label id -> region name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelTable(BTreeMap<i32, String>);

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous name when `id` was already present.
    pub fn insert(&mut self, id: i32, name: impl Into<String>) -> Option<String> {
        self.0.insert(id, name.into())
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<i32, String>> for LabelTable {
    fn from(map: BTreeMap<i32, String>) -> Self {
        Self(map)
    }
}

impl<S: Into<String>> FromIterator<(i32, S)> for LabelTable {
    fn from_iter<I: IntoIterator<Item = (i32, S)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(id, name)| (id, name.into())).collect())
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Ordered region names. Unique within one modality; concatenation across modalities
/// keeps duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoiList(Vec<String>);

impl RoiList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Appends `other` after the current entries without deduplicating.
    pub fn extend(&mut self, other: RoiList) {
        self.0.extend(other.0);
    }
}

impl From<Vec<String>> for RoiList {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl<'a> From<Vec<&'a str>> for RoiList {
    fn from(names: Vec<&'a str>) -> Self {
        Self(names.into_iter().map(str::to_string).collect())
    }
}

impl IntoIterator for RoiList {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Renders as a list literal: `['L_V1_ROI', 'Left Thalamus']`.
impl fmt::Display for RoiList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_quoted(f, name)?;
        }
        f.write_str("]")
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let quote = if name.contains('\'') && !name.contains('"') { '"' } else { '\'' };
    write!(f, "{}", quote)?;
    for c in name.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c == quote => write!(f, "\\{}", c)?,
            c if c.is_control() => write!(f, "\\x{:02x}", c as u32)?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "{}", quote)
}

/// A subcortical cluster mask on disk, for lookups that need a file argument.
/// The file is deleted when the mask is dropped.
#[derive(Debug)]
pub struct VolumeMask {
    path: TempPath,
}

impl VolumeMask {
    pub fn new(path: TempPath) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
