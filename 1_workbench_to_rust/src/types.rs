use std::collections::BTreeMap;
use std::fmt;

/// Cortical surface structures as named by Connectome Workbench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Structure {
    CortexLeft,
    CortexRight,
}

impl Structure {
    pub fn as_str(self) -> &'static str {
        match self {
            Structure::CortexLeft => "CORTEX_LEFT",
            Structure::CortexRight => "CORTEX_RIGHT",
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-vertex label keys of one hemisphere together with the key -> name table.
#[derive(Debug, Clone, Default)]
pub struct SurfaceLabels {
    pub keys: Vec<i32>,
    pub names: BTreeMap<i32, String>,
}
