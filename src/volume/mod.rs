//! Volumetric overlap lookups for the subcortical part of a dense file.
pub mod builtin;
pub mod label_volume;
