//! Minimal GIFTI reader for the metric and label files written by `wb_command -cifti-separate`.
//!
//! Only the parts of the format needed for per-vertex data are understood: `<DataArray>`
//! payloads (ASCII, Base64Binary, GZipBase64Binary) and the top-level `<LabelTable>`.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::{GzDecoder, ZlibDecoder};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

pub const INTENT_LABEL: &str = "NIFTI_INTENT_LABEL";

lazy_static! {
    static ref DATA_ARRAY_RE: Regex = Regex::new(r"(?s)<DataArray\b([^>]*)>(.*?)</DataArray>").unwrap();
    static ref DATA_RE: Regex = Regex::new(r"(?s)<Data>(.*?)</Data>").unwrap();
    static ref LABEL_TABLE_RE: Regex = Regex::new(r"(?s)<LabelTable>(.*?)</LabelTable>").unwrap();
    static ref LABEL_RE: Regex = Regex::new(r"(?s)<Label\b([^>]*)>(.*?)</Label>").unwrap();
    static ref ATTR_RE: Regex = Regex::new(r#"([A-Za-z_][\w.-]*)\s*=\s*"([^"]*)""#).unwrap();
    static ref CDATA_RE: Regex = Regex::new(r"(?s)^\s*<!\[CDATA\[(.*?)\]\]>\s*$").unwrap();
}

#[derive(Debug, Error)]
pub enum GiftiError {
    #[error("no <DataArray> elements found")]
    NoDataArrays,
    #[error("data array {index} has no <Data> element")]
    MissingData { index: usize },
    #[error("data array {index} uses unsupported encoding '{encoding}'")]
    UnsupportedEncoding { index: usize, encoding: String },
    #[error("data array {index} uses unsupported data type '{data_type}'")]
    UnsupportedDataType { index: usize, data_type: String },
    #[error("data array {index}: invalid value '{value}'")]
    InvalidValue { index: usize, value: String },
    #[error("data array {index}: invalid base64 payload")]
    Base64 {
        index: usize,
        #[source]
        source: base64::DecodeError,
    },
    #[error("data array {index}: compressed payload could not be inflated")]
    Inflate {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("data array {index}: {bytes} bytes is not a whole number of {width}-byte values")]
    Truncated { index: usize, bytes: usize, width: usize },
    #[error("data array {index} declares {expected} values but holds {found}")]
    LengthMismatch { index: usize, expected: usize, found: usize },
    #[error("maps have different lengths ({first} vs {other})")]
    RaggedMaps { first: usize, other: usize },
    #[error("label map {map} requested but the file holds {available} label map(s)")]
    MissingMap { map: usize, available: usize },
    #[error("label value {value} is not an integer")]
    NonIntegerLabel { value: f64 },
    #[error("label table entry without a Key attribute")]
    MissingLabelKey,
    #[error("label table key '{key}' is not an integer")]
    InvalidLabelKey { key: String },
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// One decoded `<DataArray>`, flattened in file order.
#[derive(Debug, Clone)]
pub struct DataArray {
    pub intent: String,
    pub dims: Vec<usize>,
    pub values: Vec<f64>,
}

/// A parsed GIFTI file.
#[derive(Debug, Clone, Default)]
pub struct GiftiImage {
    pub arrays: Vec<DataArray>,
    /// Label key -> label name. Empty for metric files.
    pub labels: BTreeMap<i32, String>,
}

impl GiftiImage {
    pub fn read(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path).with_context(|| format!("Could not read GIFTI file: {:?}", path))?;
        Self::parse(&xml).with_context(|| format!("Malformed GIFTI file: {:?}", path))
    }

    pub fn parse(xml: &str) -> Result<Self, GiftiError> {
        let mut arrays = Vec::new();
        for (index, caps) in DATA_ARRAY_RE.captures_iter(xml).enumerate() {
            let attrs = attributes(&caps[1]);
            let body = DATA_RE
                .captures(&caps[2])
                .map(|c| c.get(1).map_or("", |m| m.as_str()))
                .ok_or(GiftiError::MissingData { index })?;

            let values = decode_values(index, &attrs, body)?;
            let dims = declared_dims(&attrs);
            if !dims.is_empty() {
                let expected: usize = dims.iter().product();
                if expected != values.len() {
                    return Err(GiftiError::LengthMismatch { index, expected, found: values.len() });
                }
            }

            arrays.push(DataArray {
                intent: attrs.get("Intent").copied().unwrap_or("NIFTI_INTENT_NONE").to_string(),
                dims,
                values,
            });
        }

        if arrays.is_empty() {
            return Err(GiftiError::NoDataArrays);
        }

        let labels = match LABEL_TABLE_RE.captures(xml) {
            Some(table) => parse_label_table(&table[1])?,
            None => BTreeMap::new(),
        };

        Ok(Self { arrays, labels })
    }

    /// The integer label keys of the `map_number`-th (1-based) label array.
    pub fn label_map(&self, map_number: usize) -> Result<Vec<i32>, GiftiError> {
        let label_arrays: Vec<&DataArray> = self.arrays.iter().filter(|a| a.intent == INTENT_LABEL).collect();
        let array = map_number
            .checked_sub(1)
            .and_then(|i| label_arrays.get(i))
            .ok_or(GiftiError::MissingMap { map: map_number, available: label_arrays.len() })?;

        array
            .values
            .iter()
            .map(|&value| {
                if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
                    Err(GiftiError::NonIntegerLabel { value })
                } else {
                    Ok(value as i32)
                }
            })
            .collect()
    }

    /// Collapses every non-label map into one per-vertex value: the first nonzero value
    /// across maps, or zero when all maps are zero at that vertex.
    pub fn metric_union(&self) -> Result<Vec<f64>, GiftiError> {
        let mut maps = self.arrays.iter().filter(|a| a.intent != INTENT_LABEL);
        let first = maps.next().ok_or(GiftiError::NoDataArrays)?;
        let mut union = first.values.clone();

        for map in maps {
            if map.values.len() != union.len() {
                return Err(GiftiError::RaggedMaps { first: union.len(), other: map.values.len() });
            }
            for (slot, &value) in union.iter_mut().zip(&map.values) {
                if *slot == 0.0 {
                    *slot = value;
                }
            }
        }
        Ok(union)
    }
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

fn attributes(tag: &str) -> HashMap<&str, &str> {
    ATTR_RE
        .captures_iter(tag)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect()
}

fn declared_dims(attrs: &HashMap<&str, &str>) -> Vec<usize> {
    let count: usize = attrs.get("Dimensionality").and_then(|d| d.trim().parse().ok()).unwrap_or(0);
    (0..count)
        .map_while(|i| attrs.get(format!("Dim{}", i).as_str()).and_then(|d| d.trim().parse().ok()))
        .collect()
}

fn parse_label_table(table: &str) -> Result<BTreeMap<i32, String>, GiftiError> {
    let mut labels = BTreeMap::new();
    for caps in LABEL_RE.captures_iter(table) {
        let attrs = attributes(&caps[1]);
        // GIFTI 1.0 uses Key; some older writers used Index
        let key = attrs
            .get("Key")
            .or_else(|| attrs.get("Index"))
            .ok_or(GiftiError::MissingLabelKey)?;
        let key: i32 = key
            .trim()
            .parse()
            .map_err(|_| GiftiError::InvalidLabelKey { key: key.to_string() })?;

        let text = &caps[2];
        let name = match CDATA_RE.captures(text) {
            Some(cdata) => cdata[1].to_string(),
            None => unescape(text.trim()),
        };
        labels.insert(key, name);
    }
    Ok(labels)
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ============================================================================
// PAYLOAD DECODING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataType {
    UInt8,
    Int8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl DataType {
    fn from_name(index: usize, name: &str) -> Result<Self, GiftiError> {
        Ok(match name {
            "NIFTI_TYPE_UINT8" => Self::UInt8,
            "NIFTI_TYPE_INT8" => Self::Int8,
            "NIFTI_TYPE_INT16" => Self::Int16,
            "NIFTI_TYPE_UINT16" => Self::UInt16,
            "NIFTI_TYPE_INT32" => Self::Int32,
            "NIFTI_TYPE_UINT32" => Self::UInt32,
            "NIFTI_TYPE_FLOAT32" => Self::Float32,
            "NIFTI_TYPE_FLOAT64" => Self::Float64,
            other => return Err(GiftiError::UnsupportedDataType { index, data_type: other.to_string() }),
        })
    }

    fn width(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

macro_rules! read_as {
    ($ty:ty, $chunk:expr, $big_endian:expr) => {{
        let mut buf = [0u8; std::mem::size_of::<$ty>()];
        buf.copy_from_slice($chunk);
        let value = if $big_endian { <$ty>::from_be_bytes(buf) } else { <$ty>::from_le_bytes(buf) };
        value as f64
    }};
}

fn decode_values(index: usize, attrs: &HashMap<&str, &str>, body: &str) -> Result<Vec<f64>, GiftiError> {
    let encoding = attrs.get("Encoding").copied().unwrap_or("ASCII");
    let data_type = DataType::from_name(index, attrs.get("DataType").copied().unwrap_or("NIFTI_TYPE_FLOAT32"))?;
    let big_endian = attrs.get("Endian").copied() == Some("BigEndian");

    match encoding {
        "ASCII" => body
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|_| GiftiError::InvalidValue { index, value: token.to_string() })
            })
            .collect(),
        "Base64Binary" => {
            let bytes = decode_base64(index, body)?;
            from_bytes(index, data_type, big_endian, &bytes)
        }
        "GZipBase64Binary" => {
            let bytes = inflate(index, &decode_base64(index, body)?)?;
            from_bytes(index, data_type, big_endian, &bytes)
        }
        other => Err(GiftiError::UnsupportedEncoding { index, encoding: other.to_string() }),
    }
}

fn decode_base64(index: usize, body: &str) -> Result<Vec<u8>, GiftiError> {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|source| GiftiError::Base64 { index, source })
}

/// Writers disagree on the container: most emit a zlib stream, a few real gzip.
fn inflate(index: usize, bytes: &[u8]) -> Result<Vec<u8>, GiftiError> {
    let mut out = Vec::new();
    let result = if bytes.starts_with(&[0x1f, 0x8b]) {
        GzDecoder::new(bytes).read_to_end(&mut out)
    } else {
        ZlibDecoder::new(bytes).read_to_end(&mut out)
    };
    result.map_err(|source| GiftiError::Inflate { index, source })?;
    Ok(out)
}

fn from_bytes(index: usize, data_type: DataType, big_endian: bool, bytes: &[u8]) -> Result<Vec<f64>, GiftiError> {
    let width = data_type.width();
    if bytes.len() % width != 0 {
        return Err(GiftiError::Truncated { index, bytes: bytes.len(), width });
    }

    Ok(bytes
        .chunks_exact(width)
        .map(|chunk| match data_type {
            DataType::UInt8 => chunk[0] as f64,
            DataType::Int8 => chunk[0] as i8 as f64,
            DataType::Int16 => read_as!(i16, chunk, big_endian),
            DataType::UInt16 => read_as!(u16, chunk, big_endian),
            DataType::Int32 => read_as!(i32, chunk, big_endian),
            DataType::UInt32 => read_as!(u32, chunk, big_endian),
            DataType::Float32 => read_as!(f32, chunk, big_endian),
            DataType::Float64 => read_as!(f64, chunk, big_endian),
        })
        .collect())
}
