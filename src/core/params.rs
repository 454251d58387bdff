use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::core::selector::BandSelector;
use crate::error::{Error, Result};
use crate::types::{BoundingBox, WriteMode};

/// Default bound on concurrent band copies in materialized mode
pub const DEFAULT_JOBS: usize = 16;

/// Engine settings applied while the source is accessed
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    /// GDAL configuration options, applied thread-locally for the duration of a retrieval
    pub config_options: Vec<(String, String)>,
    /// Driver open options (`KEY=VALUE`)
    pub open_options: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            // keep GRIB values in the units they were encoded with
            config_options: vec![("GRIB_NORMALIZE_UNITS".to_string(), "NO".to_string())],
            open_options: Vec::new(),
        }
    }
}

/// Write parameters of a retrieval
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveOptions {
    pub mode: WriteMode,
    /// Concurrent band copies in materialized mode
    pub jobs: usize,
    /// Output driver short name; None infers it from the destination
    pub output_format: Option<String>,
    /// Driver creation options (`KEY=VALUE`)
    pub creation_options: Vec<String>,
    pub source: SourceConfig,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            mode: WriteMode::Virtual,
            jobs: DEFAULT_JOBS,
            output_format: None,
            creation_options: Vec::new(),
            source: SourceConfig::default(),
        }
    }
}

/// Band selectors and window read from a JSON job file:
/// `{"bands": [{"id": 1}, {"description": "/^7.+ISBL/"}], "bbox": [l, t, r, b]}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobConfig {
    pub bands: Option<Vec<BandSelector>>,
    pub bbox: Option<BoundingBox>,
}

#[derive(Deserialize)]
struct RawJob {
    bands: Option<Vec<Value>>,
    bbox: Option<BoundingBox>,
}

impl JobConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawJob = serde_json::from_str(json)?;
        let bands = raw
            .bands
            .map(|bands| bands.iter().map(BandSelector::from_json).collect::<Result<Vec<_>>>())
            .transpose()?;
        Ok(Self {
            bands,
            bbox: raw.bbox,
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }
}

/// Splits a `KEY=VALUE` option
pub fn parse_key_value(option: &str) -> Result<(String, String)> {
    match option.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(Error::Config(format!(
            "invalid option `{}`: expected KEY=VALUE",
            option
        ))),
    }
}
