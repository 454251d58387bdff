//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, GDAL, JSON and XML errors, and provides semantic variants
//! for request validation, band selection and window resolution failures.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No source specified")]
    MissingSource,

    #[error("No target filename specified")]
    MissingOutput,

    #[error("Cannot open {locator}: {source}")]
    SourceOpen {
        locator: String,
        #[source]
        source: gdal::errors::GdalError,
    },

    #[error(
        "No valid georeferencing found ({0}), if you are retrieving a NetCDF file, \
         you must specify the URL of a subdataset, not the master dataset"
    )]
    Georeferencing(String),

    #[error("Malformed selector: {selector}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("No bands to download")]
    NoBandsSelected,

    #[error("Bounding box resolves to an empty window ({width}x{height})")]
    EmptyWindow { width: i64, height: i64 },

    #[error("{data_type} bands cannot be materialized, use the virtual write mode")]
    UnsupportedBandType { data_type: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Output driver error: {0}")]
    Driver(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Error {
    pub fn selector<S: std::fmt::Display, R: std::fmt::Display>(selector: S, reason: R) -> Self {
        Error::Selector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Error::Config(e.to_string())
    }
}
