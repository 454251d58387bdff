//! I/O layer over GDAL.
//! Provides the `gdal` source adapter (opening, band snapshots, WGS84 to pixel
//! transforms) and the `writers` producing the output dataset.
pub mod gdal;
pub use gdal::{ConfigScope, GdalSource, PixelTransform};

pub mod writers;
