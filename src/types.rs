//! Shared types used across geosub.
//! Includes the geographic `BoundingBox`, the source-space `PixelWindow`, the
//! `RasterSize` of a dataset, snapshots of source bands (`BandInfo`) and datasets
//! (`SourceInfo`), the GDAL pixel `BandType`, and the `WriteMode` used to pick an
//! output path.
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use gdal::raster::RasterBand;
use gdal_sys::GDALDataType;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Geographic rectangle in WGS84 degrees, `[left, top, right, bottom]`.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// True when the longitudes cover the whole globe, which normalization alone
    /// would collapse to a single column.
    pub fn spans_all_longitudes(&self) -> bool {
        (self.right - self.left).abs() >= 360.0
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.left, b.top, b.right, b.bottom]
    }
}

impl FromStr for BoundingBox {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let coords = s
            .split(',')
            .map(|c| c.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::Config(format!("invalid window `{}`: {}", s, e)))?;
        match coords.as_slice() {
            [l, t, r, b] if coords.iter().all(|c| c.is_finite()) => Ok(Self::new(*l, *t, *r, *b)),
            _ => Err(Error::Config(format!(
                "invalid window `{}`: expected left,top,right,bottom",
                s
            ))),
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.left, self.top, self.right, self.bottom)
    }
}

/// Raster dimensions in pixels
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RasterSize {
    pub width: usize,
    pub height: usize,
}

impl RasterSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

/// Rectangular region in source pixel coordinates.
///
/// `x + width` may exceed the raster width, in which case the window wraps past
/// the right edge and continues at column 0.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct PixelWindow {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn full(size: RasterSize) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
        }
    }

    pub fn is_split(&self, raster_width: usize) -> bool {
        self.x + self.width > raster_width
    }
}

impl fmt::Display for PixelWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} to {}:{} ({}x{})",
            self.x,
            self.y,
            self.x + self.width,
            self.y + self.height,
            self.width,
            self.height
        )
    }
}

/// Pixel data type of a band as GDAL reports it, complex types included
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BandType(pub GDALDataType::Type);

impl BandType {
    pub const UINT8: Self = Self(GDALDataType::GDT_Byte);
    pub const INT8: Self = Self(GDALDataType::GDT_Int8);
    pub const UINT16: Self = Self(GDALDataType::GDT_UInt16);
    pub const INT16: Self = Self(GDALDataType::GDT_Int16);
    pub const UINT32: Self = Self(GDALDataType::GDT_UInt32);
    pub const INT32: Self = Self(GDALDataType::GDT_Int32);
    pub const UINT64: Self = Self(GDALDataType::GDT_UInt64);
    pub const INT64: Self = Self(GDALDataType::GDT_Int64);
    pub const FLOAT32: Self = Self(GDALDataType::GDT_Float32);
    pub const FLOAT64: Self = Self(GDALDataType::GDT_Float64);
    pub const CINT16: Self = Self(GDALDataType::GDT_CInt16);
    pub const CINT32: Self = Self(GDALDataType::GDT_CInt32);
    pub const CFLOAT32: Self = Self(GDALDataType::GDT_CFloat32);
    pub const CFLOAT64: Self = Self(GDALDataType::GDT_CFloat64);

    pub fn of(band: &RasterBand) -> Self {
        Self(unsafe { gdal_sys::GDALGetRasterDataType(band.c_rasterband()) })
    }

    /// GDAL name, as used by the VRT `dataType` attribute (`Float32`, `CInt16`...)
    pub fn name(&self) -> String {
        let name = unsafe { gdal_sys::GDALGetDataTypeName(self.0) };
        if name.is_null() {
            return "Unknown".to_string();
        }
        unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
    }

    pub fn is_complex(&self) -> bool {
        unsafe { gdal_sys::GDALDataTypeIsComplex(self.0) != 0 }
    }
}

impl fmt::Display for BandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Read-only snapshot of one source band
#[derive(Clone, Debug, PartialEq)]
pub struct BandInfo {
    /// 1-based band index in the source dataset
    pub id: usize,
    pub description: String,
    pub data_type: BandType,
    /// Default-domain metadata
    pub metadata: BTreeMap<String, String>,
    pub no_data: Option<f64>,
}

/// Snapshot of the dataset-level properties of an opened source
#[derive(Clone, Debug)]
pub struct SourceInfo {
    /// Locator the dataset was opened from (path, URL or GDAL virtual path)
    pub locator: String,
    /// Short name of the driver that identified the source
    pub driver: String,
    pub size: RasterSize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geo_transform: Option<[f64; 6]>,
    /// Spatial reference in WKT format
    pub projection: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub bands: Vec<BandInfo>,
}

/// How the output dataset is produced
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum WriteMode {
    /// Encode straight from a virtual (VRT) description of the window
    Virtual,
    /// Copy bands concurrently into an in-memory dataset, then encode it
    Materialized,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Virtual => write!(f, "virtual"),
            WriteMode::Materialized => write!(f, "materialized"),
        }
    }
}
