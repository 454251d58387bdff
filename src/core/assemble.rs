//! Output assembly: turns the selected bands and the resolved window into an
//! `OutputPlan`, the description of the dataset to be written.
//!
//! The plan carries everything the writers need: output size, the translated
//! geotransform, SRS and metadata, and for every band the list of source regions
//! that compose it (two regions when the window wraps past the right edge).
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{BandInfo, BandType, PixelWindow, SourceInfo};

/// Copy of a source rectangle into the same-sized output rectangle
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SourceRegion {
    pub src_x: usize,
    pub src_y: usize,
    pub dst_x: usize,
    pub dst_y: usize,
    pub width: usize,
    pub height: usize,
}

#[derive(Clone, Debug)]
pub struct PlannedBand {
    /// 1-based index of the band in the source
    pub source_id: usize,
    pub description: String,
    pub data_type: BandType,
    pub metadata: BTreeMap<String, String>,
    pub no_data: Option<f64>,
    pub regions: Vec<SourceRegion>,
}

#[derive(Clone, Debug)]
pub struct OutputPlan {
    pub source: String,
    pub width: usize,
    pub height: usize,
    pub geo_transform: Option<[f64; 6]>,
    pub projection: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub bands: Vec<PlannedBand>,
}

impl OutputPlan {
    pub fn band_ids(&self) -> Vec<usize> {
        self.bands.iter().map(|b| b.source_id).collect()
    }
}

/// Shifts the geotransform origin to the window's upper-left pixel
pub fn translate_geo_transform(gt: &[f64; 6], window: &PixelWindow) -> [f64; 6] {
    [
        gt[0] + window.x as f64 * gt[1],
        gt[1],
        gt[2],
        gt[3] + window.y as f64 * gt[5],
        gt[4],
        gt[5],
    ]
}

/// Source regions composing a window. A window running past the right edge is
/// read as `[x, W)` followed by `[0, rest)`.
pub fn window_regions(window: &PixelWindow, raster_width: usize) -> Vec<SourceRegion> {
    let first_width = window.width.min(raster_width.saturating_sub(window.x));
    let mut regions = vec![SourceRegion {
        src_x: window.x,
        src_y: window.y,
        dst_x: 0,
        dst_y: 0,
        width: first_width,
        height: window.height,
    }];
    if window.is_split(raster_width) {
        regions.push(SourceRegion {
            src_x: 0,
            src_y: window.y,
            dst_x: first_width,
            dst_y: 0,
            width: window.width - first_width,
            height: window.height,
        });
    }
    regions
}

/// Builds the output plan for the selected bands, which must be non-empty and in
/// source order.
pub fn assemble(source: &SourceInfo, bands: &[BandInfo], window: &PixelWindow) -> Result<OutputPlan> {
    if bands.is_empty() {
        return Err(Error::NoBandsSelected);
    }
    let regions = window_regions(window, source.size.width);

    Ok(OutputPlan {
        source: source.locator.clone(),
        width: window.width,
        height: window.height,
        geo_transform: source
            .geo_transform
            .as_ref()
            .map(|gt| translate_geo_transform(gt, window)),
        projection: source.projection.clone(),
        metadata: source.metadata.clone(),
        bands: bands
            .iter()
            .map(|band| PlannedBand {
                source_id: band.id,
                description: band.description.clone(),
                data_type: band.data_type,
                metadata: band.metadata.clone(),
                no_data: band.no_data,
                regions: regions.clone(),
            })
            .collect(),
    })
}
