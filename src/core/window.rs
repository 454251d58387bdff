//! Bounding box to pixel window resolution.
//!
//! Longitudes are normalized to [-180, 180) before being mapped into source pixel
//! space, and windows that cross the raster's right edge wrap around to column 0
//! instead of being rejected.
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{BoundingBox, PixelWindow, RasterSize};

/// Maps WGS84 longitude/latitude to fractional source pixel/line coordinates
pub trait ToPixel {
    fn to_pixel(&self, lon: f64, lat: f64) -> Result<(f64, f64)>;
}

/// Plain affine mapping, for sources whose geotransform is already in degrees
impl ToPixel for [f64; 6] {
    fn to_pixel(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        let inverse = invert_geo_transform(self)
            .ok_or_else(|| Error::Georeferencing("geotransform is not invertible".into()))?;
        Ok(apply_geo_transform(&inverse, lon, lat))
    }
}

pub fn normalize_longitude(lon: f64) -> f64 {
    (((lon + 180.0) % 360.0) + 360.0) % 360.0 - 180.0
}

pub fn apply_geo_transform(gt: &[f64; 6], x: f64, y: f64) -> (f64, f64) {
    (gt[0] + x * gt[1] + y * gt[2], gt[3] + x * gt[4] + y * gt[5])
}

pub fn invert_geo_transform(gt: &[f64; 6]) -> Option<[f64; 6]> {
    let det = gt[1] * gt[5] - gt[2] * gt[4];
    if det.abs() < 1e-15 || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        (gt[2] * gt[3] - gt[0] * gt[5]) * inv_det,
        gt[5] * inv_det,
        -gt[2] * inv_det,
        (-gt[1] * gt[3] + gt[0] * gt[4]) * inv_det,
        -gt[4] * inv_det,
        gt[1] * inv_det,
    ])
}

/// Resolves an optional bounding box into a window of a raster of the given size.
/// Without a bounding box the window is the full raster.
///
/// Wrapping assumes the raster covers all 360° of longitude: a corner west of column 0
/// is shifted by one raster width. On a regional raster the same shift applies, so a box
/// starting west of the raster yields a window starting near its east edge that wraps
/// to column 0, not an error.
pub fn resolve<T: ToPixel + ?Sized>(
    bbox: Option<&BoundingBox>,
    raster: RasterSize,
    transform: &T,
) -> Result<PixelWindow> {
    let Some(bbox) = bbox else {
        return Ok(PixelWindow::full(raster));
    };

    let ul = transform.to_pixel(normalize_longitude(bbox.left), bbox.top)?;
    let lr = transform.to_pixel(normalize_longitude(bbox.right), bbox.bottom)?;
    debug!("bbox {} maps to pixels {:?} - {:?}", bbox, ul, lr);

    let window = window_from_pixels(ul, lr, raster, bbox.spans_all_longitudes())?;
    debug!("resolved window {}", window);
    Ok(window)
}

fn window_from_pixels(
    ul: (f64, f64),
    lr: (f64, f64),
    raster: RasterSize,
    all_longitudes: bool,
) -> Result<PixelWindow> {
    if ![ul.0, ul.1, lr.0, lr.1].iter().all(|c| c.is_finite()) {
        return Err(Error::Georeferencing(
            "bounding box cannot be mapped to source pixels".into(),
        ));
    }
    let raster_width = raster.width as i64;
    let raster_height = raster.height as i64;

    // negative columns lie west of the raster origin, one full turn away
    let wrap = |x: f64| if x < 0.0 { x + raster.width as f64 } else { x };
    let ul_x = wrap(ul.0).floor() as i64;
    let ul_y = ul.1.floor() as i64;
    let lr_x = wrap(lr.0).ceil() as i64;
    let lr_y = lr.1.ceil() as i64;

    let mut width = if all_longitudes {
        raster_width
    } else {
        (lr_x - ul_x).min(raster_width)
    };
    if width < 0 {
        width += raster_width;
    }

    let top = ul_y.max(0);
    let height = (lr_y.min(raster_height) - top).min(raster_height);

    if width <= 0 || height <= 0 {
        return Err(Error::EmptyWindow { width, height });
    }

    Ok(PixelWindow {
        x: ul_x.rem_euclid(raster_width) as usize,
        y: top as usize,
        width: width as usize,
        height: height as usize,
    })
}
