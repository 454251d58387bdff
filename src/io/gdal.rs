use std::collections::BTreeMap;

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::{Dataset, DatasetOptions, GdalOpenFlags, Metadata};
use tracing::{debug, warn};

use crate::core::params::SourceConfig;
use crate::core::window::{ToPixel, apply_geo_transform, invert_geo_transform};
use crate::error::{Error, Result};
use crate::types::{BandInfo, BandType, RasterSize, SourceInfo};

const WGS84_EPSG: u32 = 4326;

/// Thread-local GDAL configuration that is restored when dropped
pub struct ConfigScope {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for ConfigScope {
    fn drop(&mut self) {
        for (key, value) in self.previous.drain(..).rev() {
            let restored = match value {
                Some(v) => gdal::config::set_thread_local_config_option(&key, &v),
                None => gdal::config::clear_thread_local_config_option(&key),
            };
            if let Err(e) = restored {
                warn!("Cannot restore GDAL option {}: {}", key, e);
            }
        }
    }
}

impl SourceConfig {
    /// Applies the configuration options to the calling thread until the scope is dropped
    pub fn enter(&self) -> ConfigScope {
        let mut previous = Vec::with_capacity(self.config_options.len());
        for (key, value) in &self.config_options {
            let old = gdal::config::get_thread_local_config_option(key, "")
                .ok()
                .filter(|v| !v.is_empty());
            match gdal::config::set_thread_local_config_option(key, value) {
                Ok(()) => previous.push((key.clone(), old)),
                Err(e) => warn!("Cannot set GDAL option {}={}: {}", key, value, e),
            }
        }
        ConfigScope { previous }
    }

    /// Opens a raster read-only with the configured open options
    pub fn open(&self, locator: &str) -> Result<Dataset> {
        let open_options: Vec<&str> = self.open_options.iter().map(String::as_str).collect();
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_READONLY | GdalOpenFlags::GDAL_OF_RASTER,
            open_options: (!open_options.is_empty()).then_some(open_options.as_slice()),
            ..DatasetOptions::default()
        };
        Dataset::open_ex(locator, options).map_err(|source| Error::SourceOpen {
            locator: locator.to_string(),
            source,
        })
    }
}

/// Default-domain metadata of a dataset or band
pub fn read_metadata<M: Metadata>(item: &M) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    if let Some(entries) = item.metadata_domain("") {
        for entry in entries {
            if let Some((key, val)) = entry.split_once('=') {
                metadata.insert(key.to_string(), val.to_string());
            }
        }
    }
    metadata
}

/// Opened source dataset together with its snapshot
pub struct GdalSource {
    pub dataset: Dataset,
    pub info: SourceInfo,
}

impl GdalSource {
    /// Open a GDAL-supported dataset (local path, `/vsicurl/` URL, subdataset name...)
    pub fn open(locator: &str, config: &SourceConfig) -> Result<Self> {
        let dataset = config.open(locator)?;
        let (width, height) = dataset.raster_size();
        let geo_transform = dataset.geo_transform().ok();
        let projection = Some(dataset.projection()).filter(|p| !p.is_empty());
        let metadata = read_metadata(&dataset);

        let count = dataset.raster_count() as usize;
        let mut bands = Vec::with_capacity(count);
        for id in 1..=count {
            let band = dataset.rasterband(id)?;
            bands.push(BandInfo {
                id,
                description: band.description().unwrap_or_default(),
                data_type: BandType::of(&band),
                metadata: read_metadata(&band),
                no_data: band.no_data_value(),
            });
        }
        let driver = dataset.driver().short_name();
        debug!(
            "Opened {} with {} ({}x{}, {} bands)",
            locator, driver, width, height, count
        );

        Ok(GdalSource {
            info: SourceInfo {
                locator: locator.to_string(),
                driver,
                size: RasterSize::new(width as usize, height as usize),
                geo_transform,
                projection,
                metadata,
                bands,
            },
            dataset,
        })
    }

    /// WGS84 to pixel mapping for this source
    pub fn pixel_transform(&self) -> Result<PixelTransform> {
        PixelTransform::for_dataset(&self.dataset)
    }
}

/// WGS84 lon/lat to source pixel/line, through the source SRS and the inverse geotransform
pub struct PixelTransform {
    transform: CoordTransform,
    inverse: [f64; 6],
}

impl PixelTransform {
    pub fn for_dataset(dataset: &Dataset) -> Result<Self> {
        let georef = |e: gdal::errors::GdalError| Error::Georeferencing(e.to_string());
        let mut srs = dataset.spatial_ref().map_err(georef)?;
        let gt = dataset.geo_transform().map_err(georef)?;
        let inverse = invert_geo_transform(&gt)
            .ok_or_else(|| Error::Georeferencing("geotransform is not invertible".into()))?;

        let mut wgs84 = SpatialRef::from_epsg(WGS84_EPSG)?;
        wgs84.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        let transform = CoordTransform::new(&wgs84, &srs).map_err(georef)?;
        Ok(Self { transform, inverse })
    }
}

impl ToPixel for PixelTransform {
    fn to_pixel(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        let mut xs = [lon];
        let mut ys = [lat];
        self.transform
            .transform_coords(&mut xs, &mut ys, &mut [])
            .map_err(|e| Error::Georeferencing(e.to_string()))?;
        Ok(apply_geo_transform(&self.inverse, xs[0], ys[0]))
    }
}
