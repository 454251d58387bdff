//! Materialized output: every planned band is read from the source (wrapped
//! windows as two reads) on a bounded rayon pool and written into an in-memory
//! staging dataset, which is then handed to the output driver.
use gdal::raster::{Buffer, RasterBand};
use gdal::{Dataset, DriverManager, Metadata};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::assemble::{OutputPlan, PlannedBand, SourceRegion};
use crate::core::params::SourceConfig;
use crate::error::{Error, Result};
use crate::io::writers::copy::Progress;
use crate::types::BandType;

/// Pixels of one source region, typed after the band
enum RegionData {
    U8(Buffer<u8>),
    I8(Buffer<i8>),
    U16(Buffer<u16>),
    I16(Buffer<i16>),
    U32(Buffer<u32>),
    I32(Buffer<i32>),
    U64(Buffer<u64>),
    I64(Buffer<i64>),
    F32(Buffer<f32>),
    F64(Buffer<f64>),
}

/// Band types with a lossless Rust buffer
fn is_materializable(data_type: BandType) -> bool {
    matches!(
        data_type,
        BandType::UINT8
            | BandType::INT8
            | BandType::UINT16
            | BandType::INT16
            | BandType::UINT32
            | BandType::INT32
            | BandType::UINT64
            | BandType::INT64
            | BandType::FLOAT32
            | BandType::FLOAT64
    )
}

fn read_region(band: &RasterBand, data_type: BandType, r: &SourceRegion) -> Result<RegionData> {
    macro_rules! read {
        ($variant:ident, $t:ty) => {
            RegionData::$variant(band.read_as::<$t>(
                (r.src_x as isize, r.src_y as isize),
                (r.width, r.height),
                (r.width, r.height),
                None,
            )?)
        };
    }
    Ok(match data_type {
        BandType::UINT8 => read!(U8, u8),
        BandType::INT8 => read!(I8, i8),
        BandType::UINT16 => read!(U16, u16),
        BandType::INT16 => read!(I16, i16),
        BandType::UINT32 => read!(U32, u32),
        BandType::INT32 => read!(I32, i32),
        BandType::UINT64 => read!(U64, u64),
        BandType::INT64 => read!(I64, i64),
        BandType::FLOAT32 => read!(F32, f32),
        BandType::FLOAT64 => read!(F64, f64),
        other => {
            return Err(Error::UnsupportedBandType {
                data_type: other.name(),
            });
        }
    })
}

fn write_region(band: &mut RasterBand, r: &SourceRegion, data: RegionData) -> Result<()> {
    let window = (r.dst_x as isize, r.dst_y as isize);
    let size = (r.width, r.height);
    match data {
        RegionData::U8(mut buf) => band.write(window, size, &mut buf)?,
        RegionData::I8(mut buf) => band.write(window, size, &mut buf)?,
        RegionData::U16(mut buf) => band.write(window, size, &mut buf)?,
        RegionData::I16(mut buf) => band.write(window, size, &mut buf)?,
        RegionData::U32(mut buf) => band.write(window, size, &mut buf)?,
        RegionData::I32(mut buf) => band.write(window, size, &mut buf)?,
        RegionData::U64(mut buf) => band.write(window, size, &mut buf)?,
        RegionData::I64(mut buf) => band.write(window, size, &mut buf)?,
        RegionData::F32(mut buf) => band.write(window, size, &mut buf)?,
        RegionData::F64(mut buf) => band.write(window, size, &mut buf)?,
    }
    Ok(())
}

/// Reads all regions of one band through a dedicated source handle
fn read_band(plan: &OutputPlan, band: &PlannedBand, config: &SourceConfig) -> Result<Vec<RegionData>> {
    let _scope = config.enter();
    let dataset = config.open(&plan.source)?;
    let source_band = dataset.rasterband(band.source_id)?;
    debug!("Reading band {} of {}", band.source_id, plan.source);
    band.regions
        .iter()
        .map(|region| read_region(&source_band, band.data_type, region))
        .collect()
}

/// Empty MEM dataset shaped like the plan, with one band per planned band
fn staging_dataset(plan: &OutputPlan) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name("MEM")?;
    let mut dataset = driver.create("", plan.width, plan.height, 0)?;
    for band in &plan.bands {
        let err = unsafe {
            gdal_sys::GDALAddBand(
                dataset.c_dataset(),
                band.data_type.0,
                std::ptr::null_mut(),
            )
        };
        if err != gdal_sys::CPLErr::CE_None {
            return Err(Error::Driver(format!(
                "cannot add a {} band to the staging dataset",
                band.data_type.name()
            )));
        }
    }

    if let Some(gt) = &plan.geo_transform {
        dataset.set_geo_transform(gt)?;
    }
    if let Some(wkt) = &plan.projection {
        dataset.set_projection(wkt)?;
    }
    for (key, value) in &plan.metadata {
        dataset.set_metadata_item(key, value, "")?;
    }
    for (index, planned) in plan.bands.iter().enumerate() {
        let mut band = dataset.rasterband(index + 1)?;
        if !planned.description.is_empty() {
            band.set_description(&planned.description)?;
        }
        if planned.no_data.is_some() {
            band.set_no_data_value(planned.no_data)?;
        }
        for (key, value) in &planned.metadata {
            band.set_metadata_item(key, value, "")?;
        }
    }
    Ok(dataset)
}

/// Copies the plan into an in-memory dataset with at most `jobs` bands read at once.
/// Progress is reported once per written band.
pub fn materialize(
    plan: &OutputPlan,
    config: &SourceConfig,
    jobs: usize,
    progress: &dyn Progress,
) -> Result<Dataset> {
    if jobs == 0 {
        return Err(Error::Config("jobs must be at least 1".into()));
    }
    if let Some(band) = plan.bands.iter().find(|b| !is_materializable(b.data_type)) {
        return Err(Error::UnsupportedBandType {
            data_type: band.data_type.name(),
        });
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(Error::config)?;
    let dataset = staging_dataset(plan)?;

    let total = plan.bands.len();
    let mut done = 0;
    for (chunk_index, chunk) in plan.bands.chunks(jobs).enumerate() {
        let reads: Vec<Vec<RegionData>> = pool.install(|| {
            chunk
                .par_iter()
                .map(|band| read_band(plan, band, config))
                .collect::<Result<Vec<_>>>()
        })?;
        for (offset, (planned, regions)) in chunk.iter().zip(reads).enumerate() {
            let mut band = dataset.rasterband(chunk_index * jobs + offset + 1)?;
            for (region, data) in planned.regions.iter().zip(regions) {
                write_region(&mut band, region, data)?;
            }
            done += 1;
            progress.on_progress(
                done as f64 / total as f64,
                &format!("copied band {}", planned.source_id),
            );
        }
    }
    info!("Materialized {} bands ({}x{})", total, plan.width, plan.height);
    Ok(dataset)
}
