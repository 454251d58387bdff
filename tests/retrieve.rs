use std::ffi::{CString, c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Arc, Mutex};

use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use rstest::rstest;
use tempfile::TempDir;

use geosub::{
    BandSelector, BandType, BoundingBox, Error, JobConfig, RetrievalRequest, RetrieveOptions, WriteMode,
    retrieve,
};

const WIDTH: usize = 36;
const HEIGHT: usize = 18;
const GEO_TRANSFORM: [f64; 6] = [-185.0, 10.0, 0.0, 90.125, 0.0, -10.0];

const BANDS: [(&str, &str, &str); 3] = [
    ("2[m] HTGL=\"Specified height level above ground\"", "TMP", "2-HTGL"),
    ("10[m] HTGL=\"Specified height level above ground\"", "UGRD", "10-HTGL"),
    ("700[mb] ISBL=\"Isobaric surface\"", "TMP", "70000-ISBL"),
];

fn value(band: usize, x: usize, y: usize) -> f32 {
    (band * 10_000 + y * 100 + x) as f32
}

/// 10° global grid, 3 Float32 bands described like GFS GRIB2 messages
fn fixture(dir: &Path, with_srs: bool) -> PathBuf {
    let path = dir.join(if with_srs { "gfs.tif" } else { "nosrs.tif" });
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f32, _>(&path, WIDTH, HEIGHT, BANDS.len())
        .unwrap();
    dataset.set_geo_transform(&GEO_TRANSFORM).unwrap();
    if with_srs {
        dataset.set_spatial_ref(&SpatialRef::from_epsg(4326).unwrap()).unwrap();
    }
    dataset.set_metadata_item("CENTER", "NCEP", "").unwrap();

    for (index, (description, element, short_name)) in BANDS.iter().enumerate() {
        let id = index + 1;
        let mut band = dataset.rasterband(id).unwrap();
        band.set_description(description).unwrap();
        band.set_metadata_item("GRIB_ELEMENT", element, "").unwrap();
        band.set_metadata_item("GRIB_SHORT_NAME", short_name, "").unwrap();
        if id == 1 {
            band.set_no_data_value(Some(-9999.0)).unwrap();
        }
        let data: Vec<f32> = (0..HEIGHT)
            .flat_map(|y| (0..WIDTH).map(move |x| value(id, x, y)))
            .collect();
        let mut buf = Buffer::new((WIDTH, HEIGHT), data);
        band.write((0, 0), (WIDTH, HEIGHT), &mut buf).unwrap();
    }
    path
}

fn setup() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let source = fixture(dir.path(), true);
    (dir, source.to_str().unwrap().to_string())
}

fn output(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}

fn with_mode(mode: WriteMode) -> RetrieveOptions {
    RetrieveOptions {
        mode,
        jobs: 2,
        ..RetrieveOptions::default()
    }
}

fn read_band(dataset: &Dataset, id: usize) -> Vec<f32> {
    let (w, h) = dataset.raster_size();
    let buf: Buffer<f32> = dataset
        .rasterband(id)
        .unwrap()
        .read_as((0, 0), (w, h), (w, h), None)
        .unwrap();
    buf.data().to_vec()
}

fn descriptions(dataset: &Dataset) -> Vec<String> {
    (1..=dataset.raster_count())
        .map(|id| dataset.rasterband(id).unwrap().description().unwrap())
        .collect()
}

#[rstest]
#[case(WriteMode::Virtual)]
#[case(WriteMode::Materialized)]
fn round_trip_without_selectors(#[case] mode: WriteMode) {
    let (dir, source) = setup();
    let out = output(&dir, "copy.tif");
    retrieve(&RetrievalRequest::new(&source, &out).with_options(with_mode(mode))).unwrap();

    let copy = Dataset::open(&out).unwrap();
    assert_eq!(copy.raster_size(), (WIDTH, HEIGHT));
    assert_eq!(copy.raster_count(), 3);
    assert_eq!(copy.geo_transform().unwrap(), GEO_TRANSFORM);
    assert_eq!(copy.metadata_item("CENTER", "").as_deref(), Some("NCEP"));
    assert_eq!(
        descriptions(&copy),
        BANDS.iter().map(|b| b.0.to_string()).collect::<Vec<_>>()
    );

    let band = copy.rasterband(1).unwrap();
    assert_eq!(band.no_data_value(), Some(-9999.0));
    assert_eq!(band.metadata_item("GRIB_SHORT_NAME", "").as_deref(), Some("2-HTGL"));
    for id in 1..=3 {
        let data = read_band(&copy, id);
        assert_eq!(data[0], value(id, 0, 0));
        assert_eq!(data[WIDTH * HEIGHT - 1], value(id, WIDTH - 1, HEIGHT - 1));
    }
}

#[rstest]
#[case("HTGL", vec![0, 1])]
#[case("/^700/", vec![2])]
#[case("3", vec![2])]
#[case("1,/ISBL/", vec![0, 2])]
#[case("/^(2|10)\\[m\\]/", vec![0, 1])]
fn selects_bands_from_command_line_tokens(#[case] list: &str, #[case] expected: Vec<usize>) {
    let (dir, source) = setup();
    let out = output(&dir, "selected.tif");
    let request = RetrievalRequest::new(&source, &out)
        .with_bands(BandSelector::parse_list(list).unwrap());
    retrieve(&request).unwrap();

    let copy = Dataset::open(&out).unwrap();
    let expected: Vec<String> = expected.iter().map(|&i| BANDS[i].0.to_string()).collect();
    assert_eq!(descriptions(&copy), expected);
}

#[test]
fn selects_bands_by_metadata_from_job_file() {
    let (dir, source) = setup();
    let out = output(&dir, "tmp.tif");
    let job = JobConfig::from_json_str(
        r#"{"bands": [{"metaData": {"GRIB_ELEMENT": "TMP", "GRIB_SHORT_NAME": "/HTGL$/"}}]}"#,
    )
    .unwrap();
    retrieve(&RetrievalRequest::new(&source, &out).with_bands(job.bands.unwrap())).unwrap();

    let copy = Dataset::open(&out).unwrap();
    assert_eq!(copy.raster_count(), 1);
    assert_eq!(read_band(&copy, 1)[0], value(1, 0, 0));
}

#[rstest]
#[case(WriteMode::Virtual)]
#[case(WriteMode::Materialized)]
fn bbox_selects_a_snapped_window(#[case] mode: WriteMode) {
    let (dir, source) = setup();
    let out = output(&dir, "europe.tif");
    let request = RetrievalRequest::new(&source, &out)
        .with_bbox(BoundingBox::new(-8.0125, 53.0125, 12.0125, 37.9875))
        .with_options(with_mode(mode));
    retrieve(&request).unwrap();

    let copy = Dataset::open(&out).unwrap();
    assert_eq!(copy.raster_size(), (3, 3));
    assert_eq!(
        copy.geo_transform().unwrap(),
        [-15.0, 10.0, 0.0, 60.125, 0.0, -10.0]
    );
    let data = read_band(&copy, 2);
    let expected: Vec<f32> = (3..6)
        .flat_map(|y| (17..20).map(move |x| value(2, x, y)))
        .collect();
    assert_eq!(data, expected);
}

#[rstest]
#[case(WriteMode::Virtual)]
#[case(WriteMode::Materialized)]
fn antimeridian_window_is_stitched(#[case] mode: WriteMode) {
    let (dir, source) = setup();
    let out = output(&dir, "pacific.tif");
    let request = RetrievalRequest::new(&source, &out)
        .with_bands(vec![BandSelector::by_id(3)])
        .with_bbox(BoundingBox::new(166.0, 10.0, -164.0, -10.0))
        .with_options(with_mode(mode));
    retrieve(&request).unwrap();

    let copy = Dataset::open(&out).unwrap();
    assert_eq!(copy.raster_size(), (4, 3));
    assert_eq!(copy.geo_transform().unwrap()[0], 165.0);
    let data = read_band(&copy, 1);
    for row in 0..3 {
        let got = &data[row * 4..row * 4 + 4];
        let want: Vec<f32> = [35, 0, 1, 2].iter().map(|&x| value(3, x, 8 + row)).collect();
        assert_eq!(got, want.as_slice(), "row {}", row);
    }
}

#[test]
fn longitudes_beyond_180_are_normalized() {
    let (dir, source) = setup();
    let plain = output(&dir, "plain.tif");
    let shifted = output(&dir, "shifted.tif");
    retrieve(
        &RetrievalRequest::new(&source, &plain)
            .with_bbox(BoundingBox::new(-8.0125, 53.0125, 12.0125, 37.9875)),
    )
    .unwrap();
    retrieve(
        &RetrievalRequest::new(&source, &shifted)
            .with_bbox(BoundingBox::new(351.9875, 53.0125, 372.0125, 37.9875)),
    )
    .unwrap();

    let plain = Dataset::open(&plain).unwrap();
    let shifted = Dataset::open(&shifted).unwrap();
    assert_eq!(plain.geo_transform().unwrap(), shifted.geo_transform().unwrap());
    assert_eq!(read_band(&plain, 1), read_band(&shifted, 1));
}

#[test]
fn reports_progress_through_the_verbose_sink() {
    let (dir, source) = setup();
    let out = output(&dir, "verbose.tif");
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    let request = RetrievalRequest::new(&source, &out)
        .with_bbox(BoundingBox::new(-8.0125, 53.0125, 12.0125, 37.9875))
        .with_verbose(move |m| sink.lock().unwrap().push(m.to_string()));
    retrieve(&request).unwrap();

    let messages = messages.lock().unwrap();
    assert_eq!(messages[0], format!("retrieving {}", source));
    assert_eq!(messages[1], "identified GTiff 36:18 dataset with 3 bands");
    assert_eq!(messages[2], "retrieving 17:3 to 20:6 (3x3), bands 1,2,3");
    assert!(messages[3..messages.len() - 1].iter().all(|m| m.contains('%')));
    assert!(messages.iter().any(|m| m.starts_with("100%")));
    assert_eq!(messages.last().unwrap(), &format!("wrote {}", out));
}

#[test]
fn explicit_output_format_overrides_extension() {
    let (dir, source) = setup();
    let out = output(&dir, "subset.bin");
    let options = RetrieveOptions {
        output_format: Some("GTiff".to_string()),
        creation_options: vec!["COMPRESS=DEFLATE".to_string()],
        ..RetrieveOptions::default()
    };
    retrieve(&RetrievalRequest::new(&source, &out).with_options(options)).unwrap();

    let copy = Dataset::open(&out).unwrap();
    assert_eq!(copy.driver().short_name(), "GTiff");
    assert_eq!(
        copy.metadata_item("COMPRESSION", "IMAGE_STRUCTURE").as_deref(),
        Some("DEFLATE")
    );
}

#[test]
fn no_matching_bands_writes_nothing() {
    let (dir, source) = setup();
    let out = output(&dir, "none.tif");
    let request = RetrievalRequest::new(&source, &out)
        .with_bands(vec![BandSelector::by_description("RH")]);
    let err = retrieve(&request).unwrap_err();
    assert!(matches!(err, Error::NoBandsSelected));
    assert_eq!(err.to_string(), "No bands to download");

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["gfs.tif".to_string()]);
}

fn staging_leftovers(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with(".geosub-")
        })
        .count()
}

#[rstest]
#[case(WriteMode::Virtual)]
#[case(WriteMode::Materialized)]
fn failed_write_leaves_no_partial_output(#[case] mode: WriteMode) {
    let (dir, source) = setup();
    let out = output(&dir, "bad.tif");
    // GTiff refuses tiles whose width is not a multiple of 16
    let options = RetrieveOptions {
        creation_options: vec!["TILED=YES".to_string(), "BLOCKXSIZE=7".to_string()],
        ..with_mode(mode)
    };
    let err = retrieve(&RetrievalRequest::new(&source, &out).with_options(options)).unwrap_err();
    assert!(matches!(err, Error::Driver(_)), "{}", err);
    assert!(!Path::new(&out).exists());
    assert_eq!(staging_leftovers(&dir), 0);
}

/// Single band 36x18 grid of the given GDAL type on the fixture's georeferencing
fn typed_fixture(dir: &Path, name: &str, data_type: BandType) -> (Dataset, String) {
    let path = dir.join(name).to_str().unwrap().to_string();
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let c_path = CString::new(path.as_str()).unwrap();
    let mut dataset = unsafe {
        let handle = gdal_sys::GDALCreate(
            driver.c_driver(),
            c_path.as_ptr(),
            WIDTH as c_int,
            HEIGHT as c_int,
            1,
            data_type.0,
            ptr::null_mut(),
        );
        assert!(!handle.is_null());
        Dataset::from_c_dataset(handle)
    };
    dataset.set_geo_transform(&GEO_TRANSFORM).unwrap();
    dataset.set_spatial_ref(&SpatialRef::from_epsg(4326).unwrap()).unwrap();
    (dataset, path)
}

/// Complex pixel (x, y) holds x + yi
fn complex_value(x: usize, y: usize) -> [i16; 2] {
    [x as i16, y as i16]
}

fn complex_io(dataset: &Dataset, flag: gdal_sys::GDALRWFlag::Type, data: &mut [[i16; 2]]) {
    let (w, h) = dataset.raster_size();
    assert_eq!(data.len(), w * h);
    let band = dataset.rasterband(1).unwrap();
    let err = unsafe {
        gdal_sys::GDALRasterIO(
            band.c_rasterband(),
            flag,
            0,
            0,
            w as c_int,
            h as c_int,
            data.as_mut_ptr() as *mut c_void,
            w as c_int,
            h as c_int,
            BandType::CINT16.0,
            0,
            0,
        )
    };
    assert_eq!(err, gdal_sys::CPLErr::CE_None);
}

fn complex_source(dir: &TempDir) -> String {
    let (dataset, path) = typed_fixture(dir.path(), "cint16.tif", BandType::CINT16);
    let mut data: Vec<[i16; 2]> = (0..HEIGHT)
        .flat_map(|y| (0..WIDTH).map(move |x| complex_value(x, y)))
        .collect();
    complex_io(&dataset, gdal_sys::GDALRWFlag::GF_Write, &mut data);
    path
}

#[test]
fn complex_bands_keep_their_type_through_the_virtual_path() {
    let dir = tempfile::tempdir().unwrap();
    let source = complex_source(&dir);
    let out = output(&dir, "pacific.tif");
    let request = RetrievalRequest::new(&source, &out)
        .with_bbox(BoundingBox::new(166.0, 10.0, -164.0, -10.0));
    retrieve(&request).unwrap();

    let copy = Dataset::open(&out).unwrap();
    assert_eq!(copy.raster_size(), (4, 3));
    assert_eq!(BandType::of(&copy.rasterband(1).unwrap()), BandType::CINT16);
    let mut data = vec![[0i16; 2]; 12];
    complex_io(&copy, gdal_sys::GDALRWFlag::GF_Read, &mut data);
    let expected: Vec<[i16; 2]> = (8..11)
        .flat_map(|y| [35, 0, 1, 2].into_iter().map(move |x| complex_value(x, y)))
        .collect();
    assert_eq!(data, expected);
}

#[test]
fn complex_bands_cannot_be_materialized() {
    let dir = tempfile::tempdir().unwrap();
    let source = complex_source(&dir);
    let out = output(&dir, "complex.tif");
    let request = RetrievalRequest::new(&source, &out)
        .with_options(with_mode(WriteMode::Materialized));
    let err = retrieve(&request).unwrap_err();
    assert!(matches!(err, Error::UnsupportedBandType { ref data_type } if data_type == "CInt16"));
    assert!(!Path::new(&out).exists());
    assert_eq!(staging_leftovers(&dir), 0);
}

#[rstest]
#[case(WriteMode::Virtual)]
#[case(WriteMode::Materialized)]
fn int64_values_are_copied_exactly(#[case] mode: WriteMode) {
    let dir = tempfile::tempdir().unwrap();
    let source = {
        let (dataset, path) = typed_fixture(dir.path(), "int64.tif", BandType::INT64);
        // beyond the 53 bit mantissa of an f64
        let data: Vec<i64> = (0..WIDTH * HEIGHT)
            .map(|i| i64::MAX - i as i64)
            .collect();
        let mut buf = Buffer::new((WIDTH, HEIGHT), data);
        dataset
            .rasterband(1)
            .unwrap()
            .write((0, 0), (WIDTH, HEIGHT), &mut buf)
            .unwrap();
        path
    };
    let out = output(&dir, "europe.tif");
    let request = RetrievalRequest::new(&source, &out)
        .with_bbox(BoundingBox::new(-8.0125, 53.0125, 12.0125, 37.9875))
        .with_options(with_mode(mode));
    retrieve(&request).unwrap();

    let copy = Dataset::open(&out).unwrap();
    let band = copy.rasterband(1).unwrap();
    assert_eq!(BandType::of(&band), BandType::INT64);
    let buf: Buffer<i64> = band.read_as((0, 0), (3, 3), (3, 3), None).unwrap();
    let expected: Vec<i64> = (3..6)
        .flat_map(|y| (17..20).map(move |x| i64::MAX - (y * WIDTH + x) as i64))
        .collect();
    assert_eq!(buf.data(), expected.as_slice());
}

#[test]
fn bbox_needs_georeferencing() {
    let dir = tempfile::tempdir().unwrap();
    let source = fixture(dir.path(), false);
    let source = source.to_str().unwrap();

    let out = output(&dir, "full.tif");
    retrieve(&RetrievalRequest::new(source, &out)).unwrap();
    assert_eq!(Dataset::open(&out).unwrap().raster_size(), (WIDTH, HEIGHT));

    let out = output(&dir, "window.tif");
    let err = retrieve(
        &RetrievalRequest::new(source, &out).with_bbox(BoundingBox::new(-10.0, 10.0, 10.0, -10.0)),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Georeferencing(_)));
    assert!(err.to_string().contains("subdataset"));
    assert!(!Path::new(&out).exists());
}

#[test]
fn missing_source_or_output_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let out = output(&dir, "out.tif");
    let err = retrieve(&RetrievalRequest::new("", &out)).unwrap_err();
    assert_eq!(err.to_string(), "No source specified");
    let err = retrieve(&RetrievalRequest::new("gfs.tif", "")).unwrap_err();
    assert_eq!(err.to_string(), "No target filename specified");
}
