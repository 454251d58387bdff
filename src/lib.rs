#![doc = r#"
geosub: extract bands and geographic windows from GDAL rasters.

This crate copies a subset of a raster dataset (selected bands, and/or the pixels
covering a WGS84 bounding box) into a new dataset, preserving data types,
georeferencing and metadata. Any source GDAL can open works: local files,
`/vsicurl/` URLs (e.g. NOAA GFS GRIB2 files), subdatasets. Bounding boxes crossing
the antimeridian of a 0..360° grid are stitched from two reads.

It powers the `geosub` CLI and can be embedded in your own Rust applications.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Quick start
-----------
```rust,no_run
use geosub::{retrieve, BandSelector, BoundingBox, RetrievalRequest};

fn main() -> geosub::Result<()> {
    let request = RetrievalRequest::new(
        "/vsicurl/https://noaa-gfs-bdp-pds.s3.amazonaws.com/gfs.20240101/06/atmos/gfs.t06z.pgrb2.0p25.f010",
        "europe.grb2",
    )
    .with_bands(BandSelector::parse_list("/^2\\[m\\] HTGL/,10")?)
    .with_bbox(BoundingBox::new(-8.0125, 53.0125, 12.0125, 37.9875))
    .with_verbose(|msg| println!("{msg}"));

    retrieve(&request)
}
```

Band selectors
--------------
A request without selectors keeps every band. Otherwise a band is kept when any
selector matches it; a selector matches when all of its fields do:
- `id`: the 1-based band number,
- `description`: substring of the band description, or a regex written `/.../`,
- `metadata`: each key must be present; values compare exactly, or by regex.

Selectors can also come from JSON (`{"id": 3}`, `{"metaData": {"GRIB_ELEMENT": "TMP"}}`),
see [`JobConfig`].

Materialized writes
-------------------
By default the output is encoded straight from a virtual (VRT) description of the
window. With [`WriteMode::Materialized`] bands are first copied concurrently (bounded
by `RetrieveOptions::jobs`) into an in-memory dataset:

```rust,no_run
use geosub::{retrieve, RetrievalRequest, RetrieveOptions, WriteMode};

fn main() -> geosub::Result<()> {
    let options = RetrieveOptions {
        mode: WriteMode::Materialized,
        jobs: 4,
        creation_options: vec!["COMPRESS=DEFLATE".to_string()],
        ..RetrieveOptions::default()
    };
    retrieve(&RetrievalRequest::new("input.grb2", "output.tif").with_options(options))
}
```

Error handling
--------------
All public functions return `geosub::Result<T>`; match on `geosub::Error` to handle
specific cases.

```rust,no_run
use geosub::{retrieve, Error, RetrievalRequest};

fn main() {
    match retrieve(&RetrievalRequest::new("input.nc", "out.tif")) {
        Ok(()) => {}
        Err(Error::NoBandsSelected) => eprintln!("nothing matched"),
        Err(Error::Georeferencing(msg)) => eprintln!("{msg}"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: high-level entry points.
- [`core`]: band selection, window resolution and output assembly.
- [`types`]: bounding boxes, pixel windows and band snapshots.
- [`io`]: GDAL source adapter and output writers.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use crate::core::params::{DEFAULT_JOBS, JobConfig, RetrieveOptions, SourceConfig};
pub use crate::core::selector::{BandSelector, MatchValue};
pub use error::{Error, Result};
pub use types::{BandInfo, BandType, BoundingBox, PixelWindow, RasterSize, SourceInfo, WriteMode};

// High-level API re-exports
pub use api::{RetrievalRequest, Stage, VerboseSink, progress_message, retrieve};
