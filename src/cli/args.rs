use clap::Parser;
use std::path::PathBuf;

use geosub::{DEFAULT_JOBS, WriteMode};

#[derive(Parser, Debug)]
#[command(
    name = "geosub",
    version,
    about = "Extract bands and/or a geographic window from a GDAL raster"
)]
pub struct CliArgs {
    /// Source dataset: path, URL (/vsicurl/...) or GDAL subdataset name
    pub source: Option<String>,

    /// Output filename
    pub destination: Option<String>,

    /// Bands to keep, comma separated: band numbers, description substrings or /regex/
    #[arg(short = 'b', long = "bands", value_name = "band1,band2...")]
    pub bands: Option<String>,

    /// Bounding box in WGS84 degrees
    #[arg(
        short = 'w',
        long = "window",
        value_name = "left,top,right,bottom",
        allow_hyphen_values = true
    )]
    pub window: Option<String>,

    /// JSON job file with `bands` selectors and `bbox`; -b and -w take precedence
    #[arg(short = 'j', long = "job")]
    pub job: Option<PathBuf>,

    /// Print one line per progress message
    #[arg(short, long, default_value_t = false, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Print nothing, not even errors
    #[arg(short, long, default_value_t = false)]
    pub quiet: bool,

    /// Output driver short name (e.g. GTiff, GRIB, netCDF); inferred from the extension otherwise
    #[arg(long = "of", value_name = "DRIVER")]
    pub output_format: Option<String>,

    /// Output creation option (repeatable)
    #[arg(long = "co", value_name = "KEY=VALUE")]
    pub creation_options: Vec<String>,

    /// Source open option (repeatable)
    #[arg(long = "oo", value_name = "KEY=VALUE")]
    pub open_options: Vec<String>,

    /// GDAL configuration option applied while reading (repeatable)
    #[arg(long = "config", value_name = "KEY=VALUE")]
    pub config_options: Vec<String>,

    /// Write straight from a virtual dataset, or copy bands into memory first
    #[arg(long, value_enum, default_value_t = WriteMode::Virtual)]
    pub mode: WriteMode,

    /// Concurrent band copies in materialized mode
    #[arg(long, default_value_t = DEFAULT_JOBS)]
    pub jobs: usize,

    /// Enable logging
    #[arg(long, default_value_t = false)]
    pub log: bool,
}
