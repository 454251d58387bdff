use std::io::Write;

use tracing::info;
use tracing_subscriber::EnvFilter;

use geosub::core::params::parse_key_value;
use geosub::{
    BandSelector, BoundingBox, JobConfig, RetrievalRequest, RetrieveOptions, SourceConfig,
    retrieve,
};

use super::args::CliArgs;
use super::errors::AppError;

pub const USAGE: &str =
    "geosub [-b band1,band2...] [-w left,top,right,bottom] [-v] [-q] url destination";

/// How progress messages reach the terminal
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Verbosity {
    Quiet,
    Dots,
    Lines,
}

impl Verbosity {
    pub fn from_args(args: &CliArgs) -> Self {
        if args.quiet {
            Verbosity::Quiet
        } else if args.verbose {
            Verbosity::Lines
        } else {
            Verbosity::Dots
        }
    }
}

fn print_message(verbosity: Verbosity, message: &str) {
    match verbosity {
        Verbosity::Quiet => {}
        Verbosity::Dots => {
            let mut out = std::io::stdout();
            let _ = write!(out, ".");
            let _ = out.flush();
        }
        Verbosity::Lines => println!("{}", message),
    }
}

fn checked_options(option: &str, values: &[String]) -> Result<Vec<String>, AppError> {
    values
        .iter()
        .map(|value| {
            parse_key_value(value)
                .map(|_| value.clone())
                .map_err(|_| AppError::InvalidOption {
                    option: option.to_string(),
                    value: value.clone(),
                })
        })
        .collect()
}

fn source_config(args: &CliArgs) -> Result<SourceConfig, AppError> {
    let mut config = SourceConfig::default();
    for value in &args.config_options {
        let (key, val) = parse_key_value(value).map_err(|_| AppError::InvalidOption {
            option: "--config".to_string(),
            value: value.clone(),
        })?;
        config.config_options.retain(|(k, _)| !k.eq_ignore_ascii_case(&key));
        config.config_options.push((key, val));
    }
    config.open_options = checked_options("--oo", &args.open_options)?;
    Ok(config)
}

/// Builds the library request from the command line; -b and -w override the job file
pub fn build_request(args: &CliArgs) -> Result<RetrievalRequest, AppError> {
    let job = match &args.job {
        Some(path) => JobConfig::from_path(path).map_err(|e| AppError::JobFile {
            path: path.clone(),
            reason: e.to_string(),
        })?,
        None => JobConfig::default(),
    };

    let bands = match &args.bands {
        Some(list) => Some(BandSelector::parse_list(list)?),
        None => job.bands,
    };
    let bbox = match &args.window {
        Some(window) => Some(window.parse::<BoundingBox>()?),
        None => job.bbox,
    };

    let options = RetrieveOptions {
        mode: args.mode,
        jobs: args.jobs,
        output_format: args.output_format.clone(),
        creation_options: checked_options("--co", &args.creation_options)?,
        source: source_config(args)?,
    };

    let mut request = RetrievalRequest::new(
        args.source.clone().unwrap_or_default(),
        args.destination.clone().unwrap_or_default(),
    )
    .with_options(options);
    request.bands = bands;
    request.bbox = bbox;
    Ok(request)
}

pub fn run(args: CliArgs) -> Result<(), AppError> {
    if args.log {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let verbosity = Verbosity::from_args(&args);
    let request = build_request(&args)?
        .with_verbose(move |message: &str| print_message(verbosity, message));
    info!("Starting retrieval: {:?}", request);

    let result = retrieve(&request);
    if verbosity == Verbosity::Dots {
        println!();
    }
    result.map_err(AppError::from)
}
