//! High-level library API: describe a retrieval with `RetrievalRequest` and run it
//! with `retrieve`. Prefer these entrypoints over the `core` and `io` building
//! blocks when integrating geosub.
use std::fmt;

use tracing::{debug, info, warn};

use crate::core::assemble::assemble;
use crate::core::params::RetrieveOptions;
use crate::core::selector::{BandSelector, select_bands};
use crate::core::window;
use crate::error::{Error, Result};
use crate::io::gdal::GdalSource;
use crate::io::writers::{
    StagedOutput, VirtualDataset, create_copy, materialize, resolve_output_driver,
};
use crate::types::{BoundingBox, PixelWindow, WriteMode};

/// Receives human-readable progress messages
pub type VerboseSink = Box<dyn Fn(&str) + Send + Sync>;

/// One extraction: which source, which bands, which area, and where to write it
pub struct RetrievalRequest {
    /// Anything GDAL can open: path, `/vsicurl/` URL, subdataset name...
    pub source: String,
    /// Destination path; the format follows `options.output_format` or the extension
    pub output: String,
    /// None selects every band
    pub bands: Option<Vec<BandSelector>>,
    /// None keeps the full extent
    pub bbox: Option<BoundingBox>,
    pub verbose: Option<VerboseSink>,
    pub options: RetrieveOptions,
}

impl RetrievalRequest {
    pub fn new<S: Into<String>, O: Into<String>>(source: S, output: O) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            bands: None,
            bbox: None,
            verbose: None,
            options: RetrieveOptions::default(),
        }
    }

    pub fn with_bands(mut self, bands: Vec<BandSelector>) -> Self {
        self.bands = Some(bands);
        self
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_verbose<F: Fn(&str) + Send + Sync + 'static>(mut self, sink: F) -> Self {
        self.verbose = Some(Box::new(sink));
        self
    }

    pub fn with_options(mut self, options: RetrieveOptions) -> Self {
        self.options = options;
        self
    }

    fn say(&self, message: &str) {
        debug!("{}", message);
        if let Some(sink) = &self.verbose {
            sink(message);
        }
    }
}

impl fmt::Debug for RetrievalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalRequest")
            .field("source", &self.source)
            .field("output", &self.output)
            .field("bands", &self.bands)
            .field("bbox", &self.bbox)
            .field("verbose", &self.verbose.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// Steps of a retrieval
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Stage {
    Idle,
    Opening,
    ResolvingWindow,
    SelectingBands,
    Assembling,
    Writing,
    Closed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Opening => "opening",
            Stage::ResolvingWindow => "resolving window",
            Stage::SelectingBands => "selecting bands",
            Stage::Assembling => "assembling",
            Stage::Writing => "writing",
            Stage::Closed => "closed",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Writer progress as shown to the user, e.g. `42% copied band 3`
pub fn progress_message(fraction: f64, message: &str) -> String {
    let pct = (fraction * 100.0).round() as i64;
    format!("{}% {}", pct, message).trim_end().to_string()
}

/// A retrieval in progress. Every handle it opens is released when `run` returns.
pub struct Retrieval<'a> {
    request: &'a RetrievalRequest,
    stage: Stage,
}

impl<'a> Retrieval<'a> {
    pub fn new(request: &'a RetrievalRequest) -> Self {
        Self {
            request,
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        debug!("Retrieval stage {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    pub fn run(&mut self) -> Result<()> {
        match self.execute() {
            Ok(()) => {
                self.enter(Stage::Closed);
                Ok(())
            }
            Err(e) => {
                warn!("Retrieval from {} failed in {}: {}", self.request.source, self.stage, e);
                self.enter(Stage::Failed);
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<()> {
        let request = self.request;
        if request.source.is_empty() {
            return Err(Error::MissingSource);
        }
        if request.output.is_empty() {
            return Err(Error::MissingOutput);
        }
        let options = &request.options;
        let _scope = options.source.enter();

        self.enter(Stage::Opening);
        request.say(&format!("retrieving {}", request.source));
        let source = GdalSource::open(&request.source, &options.source)?;
        let info = &source.info;
        request.say(&format!(
            "identified {} {}:{} dataset with {} bands",
            info.driver,
            info.size.width,
            info.size.height,
            info.bands.len()
        ));

        self.enter(Stage::ResolvingWindow);
        let window = match &request.bbox {
            Some(bbox) => {
                let transform = source.pixel_transform()?;
                window::resolve(Some(bbox), info.size, &transform)?
            }
            None => PixelWindow::full(info.size),
        };

        self.enter(Stage::SelectingBands);
        let bands = select_bands(request.bands.as_deref(), &info.bands);

        self.enter(Stage::Assembling);
        let plan = assemble(info, &bands, &window)?;
        let ids = plan
            .band_ids()
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",");
        request.say(&format!("retrieving {}, bands {}", window, ids));

        self.enter(Stage::Writing);
        let driver = resolve_output_driver(
            &request.output,
            options.output_format.as_deref(),
            &info.driver,
        )?;
        let staged = StagedOutput::new(&request.output)?;
        let progress = |fraction: f64, message: &str| {
            request.say(&progress_message(fraction, message));
        };
        let written = match options.mode {
            WriteMode::Virtual => {
                let vrt = VirtualDataset::create(&plan, &options.source)?;
                let dataset = vrt.open()?;
                create_copy(
                    &dataset,
                    &driver,
                    staged.write_path(),
                    &options.creation_options,
                    &progress,
                )?
            }
            WriteMode::Materialized => {
                let dataset = materialize(&plan, &options.source, options.jobs, &progress)?;
                create_copy(
                    &dataset,
                    &driver,
                    staged.write_path(),
                    &options.creation_options,
                    &progress,
                )?
            }
        };
        // the output is only complete once the driver has closed it
        drop(written);
        drop(source);
        staged.commit()?;

        info!(
            "Retrieved {} bands ({}) from {} into {}",
            plan.bands.len(),
            window,
            request.source,
            request.output
        );
        request.say(&format!("wrote {}", request.output));
        Ok(())
    }
}

/// Extracts the selected bands and window of `request.source` into `request.output`
pub fn retrieve(request: &RetrievalRequest) -> Result<()> {
    Retrieval::new(request).run()
}
