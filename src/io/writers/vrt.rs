//! Virtual dataset (GDAL VRT) rendering of an `OutputPlan`, and an in-memory
//! `/vsimem/` file holding it for the duration of a retrieval.
use std::sync::atomic::{AtomicUsize, Ordering};

use gdal::Dataset;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use tracing::{debug, warn};

use crate::core::assemble::{OutputPlan, SourceRegion};
use crate::core::params::SourceConfig;
use crate::error::Result;

static VRT_COUNTER: AtomicUsize = AtomicUsize::new(0);

type XmlWriter = Writer<Vec<u8>>;

fn start(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let elem = BytesStart::new(name).with_attributes(attrs.iter().copied());
    writer.write_event(Event::Start(elem))?;
    Ok(())
}

fn end(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn empty(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let elem = BytesStart::new(name).with_attributes(attrs.iter().copied());
    writer.write_event(Event::Empty(elem))?;
    Ok(())
}

fn text_element(
    writer: &mut XmlWriter,
    name: &str,
    attrs: &[(&str, &str)],
    text: &str,
) -> Result<()> {
    start(writer, name, attrs)?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, name)
}

fn metadata<'a, I>(writer: &mut XmlWriter, items: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut items = items.into_iter().peekable();
    if items.peek().is_none() {
        return Ok(());
    }
    start(writer, "Metadata", &[])?;
    for (key, value) in items {
        text_element(writer, "MDI", &[("key", key.as_str())], value)?;
    }
    end(writer, "Metadata")
}

fn rect(writer: &mut XmlWriter, name: &str, x: usize, y: usize, w: usize, h: usize) -> Result<()> {
    let (x, y, w, h) = (x.to_string(), y.to_string(), w.to_string(), h.to_string());
    empty(
        writer,
        name,
        &[
            ("xOff", x.as_str()),
            ("yOff", y.as_str()),
            ("xSize", w.as_str()),
            ("ySize", h.as_str()),
        ],
    )
}

fn simple_source(
    writer: &mut XmlWriter,
    plan: &OutputPlan,
    source_id: usize,
    region: &SourceRegion,
    config: &SourceConfig,
) -> Result<()> {
    start(writer, "SimpleSource", &[])?;
    text_element(writer, "SourceFilename", &[("relativeToVRT", "0")], &plan.source)?;
    if !config.open_options.is_empty() {
        start(writer, "OpenOptions", &[])?;
        for option in &config.open_options {
            let (key, value) = option.split_once('=').unwrap_or((option.as_str(), ""));
            text_element(writer, "OOI", &[("key", key)], value)?;
        }
        end(writer, "OpenOptions")?;
    }
    text_element(writer, "SourceBand", &[], &source_id.to_string())?;
    rect(
        writer,
        "SrcRect",
        region.src_x,
        region.src_y,
        region.width,
        region.height,
    )?;
    rect(
        writer,
        "DstRect",
        region.dst_x,
        region.dst_y,
        region.width,
        region.height,
    )?;
    end(writer, "SimpleSource")
}

/// Renders the plan as a VRT document referencing the source by locator
pub fn render_vrt(plan: &OutputPlan, config: &SourceConfig) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let (width, height) = (plan.width.to_string(), plan.height.to_string());
    start(
        &mut writer,
        "VRTDataset",
        &[
            ("rasterXSize", width.as_str()),
            ("rasterYSize", height.as_str()),
        ],
    )?;

    if let Some(srs) = &plan.projection {
        text_element(&mut writer, "SRS", &[], srs)?;
    }
    if let Some(gt) = &plan.geo_transform {
        let gt = gt.iter().map(f64::to_string).collect::<Vec<_>>().join(", ");
        text_element(&mut writer, "GeoTransform", &[], &gt)?;
    }
    metadata(&mut writer, &plan.metadata)?;

    for (index, band) in plan.bands.iter().enumerate() {
        let band_number = (index + 1).to_string();
        let data_type = band.data_type.name();
        start(
            &mut writer,
            "VRTRasterBand",
            &[
                ("dataType", data_type.as_str()),
                ("band", band_number.as_str()),
            ],
        )?;
        if !band.description.is_empty() {
            text_element(&mut writer, "Description", &[], &band.description)?;
        }
        if let Some(no_data) = band.no_data {
            text_element(&mut writer, "NoDataValue", &[], &no_data.to_string())?;
        }
        metadata(&mut writer, &band.metadata)?;
        for region in &band.regions {
            simple_source(&mut writer, plan, band.source_id, region, config)?;
        }
        end(&mut writer, "VRTRasterBand")?;
    }

    end(&mut writer, "VRTDataset")?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// VRT document stored under `/vsimem/`, unlinked on drop
pub struct VirtualDataset {
    path: String,
}

impl VirtualDataset {
    pub fn create(plan: &OutputPlan, config: &SourceConfig) -> Result<Self> {
        let xml = render_vrt(plan, config)?;
        debug!("VRT for {}:\n{}", plan.source, xml);
        let path = format!(
            "/vsimem/geosub-{}-{}.vrt",
            std::process::id(),
            VRT_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        gdal::vsi::create_mem_file(&path, xml.into_bytes())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn open(&self) -> Result<Dataset> {
        Ok(Dataset::open(&self.path)?)
    }
}

impl Drop for VirtualDataset {
    fn drop(&mut self) {
        if let Err(e) = gdal::vsi::unlink_mem_file(&self.path) {
            warn!("Cannot release {}: {}", self.path, e);
        }
    }
}
