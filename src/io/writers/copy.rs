//! Encoding the assembled dataset into the destination: output driver inference,
//! staging through a temporary file, and `GDALCreateCopy` with progress reporting.
use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::path::{Path, PathBuf};

use gdal::cpl::CslStringList;
use gdal::{Dataset, Driver, DriverManager, Metadata};
use tempfile::TempPath;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Receives incremental progress from a writer
pub trait Progress {
    fn on_progress(&self, fraction: f64, message: &str);
}

impl<F: Fn(f64, &str)> Progress for F {
    fn on_progress(&self, fraction: f64, message: &str) {
        self(fraction, message)
    }
}

fn capability(driver: &Driver, key: &str) -> bool {
    driver
        .metadata_item(key, "")
        .is_some_and(|v| v.eq_ignore_ascii_case("YES"))
}

fn can_write(driver: &Driver) -> bool {
    capability(driver, "DCAP_CREATECOPY") || capability(driver, "DCAP_CREATE")
}

fn extensions(driver: &Driver) -> Vec<String> {
    driver
        .metadata_item("DMD_EXTENSIONS", "")
        .map(|s| s.split_whitespace().map(|e| e.to_ascii_lowercase()).collect())
        .unwrap_or_default()
}

/// First writable raster driver declaring the extension
pub fn driver_for_extension(ext: &str) -> Option<Driver> {
    let ext = ext.to_ascii_lowercase();
    (0..DriverManager::count())
        .filter_map(|i| DriverManager::get_driver(i).ok())
        .find(|d| capability(d, "DCAP_RASTER") && can_write(d) && extensions(d).contains(&ext))
}

/// Picks the output driver: an explicit name, else the destination extension,
/// else the driver that read the source.
pub fn resolve_output_driver(
    destination: &str,
    format: Option<&str>,
    source_driver: &str,
) -> Result<Driver> {
    DriverManager::register_all();
    let driver = if let Some(name) = format {
        DriverManager::get_driver_by_name(name)
            .map_err(|e| Error::Driver(format!("unknown driver {}: {}", name, e)))?
    } else if let Some(driver) = Path::new(destination)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(driver_for_extension)
    {
        driver
    } else {
        DriverManager::get_driver_by_name(source_driver)
            .map_err(|e| Error::Driver(format!("unknown driver {}: {}", source_driver, e)))?
    };
    if !can_write(&driver) {
        return Err(Error::Driver(format!(
            "{} cannot write datasets",
            driver.short_name()
        )));
    }
    debug!("Writing {} with {}", destination, driver.short_name());
    Ok(driver)
}

/// Destination written through a temporary sibling file and renamed into place on commit.
/// GDAL virtual file system destinations (`/vsi...`) are written in place.
pub struct StagedOutput {
    destination: PathBuf,
    temp: Option<TempPath>,
}

impl StagedOutput {
    pub fn new(destination: &str) -> Result<Self> {
        let path = PathBuf::from(destination);
        if destination.starts_with("/vsi") {
            return Ok(Self {
                destination: path,
                temp: None,
            });
        }
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix(".geosub-").suffix(&suffix);
        // same mode as a freshly created file, the umask still applies
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(0o666));
        }
        let temp = builder.tempfile_in(dir)?.into_temp_path();
        Ok(Self {
            destination: path,
            temp: Some(temp),
        })
    }

    /// Path the writer should create
    pub fn write_path(&self) -> &Path {
        match &self.temp {
            Some(temp) => temp,
            None => &self.destination,
        }
    }

    /// Moves the finished file (and a GDAL `.aux.xml` sidecar, if any) to the destination
    pub fn commit(self) -> Result<()> {
        let Some(temp) = self.temp else {
            return Ok(());
        };
        let sidecar = aux_xml(&temp);
        temp.persist(&self.destination).map_err(|e| e.error)?;
        if sidecar.exists() {
            std::fs::rename(&sidecar, aux_xml(&self.destination))?;
        }
        Ok(())
    }
}

fn aux_xml(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".aux.xml");
    PathBuf::from(name)
}

unsafe extern "C" fn progress_trampoline(
    complete: f64,
    message: *const c_char,
    arg: *mut c_void,
) -> c_int {
    let progress = unsafe { &*(arg as *const &dyn Progress) };
    let message = if message.is_null() {
        Cow::Borrowed("")
    } else {
        unsafe { CStr::from_ptr(message) }.to_string_lossy()
    };
    progress.on_progress(complete, &message);
    1
}

fn last_cpl_error() -> String {
    let msg = unsafe { gdal_sys::CPLGetLastErrorMsg() };
    if msg.is_null() {
        return "unknown error".to_string();
    }
    let text = unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned();
    unsafe { gdal_sys::CPLErrorReset() };
    text
}

/// Encodes `source` into `path` with `driver`, reporting progress as it goes
pub fn create_copy(
    source: &Dataset,
    driver: &Driver,
    path: &Path,
    creation_options: &[String],
    progress: &dyn Progress,
) -> Result<Dataset> {
    let c_path = CString::new(path.to_string_lossy().as_bytes())
        .map_err(|e| Error::Driver(format!("invalid output path: {}", e)))?;
    let mut options = CslStringList::new();
    for option in creation_options {
        options.add_string(option)?;
    }

    let mut progress_ref: &dyn Progress = progress;
    let handle = unsafe {
        gdal_sys::CPLErrorReset();
        gdal_sys::GDALCreateCopy(
            driver.c_driver(),
            c_path.as_ptr(),
            source.c_dataset(),
            0,
            options.as_ptr(),
            Some(progress_trampoline),
            &mut progress_ref as *mut &dyn Progress as *mut c_void,
        )
    };
    if handle.is_null() {
        return Err(Error::Driver(format!(
            "{} failed to write {}: {}",
            driver.short_name(),
            path.display(),
            last_cpl_error()
        )));
    }
    info!("Wrote {} bands to {}", source.raster_count(), path.display());
    Ok(unsafe { Dataset::from_c_dataset(handle) })
}
