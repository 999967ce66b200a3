//! Grid file format table.

use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::error::{CsError, CsResult};
use crate::grid::japan::JapanGrid;
use crate::grid::ostn02::Ostn02Grid;
use crate::grid::provider::FileProvider;
use crate::grid::{GridFile, GridOptions};

pub type OpenFn = fn(&Path, Arc<dyn FileProvider>, GridOptions) -> Box<dyn GridFile>;

pub struct GridFormatEntry {
    pub key: &'static str,
    pub code: u16,
    /// EPSG operation method code, 0 when there is none.
    pub epsg: u16,
    pub description: &'static str,
    /// Lower-case source file extensions that identify the format.
    pub extensions: &'static [&'static str],
    /// File name prefix that identifies the format, upper case.
    pub name_prefix: &'static str,
    pub open: OpenFn,
}

fn open_japan(path: &Path, provider: Arc<dyn FileProvider>, options: GridOptions) -> Box<dyn GridFile> {
    Box::new(JapanGrid::new(path, provider, options))
}

fn open_ostn02(path: &Path, provider: Arc<dyn FileProvider>, options: GridOptions) -> Box<dyn GridFile> {
    Box::new(Ostn02Grid::new(path, provider, options))
}

pub static FORMATS: &[GridFormatEntry] = &[
    GridFormatEntry {
        key: "JAPAN",
        code: 1,
        epsg: 0,
        description: "Japanese mesh-code grid (Tokyo to JGD2000)",
        extensions: &["par", "_par"],
        name_prefix: "",
        open: open_japan,
    },
    GridFormatEntry {
        key: "OSTN02",
        code: 2,
        epsg: 9633,
        description: "Ordnance Survey OSTN02 National Grid shifts (ETRS89 to OSGB36)",
        extensions: &["_02"],
        name_prefix: "OSTN02",
        open: open_ostn02,
    },
];

/// Find a format by key, ignoring case.
pub fn lookup(key: &str) -> Option<&'static GridFormatEntry> {
    let key = key.trim();
    FORMATS.iter().find(|f| f.key.eq_ignore_ascii_case(key))
}

/// Guess the format of a grid file from its name.
pub fn detect(path: &Path) -> Option<&'static GridFormatEntry> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_uppercase)
        .unwrap_or_default();
    let found = FORMATS.iter().find(|f| {
        f.extensions.contains(&ext.as_str())
            || (!f.name_prefix.is_empty() && stem.starts_with(f.name_prefix))
    });
    if found.is_none() {
        debug!("no grid format recognises {}", path.display());
    }
    found
}

/// Open `path` as `format`, or as its detected format when `format` is `None`.
pub fn open(
    path: &Path,
    format: Option<&str>,
    provider: Arc<dyn FileProvider>,
    options: GridOptions,
) -> CsResult<Box<dyn GridFile>> {
    let entry = match format {
        Some(key) => lookup(key).ok_or_else(|| CsError::UnknownGridFormat(key.to_string()))?,
        None => detect(path)
            .ok_or_else(|| CsError::UnknownGridFormat(path.display().to_string()))?,
    };
    Ok((entry.open)(path, provider, options))
}
