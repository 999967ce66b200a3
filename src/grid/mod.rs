//! Datum shift grid files.
//!
//! Each format compiles its ASCII distribution file into a binary form on
//! first use and answers shift queries through [`GridFile`].

pub mod bilinear;
pub mod catalog;
pub mod japan;
pub mod ostn02;
pub mod provider;
pub mod registry;

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::datum::Iteration;
use crate::error::{CsError, CsResult, ShiftStatus};
use crate::grid::provider::FileProvider;

/// Default read buffer for binary grid files, bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    /// Buffer size for binary files; a file that fits is read whole.
    pub buffer_size: usize,
    /// Rebuild binary files from their source even when up to date.
    pub regenerate: bool,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            regenerate: false,
        }
    }
}

/// One opened (or openable) grid file. Points are `[lng, lat]` in degrees.
///
/// Objects open their files lazily and keep state between queries, so they
/// take `&mut self` and are not shared between threads.
pub trait GridFile: Send {
    fn path(&self) -> &Path;

    /// Registry key of the format.
    fn format(&self) -> &'static str;

    fn covers(&mut self, ll: [f64; 2]) -> CsResult<bool>;

    /// Shifted point, `None` outside the grid.
    fn forward(&mut self, ll: [f64; 2]) -> CsResult<Option<[f64; 2]>>;

    /// Point whose forward shift is `ll`, `None` outside the grid.
    fn inverse(&mut self, ll: [f64; 2], iteration: &Iteration) -> CsResult<Option<([f64; 2], ShiftStatus)>>;

    /// Close the file and drop buffers. Coverage metadata survives.
    fn release(&mut self);
}

/// Make sure `binary` exists and is not older than `source`, compiling it
/// with `build` when needed. A binary without its source is used as is.
pub(crate) fn materialize<F>(
    provider: &dyn FileProvider,
    source: &Path,
    binary: &Path,
    regenerate: bool,
    build: F,
) -> CsResult<()>
where
    F: FnOnce(&str) -> CsResult<Vec<u8>>,
{
    let src_time = provider.modified(source)?;
    let bin_time = provider.modified(binary)?;
    let stale = match (src_time, bin_time) {
        (None, None) => return Err(CsError::FileNotFound(source.to_path_buf())),
        (None, Some(_)) => false,
        (Some(_), None) => true,
        (Some(src), Some(bin)) => regenerate || src > bin,
    };
    if !stale {
        return Ok(());
    }
    let text = provider.read_to_string(source)?;
    let bytes = build(&text)?;
    provider.write(binary, &bytes)?;
    info!(
        "compiled {} into {} ({} bytes)",
        source.display(),
        binary.display(),
        bytes.len()
    );
    Ok(())
}
