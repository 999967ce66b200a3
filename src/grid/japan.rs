//! Japanese mesh-code datum shift grid (Tokyo → JGD2000, `.par` files).
//!
//! The ASCII source lists one third-order mesh cell per line with its
//! latitude and longitude shifts in arc-seconds. On first use it is compiled
//! into a sorted binary file next to the source (extension `_par`), which is
//! then searched by mesh code. Binary layout, little endian, 12 bytes per
//! record:
//!
//! ```text
//! u32 mesh code | i32 dlat (sec·1e5) | i32 dlng (sec·1e5)
//! ```
//!
//! The first two records are sentinels with mesh codes 1 and 2 carrying the
//! south-west and north-east corners of the coverage in whole seconds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};

use crate::datum::{iterate_inverse, Iteration};
use crate::error::{CsError, CsResult, ShiftStatus};
use crate::grid::bilinear::{interpolate, Corners};
use crate::grid::provider::{FileProvider, GridReader};
use crate::grid::{materialize, GridFile, GridOptions};

pub const RECORD_LEN: usize = 12;

const SENTINEL_MIN: u32 = 1;
const SENTINEL_MAX: u32 = 2;

/// Size of a third-order mesh cell, arc-seconds.
pub const CELL_LAT_SEC: i64 = 30;
pub const CELL_LNG_SEC: i64 = 45;

/// Cells per degree of longitude and per 40' of latitude.
const CELLS_PER_PRIMARY: i64 = 80;

const HEADER_LINES: usize = 2;

/// Largest shift accepted from the ASCII source, arc-seconds.
const MAX_SHIFT_SEC: f64 = 60.0;

const SHIFT_SCALE: f64 = 1.0e5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
    pub code: u32,
    pub dlat: i32,
    pub dlng: i32,
}

impl Record {
    fn to_bytes(self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..4].copy_from_slice(&self.code.to_le_bytes());
        out[4..8].copy_from_slice(&self.dlat.to_le_bytes());
        out[8..12].copy_from_slice(&self.dlng.to_le_bytes());
        out
    }

    fn from_bytes(b: &[u8]) -> Self {
        let word = |i: usize| [b[i], b[i + 1], b[i + 2], b[i + 3]];
        Self {
            code: u32::from_le_bytes(word(0)),
            dlat: i32::from_le_bytes(word(4)),
            dlng: i32::from_le_bytes(word(8)),
        }
    }
}

/// Mesh code of the cell with south-west corner `lat_cell`·30", `lng_cell`·45".
fn code_of_cell(lat_cell: i64, lng_cell: i64) -> Option<u32> {
    let p = lat_cell / CELLS_PER_PRIMARY;
    let u = lng_cell / CELLS_PER_PRIMARY - 100;
    if !(0..100).contains(&p) || !(0..100).contains(&u) || lat_cell < 0 || lng_cell < 0 {
        return None;
    }
    let (lat_rem, lng_rem) = (lat_cell % CELLS_PER_PRIMARY, lng_cell % CELLS_PER_PRIMARY);
    let code = p * 1_000_000
        + u * 10_000
        + (lat_rem / 10) * 1_000
        + (lng_rem / 10) * 100
        + (lat_rem % 10) * 10
        + lng_rem % 10;
    u32::try_from(code).ok()
}

/// Mesh code of the cell containing a point given in arc-seconds.
pub fn mesh_code(lat_sec: f64, lng_sec: f64) -> Option<u32> {
    if !(lat_sec.is_finite() && lng_sec.is_finite()) {
        return None;
    }
    let lat_cell = (lat_sec / CELL_LAT_SEC as f64).floor() as i64;
    let lng_cell = (lng_sec / CELL_LNG_SEC as f64).floor() as i64;
    code_of_cell(lat_cell, lng_cell)
}

/// South-west corner of a mesh cell in whole arc-seconds (lat, lng).
pub fn mesh_origin(code: u32) -> Option<(i64, i64)> {
    let code = i64::from(code);
    if code >= 100_000_000 {
        return None;
    }
    let p = code / 1_000_000;
    let u = code / 10_000 % 100;
    let q = code / 1_000 % 10;
    let v = code / 100 % 10;
    let r = code / 10 % 10;
    let w = code % 10;
    if q >= 8 || v >= 8 {
        return None;
    }
    let lat = p * 2400 + q * 300 + r * CELL_LAT_SEC;
    let lng = (u + 100) * 3600 + v * 450 + w * CELL_LNG_SEC;
    Some((lat, lng))
}

/// Whole-file coverage in arc-seconds, south/west inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coverage {
    pub south: i64,
    pub west: i64,
    pub north: i64,
    pub east: i64,
}

impl Coverage {
    pub fn contains(&self, lat_sec: f64, lng_sec: f64) -> bool {
        lat_sec >= self.south as f64
            && lat_sec < self.north as f64
            && lng_sec >= self.west as f64
            && lng_sec < self.east as f64
    }
}

/// Parse the ASCII source. Any malformed line fails the whole file.
pub fn parse_par(path: &Path, text: &str) -> CsResult<Vec<Record>> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate().skip(HEADER_LINES) {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let bad = |what: &str| CsError::format(path, format!("line {line_no}: {what}"));
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(bad(&format!("expected 3 fields, found {}", fields.len())));
        }
        if fields[0].len() != 8 || !fields[0].bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad("mesh code must be 8 digits"));
        }
        let code: u32 = fields[0].parse().map_err(|_| bad("mesh code"))?;
        if mesh_origin(code).is_none() {
            return Err(bad("mesh code digits out of range"));
        }
        let shift = |s: &str| -> CsResult<i32> {
            let value: f64 = s.parse().map_err(|_| bad("shift is not a number"))?;
            if !(value.abs() <= MAX_SHIFT_SEC) {
                return Err(bad("shift out of range"));
            }
            Ok((value * SHIFT_SCALE).round() as i32)
        };
        records.push(Record {
            code,
            dlat: shift(fields[1])?,
            dlng: shift(fields[2])?,
        });
    }
    if records.is_empty() {
        return Err(CsError::format(path, "no grid records"));
    }
    records.sort_by_key(|r| r.code);
    if let Some(pair) = records.windows(2).find(|w| w[0].code == w[1].code) {
        return Err(CsError::format(path, format!("duplicate mesh code {}", pair[0].code)));
    }
    Ok(records)
}

/// Serialise parsed records, prefixed by the coverage sentinels.
pub fn build_binary(records: &[Record]) -> Vec<u8> {
    let mut coverage = Coverage {
        south: i64::MAX,
        west: i64::MAX,
        north: i64::MIN,
        east: i64::MIN,
    };
    for rec in records {
        if let Some((lat, lng)) = mesh_origin(rec.code) {
            coverage.south = coverage.south.min(lat);
            coverage.west = coverage.west.min(lng);
            coverage.north = coverage.north.max(lat + CELL_LAT_SEC);
            coverage.east = coverage.east.max(lng + CELL_LNG_SEC);
        }
    }
    let sentinel = |code, a: i64, b: i64| Record {
        code,
        dlat: a as i32,
        dlng: b as i32,
    };
    let mut out = Vec::with_capacity((records.len() + 2) * RECORD_LEN);
    out.extend_from_slice(&sentinel(SENTINEL_MIN, coverage.south, coverage.west).to_bytes());
    out.extend_from_slice(&sentinel(SENTINEL_MAX, coverage.north, coverage.east).to_bytes());
    for rec in records {
        out.extend_from_slice(&rec.to_bytes());
    }
    out
}

/// Binary path for an ASCII source: `TKY2JGD.par` → `TKY2JGD._par`.
pub fn binary_path(source: &Path) -> PathBuf {
    source.with_extension("_par")
}

/// Buffered record access over the binary file.
struct RecordFile {
    path: PathBuf,
    reader: Box<dyn GridReader>,
    count: usize,
    per_block: usize,
    buffer: Vec<u8>,
    buf_first: usize,
    buf_count: usize,
}

impl RecordFile {
    fn open(path: &Path, reader: Box<dyn GridReader>, buffer_size: usize) -> CsResult<Self> {
        let len = usize::try_from(reader.len())
            .map_err(|_| CsError::OutOfMemory(path.display().to_string()))?;
        if len % RECORD_LEN != 0 || len < 3 * RECORD_LEN {
            return Err(CsError::format(path, format!("bad binary grid size {len}")));
        }
        let count = len / RECORD_LEN;
        let per_block = if buffer_size >= len {
            count
        } else {
            (buffer_size / RECORD_LEN).max(1)
        };
        let mut file = Self {
            path: path.to_path_buf(),
            reader,
            count,
            per_block,
            buffer: Vec::new(),
            buf_first: 0,
            buf_count: 0,
        };
        if per_block == count {
            file.load_block(0)?;
        }
        Ok(file)
    }

    fn load_block(&mut self, first: usize) -> CsResult<()> {
        let n = self.per_block.min(self.count - first);
        self.buffer.resize(n * RECORD_LEN, 0);
        self.reader
            .read_at((first * RECORD_LEN) as u64, &mut self.buffer)?;
        self.buf_first = first;
        self.buf_count = n;
        Ok(())
    }

    fn record(&mut self, index: usize) -> CsResult<Record> {
        if index >= self.count {
            return Err(CsError::Internal(format!(
                "record {index} beyond end of {}",
                self.path.display()
            )));
        }
        if index < self.buf_first || index >= self.buf_first + self.buf_count {
            self.load_block(index - index % self.per_block)?;
        }
        let at = (index - self.buf_first) * RECORD_LEN;
        Ok(Record::from_bytes(&self.buffer[at..at + RECORD_LEN]))
    }

    fn coverage(&mut self) -> CsResult<Coverage> {
        let min = self.record(0)?;
        let max = self.record(1)?;
        if min.code != SENTINEL_MIN || max.code != SENTINEL_MAX {
            return Err(CsError::format(&self.path, "missing coverage sentinels"));
        }
        Ok(Coverage {
            south: i64::from(min.dlat),
            west: i64::from(min.dlng),
            north: i64::from(max.dlat),
            east: i64::from(max.dlng),
        })
    }

    /// Binary search past the sentinels.
    fn find(&mut self, code: u32) -> CsResult<Option<Record>> {
        let (mut lo, mut hi) = (2, self.count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let rec = self.record(mid)?;
            match rec.code.cmp(&code) {
                std::cmp::Ordering::Equal => return Ok(Some(rec)),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Ok(None)
    }
}

/// The last cell used, with its corner shifts.
#[derive(Clone, Copy, Debug)]
struct Cell {
    south: i64,
    west: i64,
    dlat: Corners<i32>,
    dlng: Corners<i32>,
}

impl Cell {
    fn contains(&self, lat_sec: f64, lng_sec: f64) -> bool {
        let (s, w) = (self.south as f64, self.west as f64);
        lat_sec >= s
            && lat_sec < s + CELL_LAT_SEC as f64
            && lng_sec >= w
            && lng_sec < w + CELL_LNG_SEC as f64
    }

    /// Shift in arc-seconds (dlat, dlng).
    fn shift(&self, lat_sec: f64, lng_sec: f64) -> Option<[f64; 2]> {
        let t = (lng_sec - self.west as f64) / CELL_LNG_SEC as f64;
        let u = (lat_sec - self.south as f64) / CELL_LAT_SEC as f64;
        let dlat = interpolate(&self.dlat, t, u)? / SHIFT_SCALE;
        let dlng = interpolate(&self.dlng, t, u)? / SHIFT_SCALE;
        Some([dlat, dlng])
    }
}

pub struct JapanGrid {
    source: PathBuf,
    binary: PathBuf,
    provider: Arc<dyn FileProvider>,
    options: GridOptions,
    coverage: Option<Coverage>,
    file: Option<RecordFile>,
    cell: Option<Cell>,
}

impl JapanGrid {
    /// Nothing is read until the first query.
    pub fn new(source: impl Into<PathBuf>, provider: Arc<dyn FileProvider>, options: GridOptions) -> Self {
        let source = source.into();
        Self {
            binary: binary_path(&source),
            source,
            provider,
            options,
            coverage: None,
            file: None,
            cell: None,
        }
    }

    pub fn coverage(&self) -> Option<Coverage> {
        self.coverage
    }

    /// Compile the binary file if it is missing, older than the source, or
    /// a rebuild is forced.
    fn ensure_binary(&self) -> CsResult<()> {
        materialize(
            self.provider.as_ref(),
            &self.source,
            &self.binary,
            self.options.regenerate,
            |text| {
                let records = parse_par(&self.source, text)?;
                info!("{} mesh records in {}", records.len(), self.source.display());
                Ok(build_binary(&records))
            },
        )
    }

    fn open(&mut self) -> CsResult<&mut RecordFile> {
        if self.file.is_none() {
            self.ensure_binary()?;
            let reader = self.provider.open(&self.binary)?;
            let mut file = RecordFile::open(&self.binary, reader, self.options.buffer_size)?;
            self.coverage = Some(file.coverage()?);
            debug!("opened {} ({} records)", self.binary.display(), file.count - 2);
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| CsError::Internal("grid file vanished after open".into()))
    }

    /// Look up the cell around a point, reusing the cached one when possible.
    fn cell_for(&mut self, lat_sec: f64, lng_sec: f64) -> CsResult<Option<Cell>> {
        if let Some(cell) = self.cell {
            if cell.contains(lat_sec, lng_sec) {
                return Ok(Some(cell));
            }
        }
        let Some(code) = mesh_code(lat_sec, lng_sec) else {
            return Ok(None);
        };
        let Some((south, west)) = mesh_origin(code) else {
            return Ok(None);
        };
        let (lat_cell, lng_cell) = (south / CELL_LAT_SEC, west / CELL_LNG_SEC);

        let file = self.open()?;
        let Some(sw) = file.find(code)? else {
            self.cell = None;
            return Ok(None);
        };
        let mut neighbour = |dlat: i64, dlng: i64| -> CsResult<Record> {
            match code_of_cell(lat_cell + dlat, lng_cell + dlng) {
                Some(c) => Ok(file.find(c)?.unwrap_or(sw)),
                None => Ok(sw),
            }
        };
        let se = neighbour(0, 1)?;
        let nw = neighbour(1, 0)?;
        let ne = neighbour(1, 1)?;

        let cell = Cell {
            south,
            west,
            dlat: Corners {
                sw: sw.dlat,
                se: se.dlat,
                nw: nw.dlat,
                ne: ne.dlat,
            },
            dlng: Corners {
                sw: sw.dlng,
                se: se.dlng,
                nw: nw.dlng,
                ne: ne.dlng,
            },
        };
        debug!("mesh cell {code} loaded");
        self.cell = Some(cell);
        Ok(Some(cell))
    }

    /// Interpolated shift in arc-seconds (dlat, dlng), `None` without coverage.
    pub fn shift(&mut self, ll: [f64; 2]) -> CsResult<Option<[f64; 2]>> {
        if !self.covers(ll)? {
            return Ok(None);
        }
        let (lat_sec, lng_sec) = (ll[1] * 3600.0, ll[0] * 3600.0);
        Ok(self
            .cell_for(lat_sec, lng_sec)?
            .and_then(|cell| cell.shift(lat_sec, lng_sec)))
    }
}

impl GridFile for JapanGrid {
    fn path(&self) -> &Path {
        &self.source
    }

    fn format(&self) -> &'static str {
        "JAPAN"
    }

    fn covers(&mut self, ll: [f64; 2]) -> CsResult<bool> {
        if self.coverage.is_none() {
            self.open()?;
        }
        Ok(self
            .coverage
            .is_some_and(|c| c.contains(ll[1] * 3600.0, ll[0] * 3600.0)))
    }

    fn forward(&mut self, ll: [f64; 2]) -> CsResult<Option<[f64; 2]>> {
        Ok(self
            .shift(ll)?
            .map(|[dlat, dlng]| [ll[0] + dlng / 3600.0, ll[1] + dlat / 3600.0]))
    }

    fn inverse(&mut self, ll: [f64; 2], iteration: &Iteration) -> CsResult<Option<([f64; 2], ShiftStatus)>> {
        if self.shift(ll)?.is_none() {
            return Ok(None);
        }
        let result = iterate_inverse(ll, iteration, |guess| {
            Ok(self.forward(guess)?.unwrap_or(guess))
        })?;
        Ok(Some(result))
    }

    fn release(&mut self) {
        if self.file.take().is_some() {
            debug!("released {}", self.binary.display());
        }
        self.cell = None;
    }
}

impl Drop for JapanGrid {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::provider::MemoryFileProvider;
    use approx::assert_relative_eq;

    const PAR: &str = "JGD2000-TokyoDatum Ver.2.1.1\n\
MeshCode   dB(sec)   dL(sec)\n\
53394611  11.60000 -11.70000\n\
53394612  11.64500 -11.74500\n\
53394621  11.63000 -11.73000\n\
53394622  11.67500 -11.77500\n\
53394613  11.69000 -11.79000\n";

    fn grid(buffer_size: usize) -> (Arc<MemoryFileProvider>, JapanGrid) {
        let provider = Arc::new(MemoryFileProvider::new());
        provider.insert("/grids/TKY2JGD.par", PAR);
        let grid = JapanGrid::new(
            "/grids/TKY2JGD.par",
            provider.clone(),
            GridOptions {
                buffer_size,
                regenerate: false,
            },
        );
        (provider, grid)
    }

    /// Inside cell 53394611, a third of the way east and half way north.
    fn point() -> [f64; 2] {
        let (lat, lng) = mesh_origin(53_394_611).unwrap();
        [(lng as f64 + 15.0) / 3600.0, (lat as f64 + 15.0) / 3600.0]
    }

    #[test]
    fn test_mesh_code_roundtrip() {
        assert_eq!(mesh_origin(53_394_611), Some((128_430, 503_145)));
        assert_eq!(mesh_code(128_430.0 + 1.0, 503_145.0 + 1.0), Some(53_394_611));
        assert_eq!(mesh_code(128_430.0 + 30.0, 503_145.0), Some(53_394_621));
        assert_eq!(mesh_code(128_430.0, 503_145.0 + 45.0), Some(53_394_612));
        assert!(mesh_origin(53_398_611).is_none());
        assert!(mesh_code(0.0, 0.0).is_none());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let p = Path::new("x.par");
        let header = "h1\nh2\n";
        assert!(parse_par(p, &format!("{header}53394611 1.0\n")).is_err());
        assert!(parse_par(p, &format!("{header}5339461 1.0 2.0\n")).is_err());
        assert!(parse_par(p, &format!("{header}53394611 1.0 99.0\n")).is_err());
        assert!(parse_par(p, &format!("{header}53394611 1.0 2.0\n53394611 1.0 2.0\n")).is_err());
        assert!(parse_par(p, header).is_err());
        let ok = parse_par(p, &format!("{header}53394612 1.0 2.0\n\n53394611 3.0 4.0\n")).unwrap();
        assert_eq!(ok[0].code, 53_394_611);
        assert_eq!(ok[0].dlat, 300_000);
    }

    #[test]
    fn test_binary_materialised_once() {
        let (provider, mut g) = grid(1 << 16);
        g.forward(point()).unwrap();
        assert!(provider.contains(Path::new("/grids/TKY2JGD._par")));
        let bytes = provider.contents(Path::new("/grids/TKY2JGD._par")).unwrap();
        assert_eq!(bytes.len(), 7 * RECORD_LEN);

        // A fresh object with an up-to-date binary does not rebuild it.
        let stamp = provider.modified(Path::new("/grids/TKY2JGD._par")).unwrap();
        let mut again = JapanGrid::new("/grids/TKY2JGD.par", provider.clone(), GridOptions::default());
        again.forward(point()).unwrap();
        assert_eq!(provider.modified(Path::new("/grids/TKY2JGD._par")).unwrap(), stamp);

        // Touching the source makes the binary stale.
        provider.insert("/grids/TKY2JGD.par", PAR);
        let mut rebuilt = JapanGrid::new("/grids/TKY2JGD.par", provider.clone(), GridOptions::default());
        rebuilt.forward(point()).unwrap();
        assert!(provider.modified(Path::new("/grids/TKY2JGD._par")).unwrap() > stamp);
    }

    #[test]
    fn test_interpolated_shift() {
        let (_, mut g) = grid(1 << 16);
        let [dlat, dlng] = g.shift(point()).unwrap().unwrap();
        // t = 1/3 east, u = 1/2 north
        let sw = 11.6;
        let se = 11.645;
        let nw = 11.63;
        let ne = 11.675;
        let t = 15.0 / 45.0;
        let u = 0.5;
        let expected = sw + t * (se - sw) + u * (nw - sw) + t * u * (sw - se - nw + ne);
        assert_relative_eq!(dlat, expected, epsilon = 1e-9);
        assert!(dlng < -11.7);
    }

    #[test]
    fn test_cached_cell_avoids_reads() {
        let (provider, mut g) = grid(2 * RECORD_LEN);
        let first = g.forward(point()).unwrap().unwrap();
        let reads = provider.reads();
        let nearby = [point()[0] + 1.0 / 3600.0, point()[1] + 1.0 / 3600.0];
        g.forward(nearby).unwrap().unwrap();
        let again = g.forward(point()).unwrap().unwrap();
        assert_eq!(provider.reads(), reads);
        assert_eq!(first, again);

        // A different cell needs new records.
        let (lat, lng) = mesh_origin(53_394_612).unwrap();
        g.forward([(lng as f64 + 1.0) / 3600.0, (lat as f64 + 1.0) / 3600.0])
            .unwrap()
            .unwrap();
        assert!(provider.reads() > reads);
    }

    #[test]
    fn test_missing_neighbours_reuse_sw() {
        let (_, mut g) = grid(1 << 16);
        // 53394613 has no east or north neighbours in the file.
        let (lat, lng) = mesh_origin(53_394_613).unwrap();
        let ll = [(lng as f64 + 40.0) / 3600.0, (lat as f64 + 25.0) / 3600.0];
        let [dlat, dlng] = g.shift(ll).unwrap().unwrap();
        assert_relative_eq!(dlat, 11.69, epsilon = 1e-9);
        assert_relative_eq!(dlng, -11.79, epsilon = 1e-9);
    }

    #[test]
    fn test_no_coverage() {
        let (_, mut g) = grid(1 << 16);
        assert_eq!(g.forward([135.0, 35.0]).unwrap(), None);
        assert!(!g.covers([135.0, 35.0]).unwrap());
        assert_eq!(g.inverse([135.0, 35.0], &Iteration::default()).unwrap(), None);
    }

    #[test]
    fn test_release_keeps_coverage() {
        let (provider, mut g) = grid(1 << 16);
        g.forward(point()).unwrap();
        g.release();
        let opens = provider.opens();
        assert!(!g.covers([135.0, 35.0]).unwrap());
        assert_eq!(provider.opens(), opens);
        assert!(g.coverage().is_some());

        g.forward(point()).unwrap();
        assert_eq!(provider.opens(), opens + 1);
    }

    #[test]
    fn test_inverse_recovers_input() {
        let (_, mut g) = grid(1 << 16);
        let tokyo = point();
        let jgd = g.forward(tokyo).unwrap().unwrap();
        let (back, status) = g.inverse(jgd, &Iteration::default()).unwrap().unwrap();
        assert_eq!(status, ShiftStatus::Normal);
        assert_relative_eq!(back[0], tokyo[0], epsilon = 1e-9);
        assert_relative_eq!(back[1], tokyo[1], epsilon = 1e-9);
    }

    #[test]
    fn test_missing_source() {
        let provider = Arc::new(MemoryFileProvider::new());
        let mut g = JapanGrid::new("/none.par", provider, GridOptions::default());
        assert!(matches!(g.forward(point()), Err(CsError::FileNotFound(_))));
    }
}
