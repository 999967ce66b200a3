//! OSTN02: ETRS89 ↔ OSGB36 through the British National Grid.
//!
//! ETRS89 latitude/longitude is projected with the National Grid constants
//! on GRS80, the grid supplies easting/northing shifts at 1 km nodes, and the
//! shifted coordinates are unprojected on Airy 1830 as OSGB36.
//!
//! The ASCII source is the published CSV
//! (`id, E, N, dE, dN, dGeoid, flag`, one line per node, id = 1 + col + row·701).
//! Its binary form holds `f32 dE, f32 dN` per node, row-major from the
//! south-west corner, no header.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use ndarray::Array2;

use crate::datum::Iteration;
use crate::error::{CsError, CsResult, ShiftStatus};
use crate::grid::bilinear::sample;
use crate::grid::provider::FileProvider;
use crate::grid::{materialize, GridFile, GridOptions};
use crate::proj::ellipsoid::{AIRY1830, GRS80};
use crate::proj::transverse_mercator::TransverseMercator;
use crate::proj::Projection;

const NODE_LEN: usize = 8;

const NG_LON0: f64 = -2.0;
const NG_LAT0: f64 = 49.0;
const NG_K0: f64 = 0.999_601_271_7;
const NG_FALSE_EASTING: f64 = 400_000.0;
const NG_FALSE_NORTHING: f64 = -100_000.0;

/// Largest shift accepted from the ASCII source, metres.
const MAX_SHIFT: f64 = 200.0;

const INVERSE_MAX_ITERATIONS: usize = 10;
const INVERSE_TOLERANCE: f64 = 1.0e-4;

/// Node lattice of the shift grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layout {
    pub cols: usize,
    pub rows: usize,
    /// Node spacing, metres.
    pub spacing: f64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            cols: 701,
            rows: 1251,
            spacing: 1000.0,
        }
    }
}

impl Layout {
    fn nodes(&self) -> usize {
        self.cols * self.rows
    }

    fn contains(&self, e: f64, n: f64) -> bool {
        e >= 0.0
            && n >= 0.0
            && e <= (self.cols - 1) as f64 * self.spacing
            && n <= (self.rows - 1) as f64 * self.spacing
    }
}

/// Parse the CSV source into the binary node layout.
pub fn build_binary(path: &Path, text: &str, layout: &Layout) -> CsResult<Vec<u8>> {
    let mut out = Vec::with_capacity(layout.nodes() * NODE_LEN);
    let mut expected_id = 1usize;
    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let bad = |what: String| CsError::format(path, format!("line {line_no}: {what}"));
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 7 {
            return Err(bad(format!("expected 7 fields, found {}", fields.len())));
        }
        let Ok(id) = fields[0].parse::<usize>() else {
            if line_no == 1 {
                continue;
            }
            return Err(bad(format!("bad point id {:?}", fields[0])));
        };
        if id != expected_id || id > layout.nodes() {
            return Err(bad(format!("point id {id} out of sequence")));
        }
        let number = |i: usize| -> CsResult<f64> {
            fields[i]
                .parse::<f64>()
                .map_err(|_| bad(format!("field {} is not a number", i + 1)))
        };
        let (e, n) = (number(1)?, number(2)?);
        let (col, row) = ((id - 1) % layout.cols, (id - 1) / layout.cols);
        if e != col as f64 * layout.spacing || n != row as f64 * layout.spacing {
            return Err(bad(format!("node {id} is not at ({col}, {row})")));
        }
        let (de, dn) = (number(3)?, number(4)?);
        if !(de.abs() <= MAX_SHIFT && dn.abs() <= MAX_SHIFT) {
            return Err(bad(format!("shift ({de}, {dn}) out of range")));
        }
        out.extend_from_slice(&(de as f32).to_le_bytes());
        out.extend_from_slice(&(dn as f32).to_le_bytes());
        expected_id += 1;
    }
    if expected_id - 1 != layout.nodes() {
        return Err(CsError::format(
            path,
            format!("{} nodes, expected {}", expected_id - 1, layout.nodes()),
        ));
    }
    Ok(out)
}

/// Binary path for a source: `OSTN02_OSGM02_GB.txt` → `OSTN02_OSGM02_GB._02`.
pub fn binary_path(source: &Path) -> PathBuf {
    source.with_extension("_02")
}

struct Shifts {
    east: Array2<f32>,
    north: Array2<f32>,
}

pub struct Ostn02Grid {
    source: PathBuf,
    binary: PathBuf,
    provider: Arc<dyn FileProvider>,
    options: GridOptions,
    layout: Layout,
    shifts: Option<Shifts>,
    etrs89: TransverseMercator,
    osgb36: TransverseMercator,
}

impl Ostn02Grid {
    pub fn new(source: impl Into<PathBuf>, provider: Arc<dyn FileProvider>, options: GridOptions) -> Self {
        Self::with_layout(source, provider, options, Layout::default())
    }

    pub fn with_layout(
        source: impl Into<PathBuf>,
        provider: Arc<dyn FileProvider>,
        options: GridOptions,
        layout: Layout,
    ) -> Self {
        let source = source.into();
        let national_grid = |ellipsoid| {
            TransverseMercator::new(
                ellipsoid,
                NG_LON0.to_radians(),
                NG_LAT0.to_radians(),
                NG_K0,
                1.0,
            )
        };
        Self {
            binary: binary_path(&source),
            source,
            provider,
            options,
            layout,
            shifts: None,
            etrs89: national_grid(GRS80),
            osgb36: national_grid(AIRY1830),
        }
    }

    fn load(&mut self) -> CsResult<&Shifts> {
        if self.shifts.is_none() {
            let layout = self.layout;
            materialize(
                self.provider.as_ref(),
                &self.source,
                &self.binary,
                self.options.regenerate,
                |text| build_binary(&self.source, text, &layout),
            )?;
            let mut reader = self.provider.open(&self.binary)?;
            let expected = (layout.nodes() * NODE_LEN) as u64;
            if reader.len() != expected {
                return Err(CsError::format(
                    &self.binary,
                    format!("size {} does not match {expected}", reader.len()),
                ));
            }
            let mut bytes = vec![0u8; layout.nodes() * NODE_LEN];
            reader.read_at(0, &mut bytes)?;

            let value = |at: usize| f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
            let east = Array2::from_shape_fn((layout.rows, layout.cols), |(r, c)| {
                value((r * layout.cols + c) * NODE_LEN)
            });
            let north = Array2::from_shape_fn((layout.rows, layout.cols), |(r, c)| {
                value((r * layout.cols + c) * NODE_LEN + 4)
            });
            debug!("loaded {} ({}×{} nodes)", self.binary.display(), layout.cols, layout.rows);
            self.shifts = Some(Shifts { east, north });
        }
        self.shifts
            .as_ref()
            .ok_or_else(|| CsError::Internal("OSTN02 shifts vanished after load".into()))
    }

    /// National Grid easting/northing of a geographic point on `tm`.
    fn project(tm: &TransverseMercator, ll: [f64; 2]) -> (f64, f64) {
        let (x, y, _) = tm.forward(ll[0].to_radians(), ll[1].to_radians());
        (x + NG_FALSE_EASTING, y + NG_FALSE_NORTHING)
    }

    fn unproject(tm: &TransverseMercator, e: f64, n: f64) -> [f64; 2] {
        let (lng, lat, _) = tm.inverse(e - NG_FALSE_EASTING, n - NG_FALSE_NORTHING);
        [lng.to_degrees(), lat.to_degrees()]
    }

    /// Interpolated (dE, dN) at an ETRS89 grid position, metres.
    pub fn shift_at(&mut self, e: f64, n: f64) -> CsResult<Option<(f64, f64)>> {
        let spacing = self.layout.spacing;
        let shifts = self.load()?;
        let (col, row) = (e / spacing, n / spacing);
        let de = sample(&shifts.east.view(), col, row);
        let dn = sample(&shifts.north.view(), col, row);
        Ok(de.zip(dn))
    }
}

impl GridFile for Ostn02Grid {
    fn path(&self) -> &Path {
        &self.source
    }

    fn format(&self) -> &'static str {
        "OSTN02"
    }

    fn covers(&mut self, ll: [f64; 2]) -> CsResult<bool> {
        let (e, n) = Self::project(&self.etrs89, ll);
        Ok(self.layout.contains(e, n))
    }

    fn forward(&mut self, ll: [f64; 2]) -> CsResult<Option<[f64; 2]>> {
        let (e, n) = Self::project(&self.etrs89, ll);
        if !self.layout.contains(e, n) {
            return Ok(None);
        }
        let Some((de, dn)) = self.shift_at(e, n)? else {
            return Ok(None);
        };
        Ok(Some(Self::unproject(&self.osgb36, e + de, n + dn)))
    }

    /// Iteration limits are fixed for this format.
    fn inverse(&mut self, ll: [f64; 2], _iteration: &Iteration) -> CsResult<Option<([f64; 2], ShiftStatus)>> {
        let (e_osgb, n_osgb) = Self::project(&self.osgb36, ll);
        let Some((de, dn)) = self.shift_at(e_osgb, n_osgb)? else {
            return Ok(None);
        };
        let (mut e, mut n) = (e_osgb - de, n_osgb - dn);
        let mut delta = f64::INFINITY;
        for _ in 0..INVERSE_MAX_ITERATIONS {
            let Some((de, dn)) = self.shift_at(e, n)? else {
                return Ok(None);
            };
            let (e_next, n_next) = (e_osgb - de, n_osgb - dn);
            delta = (e_next - e).abs().max((n_next - n).abs());
            e = e_next;
            n = n_next;
            if delta < INVERSE_TOLERANCE {
                return Ok(Some((Self::unproject(&self.etrs89, e, n), ShiftStatus::Normal)));
            }
        }
        Err(CsError::NoConvergence {
            iterations: INVERSE_MAX_ITERATIONS,
            residual: delta,
        })
    }

    fn release(&mut self) {
        if self.shifts.take().is_some() {
            debug!("released {}", self.binary.display());
        }
    }
}

impl Drop for Ostn02Grid {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::provider::MemoryFileProvider;
    use approx::assert_relative_eq;

    const SMALL: Layout = Layout {
        cols: 4,
        rows: 5,
        spacing: 1000.0,
    };

    fn csv(layout: &Layout, shift: impl Fn(usize, usize) -> (f64, f64)) -> String {
        let mut text = String::from("point_id,ETRS89_E,ETRS89_N,dE,dN,dGeoid,flag\n");
        for row in 0..layout.rows {
            for col in 0..layout.cols {
                let id = 1 + col + row * layout.cols;
                let (de, dn) = shift(col, row);
                text.push_str(&format!(
                    "{id},{},{},{de:.3},{dn:.3},47.000,1\n",
                    col as f64 * layout.spacing,
                    row as f64 * layout.spacing
                ));
            }
        }
        text
    }

    fn grid(text: &str) -> (Arc<MemoryFileProvider>, Ostn02Grid) {
        let provider = Arc::new(MemoryFileProvider::new());
        provider.insert("/gb/OSTN02_OSGM02_GB.txt", text);
        let grid = Ostn02Grid::with_layout(
            "/gb/OSTN02_OSGM02_GB.txt",
            provider.clone(),
            GridOptions::default(),
            SMALL,
        );
        (provider, grid)
    }

    /// ETRS89 point at National Grid (e, n).
    fn etrs89_at(e: f64, n: f64) -> [f64; 2] {
        let tm = TransverseMercator::new(GRS80, NG_LON0.to_radians(), NG_LAT0.to_radians(), NG_K0, 1.0);
        Ostn02Grid::unproject(&tm, e, n)
    }

    #[test]
    fn test_constant_shift() {
        let (provider, mut g) = grid(&csv(&SMALL, |_, _| (100.0, -80.0)));
        let out = g.forward(etrs89_at(1500.0, 2000.0)).unwrap().unwrap();
        assert!(provider.contains(Path::new("/gb/OSTN02_OSGM02_GB._02")));

        let (e, n) = Ostn02Grid::project(&g.osgb36, out);
        assert_relative_eq!(e, 1600.0, epsilon = 1e-4);
        assert_relative_eq!(n, 1920.0, epsilon = 1e-4);
    }

    #[test]
    fn test_interpolated_shift() {
        let (_, mut g) = grid(&csv(&SMALL, |c, r| (90.0 + c as f64, -70.0 - 2.0 * r as f64)));
        let (de, dn) = g.shift_at(1250.0, 3500.0).unwrap().unwrap();
        assert_relative_eq!(de, 91.25, epsilon = 1e-5);
        assert_relative_eq!(dn, -77.0, epsilon = 1e-5);
        assert!(g.shift_at(3500.0, 0.0).unwrap().is_none());
    }

    #[test]
    fn test_inverse_roundtrip() {
        let (_, mut g) = grid(&csv(&SMALL, |c, r| (95.0 + 0.5 * c as f64, -75.0 + 0.25 * r as f64)));
        let etrs = etrs89_at(1200.0, 2700.0);
        let osgb = g.forward(etrs).unwrap().unwrap();
        let (back, status) = g.inverse(osgb, &Iteration::default()).unwrap().unwrap();
        assert_eq!(status, ShiftStatus::Normal);
        assert_relative_eq!(back[0], etrs[0], epsilon = 1e-9);
        assert_relative_eq!(back[1], etrs[1], epsilon = 1e-9);
    }

    #[test]
    fn test_inverse_reports_last_residual() {
        // Easting shift swings 398 m across the first cell, so the
        // fixed-point step only contracts by about 0.4
        let (_, mut g) = grid(&csv(&SMALL, |c, _| (if c == 0 { -199.0 } else { 199.0 }, 0.0)));
        let osgb = Ostn02Grid::unproject(&g.osgb36, 780.0, 2000.0);
        match g.inverse(osgb, &Iteration::default()) {
            Err(CsError::NoConvergence { iterations, residual }) => {
                assert_eq!(iterations, INVERSE_MAX_ITERATIONS);
                assert!(residual > INVERSE_TOLERANCE, "{residual}");
                assert!(residual < 1.0, "{residual}");
            }
            other => panic!("expected NoConvergence, got {other:?}"),
        }
    }

    #[test]
    fn test_outside_grid() {
        let (provider, mut g) = grid(&csv(&SMALL, |_, _| (100.0, -80.0)));
        let far = etrs89_at(50_000.0, 2000.0);
        assert!(!g.covers(far).unwrap());
        assert_eq!(g.forward(far).unwrap(), None);
        // Coverage is decided from the layout alone.
        assert_eq!(provider.opens(), 0);
    }

    #[test]
    fn test_malformed_source() {
        let good = csv(&SMALL, |_, _| (100.0, -80.0));
        let truncated: String = good.lines().take(10).map(|l| format!("{l}\n")).collect();
        let (_, mut g) = grid(&truncated);
        assert!(matches!(
            g.forward(etrs89_at(1500.0, 2000.0)),
            Err(CsError::InvalidFormat { .. })
        ));

        let wild = good.replacen("1,0,0,100.000", "1,0,0,900.000", 1);
        assert!(build_binary(Path::new("x"), &wild, &SMALL).is_err());
        let misplaced = good.replacen("2,1000,0", "2,1001,0", 1);
        assert!(build_binary(Path::new("x"), &misplaced, &SMALL).is_err());
    }
}
