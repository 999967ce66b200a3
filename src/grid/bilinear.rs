//! Bilinear interpolation kernel shared by the grid file formats.

use ndarray::ArrayView2;
use num_traits::NumCast;

/// Corner values of one grid cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corners<T> {
    pub sw: T,
    pub se: T,
    pub nw: T,
    pub ne: T,
}

impl<T: Copy> Corners<T> {
    /// All four corners set to one value.
    pub fn uniform(value: T) -> Self {
        Self {
            sw: value,
            se: value,
            nw: value,
            ne: value,
        }
    }
}

/// Interpolate inside a cell.
///
/// `t` is the fractional offset east of the SW corner, `u` north of it,
/// both nominally in [0, 1]:
///
/// `SW + t·(SE − SW) + u·(NW − SW) + t·u·(SW − SE − NW + NE)`
///
/// Returns `None` if a corner cannot be represented as f64 or is NaN.
pub fn interpolate<T>(corners: &Corners<T>, t: f64, u: f64) -> Option<f64>
where
    T: Copy + NumCast,
{
    let sw: f64 = NumCast::from(corners.sw)?;
    let se: f64 = NumCast::from(corners.se)?;
    let nw: f64 = NumCast::from(corners.nw)?;
    let ne: f64 = NumCast::from(corners.ne)?;

    if sw.is_nan() || se.is_nan() || nw.is_nan() || ne.is_nan() {
        return None;
    }

    Some(sw + t * (se - sw) + u * (nw - sw) + t * u * (sw - se - nw + ne))
}

/// Sample a node grid at fractional (col, row), row 0 being the southern
/// edge. Nodes sit at integer positions. Returns `None` when the cell is
/// not entirely inside the grid.
pub fn sample<T>(grid: &ArrayView2<'_, T>, col: f64, row: f64) -> Option<f64>
where
    T: Copy + NumCast,
{
    if !(col >= 0.0 && row >= 0.0) {
        return None;
    }
    let (rows, cols) = (grid.nrows(), grid.ncols());
    let mut c0 = col.floor() as usize;
    let mut r0 = row.floor() as usize;
    // The last node row/column is reachable only exactly.
    if c0 + 1 == cols && col == c0 as f64 && c0 > 0 {
        c0 -= 1;
    }
    if r0 + 1 == rows && row == r0 as f64 && r0 > 0 {
        r0 -= 1;
    }
    if c0 + 1 >= cols || r0 + 1 >= rows {
        return None;
    }

    let corners = Corners {
        sw: grid[(r0, c0)],
        se: grid[(r0, c0 + 1)],
        nw: grid[(r0 + 1, c0)],
        ne: grid[(r0 + 1, c0 + 1)],
    };
    interpolate(&corners, col - c0 as f64, row - r0 as f64)
}
