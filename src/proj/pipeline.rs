//! Conversion pipeline between two coordinate systems.
//!
//! Source cartesian → source geographic → optional datum shift → target
//! geographic → target cartesian. Projection status and datum shift status
//! are tracked separately and the worst of each is reported.

use std::fmt;

use rayon::prelude::*;

use crate::datum::{Direction, GeodeticTransform};
use crate::error::{CsResult, ShiftStatus, Status};
use crate::proj::coordsys::CoordSys;

/// Worst statuses seen while converting one or more points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub projection: Status,
    pub shift: ShiftStatus,
}

impl Outcome {
    pub fn worst(self, other: Outcome) -> Outcome {
        Outcome {
            projection: self.projection.worst(other.projection),
            shift: self.shift.worst(other.shift),
        }
    }

    pub fn is_normal(self) -> bool {
        self.projection.is_normal() && self.shift == ShiftStatus::Normal
    }
}

struct DatumStep {
    transform: Box<dyn GeodeticTransform>,
    direction: Direction,
}

pub struct Conversion {
    src: CoordSys,
    trg: CoordSys,
    datum: Option<DatumStep>,
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversion")
            .field("src", &self.src.def().key_name)
            .field("trg", &self.trg.def().key_name)
            .field("datum", &self.datum.as_ref().map(|d| d.direction))
            .finish()
    }
}

impl Conversion {
    /// Conversion between two systems on the same datum.
    pub fn new(src: CoordSys, trg: CoordSys) -> Self {
        Self {
            src,
            trg,
            datum: None,
        }
    }

    /// Conversion with a datum shift applied between the geographic steps.
    /// Null transformations are dropped.
    pub fn with_datum_shift(
        src: CoordSys,
        trg: CoordSys,
        transform: Box<dyn GeodeticTransform>,
        direction: Direction,
    ) -> Self {
        let datum = (!transform.is_null()).then_some(DatumStep {
            transform,
            direction,
        });
        Self { src, trg, datum }
    }

    pub fn src(&self) -> &CoordSys {
        &self.src
    }

    pub fn trg(&self) -> &CoordSys {
        &self.trg
    }

    pub fn has_datum_shift(&self) -> bool {
        self.datum.is_some()
    }

    /// Convert one point from source to target system units.
    pub fn transform(&mut self, xy: [f64; 2]) -> CsResult<([f64; 2], Outcome)> {
        let (ll, src_status) = self.src.cs2ll(xy);
        let (ll, shift) = match self.datum.as_mut() {
            Some(step) => step.transform.apply2(ll, step.direction)?,
            None => (ll, ShiftStatus::Normal),
        };
        let (out, trg_status) = self.trg.ll2cs(ll);
        Ok((
            out,
            Outcome {
                projection: src_status.worst(trg_status),
                shift,
            },
        ))
    }

    /// Convert points in place. Without a datum shift the points are
    /// processed in parallel; grid-based shifts keep per-file state and run
    /// sequentially.
    pub fn transform_batch(&mut self, coords: &mut [[f64; 2]]) -> CsResult<Outcome> {
        let Some(step) = self.datum.as_mut() else {
            let (src, trg) = (&self.src, &self.trg);
            let projection = coords
                .par_iter_mut()
                .map(|pt| src.cs2ll_in_place(pt).worst(trg.ll2cs_in_place(pt)))
                .reduce(|| Status::Normal, Status::worst);
            return Ok(Outcome {
                projection,
                shift: ShiftStatus::Normal,
            });
        };

        let mut outcome = Outcome::default();
        for pt in coords.iter_mut() {
            let mut projection = self.src.cs2ll_in_place(pt);
            let (ll, shift) = step.transform.apply2(*pt, step.direction)?;
            *pt = ll;
            projection = projection.worst(self.trg.ll2cs_in_place(pt));
            outcome = outcome.worst(Outcome { projection, shift });
        }
        Ok(outcome)
    }

    /// Release grid file handles held by the datum shift.
    pub fn release(&mut self) {
        if let Some(step) = self.datum.as_mut() {
            step.transform.release();
        }
    }
}
