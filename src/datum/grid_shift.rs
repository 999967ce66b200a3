//! Grid-interpolation datum shifts over an ordered list of grid files.
//!
//! The first file with a record for a point does the work. Points no file covers
//! go to the fallback transformation when there is one, and otherwise come
//! back unchanged with [`ShiftStatus::NoCoverage`].

use std::fmt;

use log::{debug, warn};

use crate::datum::{registry, GeodeticTransform, Iteration, SetupContext, XfrmDef};
use crate::error::{CsResult, ShiftStatus};
use crate::grid::catalog::DatumCatalog;
use crate::grid::{self, GridFile};
use crate::proj::csdef::{QcError, QcSink};

pub struct GridShift {
    grids: Vec<Box<dyn GridFile>>,
    fallback: Option<Box<dyn GeodeticTransform>>,
    iteration: Iteration,
}

impl fmt::Debug for GridShift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridShift")
            .field("grids", &self.grids.iter().map(|g| g.path()).collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .field("iteration", &self.iteration)
            .finish()
    }
}

impl GridShift {
    pub fn new(
        grids: Vec<Box<dyn GridFile>>,
        fallback: Option<Box<dyn GeodeticTransform>>,
        iteration: Iteration,
    ) -> Self {
        Self {
            grids,
            fallback,
            iteration,
        }
    }

    pub fn grid_count(&self) -> usize {
        self.grids.len()
    }

    fn uncovered(&mut self, ll: [f64; 2], inverse: bool) -> CsResult<([f64; 2], ShiftStatus)> {
        match self.fallback.as_mut() {
            Some(fallback) => {
                warn!("({}, {}) outside every grid file, using fallback", ll[0], ll[1]);
                if inverse {
                    fallback.inverse2(ll)
                } else {
                    fallback.forward2(ll)
                }
            }
            None => Ok((ll, ShiftStatus::NoCoverage)),
        }
    }
}

impl GeodeticTransform for GridShift {
    /// Grids carry horizontal shifts only; heights pass through.
    fn forward3(&mut self, llh: [f64; 3]) -> CsResult<([f64; 3], ShiftStatus)> {
        let (ll, status) = self.forward2([llh[0], llh[1]])?;
        Ok(([ll[0], ll[1], llh[2]], status))
    }

    fn inverse3(&mut self, llh: [f64; 3]) -> CsResult<([f64; 3], ShiftStatus)> {
        let (ll, status) = self.inverse2([llh[0], llh[1]])?;
        Ok(([ll[0], ll[1], llh[2]], status))
    }

    fn forward2(&mut self, ll: [f64; 2]) -> CsResult<([f64; 2], ShiftStatus)> {
        for grid in self.grids.iter_mut() {
            if !grid.covers(ll)? {
                continue;
            }
            // A covering rectangle can still have holes; try the next file.
            if let Some(out) = grid.forward(ll)? {
                return Ok((out, ShiftStatus::Normal));
            }
        }
        self.uncovered(ll, false)
    }

    fn inverse2(&mut self, ll: [f64; 2]) -> CsResult<([f64; 2], ShiftStatus)> {
        let iteration = self.iteration;
        for grid in self.grids.iter_mut() {
            if !grid.covers(ll)? {
                continue;
            }
            if let Some(found) = grid.inverse(ll, &iteration)? {
                return Ok(found);
            }
        }
        self.uncovered(ll, true)
    }

    fn iteration(&self) -> Iteration {
        self.iteration
    }

    fn release(&mut self) {
        for grid in &mut self.grids {
            grid.release();
        }
        if let Some(fallback) = self.fallback.as_mut() {
            fallback.release();
        }
    }
}

pub(crate) fn check(def: &XfrmDef, sink: &mut QcSink<'_>) {
    if def.grid_files.is_empty() && def.catalog.is_none() {
        sink.push(QcError::GridFiles);
    }
    if let Some(fallback) = &def.fallback {
        if registry::lookup(&fallback.method).is_none() {
            sink.push(QcError::UnknownTransform);
        }
    }
}

pub(crate) fn setup(def: &XfrmDef, ctx: &SetupContext) -> CsResult<Box<dyn GeodeticTransform>> {
    let mut grids = Vec::with_capacity(def.grid_files.len());
    for file in &def.grid_files {
        let path = ctx.resolve(&file.path);
        grids.push(grid::registry::open(
            &path,
            file.format.as_deref(),
            ctx.provider.clone(),
            ctx.grid_options,
        )?);
    }
    if let Some(catalog) = &def.catalog {
        let catalog = DatumCatalog::load(&ctx.resolve(catalog), ctx.provider.as_ref())?;
        grids.extend(catalog.open_grids(&ctx.provider, ctx.grid_options)?);
    }

    let fallback = match &def.fallback {
        Some(fallback) => Some(registry::setup(fallback, ctx)?),
        None => None,
    };
    debug!(
        "{}: {} grid files, fallback {}",
        def.key_name,
        grids.len(),
        def.fallback.as_ref().map_or("none", |f| f.key_name.as_str())
    );

    Ok(Box::new(GridShift::new(grids, fallback, def.iteration(ctx.iteration))))
}
