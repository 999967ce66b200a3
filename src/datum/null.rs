//! The identity transformation, for datums that differ in name only.

use crate::datum::{GeodeticTransform, Iteration, SetupContext, XfrmDef};
use crate::error::{CsResult, ShiftStatus};
use crate::proj::csdef::QcSink;

#[derive(Clone, Copy, Debug, Default)]
pub struct NullTransform {
    iteration: Iteration,
}

impl GeodeticTransform for NullTransform {
    fn forward3(&mut self, llh: [f64; 3]) -> CsResult<([f64; 3], ShiftStatus)> {
        Ok((llh, ShiftStatus::Normal))
    }

    fn inverse3(&mut self, llh: [f64; 3]) -> CsResult<([f64; 3], ShiftStatus)> {
        Ok((llh, ShiftStatus::Normal))
    }

    fn inverse2(&mut self, ll: [f64; 2]) -> CsResult<([f64; 2], ShiftStatus)> {
        Ok((ll, ShiftStatus::Normal))
    }

    fn iteration(&self) -> Iteration {
        self.iteration
    }

    fn is_null(&self) -> bool {
        true
    }
}

pub(crate) fn check(_def: &XfrmDef, _sink: &mut QcSink<'_>) {}

pub(crate) fn setup(def: &XfrmDef, ctx: &SetupContext) -> CsResult<Box<dyn GeodeticTransform>> {
    Ok(Box::new(NullTransform {
        iteration: def.iteration(ctx.iteration),
    }))
}

pub(crate) fn is_null(_def: &XfrmDef) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let mut xf = NullTransform::default();
        assert!(xf.is_null());
        assert_eq!(xf.forward2([12.5, -33.0]).unwrap(), ([12.5, -33.0], ShiftStatus::Normal));
        assert_eq!(xf.inverse3([1.0, 2.0, 3.0]).unwrap().0, [1.0, 2.0, 3.0]);
    }
}
