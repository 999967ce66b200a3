//! Lambert Tangential Conformal Conic (one standard parallel).
//!
//! The cone touches the ellipsoid at the origin latitude and is scaled by the
//! scale reduction factor there. An origin on the equator degenerates to
//! Mercator and is rejected by the check.

use crate::error::CsResult;
use crate::proj::csdef::{check_scl_red, CsDef, QcError, QcSink};
use crate::proj::lambert_conformal::LambertConformalConic;
use crate::proj::registry::SetupArgs;
use crate::proj::Projection;

/// Origin latitudes closer to the equator than this are refused, degrees.
const MIN_ORG_LAT: f64 = 1.0e-6;

pub(crate) fn check(def: &CsDef, sink: &mut QcSink<'_>) {
    check_scl_red(def, sink);
    if def.org_lat.abs() < MIN_ORG_LAT || def.org_lat.abs() >= 90.0 {
        sink.push(QcError::OrgLat);
    }
}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    let def = args.def;
    Ok(Box::new(LambertConformalConic::new_1sp(
        args.ellipsoid,
        def.org_lng.to_radians(),
        def.org_lat.to_radians(),
        def.scl_red,
        args.unit_scale,
    )))
}
