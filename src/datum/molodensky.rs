//! Standard Molodensky datum shift.
//!
//! Closed-form shifts in latitude, longitude and height computed from the
//! geocentric translation and the differences in semi-major axis and
//! flattening, evaluated on the source ellipsoid.

use crate::datum::{GeodeticTransform, Iteration, SetupContext, XfrmDef};
use crate::error::{CsResult, ShiftStatus};
use crate::proj::csdef::{QcError, QcSink};
use crate::proj::ellipsoid::Ellipsoid;

#[derive(Clone, Debug)]
pub struct Molodensky {
    src: Ellipsoid,
    trg: Ellipsoid,
    delta: [f64; 3],
    iteration: Iteration,
}

/// Shifts (dlng, dlat in radians, dh in metres) from `ell` by the given
/// translation and axis/flattening differences.
fn shifts(ell: &Ellipsoid, delta: [f64; 3], da: f64, df: f64, llh: [f64; 3]) -> [f64; 3] {
    let [dx, dy, dz] = delta;
    let lam = llh[0].to_radians();
    let phi = llh[1].to_radians();
    let h = llh[2];
    let (sin_phi, cos_phi) = phi.sin_cos();
    let (sin_lam, cos_lam) = lam.sin_cos();

    let a = ell.a;
    let b = ell.b;
    let nu = ell.prime_vertical_radius(phi);
    let rho = ell.meridian_radius(phi);

    let d_phi = (-dx * sin_phi * cos_lam - dy * sin_phi * sin_lam
        + dz * cos_phi
        + da * (nu * ell.e2 * sin_phi * cos_phi) / a
        + df * (rho * a / b + nu * b / a) * sin_phi * cos_phi)
        / (rho + h);

    // Longitude shift is undefined at the poles; leave it zero there.
    let d_lam = if cos_phi.abs() < 1.0e-12 {
        0.0
    } else {
        (-dx * sin_lam + dy * cos_lam) / ((nu + h) * cos_phi)
    };

    let d_h = dx * cos_phi * cos_lam + dy * cos_phi * sin_lam + dz * sin_phi - da * a / nu
        + df * (b / a) * nu * sin_phi * sin_phi;

    [d_lam, d_phi, d_h]
}

impl Molodensky {
    pub fn new(src: Ellipsoid, trg: Ellipsoid, delta: [f64; 3], iteration: Iteration) -> Self {
        Self {
            src,
            trg,
            delta,
            iteration,
        }
    }

    fn shift(&self, from: &Ellipsoid, to: &Ellipsoid, delta: [f64; 3], llh: [f64; 3]) -> [f64; 3] {
        let d = shifts(from, delta, to.a - from.a, to.f - from.f, llh);
        [
            llh[0] + d[0].to_degrees(),
            llh[1] + d[1].to_degrees(),
            llh[2] + d[2],
        ]
    }
}

impl GeodeticTransform for Molodensky {
    fn forward3(&mut self, llh: [f64; 3]) -> CsResult<([f64; 3], ShiftStatus)> {
        Ok((self.shift(&self.src, &self.trg, self.delta, llh), ShiftStatus::Normal))
    }

    /// The same formulae run from the target ellipsoid with the translation
    /// negated.
    fn inverse3(&mut self, llh: [f64; 3]) -> CsResult<([f64; 3], ShiftStatus)> {
        let back = self.delta.map(|d| -d);
        Ok((self.shift(&self.trg, &self.src, back, llh), ShiftStatus::Normal))
    }

    fn iteration(&self) -> Iteration {
        self.iteration
    }
}

pub(crate) fn check(def: &XfrmDef, sink: &mut QcSink<'_>) {
    if def.src_ellipsoid.resolve().is_err() || def.trg_ellipsoid.resolve().is_err() {
        sink.push(QcError::Ellipsoid);
    }
    if def
        .delta()
        .iter()
        .any(|d| !(d.abs() <= crate::datum::similarity::MAX_TRANSLATION))
    {
        sink.push(QcError::Translation);
    }
}

pub(crate) fn setup(def: &XfrmDef, ctx: &SetupContext) -> CsResult<Box<dyn GeodeticTransform>> {
    Ok(Box::new(Molodensky::new(
        def.src_ellipsoid.resolve()?,
        def.trg_ellipsoid.resolve()?,
        def.delta(),
        def.iteration(ctx.iteration),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::similarity::{RotationForm, Similarity};
    use crate::proj::ellipsoid::{CLARKE1866, WGS84};
    use approx::assert_relative_eq;

    const NAD27: [f64; 3] = [-8.0, 160.0, 176.0];

    #[test]
    fn test_agrees_with_geocentric_translation() {
        let mut molo = Molodensky::new(CLARKE1866, WGS84, NAD27, Iteration::default());
        let mut exact = Similarity::new(
            CLARKE1866,
            WGS84,
            NAD27,
            RotationForm::None,
            [0.0; 3],
            0.0,
            Iteration::default(),
        );
        for llh in [[-100.0, 40.0, 0.0], [-75.0, 25.0, 500.0], [-120.0, 60.0, 0.0]] {
            let (a, _) = molo.forward3(llh).unwrap();
            let (b, _) = exact.forward3(llh).unwrap();
            // about a metre
            assert_relative_eq!(a[0], b[0], epsilon = 1e-5);
            assert_relative_eq!(a[1], b[1], epsilon = 1e-5);
            assert_relative_eq!(a[2], b[2], epsilon = 1.0);
        }
    }

    #[test]
    fn test_inverse2_and_inverse3() {
        let mut molo = Molodensky::new(CLARKE1866, WGS84, NAD27, Iteration::default());
        let start = [-90.0, 35.0];
        let (out, _) = molo.forward2(start).unwrap();
        let (back, status) = molo.inverse2(out).unwrap();
        assert_eq!(status, ShiftStatus::Normal);
        assert_relative_eq!(back[0], start[0], epsilon = 1e-9);
        assert_relative_eq!(back[1], start[1], epsilon = 1e-9);

        let (back3, _) = molo.inverse3([out[0], out[1], 0.0]).unwrap();
        assert_relative_eq!(back3[0], start[0], epsilon = 1e-6);
        assert_relative_eq!(back3[1], start[1], epsilon = 1e-6);
    }

    #[test]
    fn test_pole_longitude_unchanged() {
        let mut molo = Molodensky::new(CLARKE1866, WGS84, NAD27, Iteration::default());
        let (out, _) = molo.forward3([45.0, 90.0, 0.0]).unwrap();
        assert_relative_eq!(out[0], 45.0);
    }
}
