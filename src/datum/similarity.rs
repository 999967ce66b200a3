//! Geocentric similarity transforms: 3, 6 and 7 parameter and Bursa-Wolf.
//!
//! All four convert to geocentric XYZ on the source ellipsoid, apply
//! `X' = M R X + T` and convert back on the target ellipsoid. Rotations use
//! the coordinate frame convention.

use crate::datum::{GeodeticTransform, Iteration, SetupContext, XfrmDef};
use crate::error::{CsResult, ShiftStatus};
use crate::proj::csdef::{QcError, QcSink};
use crate::proj::ellipsoid::Ellipsoid;

/// Largest accepted translation component, metres.
pub const MAX_TRANSLATION: f64 = 5000.0;
/// Largest accepted rotation component, arc-seconds.
pub const MAX_ROTATION: f64 = 60.0;
/// Largest accepted scale difference, parts per million.
pub const MAX_SCALE_PPM: f64 = 1000.0;

const ARC_SEC: f64 = std::f64::consts::PI / (180.0 * 3600.0);

type Matrix = [[f64; 3]; 3];

const IDENTITY: Matrix = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotationForm {
    /// Translation only.
    None,
    /// First-order matrix: cosines taken as one, products of sines as zero.
    SmallAngle,
    /// Exact product of the three axis rotations.
    Full,
}

/// Coordinate-frame rotation matrix for angles in radians.
fn rotation_matrix(form: RotationForm, [rx, ry, rz]: [f64; 3]) -> Matrix {
    match form {
        RotationForm::None => IDENTITY,
        RotationForm::SmallAngle => [[1.0, rz, -ry], [-rz, 1.0, rx], [ry, -rx, 1.0]],
        RotationForm::Full => {
            let (sx, cx) = rx.sin_cos();
            let (sy, cy) = ry.sin_cos();
            let (sz, cz) = rz.sin_cos();
            let r_x = [[1.0, 0.0, 0.0], [0.0, cx, sx], [0.0, -sx, cx]];
            let r_y = [[cy, 0.0, -sy], [0.0, 1.0, 0.0], [sy, 0.0, cy]];
            let r_z = [[cz, sz, 0.0], [-sz, cz, 0.0], [0.0, 0.0, 1.0]];
            mat_mul(&mat_mul(&r_x, &r_y), &r_z)
        }
    }
}

fn mat_mul(a: &Matrix, b: &Matrix) -> Matrix {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn apply(m: &Matrix, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn apply_transposed(m: &Matrix, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[1][0] * v[1] + m[2][0] * v[2],
        m[0][1] * v[0] + m[1][1] * v[1] + m[2][1] * v[2],
        m[0][2] * v[0] + m[1][2] * v[1] + m[2][2] * v[2],
    ]
}

#[derive(Clone, Debug)]
pub struct Similarity {
    src: Ellipsoid,
    trg: Ellipsoid,
    delta: [f64; 3],
    rotation: Matrix,
    scale: f64,
    iteration: Iteration,
}

impl Similarity {
    /// `rotation` in arc-seconds, `scale_ppm` in parts per million.
    pub fn new(
        src: Ellipsoid,
        trg: Ellipsoid,
        delta: [f64; 3],
        form: RotationForm,
        rotation: [f64; 3],
        scale_ppm: f64,
        iteration: Iteration,
    ) -> Self {
        let radians = rotation.map(|r| r * ARC_SEC);
        Self {
            src,
            trg,
            delta,
            rotation: rotation_matrix(form, radians),
            scale: 1.0 + scale_ppm * 1.0e-6,
            iteration,
        }
    }
}

impl GeodeticTransform for Similarity {
    fn forward3(&mut self, llh: [f64; 3]) -> CsResult<([f64; 3], ShiftStatus)> {
        let xyz = self.src.cartesian(llh);
        let r = apply(&self.rotation, xyz);
        let out = [
            self.scale * r[0] + self.delta[0],
            self.scale * r[1] + self.delta[1],
            self.scale * r[2] + self.delta[2],
        ];
        Ok((self.trg.geographic(out), ShiftStatus::Normal))
    }

    /// Exact for orthogonal rotations; for the small-angle matrix the
    /// transpose stands in for the inverse.
    fn inverse3(&mut self, llh: [f64; 3]) -> CsResult<([f64; 3], ShiftStatus)> {
        let xyz = self.trg.cartesian(llh);
        let shifted = [
            (xyz[0] - self.delta[0]) / self.scale,
            (xyz[1] - self.delta[1]) / self.scale,
            (xyz[2] - self.delta[2]) / self.scale,
        ];
        let out = apply_transposed(&self.rotation, shifted);
        Ok((self.src.geographic(out), ShiftStatus::Normal))
    }

    fn iteration(&self) -> Iteration {
        self.iteration
    }
}

fn check_ellipsoids(def: &XfrmDef, sink: &mut QcSink<'_>) {
    if def.src_ellipsoid.resolve().is_err() || def.trg_ellipsoid.resolve().is_err() {
        sink.push(QcError::Ellipsoid);
    }
}

fn check_translation(def: &XfrmDef, sink: &mut QcSink<'_>) {
    if def.delta().iter().any(|d| !(d.abs() <= MAX_TRANSLATION)) {
        sink.push(QcError::Translation);
    }
}

fn check_rotation(def: &XfrmDef, sink: &mut QcSink<'_>) {
    if def.rotation().iter().any(|r| !(r.abs() <= MAX_ROTATION)) {
        sink.push(QcError::Rotation);
    }
}

fn check_scale(def: &XfrmDef, sink: &mut QcSink<'_>) {
    if !(def.scale_ppm.abs() <= MAX_SCALE_PPM) {
        sink.push(QcError::BwScale);
    }
}

pub(crate) fn check_parm3(def: &XfrmDef, sink: &mut QcSink<'_>) {
    check_ellipsoids(def, sink);
    check_translation(def, sink);
}

pub(crate) fn check_parm6(def: &XfrmDef, sink: &mut QcSink<'_>) {
    check_parm3(def, sink);
    check_rotation(def, sink);
}

pub(crate) fn check_parm7(def: &XfrmDef, sink: &mut QcSink<'_>) {
    check_parm6(def, sink);
    check_scale(def, sink);
}

fn build(
    def: &XfrmDef,
    ctx: &SetupContext,
    form: RotationForm,
    scaled: bool,
) -> CsResult<Box<dyn GeodeticTransform>> {
    let rotation = match form {
        RotationForm::None => [0.0; 3],
        _ => def.rotation(),
    };
    Ok(Box::new(Similarity::new(
        def.src_ellipsoid.resolve()?,
        def.trg_ellipsoid.resolve()?,
        def.delta(),
        form,
        rotation,
        if scaled { def.scale_ppm } else { 0.0 },
        def.iteration(ctx.iteration),
    )))
}

pub(crate) fn setup_parm3(def: &XfrmDef, ctx: &SetupContext) -> CsResult<Box<dyn GeodeticTransform>> {
    build(def, ctx, RotationForm::None, false)
}

pub(crate) fn setup_parm6(def: &XfrmDef, ctx: &SetupContext) -> CsResult<Box<dyn GeodeticTransform>> {
    build(def, ctx, RotationForm::SmallAngle, false)
}

pub(crate) fn setup_parm7(def: &XfrmDef, ctx: &SetupContext) -> CsResult<Box<dyn GeodeticTransform>> {
    build(def, ctx, RotationForm::Full, true)
}

pub(crate) fn setup_bursa(def: &XfrmDef, ctx: &SetupContext) -> CsResult<Box<dyn GeodeticTransform>> {
    build(def, ctx, RotationForm::SmallAngle, true)
}

/// A 3 parameter shift between identical ellipsoids with no translation.
pub(crate) fn parm3_is_null(def: &XfrmDef) -> bool {
    def.delta() == [0.0; 3] && def.src_ellipsoid == def.trg_ellipsoid
}

pub(crate) fn parm7_is_null(def: &XfrmDef) -> bool {
    parm3_is_null(def) && def.rotation() == [0.0; 3] && def.scale_ppm == 0.0
}
