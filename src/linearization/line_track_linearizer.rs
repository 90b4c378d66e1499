//! Linearization of [`LineTrack`] trajectories.
//!
//! With vertex `v = (vx, vy, vz)` and momentum `p = (tx, ty)`, the parameters of a line
//! through `v` expressed at `z_ref` are
//!
//! ```text
//! h(v, p) = (vx − tx·(vz − z_ref), vy − ty·(vz − z_ref), tx, ty)
//! ```
//!
//! which is non-linear through the `tx·vz` and `ty·vz` products. Around `(v₀, p₀)` with
//! `d = vz₀ − z_ref`:
//!
//! ```text
//!     | 1  0  −tx₀ |        | −d   0 |
//! A = | 0  1  −ty₀ |    B = |  0  −d |    c = h(v₀, p₀) − A·v₀ − B·p₀ = (tx₀·vz₀, ty₀·vz₀, 0, 0)
//!     | 0  0    0  |        |  1   0 |
//!     | 0  0    0  |        |  0   1 |
//! ```
//!
//! `p₀` is the measured slope pair: a straight line carries the same momentum everywhere.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Point3};

use super::{LinearizedTrackState, LinearizedTrackStateFactory};
use crate::trajectory::{LineTrack, Trajectory};

/// Stateless factory building linear models of [`LineTrack`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineTrackLinearizer;

impl LineTrackLinearizer {
    pub fn new() -> Self {
        LineTrackLinearizer
    }
}

impl LinearizedTrackStateFactory<LineTrack> for LineTrackLinearizer {
    fn linearize(
        &self,
        point: &Point3<f64>,
        track: &Arc<LineTrack>,
    ) -> LinearizedTrackState<LineTrack> {
        let tx = track.tx();
        let ty = track.ty();
        let d = point.z - track.z_ref();

        #[rustfmt::skip]
        let position_jacobian = DMatrix::from_row_slice(4, 3, &[
            1.0, 0.0, -tx,
            0.0, 1.0, -ty,
            0.0, 0.0, 0.0,
            0.0, 0.0, 0.0,
        ]);

        #[rustfmt::skip]
        let momentum_jacobian = DMatrix::from_row_slice(4, 2, &[
            -d,  0.0,
            0.0, -d,
            1.0, 0.0,
            0.0, 1.0,
        ]);

        let constant_term = DVector::from_vec(vec![tx * point.z, ty * point.z, 0.0, 0.0]);
        let predicted_momentum = DVector::from_vec(vec![tx, ty]);

        LinearizedTrackState::new(
            Arc::clone(track),
            *point,
            position_jacobian,
            momentum_jacobian,
            constant_term,
            predicted_momentum,
            track.parameters(),
            &track.covariance(),
        )
    }
}

#[cfg(test)]
mod line_track_linearizer_test {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Vector4};

    fn exact_h(v: &Point3<f64>, p: &DVector<f64>, z_ref: f64) -> DVector<f64> {
        let dz = v.z - z_ref;
        DVector::from_vec(vec![v.x - p[0] * dz, v.y - p[1] * dz, p[0], p[1]])
    }

    #[test]
    fn test_model_exact_at_linearization_point() {
        let track = Arc::new(LineTrack::new(
            Vector4::new(0.3, -0.4, 0.12, -0.07),
            2.0,
            Matrix4::from_diagonal_element(1e-4),
        ));
        let point = Point3::new(0.05, 0.02, 7.5);
        let lin = LineTrackLinearizer.linearize(&point, &track);

        assert!(lin.is_valid());
        assert_eq!(lin.linearization_point(), &point);
        assert_relative_eq!(
            lin.predicted_parameters_at_linearization_point(),
            exact_h(&point, lin.predicted_momentum(), 2.0),
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_model_first_order_accurate() {
        let track = Arc::new(LineTrack::new(
            Vector4::new(0.0, 0.0, 0.2, 0.1),
            0.0,
            Matrix4::identity(),
        ));
        let point = Point3::new(0.0, 0.0, 3.0);
        let lin = LineTrackLinearizer.linearize(&point, &track);

        let v = Point3::new(1e-3, -2e-3, 3.0 + 1e-3);
        let p = DVector::from_vec(vec![0.2 + 1e-3, 0.1 - 1e-3]);
        let err = (lin.predicted_parameters(&v, &p) - exact_h(&v, &p, 0.0)).amax();

        // the residual is the second-order term δtx·δvz
        assert!(err <= 1.1e-6, "linearization error too large: {err}");
    }

    #[test]
    fn test_measured_line_through_point_has_zero_residual() {
        let vertex = Point3::new(0.1, -0.2, 5.0);
        let track = Arc::new(LineTrack::through_point(
            &vertex,
            0.3,
            0.05,
            0.0,
            Matrix4::from_diagonal_element(1e-6),
        ));
        let lin = LineTrackLinearizer.linearize(&vertex, &track);
        let residual = lin.parameters() - lin.predicted_parameters_at_linearization_point();

        assert_relative_eq!(residual.amax(), 0.0, epsilon = 1e-14);
    }
}
