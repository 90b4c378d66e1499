//! # Vertex updators
//!
//! A [`VertexUpdator`] folds **one** vertex track into a running [`VertexState`]. The
//! fitter applies it sequentially over the track list, in input order; with floating-point
//! arithmetic the result may depend weakly on that order, but is deterministic for a
//! fixed order.
//!
//! ## Kalman update
//!
//! [`KalmanVertexUpdator`] implements the information-form update of Frühwirth (1987),
//! with the track momentum `p` eliminated from the linear model `q ≈ c + A·x + B·p`:
//!
//! ```text
//! S   = (Bᵀ G B)⁻¹
//! G_B = G − G B S Bᵀ G
//! W'  = W₀ + w · Aᵀ G_B A
//! x'  = W'⁻¹ (W₀ x₀ + w · Aᵀ G_B (q − c))
//! ```
//!
//! where `G` is the weight of the track parameters, `w` the track weight and `(x₀, W₀)`
//! the prior position and weight. The matrix work per step is sized by one track's
//! parameter dimension, independent of the number of tracks already in the vertex.
//!
//! ## References
//! * R. Frühwirth, *Application of Kalman filtering to track and vertex fitting*,
//!   Nucl. Instrum. Meth. A262 (1987) 444.

use std::fmt;

use nalgebra::{DMatrix, DVector, Point3};

use crate::{
    linalg::{
        invert_positive_definite, invert_positive_definite3, point_to_dvector, symmetrize,
        symmetrize3, to_matrix3, to_vector3,
    },
    linearization::LinearizedTrackState,
    trajectory::Trajectory,
    vertex_errors::VertexFitError,
    vertex_state::VertexState,
    vertex_track::VertexTrack,
};

/// Sequential update rule combining a vertex estimate with one track.
pub trait VertexUpdator<T: Trajectory>: fmt::Debug + Send + Sync {
    /// Fold `track` into `prior` and return the new state.
    ///
    /// Return
    /// ----------
    /// * `Err(VertexFitError::InvalidLinearization)` if the track's linearized state is invalid.
    /// * `Err(VertexFitError::SingularMatrix)` on a degenerate update.
    fn update(
        &self,
        prior: &VertexState,
        track: &VertexTrack<T>,
    ) -> Result<VertexState, VertexFitError>;

    /// Unweighted χ² of `track` with respect to the vertex position in `state`.
    fn track_chi2(&self, state: &VertexState, track: &VertexTrack<T>)
        -> Result<f64, VertexFitError>;
}

/// Momentum-marginalized linear model pieces shared by updator and smoother.
pub(crate) struct ReducedTrackModel {
    /// `(BᵀGB)⁻¹`, m×m
    pub s: DMatrix<f64>,
    /// `G − G B S Bᵀ G`, n×n
    pub g_b: DMatrix<f64>,
    /// `q − c`
    pub measurement: DVector<f64>,
}

impl ReducedTrackModel {
    pub(crate) fn new<T>(lin: &LinearizedTrackState<T>) -> Result<Self, VertexFitError> {
        lin.check_dimensions()?;
        if !lin.is_valid() {
            return Err(VertexFitError::InvalidLinearization);
        }
        let g = lin.weight();
        let b = lin.momentum_jacobian();
        let measurement = lin.parameters() - lin.constant_term();

        if b.ncols() == 0 {
            return Ok(ReducedTrackModel {
                s: DMatrix::zeros(0, 0),
                g_b: g.clone(),
                measurement,
            });
        }

        let gb = g * b;
        let s = invert_positive_definite(&(b.transpose() * &gb))
            .ok_or(VertexFitError::SingularMatrix("track momentum weight BᵀGB"))?;
        let g_b = symmetrize(&(g - &gb * &s * gb.transpose()));

        Ok(ReducedTrackModel { s, g_b, measurement })
    }

    /// Momentum best matching vertex `x`: `S BᵀG (q − c − A x)`.
    pub(crate) fn momentum_at<T>(
        &self,
        lin: &LinearizedTrackState<T>,
        x: &DVector<f64>,
    ) -> DVector<f64> {
        if self.s.nrows() == 0 {
            return DVector::zeros(0);
        }
        let r = &self.measurement - lin.position_jacobian() * x;
        &self.s * lin.momentum_jacobian().transpose() * lin.weight() * r
    }
}

/// Information-form Kalman vertex update.
#[derive(Debug, Clone, Copy, Default)]
pub struct KalmanVertexUpdator;

impl KalmanVertexUpdator {
    pub fn new() -> Self {
        KalmanVertexUpdator
    }
}

impl<T: Trajectory> VertexUpdator<T> for KalmanVertexUpdator {
    fn update(
        &self,
        prior: &VertexState,
        track: &VertexTrack<T>,
    ) -> Result<VertexState, VertexFitError> {
        let lin = track.linearized_track();
        let model = ReducedTrackModel::new(lin)?;
        let a = lin.position_jacobian();
        let w = track.weight();

        let at_gb = a.transpose() * &model.g_b;
        let track_weight = to_matrix3(&(&at_gb * a));
        let new_weight = symmetrize3(&(prior.weight() + track_weight * w));
        let new_covariance = invert_positive_definite3(&new_weight)
            .ok_or(VertexFitError::SingularMatrix("vertex weight"))?;

        let info = prior.weight() * prior.position().coords
            + to_vector3(&(at_gb * &model.measurement)) * w;
        let new_position = Point3::from(new_covariance * info);

        Ok(VertexState::from_parts(
            new_position,
            new_covariance,
            new_weight,
        ))
    }

    fn track_chi2(
        &self,
        state: &VertexState,
        track: &VertexTrack<T>,
    ) -> Result<f64, VertexFitError> {
        let lin = track.linearized_track();
        let model = ReducedTrackModel::new(lin)?;
        let x = point_to_dvector(state.position());
        let p = model.momentum_at(lin, &x);

        let r = &model.measurement - lin.position_jacobian() * &x - lin.momentum_jacobian() * p;
        Ok(r.dot(&(lin.weight() * &r)))
    }
}

#[cfg(test)]
mod updator_test {
    use super::*;
    use crate::linearization::{LineTrackLinearizer, LinearizedTrackStateFactory};
    use crate::trajectory::LineTrack;
    use crate::vertex_track::VertexTrackFactory;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Matrix4};
    use std::sync::Arc;

    fn vertex_track(
        vertex: &Point3<f64>,
        tx: f64,
        ty: f64,
        lin_point: &Point3<f64>,
        weight: f64,
    ) -> VertexTrack<LineTrack> {
        let track = Arc::new(LineTrack::through_point(
            vertex,
            tx,
            ty,
            0.0,
            Matrix4::from_diagonal(&nalgebra::Vector4::new(1e-4, 1e-4, 1e-6, 1e-6)),
        ));
        let lin = Arc::new(LineTrackLinearizer.linearize(lin_point, &track));
        VertexTrackFactory.vertex_track(lin, weight).unwrap()
    }

    #[test]
    fn test_update_reduces_uncertainty_transversely() {
        let vertex = Point3::new(0.1, -0.2, 5.0);
        let prior = VertexState::uninformative(vertex, 10_000.0);
        let vt = vertex_track(&vertex, 0.0, 0.0, &vertex, 1.0);

        let updated = KalmanVertexUpdator.update(&prior, &vt).unwrap();

        assert!(updated.covariance()[(0, 0)] < 1e-3);
        assert!(updated.covariance()[(1, 1)] < 1e-3);
        // a single line parallel to z leaves z unconstrained
        assert!(updated.covariance()[(2, 2)] > 100.0);
        assert_relative_eq!(*updated.position(), vertex, epsilon = 1e-9);
    }

    #[test]
    fn test_sequential_updates_pin_the_vertex() {
        let vertex = Point3::new(0.1, -0.2, 5.0);
        let start = Point3::new(0.0, 0.0, 4.0);
        let prior = VertexState::uninformative(start, 10_000.0);

        let tracks = [
            vertex_track(&vertex, 0.1, 0.0, &start, 1.0),
            vertex_track(&vertex, -0.1, 0.05, &start, 1.0),
            vertex_track(&vertex, 0.0, -0.1, &start, 1.0),
        ];

        let state = tracks
            .iter()
            .try_fold(prior, |s, vt| KalmanVertexUpdator.update(&s, vt))
            .unwrap();

        // slopes are measured exactly, so the model is linear in the vertex
        assert_relative_eq!(*state.position(), vertex, epsilon = 1e-6);
        for vt in &tracks {
            assert!(KalmanVertexUpdator.track_chi2(&state, vt).unwrap() < 1e-6);
        }
    }

    #[test]
    fn test_zero_weight_track_is_ignored() {
        let vertex = Point3::new(1.0, 1.0, 1.0);
        let prior = VertexState::new(Point3::origin(), Matrix3::identity()).unwrap();
        let vt = vertex_track(&vertex, 0.1, 0.1, &Point3::origin(), 0.0);

        let updated = KalmanVertexUpdator.update(&prior, &vt).unwrap();
        assert_relative_eq!(*updated.position(), Point3::origin(), epsilon = 1e-14);
        assert_relative_eq!(*updated.covariance(), Matrix3::identity(), epsilon = 1e-14);
    }

    #[test]
    fn test_track_chi2_grows_with_offset() {
        let vertex = Point3::new(0.0, 0.0, 0.0);
        let vt = vertex_track(&vertex, 0.05, -0.05, &vertex, 1.0);
        let on = VertexState::uninformative(vertex, 1.0);
        let off = VertexState::uninformative(Point3::new(0.02, 0.0, 0.0), 1.0);

        let chi2_on = KalmanVertexUpdator.track_chi2(&on, &vt).unwrap();
        let chi2_off = KalmanVertexUpdator.track_chi2(&off, &vt).unwrap();

        assert_relative_eq!(chi2_on, 0.0, epsilon = 1e-12);
        // 0.02 offset over σ = 0.01 in x0
        assert_relative_eq!(chi2_off, 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_invalid_linearization_is_reported() {
        let track = Arc::new(LineTrack::new(
            nalgebra::Vector4::new(0.0, 0.0, 0.1, 0.1),
            0.0,
            Matrix4::zeros(),
        ));
        let lin = Arc::new(LineTrackLinearizer.linearize(&Point3::origin(), &track));
        let vt = VertexTrackFactory.unit_weight_track(lin);
        let prior = VertexState::uninformative(Point3::origin(), 1.0);

        assert_eq!(
            KalmanVertexUpdator.update(&prior, &vt).unwrap_err(),
            VertexFitError::InvalidLinearization
        );
    }
}
