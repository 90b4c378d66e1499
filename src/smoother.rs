//! # Vertex smoothers
//!
//! Once the vertex has converged, a [`VertexSmoother`] recomputes each track's parameters
//! with the constraint that the track originates from the fitted vertex. The result, one
//! [`RefittedTrackState`] per vertex track, is what a caller needs to run a subsequent
//! fit with a vertex-position constraint.
//!
//! [`KalmanVertexSmoother`] uses the Frühwirth smoother equations: with the final vertex
//! `x` and covariance `C`,
//!
//! ```text
//! p = S BᵀG (q − c − A x)
//! D = S + S BᵀG A C AᵀG B S        (momentum covariance)
//! E = −C AᵀG B S                   (vertex–momentum covariance)
//! ```

use std::fmt;

use nalgebra::{DMatrix, DVector, Point3};

use crate::{
    linalg::{point_to_dvector, symmetrize, to_dmatrix},
    trajectory::Trajectory,
    updator::ReducedTrackModel,
    vertex_errors::VertexFitError,
    vertex_state::VertexState,
    vertex_track::VertexTrack,
};

/// Track parameters re-evaluated under the constraint of the fitted vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct RefittedTrackState {
    /// Vertex the track was constrained to.
    pub position: Point3<f64>,
    /// Refitted momentum parameters.
    pub momentum: DVector<f64>,
    /// Parameters predicted by the linear model at `(position, momentum)`.
    pub parameters: DVector<f64>,
    /// Covariance of `momentum` (m×m).
    pub momentum_covariance: DMatrix<f64>,
    /// Covariance between vertex position and `momentum` (3×m).
    pub position_momentum_covariance: DMatrix<f64>,
    /// χ² of the measured parameters with respect to the refitted ones.
    pub chi2: f64,
    /// Weight of the track in the vertex fit.
    pub weight: f64,
}

/// Post-fit refit of the tracks constrained to the vertex.
pub trait VertexSmoother<T: Trajectory>: fmt::Debug + Send + Sync {
    /// Refit every track of `tracks` against `state`, preserving order.
    fn smooth(
        &self,
        state: &VertexState,
        tracks: &[VertexTrack<T>],
    ) -> Result<Vec<RefittedTrackState>, VertexFitError>;
}

/// Kalman-filter smoother.
#[derive(Debug, Clone, Copy, Default)]
pub struct KalmanVertexSmoother;

impl KalmanVertexSmoother {
    pub fn new() -> Self {
        KalmanVertexSmoother
    }

    fn refit<T>(
        &self,
        state: &VertexState,
        track: &VertexTrack<T>,
    ) -> Result<RefittedTrackState, VertexFitError> {
        let lin = track.linearized_track();
        let model = ReducedTrackModel::new(lin)?;
        let a = lin.position_jacobian();
        let b = lin.momentum_jacobian();
        let g = lin.weight();

        let x = point_to_dvector(state.position());
        let momentum = model.momentum_at(lin, &x);
        let parameters = lin.predicted_parameters(state.position(), &momentum);

        let c = to_dmatrix(state.covariance());
        // K = S Bᵀ G A, m×3
        let k = &model.s * b.transpose() * g * a;
        let momentum_covariance = symmetrize(&(&model.s + &k * &c * k.transpose()));
        let position_momentum_covariance = -(&c * k.transpose());

        let residual = lin.parameters() - &parameters;
        let chi2 = residual.dot(&(g * &residual));

        Ok(RefittedTrackState {
            position: *state.position(),
            momentum,
            parameters,
            momentum_covariance,
            position_momentum_covariance,
            chi2,
            weight: track.weight(),
        })
    }
}

impl<T: Trajectory> VertexSmoother<T> for KalmanVertexSmoother {
    fn smooth(
        &self,
        state: &VertexState,
        tracks: &[VertexTrack<T>],
    ) -> Result<Vec<RefittedTrackState>, VertexFitError> {
        tracks.iter().map(|vt| self.refit(state, vt)).collect()
    }
}
