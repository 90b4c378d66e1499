//! # Track linearization
//!
//! A vertex fit needs, for every trajectory, a local **linear model** of its measured
//! parameters `q` as a function of the vertex position `x` and of the track momentum `p`:
//!
//! ```text
//! q ≈ c + A·x + B·p
//! ```
//!
//! valid in the neighbourhood of a *linearization point*. This module defines the
//! [`LinearizedTrackState`] holding such a model and the [`LinearizedTrackStateFactory`]
//! capability building it for a trajectory type.
//!
//! ## Lifetime
//!
//! A [`LinearizedTrackState`] is tied to exactly one `(trajectory, point)` pair. When the
//! fitter moves its estimate, a new state is built from the trajectory and the old one is
//! dropped; states are never updated in place. States are shared through [`Arc`] so that
//! several [`VertexTrack`](crate::vertex_track::VertexTrack)s can refer to the same model
//! without copying its matrices.
//!
//! ## See also
//! * [`LineTrackLinearizer`] – reference factory for [`LineTrack`](crate::trajectory::LineTrack).
//! * [`KalmanVertexUpdator`](crate::updator::KalmanVertexUpdator) – consumer of the model.

use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector, Point3};

use crate::{
    linalg::{invert_positive_definite, point_to_dvector},
    trajectory::Trajectory,
    vertex_errors::VertexFitError,
};

pub mod line_track_linearizer;

pub use line_track_linearizer::LineTrackLinearizer;

/// Builds linearized track states for trajectories of type `T`.
///
/// Implementations hold only immutable configuration and are shared between fits.
pub trait LinearizedTrackStateFactory<T: Trajectory>: fmt::Debug + Send + Sync {
    /// Linearize `track` about `point`.
    ///
    /// Never fails: a model that cannot be built is returned with
    /// [`LinearizedTrackState::is_valid`] set to `false`.
    fn linearize(&self, point: &Point3<f64>, track: &Arc<T>) -> LinearizedTrackState<T>;
}

/// Local linear model of a trajectory around a linearization point.
pub struct LinearizedTrackState<T> {
    track: Arc<T>,
    linearization_point: Point3<f64>,
    position_jacobian: DMatrix<f64>,
    momentum_jacobian: DMatrix<f64>,
    constant_term: DVector<f64>,
    predicted_momentum: DVector<f64>,
    parameters: DVector<f64>,
    weight: DMatrix<f64>,
    valid: bool,
}

impl<T> LinearizedTrackState<T> {
    /// Assemble a linearized state.
    ///
    /// The weight is obtained by inverting `covariance`. The state is flagged invalid when
    /// dimensions are inconsistent (`A` n×3, `B` n×m, `c` and `q` of length n, `p₀` of
    /// length m, covariance n×n), when any input is non-finite, or when the covariance is
    /// singular.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        track: Arc<T>,
        linearization_point: Point3<f64>,
        position_jacobian: DMatrix<f64>,
        momentum_jacobian: DMatrix<f64>,
        constant_term: DVector<f64>,
        predicted_momentum: DVector<f64>,
        parameters: DVector<f64>,
        covariance: &DMatrix<f64>,
    ) -> Self {
        let n = parameters.len();
        let m = predicted_momentum.len();
        let dims_ok = position_jacobian.shape() == (n, 3)
            && momentum_jacobian.shape() == (n, m)
            && constant_term.len() == n
            && covariance.shape() == (n, n);

        let finite = linearization_point.iter().all(|v| v.is_finite())
            && position_jacobian.iter().all(|v| v.is_finite())
            && momentum_jacobian.iter().all(|v| v.is_finite())
            && constant_term.iter().all(|v| v.is_finite())
            && predicted_momentum.iter().all(|v| v.is_finite())
            && parameters.iter().all(|v| v.is_finite());

        let weight = if dims_ok && finite {
            invert_positive_definite(covariance)
        } else {
            None
        };
        let valid = weight.is_some();

        LinearizedTrackState {
            track,
            linearization_point,
            position_jacobian,
            momentum_jacobian,
            constant_term,
            predicted_momentum,
            parameters,
            weight: weight.unwrap_or_else(|| DMatrix::zeros(n, n)),
            valid,
        }
    }

    pub fn track(&self) -> &Arc<T> {
        &self.track
    }

    pub fn linearization_point(&self) -> &Point3<f64> {
        &self.linearization_point
    }

    /// `A = ∂q/∂x`, n×3.
    pub fn position_jacobian(&self) -> &DMatrix<f64> {
        &self.position_jacobian
    }

    /// `B = ∂q/∂p`, n×m.
    pub fn momentum_jacobian(&self) -> &DMatrix<f64> {
        &self.momentum_jacobian
    }

    pub fn constant_term(&self) -> &DVector<f64> {
        &self.constant_term
    }

    pub fn predicted_momentum(&self) -> &DVector<f64> {
        &self.predicted_momentum
    }

    /// Measured parameters `q`.
    pub fn parameters(&self) -> &DVector<f64> {
        &self.parameters
    }

    /// Inverse of the parameter covariance. All zeros for an invalid state.
    pub fn weight(&self) -> &DMatrix<f64> {
        &self.weight
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn parameter_dimension(&self) -> usize {
        self.parameters.len()
    }

    pub fn momentum_dimension(&self) -> usize {
        self.predicted_momentum.len()
    }

    /// Report the first matrix whose shape disagrees with the parameter and momentum
    /// dimensions.
    pub fn check_dimensions(&self) -> Result<(), VertexFitError> {
        let n = self.parameter_dimension();
        let m = self.momentum_dimension();
        let checks = [
            ("position jacobian rows", n, self.position_jacobian.nrows()),
            ("position jacobian columns", 3, self.position_jacobian.ncols()),
            ("momentum jacobian rows", n, self.momentum_jacobian.nrows()),
            ("momentum jacobian columns", m, self.momentum_jacobian.ncols()),
            ("constant term", n, self.constant_term.len()),
        ];
        match checks.iter().find(|(_, expected, found)| expected != found) {
            Some(&(context, expected, found)) => Err(VertexFitError::DimensionMismatch {
                context,
                expected,
                found,
            }),
            None => Ok(()),
        }
    }

    /// Parameters predicted by the linear model for vertex `x` and momentum `p`.
    pub fn predicted_parameters(&self, x: &Point3<f64>, p: &DVector<f64>) -> DVector<f64> {
        &self.constant_term
            + &self.position_jacobian * point_to_dvector(x)
            + &self.momentum_jacobian * p
    }

    /// Parameters predicted at the linearization point with the predicted momentum.
    pub fn predicted_parameters_at_linearization_point(&self) -> DVector<f64> {
        self.predicted_parameters(&self.linearization_point, &self.predicted_momentum)
    }
}

impl<T: fmt::Debug> fmt::Debug for LinearizedTrackState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearizedTrackState")
            .field("track", &self.track)
            .field("linearization_point", &self.linearization_point)
            .field("parameter_dimension", &self.parameters.len())
            .field("momentum_dimension", &self.predicted_momentum.len())
            .field("valid", &self.valid)
            .finish()
    }
}
