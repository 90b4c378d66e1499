//! # Vertex states and beam-spot priors
//!
//! [`VertexState`] is the value threaded through the fit: a 3D position together with its
//! covariance and the matching weight (information) matrix. A state is never modified in
//! place; the updator builds a new one for every track it folds in.
//!
//! [`BeamSpot`] describes the luminous region of the colliding beams and converts into a
//! [`VertexState`] used as prior by
//! [`SequentialVertexFitter::vertex_with_beam_spot`](crate::sequential_fitter::SequentialVertexFitter::vertex_with_beam_spot).

use std::fmt;

use nalgebra::{Matrix3, Point3, Vector3};

use crate::{
    linalg::{invert_positive_definite3, symmetrize3},
    vertex_errors::VertexFitError,
};

/// Position estimate with covariance and weight.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexState {
    position: Point3<f64>,
    covariance: Matrix3<f64>,
    weight: Matrix3<f64>,
}

impl VertexState {
    /// Build a state from a position and its covariance.
    ///
    /// Return
    /// ----------
    /// * `Err(VertexFitError::SingularMatrix)` if the covariance is not positive definite.
    pub fn new(position: Point3<f64>, covariance: Matrix3<f64>) -> Result<Self, VertexFitError> {
        let covariance = symmetrize3(&covariance);
        let weight = invert_positive_definite3(&covariance)
            .ok_or(VertexFitError::SingularMatrix("vertex covariance"))?;
        Ok(VertexState {
            position,
            covariance,
            weight,
        })
    }

    /// Build a state from a position and its weight (inverse covariance).
    pub fn from_weight(position: Point3<f64>, weight: Matrix3<f64>) -> Result<Self, VertexFitError> {
        let weight = symmetrize3(&weight);
        let covariance = invert_positive_definite3(&weight)
            .ok_or(VertexFitError::SingularMatrix("vertex weight"))?;
        Ok(VertexState {
            position,
            covariance,
            weight,
        })
    }

    /// Assemble a state whose covariance and weight are already known to be inverses.
    pub(crate) fn from_parts(
        position: Point3<f64>,
        covariance: Matrix3<f64>,
        weight: Matrix3<f64>,
    ) -> Self {
        VertexState {
            position,
            covariance,
            weight,
        }
    }

    /// Starting state carrying (almost) no information: covariance `error_scale · I₃`.
    ///
    /// `error_scale` is expected to be strictly positive; the fitter parameters enforce it.
    pub fn uninformative(position: Point3<f64>, error_scale: f64) -> Self {
        VertexState {
            position,
            covariance: Matrix3::from_diagonal_element(error_scale),
            weight: Matrix3::from_diagonal_element(1.0 / error_scale),
        }
    }

    pub fn position(&self) -> &Point3<f64> {
        &self.position
    }

    pub fn covariance(&self) -> &Matrix3<f64> {
        &self.covariance
    }

    pub fn weight(&self) -> &Matrix3<f64> {
        &self.weight
    }

    /// `true` when position and covariance contain only finite numbers.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.covariance.iter().all(|v| v.is_finite())
    }

    /// Distance to `other` in the plane transverse to the `z` axis.
    pub fn transverse_distance(&self, other: &Point3<f64>) -> f64 {
        transverse_distance(&self.position, other)
    }
}

impl fmt::Display for VertexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VertexState(x={:.5} ± {:.5}, y={:.5} ± {:.5}, z={:.5} ± {:.5})",
            self.position.x,
            self.covariance[(0, 0)].sqrt(),
            self.position.y,
            self.covariance[(1, 1)].sqrt(),
            self.position.z,
            self.covariance[(2, 2)].sqrt(),
        )
    }
}

/// Transverse (x, y) distance between two points.
pub fn transverse_distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Cylindrical radius of a point around the `z` axis.
pub fn transverse_radius(p: &Point3<f64>) -> f64 {
    p.x.hypot(p.y)
}

/// Luminous region of the colliding beams.
///
/// The beam line passes through `position` with slopes `(dxdz, dydz)`. The transverse
/// widths are measured in the frame attached to the beam line, so the global covariance
/// returned by [`BeamSpot::covariance`] is rotated accordingly.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamSpot {
    pub position: Point3<f64>,
    pub sigma_z: f64,
    pub dxdz: f64,
    pub dydz: f64,
    pub width_x: f64,
    pub width_y: f64,
}

impl BeamSpot {
    /// Beam spot aligned with the `z` axis.
    pub fn new(position: Point3<f64>, width_x: f64, width_y: f64, sigma_z: f64) -> Self {
        BeamSpot {
            position,
            sigma_z,
            dxdz: 0.0,
            dydz: 0.0,
            width_x,
            width_y,
        }
    }

    /// Set the slopes of the beam line.
    pub fn with_slopes(mut self, dxdz: f64, dydz: f64) -> Self {
        self.dxdz = dxdz;
        self.dydz = dydz;
        self
    }

    /// Global 3×3 covariance of the luminous region.
    ///
    /// Built as `wx² e₁e₁ᵀ + wy² e₂e₂ᵀ + σz² uuᵀ` where `u` is the unit beam direction and
    /// `(e₁, e₂)` the transverse axes obtained by projecting `x̂` out of `u`.
    pub fn covariance(&self) -> Matrix3<f64> {
        let u = Vector3::new(self.dxdz, self.dydz, 1.0).normalize();
        let e1 = (Vector3::x() - u * u.x).normalize();
        let e2 = u.cross(&e1);

        let cov = e1 * e1.transpose() * self.width_x.powi(2)
            + e2 * e2.transpose() * self.width_y.powi(2)
            + u * u.transpose() * self.sigma_z.powi(2);
        symmetrize3(&cov)
    }
}

impl TryFrom<&BeamSpot> for VertexState {
    type Error = VertexFitError;

    fn try_from(spot: &BeamSpot) -> Result<Self, Self::Error> {
        VertexState::new(spot.position, spot.covariance())
    }
}

#[cfg(test)]
mod vertex_state_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_new_computes_weight() {
        let cov = Matrix3::from_diagonal(&Vector3::new(4.0, 1.0, 0.25));
        let state = VertexState::new(Point3::new(1.0, 2.0, 3.0), cov).unwrap();

        assert_relative_eq!(
            *state.weight(),
            Matrix3::from_diagonal(&Vector3::new(0.25, 1.0, 4.0)),
            epsilon = 1e-14
        );
        assert!(state.is_finite());
    }

    #[test]
    fn test_singular_covariance_is_rejected() {
        let res = VertexState::new(Point3::origin(), Matrix3::zeros());
        assert_eq!(
            res.unwrap_err(),
            VertexFitError::SingularMatrix("vertex covariance")
        );
        let res = VertexState::from_weight(Point3::origin(), Matrix3::zeros());
        assert_eq!(res.unwrap_err(), VertexFitError::SingularMatrix("vertex weight"));
    }

    #[test]
    fn test_indefinite_covariance_is_rejected() {
        let cov = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1e-4));
        assert_eq!(
            VertexState::new(Point3::origin(), cov).unwrap_err(),
            VertexFitError::SingularMatrix("vertex covariance")
        );
    }

    #[test]
    fn test_uninformative() {
        let state = VertexState::uninformative(Point3::new(0.0, 0.0, 1.0), 10_000.0);
        assert_eq!(state.covariance()[(1, 1)], 10_000.0);
        assert_eq!(state.weight()[(2, 2)], 1e-4);
        assert_eq!(state.covariance()[(0, 1)], 0.0);
    }

    #[test]
    fn test_transverse_distance_ignores_z() {
        let state = VertexState::uninformative(Point3::new(3.0, 0.0, 100.0), 1.0);
        assert_relative_eq!(state.transverse_distance(&Point3::new(0.0, 4.0, -7.0)), 5.0);
        assert_relative_eq!(transverse_radius(&Point3::new(3.0, 4.0, 1e6)), 5.0);
    }

    #[test]
    fn test_non_finite_state() {
        let state = VertexState::uninformative(Point3::new(f64::NAN, 0.0, 0.0), 1.0);
        assert!(!state.is_finite());
    }

    #[test]
    fn test_beam_spot_covariance_aligned() {
        let spot = BeamSpot::new(Point3::new(0.1, 0.2, 0.0), 0.002, 0.003, 5.0);
        let cov = spot.covariance();

        assert_relative_eq!(cov[(0, 0)], 0.002_f64.powi(2), epsilon = 1e-15);
        assert_relative_eq!(cov[(1, 1)], 0.003_f64.powi(2), epsilon = 1e-15);
        assert_relative_eq!(cov[(2, 2)], 25.0, epsilon = 1e-12);
        assert_relative_eq!(cov[(0, 2)], 0.0, epsilon = 1e-15);

        let state = VertexState::try_from(&spot).unwrap();
        assert_eq!(*state.position(), spot.position);
    }

    #[test]
    fn test_beam_spot_covariance_tilted() {
        let spot = BeamSpot::new(Point3::origin(), 0.001, 0.001, 5.0).with_slopes(1e-3, -2e-3);
        let cov = spot.covariance();

        // the long axis follows the beam line
        let u = Vector3::new(1e-3, -2e-3, 1.0).normalize();
        assert_relative_eq!((u.transpose() * cov * u)[(0, 0)], 25.0, epsilon = 1e-9);
        assert!(cov[(0, 2)] > 0.0);
        assert!(cov[(1, 2)] < 0.0);
        assert_relative_eq!(cov, cov.transpose(), epsilon = 1e-15);
    }
}
