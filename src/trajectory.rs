//! # Trajectories
//!
//! This module defines the [`Trajectory`] capability consumed by the vertex fitter and a
//! reference straight-line implementation, [`LineTrack`].
//!
//! A trajectory is an immutable measurement owned by the caller and shared with the fitter
//! through an [`Arc`](std::sync::Arc). The fitter itself never inspects the parameter vector:
//! only the [`LinearizedTrackStateFactory`](crate::linearization::LinearizedTrackStateFactory)
//! matching the trajectory type knows how to build a local linear model from it.
//!
//! ## `LineTrack` parameterization
//!
//! A [`LineTrack`] is a straight line measured at the reference plane `z = z_ref`:
//!
//! ```text
//! x(z) = x0 + tx · (z − z_ref)
//! y(z) = y0 + ty · (z − z_ref)
//! ```
//!
//! with parameter vector `(x0, y0, tx, ty)` and its 4×4 covariance. The slopes `(tx, ty)`
//! play the role of the track momentum in the vertex fit.
//! Lines perpendicular to the `z` axis cannot be represented.

use std::fmt;

use nalgebra::{DMatrix, DVector, Matrix4, Point3, Vector3, Vector4};

/// A measured particle trajectory.
///
/// Implementations must be cheap to read and free of interior mutability, since the
/// same trajectory can be fitted concurrently from several threads.
pub trait Trajectory: fmt::Debug + Send + Sync {
    /// A point on the trajectory close to the interaction region.
    fn reference_point(&self) -> Point3<f64>;

    /// Unit tangent of the trajectory at [`Trajectory::reference_point`].
    fn direction(&self) -> Vector3<f64>;

    /// Measured parameter vector.
    fn parameters(&self) -> DVector<f64>;

    /// Covariance of [`Trajectory::parameters`].
    fn covariance(&self) -> DMatrix<f64>;
}

/// Straight-line trajectory measured at a reference plane.
#[derive(Debug, Clone, PartialEq)]
pub struct LineTrack {
    /// `(x0, y0, tx, ty)` at `z = z_ref`
    params: Vector4<f64>,
    z_ref: f64,
    covariance: Matrix4<f64>,
}

impl LineTrack {
    /// Build a line from its measured parameters.
    ///
    /// Arguments
    /// -----------------
    /// * `params`: `(x0, y0, tx, ty)` at the reference plane.
    /// * `z_ref`: longitudinal position of the reference plane.
    /// * `covariance`: 4×4 covariance of `params`.
    pub fn new(params: Vector4<f64>, z_ref: f64, covariance: Matrix4<f64>) -> Self {
        LineTrack {
            params,
            z_ref,
            covariance,
        }
    }

    /// Build the line passing through `point` with slopes `(tx, ty)`.
    ///
    /// The parameters are expressed at `z_ref`, so this is the natural way to
    /// generate tracks originating from a known vertex.
    pub fn through_point(
        point: &Point3<f64>,
        tx: f64,
        ty: f64,
        z_ref: f64,
        covariance: Matrix4<f64>,
    ) -> Self {
        let dz = z_ref - point.z;
        let params = Vector4::new(point.x + tx * dz, point.y + ty * dz, tx, ty);
        LineTrack::new(params, z_ref, covariance)
    }

    pub fn x0(&self) -> f64 {
        self.params[0]
    }

    pub fn y0(&self) -> f64 {
        self.params[1]
    }

    pub fn tx(&self) -> f64 {
        self.params[2]
    }

    pub fn ty(&self) -> f64 {
        self.params[3]
    }

    pub fn z_ref(&self) -> f64 {
        self.z_ref
    }

    pub fn params(&self) -> &Vector4<f64> {
        &self.params
    }

    pub fn params_covariance(&self) -> &Matrix4<f64> {
        &self.covariance
    }

    /// Position of the line at longitudinal coordinate `z`.
    pub fn point_at_z(&self, z: f64) -> Point3<f64> {
        let dz = z - self.z_ref;
        Point3::new(self.x0() + self.tx() * dz, self.y0() + self.ty() * dz, z)
    }
}

impl Trajectory for LineTrack {
    fn reference_point(&self) -> Point3<f64> {
        self.point_at_z(self.z_ref)
    }

    fn direction(&self) -> Vector3<f64> {
        Vector3::new(self.tx(), self.ty(), 1.0).normalize()
    }

    fn parameters(&self) -> DVector<f64> {
        DVector::from_column_slice(self.params.as_slice())
    }

    fn covariance(&self) -> DMatrix<f64> {
        DMatrix::from_column_slice(4, 4, self.covariance.as_slice())
    }
}

impl fmt::Display for LineTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LineTrack(x0={:.4}, y0={:.4}, tx={:.5}, ty={:.5} @ z={:.3})",
            self.x0(),
            self.y0(),
            self.tx(),
            self.ty(),
            self.z_ref
        )
    }
}
