//! # Linearization point finders
//!
//! Before the first pass the fitter needs a point about which every trajectory is
//! linearized. A [`LinearizationPointFinder`] produces it from the raw trajectories.
//!
//! [`CrossingPointFinder`] approximates each trajectory by its tangent line at the
//! reference point, computes the mid-point of the segment of closest approach for every
//! pair of lines and combines these crossing points with a mean or a per-coordinate median.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nalgebra::{Matrix4, Point3};
//! use vertexfit::linearization_point_finder::{CrossingPointFinder, LinearizationPointFinder};
//! use vertexfit::trajectory::LineTrack;
//!
//! let vertex = Point3::new(0.1, -0.2, 5.0);
//! let tracks: Vec<Arc<LineTrack>> = [(0.1, 0.0), (-0.1, 0.05), (0.0, -0.1)]
//!     .iter()
//!     .map(|&(tx, ty)| Arc::new(LineTrack::through_point(&vertex, tx, ty, 0.0, Matrix4::identity())))
//!     .collect();
//!
//! let point = CrossingPointFinder::default().linearization_point(&tracks).unwrap();
//! assert!((point - vertex).norm() < 1e-9);
//! ```

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use nalgebra::{Point3, Vector3};

use crate::{
    constants::{EPS, MIN_TRACKS_FOR_POINT_FINDING},
    trajectory::Trajectory,
    vertex_errors::VertexFitError,
};

/// Produces the initial linearization point from a set of trajectories.
pub trait LinearizationPointFinder<T: Trajectory>: fmt::Debug + Send + Sync {
    /// Estimate a common point of `tracks`.
    ///
    /// Return
    /// ----------
    /// * `Err(VertexFitError::InsufficientInput)` if fewer than two trajectories are given.
    fn linearization_point(&self, tracks: &[Arc<T>]) -> Result<Point3<f64>, VertexFitError>;
}

/// How the pairwise crossing points are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossingPointEstimator {
    /// Arithmetic mean of all crossing points.
    #[default]
    Mean,
    /// Median of each coordinate, robust against a few badly measured tracks.
    Median,
}

/// Linearization point from pairwise closest approaches of tangent lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossingPointFinder {
    estimator: CrossingPointEstimator,
}

impl CrossingPointFinder {
    pub fn new(estimator: CrossingPointEstimator) -> Self {
        CrossingPointFinder { estimator }
    }

    pub fn estimator(&self) -> CrossingPointEstimator {
        self.estimator
    }
}

impl<T: Trajectory> LinearizationPointFinder<T> for CrossingPointFinder {
    fn linearization_point(&self, tracks: &[Arc<T>]) -> Result<Point3<f64>, VertexFitError> {
        if tracks.len() < MIN_TRACKS_FOR_POINT_FINDING {
            return Err(VertexFitError::InsufficientInput {
                required: MIN_TRACKS_FOR_POINT_FINDING,
                found: tracks.len(),
            });
        }

        let lines: Vec<(Point3<f64>, Vector3<f64>)> = tracks
            .iter()
            .map(|t| (t.reference_point(), t.direction()))
            .collect();

        let crossings: Vec<Point3<f64>> = lines
            .iter()
            .tuple_combinations()
            .filter_map(|(l1, l2)| closest_approach_midpoint(l1, l2))
            .collect();

        // all pairs parallel (or degenerate): fall back on the reference points
        let points = if crossings.is_empty() {
            lines.iter().map(|(p, _)| *p).collect()
        } else {
            crossings
        };

        Ok(match self.estimator {
            CrossingPointEstimator::Mean => mean_point(&points),
            CrossingPointEstimator::Median => median_point(&points),
        })
    }
}

/// Mid-point of the shortest segment joining two lines `p + s·d`.
///
/// Returns `None` for (nearly) parallel lines or non-finite input.
pub fn closest_approach_midpoint(
    (p1, d1): &(Point3<f64>, Vector3<f64>),
    (p2, d2): &(Point3<f64>, Vector3<f64>),
) -> Option<Point3<f64>> {
    let w0 = p1 - p2;
    let a = d1.dot(d1);
    let b = d1.dot(d2);
    let c = d2.dot(d2);
    let d = d1.dot(&w0);
    let e = d2.dot(&w0);

    let denom = a * c - b * b;
    if !denom.is_finite() || denom <= EPS * a * c {
        return None;
    }

    let s = (b * e - c * d) / denom;
    let t = (a * e - b * d) / denom;
    let mid = Point3::from((p1.coords + d1 * s + p2.coords + d2 * t) * 0.5);
    mid.iter().all(|v| v.is_finite()).then_some(mid)
}

fn mean_point(points: &[Point3<f64>]) -> Point3<f64> {
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len() as f64)
}

fn median_point(points: &[Point3<f64>]) -> Point3<f64> {
    let median = |axis: usize| {
        let mut values: Vec<f64> = points.iter().map(|p| p[axis]).collect();
        values.sort_by(f64::total_cmp);
        let n = values.len();
        if n % 2 == 1 {
            values[n / 2]
        } else {
            0.5 * (values[n / 2 - 1] + values[n / 2])
        }
    };
    Point3::new(median(0), median(1), median(2))
}
