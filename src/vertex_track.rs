//! # Vertex tracks
//!
//! A [`VertexTrack`] is the unit consumed by the vertex updator: one trajectory, its
//! current [`LinearizedTrackState`] and a fit weight. Vertex tracks are rebuilt every time
//! the linearization point moves.

use std::fmt;
use std::sync::Arc;

use nalgebra::Point3;

use crate::{linearization::LinearizedTrackState, vertex_errors::VertexFitError};

/// Trajectory paired with its linearized state and a fit weight.
pub struct VertexTrack<T> {
    linearized: Arc<LinearizedTrackState<T>>,
    weight: f64,
}

impl<T> VertexTrack<T> {
    pub fn trajectory(&self) -> &Arc<T> {
        self.linearized.track()
    }

    pub fn linearized_track(&self) -> &Arc<LinearizedTrackState<T>> {
        &self.linearized
    }

    pub fn linearization_point(&self) -> &Point3<f64> {
        self.linearized.linearization_point()
    }

    /// Weight in `[0, ∞)` used to down-weight outliers; 1 for a regular track.
    pub fn weight(&self) -> f64 {
        self.weight
    }
}

// Manual impl: cloning shares the linearized state and never requires `T: Clone`.
impl<T> Clone for VertexTrack<T> {
    fn clone(&self) -> Self {
        VertexTrack {
            linearized: Arc::clone(&self.linearized),
            weight: self.weight,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for VertexTrack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexTrack")
            .field("linearized", &self.linearized)
            .field("weight", &self.weight)
            .finish()
    }
}

/// Bundles linearized states and weights into [`VertexTrack`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct VertexTrackFactory;

impl VertexTrackFactory {
    pub fn new() -> Self {
        VertexTrackFactory
    }

    /// Build a vertex track.
    ///
    /// Return
    /// ----------
    /// * `Err(VertexFitError::InvalidTrackWeight)` if `weight` is negative or not finite.
    pub fn vertex_track<T>(
        &self,
        linearized: Arc<LinearizedTrackState<T>>,
        weight: f64,
    ) -> Result<VertexTrack<T>, VertexFitError> {
        if !(weight.is_finite() && weight >= 0.0) {
            return Err(VertexFitError::InvalidTrackWeight(weight));
        }
        Ok(VertexTrack { linearized, weight })
    }

    /// Build a vertex track with unit weight.
    pub fn unit_weight_track<T>(&self, linearized: Arc<LinearizedTrackState<T>>) -> VertexTrack<T> {
        VertexTrack {
            linearized,
            weight: 1.0,
        }
    }
}
