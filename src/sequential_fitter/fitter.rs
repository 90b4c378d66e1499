//! # Sequential vertex fitter
//!
//! [`SequentialVertexFitter`] drives the iterative fit: it linearizes the trajectories,
//! folds them into the vertex estimate one at a time, checks the transverse shift of the
//! estimate between passes and re-linearizes until the shift falls below
//! [`FitterParams::maximum_distance`] or the iteration cap is reached.
//!
//! The numerical work is delegated to strategy objects shared through [`Arc`]: a
//! [`LinearizationPointFinder`], a [`LinearizedTrackStateFactory`], a [`VertexUpdator`]
//! and an optional [`VertexSmoother`]. A fitter instance is immutable; the `with_*`
//! helpers consume it and return a reconfigured one.
//!
//! ## Errors
//!
//! Only misuse of the API is reported as `Err`: too few trajectories, an invalid
//! configuration or a prior covariance that is not positive definite. Numerical failures,
//! non-finite estimates, covariances that are not positive semi-definite and vertices
//! outside the tracker bounds produce an invalid [`CachingVertex`].
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nalgebra::{Matrix4, Point3, Vector4};
//! use vertexfit::sequential_fitter::{FitterParams, SequentialVertexFitter};
//! use vertexfit::trajectory::LineTrack;
//!
//! let vertex = Point3::new(0.1, -0.2, 5.0);
//! let cov = Matrix4::from_diagonal(&Vector4::new(1e-4, 1e-4, 1e-6, 1e-6));
//! let tracks: Vec<Arc<LineTrack>> = [(0.1, 0.0), (-0.1, 0.05), (0.0, -0.1)]
//!     .iter()
//!     .map(|&(tx, ty)| Arc::new(LineTrack::through_point(&vertex, tx, ty, 0.0, cov)))
//!     .collect();
//!
//! let fitter = SequentialVertexFitter::for_line_tracks(FitterParams::default()).unwrap();
//! let fitted = fitter.vertex(&tracks).unwrap();
//!
//! assert!(fitted.is_valid());
//! assert!((fitted.position().unwrap() - vertex).norm() < 1e-4);
//! assert_eq!(fitted.degrees_of_freedom(), Some(3.0));
//! ```

use std::fmt;
use std::sync::Arc;

use nalgebra::{Matrix3, Point3};
use tracing::{debug, trace};

use crate::{
    caching_vertex::CachingVertex,
    constants::{EPS, MUON_SYSTEM_BOUNDS_HALF_LENGTH, MUON_SYSTEM_BOUNDS_RADIUS},
    linalg::is_symmetric_positive_semi_definite,
    linearization::{LineTrackLinearizer, LinearizedTrackStateFactory},
    linearization_point_finder::{CrossingPointFinder, LinearizationPointFinder},
    sequential_fitter::FitterParams,
    smoother::{KalmanVertexSmoother, VertexSmoother},
    trajectory::{LineTrack, Trajectory},
    updator::{KalmanVertexUpdator, VertexUpdator},
    vertex_errors::VertexFitError,
    vertex_state::{transverse_radius, BeamSpot, VertexState},
    vertex_track::{VertexTrack, VertexTrackFactory},
};

/// Iterative vertex fitter built from pluggable strategies.
pub struct SequentialVertexFitter<T: Trajectory> {
    params: FitterParams,
    linearization_point_finder: Arc<dyn LinearizationPointFinder<T>>,
    updator: Arc<dyn VertexUpdator<T>>,
    smoother: Option<Arc<dyn VertexSmoother<T>>>,
    linearized_track_state_factory: Arc<dyn LinearizedTrackStateFactory<T>>,
    vertex_track_factory: VertexTrackFactory,
}

impl<T: Trajectory> SequentialVertexFitter<T> {
    /// Fitter without smoother: [`CachingVertex::refitted_tracks`] will be empty.
    ///
    /// Return
    /// ----------
    /// * `Err(VertexFitError::InvalidFitterParameter)` if `params` does not validate.
    pub fn new(
        linearization_point_finder: Arc<dyn LinearizationPointFinder<T>>,
        updator: Arc<dyn VertexUpdator<T>>,
        linearized_track_state_factory: Arc<dyn LinearizedTrackStateFactory<T>>,
        params: FitterParams,
    ) -> Result<Self, VertexFitError> {
        params.validate()?;
        Ok(SequentialVertexFitter {
            params,
            linearization_point_finder,
            updator,
            smoother: None,
            linearized_track_state_factory,
            vertex_track_factory: VertexTrackFactory,
        })
    }

    /// Fitter refitting the tracks against the vertex with `smoother`.
    pub fn with_smoother(
        linearization_point_finder: Arc<dyn LinearizationPointFinder<T>>,
        updator: Arc<dyn VertexUpdator<T>>,
        smoother: Arc<dyn VertexSmoother<T>>,
        linearized_track_state_factory: Arc<dyn LinearizedTrackStateFactory<T>>,
        params: FitterParams,
    ) -> Result<Self, VertexFitError> {
        let mut fitter = Self::new(
            linearization_point_finder,
            updator,
            linearized_track_state_factory,
            params,
        )?;
        fitter.smoother = Some(smoother);
        Ok(fitter)
    }

    pub fn params(&self) -> &FitterParams {
        &self.params
    }

    pub fn linearization_point_finder(&self) -> &Arc<dyn LinearizationPointFinder<T>> {
        &self.linearization_point_finder
    }

    pub fn vertex_updator(&self) -> &Arc<dyn VertexUpdator<T>> {
        &self.updator
    }

    pub fn vertex_smoother(&self) -> Option<&Arc<dyn VertexSmoother<T>>> {
        self.smoother.as_ref()
    }

    pub fn linearized_track_state_factory(&self) -> &Arc<dyn LinearizedTrackStateFactory<T>> {
        &self.linearized_track_state_factory
    }

    /// Same fitter with different parameters.
    pub fn with_params(mut self, params: FitterParams) -> Result<Self, VertexFitError> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    pub fn with_tracker_bounds(self, radius: f64, half_length: f64) -> Result<Self, VertexFitError> {
        let params = FitterParams {
            tracker_bounds_radius: radius,
            tracker_bounds_half_length: half_length,
            ..self.params.clone()
        };
        self.with_params(params)
    }

    /// Widen the accepted volume to the muon system.
    pub fn with_muon_system_bounds(mut self) -> Self {
        self.params.tracker_bounds_radius = MUON_SYSTEM_BOUNDS_RADIUS;
        self.params.tracker_bounds_half_length = MUON_SYSTEM_BOUNDS_HALF_LENGTH;
        self
    }

    pub fn with_maximum_distance(self, maximum_distance: f64) -> Result<Self, VertexFitError> {
        let params = FitterParams {
            maximum_distance,
            ..self.params.clone()
        };
        self.with_params(params)
    }

    pub fn with_maximum_number_of_iterations(
        self,
        maximum_number_of_iterations: usize,
    ) -> Result<Self, VertexFitError> {
        let params = FitterParams {
            maximum_number_of_iterations,
            ..self.params.clone()
        };
        self.with_params(params)
    }

    /// `true` iff `point` lies strictly inside the tracker bounds.
    ///
    /// Non-finite points are never inside.
    pub fn inside_tracker_bounds(&self, point: &Point3<f64>) -> bool {
        transverse_radius(point) < self.params.tracker_bounds_radius
            && point.z.abs() < self.params.tracker_bounds_half_length
    }

    /// Fit `tracks` without prior, the linearization point being found from the tracks.
    ///
    /// Return
    /// ----------
    /// * `Err(VertexFitError::InsufficientInput)` for fewer than two trajectories.
    pub fn vertex(&self, tracks: &[Arc<T>]) -> Result<CachingVertex<T>, VertexFitError> {
        let point = self.find_linearization_point(tracks)?;
        let vertex_tracks = self.linearize_tracks(tracks, &point);
        let start = VertexState::uninformative(point, self.params.initial_error_scale);
        Ok(self.fit(vertex_tracks, start, None))
    }

    /// Fit `tracks` without prior, linearizing about `point`.
    pub fn vertex_with_point(
        &self,
        tracks: &[Arc<T>],
        point: &Point3<f64>,
    ) -> Result<CachingVertex<T>, VertexFitError> {
        require_non_empty(tracks.len())?;
        let vertex_tracks = self.linearize_tracks(tracks, point);
        let start = VertexState::uninformative(*point, self.params.initial_error_scale);
        Ok(self.fit(vertex_tracks, start, None))
    }

    /// Fit `tracks` with a prior; the prior position is also the linearization point.
    ///
    /// Return
    /// ----------
    /// * `Err(VertexFitError::SingularMatrix)` if `prior_covariance` cannot be inverted.
    pub fn vertex_with_prior(
        &self,
        tracks: &[Arc<T>],
        prior_position: &Point3<f64>,
        prior_covariance: &Matrix3<f64>,
    ) -> Result<CachingVertex<T>, VertexFitError> {
        require_non_empty(tracks.len())?;
        let prior = VertexState::new(*prior_position, *prior_covariance)?;
        let vertex_tracks = self.linearize_tracks(tracks, prior_position);
        Ok(self.fit(vertex_tracks, prior.clone(), Some(prior)))
    }

    /// Fit `tracks` with the beam spot as prior; the linearization point is found from the
    /// tracks.
    pub fn vertex_with_beam_spot(
        &self,
        tracks: &[Arc<T>],
        beam_spot: &BeamSpot,
    ) -> Result<CachingVertex<T>, VertexFitError> {
        let point = self.find_linearization_point(tracks)?;
        let prior = VertexState::try_from(beam_spot)?;
        let vertex_tracks = self.linearize_tracks(tracks, &point);
        Ok(self.fit(vertex_tracks, prior.clone(), Some(prior)))
    }

    /// Fit already linearized tracks without prior.
    ///
    /// The first pass uses the tracks as given. The starting point is the linearization
    /// point of the first track, or the origin when that point lies outside the tracker
    /// bounds.
    pub fn vertex_from_tracks(
        &self,
        tracks: Vec<VertexTrack<T>>,
    ) -> Result<CachingVertex<T>, VertexFitError> {
        let point = self.first_track_point(&tracks)?;
        let start = VertexState::uninformative(point, self.params.initial_error_scale);
        Ok(self.fit(tracks, start, None))
    }

    /// Fit already linearized tracks with a prior. The prior position is not used to
    /// re-linearize the tracks for the first pass.
    pub fn vertex_from_tracks_with_prior(
        &self,
        tracks: Vec<VertexTrack<T>>,
        prior_position: &Point3<f64>,
        prior_covariance: &Matrix3<f64>,
    ) -> Result<CachingVertex<T>, VertexFitError> {
        require_non_empty(tracks.len())?;
        let prior = VertexState::new(*prior_position, *prior_covariance)?;
        Ok(self.fit(tracks, prior.clone(), Some(prior)))
    }

    /// Fit already linearized tracks with the beam spot as prior.
    pub fn vertex_from_tracks_with_beam_spot(
        &self,
        tracks: Vec<VertexTrack<T>>,
        beam_spot: &BeamSpot,
    ) -> Result<CachingVertex<T>, VertexFitError> {
        require_non_empty(tracks.len())?;
        let prior = VertexState::try_from(beam_spot)?;
        Ok(self.fit(tracks, prior.clone(), Some(prior)))
    }

    /// Linearize every trajectory about `point` into a unit-weight vertex track.
    pub fn linearize_tracks(&self, tracks: &[Arc<T>], point: &Point3<f64>) -> Vec<VertexTrack<T>> {
        tracks
            .iter()
            .map(|track| {
                let linearized = self.linearized_track_state_factory.linearize(point, track);
                self.vertex_track_factory
                    .unit_weight_track(Arc::new(linearized))
            })
            .collect()
    }

    /// Rebuild `tracks` about `point`, keeping only their trajectories.
    pub fn relinearize_tracks(
        &self,
        tracks: &[VertexTrack<T>],
        point: &Point3<f64>,
    ) -> Vec<VertexTrack<T>> {
        tracks
            .iter()
            .map(|vt| {
                let linearized = self
                    .linearized_track_state_factory
                    .linearize(point, vt.trajectory());
                self.vertex_track_factory
                    .unit_weight_track(Arc::new(linearized))
            })
            .collect()
    }

    fn find_linearization_point(&self, tracks: &[Arc<T>]) -> Result<Point3<f64>, VertexFitError> {
        let point = self.linearization_point_finder.linearization_point(tracks)?;
        if self.inside_tracker_bounds(&point) {
            trace!("linearization point found at {:?}", point);
            Ok(point)
        } else {
            debug!(
                "linearization point {:?} outside tracker bounds, starting from the origin",
                point
            );
            Ok(Point3::origin())
        }
    }

    fn first_track_point(&self, tracks: &[VertexTrack<T>]) -> Result<Point3<f64>, VertexFitError> {
        let first = tracks.first().ok_or(VertexFitError::InsufficientInput {
            required: 1,
            found: 0,
        })?;
        let point = *first.linearization_point();
        Ok(if self.inside_tracker_bounds(&point) {
            point
        } else {
            Point3::origin()
        })
    }

    /// Fold every track, in order, into `start`.
    fn update_pass(
        &self,
        start: &VertexState,
        tracks: &[VertexTrack<T>],
    ) -> Result<VertexState, VertexFitError> {
        tracks.iter().try_fold(start.clone(), |state, vt| {
            self.updator.update(&state, vt)
        })
    }

    /// `(x − x₀)ᵀW₀(x − x₀) + Σ wᵢ χ²ᵢ(x)`
    fn total_chi2(
        &self,
        state: &VertexState,
        start: &VertexState,
        tracks: &[VertexTrack<T>],
    ) -> Result<f64, VertexFitError> {
        let dx = state.position() - start.position();
        let prior_term = dx.dot(&(start.weight() * dx));
        tracks.iter().try_fold(prior_term, |chi2, vt| {
            Ok(chi2 + vt.weight() * self.updator.track_chi2(state, vt)?)
        })
    }

    /// Core loop. Every pass restarts from `start`; `prior` only affects the bookkeeping of
    /// the result.
    fn fit(
        &self,
        tracks: Vec<VertexTrack<T>>,
        start: VertexState,
        prior: Option<VertexState>,
    ) -> CachingVertex<T> {
        let max_iterations = self.params.maximum_number_of_iterations;
        let mut tracks = tracks;
        let mut reference = *start.position();
        let mut iterations = 0;

        let state = loop {
            iterations += 1;

            let candidate = match self.update_pass(&start, &tracks) {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!("vertex update failed at pass {}: {}", iterations, e);
                    return CachingVertex::invalid(iterations);
                }
            };
            if !candidate.is_finite() {
                debug!("non-finite vertex estimate at pass {}", iterations);
                return CachingVertex::invalid(iterations);
            }

            let shift = candidate.transverse_distance(&reference);
            trace!(
                "pass {}: position {:?}, transverse shift {:.3e}",
                iterations,
                candidate.position(),
                shift
            );

            if shift < self.params.maximum_distance {
                debug!("vertex converged after {} pass(es)", iterations);
                break candidate;
            }
            if iterations >= max_iterations {
                debug!(
                    "vertex not converged after {} passes, last shift {:.3e}",
                    iterations, shift
                );
                break candidate;
            }

            tracks = self.relinearize_tracks(&tracks, candidate.position());
            reference = *candidate.position();
        };

        if !self.inside_tracker_bounds(state.position()) {
            debug!("vertex {:?} outside tracker bounds", state.position());
            return CachingVertex::invalid(iterations);
        }
        if !is_symmetric_positive_semi_definite(state.covariance(), EPS) {
            debug!(
                "vertex covariance is not positive semi-definite: {:?}",
                state.covariance()
            );
            return CachingVertex::invalid(iterations);
        }

        let chi2 = match self.total_chi2(&state, &start, &tracks) {
            Ok(chi2) if chi2.is_finite() => chi2,
            Ok(_) => {
                debug!("non-finite vertex chi2");
                return CachingVertex::invalid(iterations);
            }
            Err(e) => {
                debug!("vertex chi2 failed: {}", e);
                return CachingVertex::invalid(iterations);
            }
        };

        match &self.smoother {
            Some(smoother) if self.params.smooth_eagerly => {
                match smoother.smooth(&state, &tracks) {
                    Ok(refitted) => CachingVertex::with_refitted_tracks(
                        state, chi2, tracks, prior, refitted, iterations,
                    ),
                    Err(e) => {
                        debug!("vertex smoothing failed: {}", e);
                        CachingVertex::invalid(iterations)
                    }
                }
            }
            smoother => CachingVertex::new(state, chi2, tracks, prior, smoother.clone(), iterations),
        }
    }
}

impl SequentialVertexFitter<LineTrack> {
    /// Fitter for [`LineTrack`]s with the reference strategies: crossing-point finder,
    /// Kalman updator and Kalman smoother.
    pub fn for_line_tracks(params: FitterParams) -> Result<Self, VertexFitError> {
        Self::with_smoother(
            Arc::new(CrossingPointFinder::default()),
            Arc::new(KalmanVertexUpdator),
            Arc::new(KalmanVertexSmoother),
            Arc::new(LineTrackLinearizer),
            params,
        )
    }
}

fn require_non_empty(found: usize) -> Result<(), VertexFitError> {
    if found == 0 {
        Err(VertexFitError::InsufficientInput { required: 1, found })
    } else {
        Ok(())
    }
}

// Duplicating a fitter shares its strategies.
impl<T: Trajectory> Clone for SequentialVertexFitter<T> {
    fn clone(&self) -> Self {
        SequentialVertexFitter {
            params: self.params.clone(),
            linearization_point_finder: Arc::clone(&self.linearization_point_finder),
            updator: Arc::clone(&self.updator),
            smoother: self.smoother.clone(),
            linearized_track_state_factory: Arc::clone(&self.linearized_track_state_factory),
            vertex_track_factory: self.vertex_track_factory,
        }
    }
}

impl<T: Trajectory> fmt::Debug for SequentialVertexFitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialVertexFitter")
            .field("params", &self.params)
            .field("linearization_point_finder", &self.linearization_point_finder)
            .field("updator", &self.updator)
            .field("smoother", &self.smoother)
            .field(
                "linearized_track_state_factory",
                &self.linearized_track_state_factory,
            )
            .finish()
    }
}
