//! # Fit result
//!
//! [`CachingVertex`] is the immutable value returned by every fitter entry point. A valid
//! vertex carries the final [`VertexState`], the fit quality (χ² and degrees of freedom),
//! the vertex tracks at convergence and, when a smoother is configured, the refitted
//! tracks. An invalid vertex carries nothing but the number of passes that were run
//! before the fit was abandoned.
//!
//! Refitted tracks are computed at most once. The fitter normally fills them eagerly;
//! otherwise the first call to [`CachingVertex::refitted_tracks`] runs the smoother and
//! caches its result.

use std::fmt;
use std::sync::Arc;

use nalgebra::{Matrix3, Point3};
use once_cell::sync::OnceCell;

use crate::{
    smoother::{RefittedTrackState, VertexSmoother},
    trajectory::Trajectory,
    vertex_state::VertexState,
    vertex_track::VertexTrack,
};

struct FittedVertex<T: Trajectory> {
    state: VertexState,
    chi2: f64,
    ndf: f64,
    tracks: Vec<VertexTrack<T>>,
    prior: Option<VertexState>,
    smoother: Option<Arc<dyn VertexSmoother<T>>>,
    // None inside the cell: the smoother failed
    refitted: OnceCell<Option<Vec<RefittedTrackState>>>,
}

/// Result of a vertex fit.
pub struct CachingVertex<T: Trajectory> {
    fit: Option<FittedVertex<T>>,
    iterations: usize,
}

impl<T: Trajectory> CachingVertex<T> {
    /// Assemble a valid vertex. Refitted tracks are computed on first access.
    pub(crate) fn new(
        state: VertexState,
        chi2: f64,
        tracks: Vec<VertexTrack<T>>,
        prior: Option<VertexState>,
        smoother: Option<Arc<dyn VertexSmoother<T>>>,
        iterations: usize,
    ) -> Self {
        let weight_sum: f64 = tracks.iter().map(VertexTrack::weight).sum();
        let ndf = 2.0 * weight_sum - 3.0 + if prior.is_some() { 3.0 } else { 0.0 };

        CachingVertex {
            fit: Some(FittedVertex {
                state,
                chi2,
                ndf,
                tracks,
                prior,
                smoother,
                refitted: OnceCell::new(),
            }),
            iterations,
        }
    }

    /// Same as [`CachingVertex::new`] with refitted tracks already known.
    pub(crate) fn with_refitted_tracks(
        state: VertexState,
        chi2: f64,
        tracks: Vec<VertexTrack<T>>,
        prior: Option<VertexState>,
        refitted: Vec<RefittedTrackState>,
        iterations: usize,
    ) -> Self {
        let mut vertex = Self::new(state, chi2, tracks, prior, None, iterations);
        if let Some(fit) = vertex.fit.as_mut() {
            fit.refitted = OnceCell::with_value(Some(refitted));
        }
        vertex
    }

    /// A vertex that failed to fit.
    pub fn invalid(iterations: usize) -> Self {
        CachingVertex {
            fit: None,
            iterations,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.fit.is_some()
    }

    pub fn position(&self) -> Option<&Point3<f64>> {
        self.fit.as_ref().map(|f| f.state.position())
    }

    pub fn covariance(&self) -> Option<&Matrix3<f64>> {
        self.fit.as_ref().map(|f| f.state.covariance())
    }

    pub fn vertex_state(&self) -> Option<&VertexState> {
        self.fit.as_ref().map(|f| &f.state)
    }

    /// χ² of the fit: prior term plus the weighted track contributions.
    pub fn total_chi_squared(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.chi2)
    }

    /// `2·Σwᵢ − 3`, plus 3 when the fit used a prior.
    pub fn degrees_of_freedom(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.ndf)
    }

    /// χ² per degree of freedom, `None` when the vertex is invalid or `ndf ≤ 0`.
    pub fn normalised_chi_squared(&self) -> Option<f64> {
        self.fit
            .as_ref()
            .filter(|f| f.ndf > 0.0)
            .map(|f| f.chi2 / f.ndf)
    }

    /// Vertex tracks at convergence, in input order. Empty for an invalid vertex.
    pub fn tracks(&self) -> &[VertexTrack<T>] {
        self.fit
            .as_ref()
            .map(|f| f.tracks.as_slice())
            .unwrap_or_default()
    }

    /// Tracks refitted against the vertex.
    ///
    /// Return
    /// ----------
    /// * `None` for an invalid vertex or when smoothing failed.
    /// * An empty slice when the fitter had no smoother.
    pub fn refitted_tracks(&self) -> Option<&[RefittedTrackState]> {
        let fit = self.fit.as_ref()?;
        fit.refitted
            .get_or_init(|| match &fit.smoother {
                Some(smoother) => smoother.smooth(&fit.state, &fit.tracks).ok(),
                None => Some(Vec::new()),
            })
            .as_deref()
    }

    pub fn has_prior(&self) -> bool {
        self.prior_state().is_some()
    }

    pub fn prior_state(&self) -> Option<&VertexState> {
        self.fit.as_ref().and_then(|f| f.prior.as_ref())
    }

    /// Number of passes run by the fitter.
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

impl<T: Trajectory> fmt::Debug for CachingVertex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingVertex")
            .field("valid", &self.is_valid())
            .field("state", &self.vertex_state())
            .field("chi2", &self.total_chi_squared())
            .field("ndf", &self.degrees_of_freedom())
            .field("tracks", &self.tracks().len())
            .field("iterations", &self.iterations)
            .finish()
    }
}

impl<T: Trajectory> fmt::Display for CachingVertex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fit {
            None => write!(f, "CachingVertex(invalid, iterations={})", self.iterations),
            Some(fit) => write!(
                f,
                "CachingVertex({}, chi2={:.4}, ndf={:.1}, tracks={}, iterations={}{})",
                fit.state,
                fit.chi2,
                fit.ndf,
                fit.tracks.len(),
                self.iterations,
                if fit.prior.is_some() { ", prior" } else { "" },
            ),
        }
    }
}
