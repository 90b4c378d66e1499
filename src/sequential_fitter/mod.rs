//! # Sequential vertex fit
//!
//! This module hosts the fit driver, [`SequentialVertexFitter`], and the
//! [`FitterParams`] configuration struct with its validating builder.
//!
//! ## Pipeline overview
//!
//! 1. **Linearization point**
//!    Taken from the prior, from an explicit point, or produced by the configured
//!    [`LinearizationPointFinder`](crate::linearization_point_finder::LinearizationPointFinder).
//!    A found point outside the tracker bounds is replaced by the origin.
//!
//! 2. **Linearization**
//!    Every trajectory is linearized about that point and wrapped in a unit-weight
//!    [`VertexTrack`](crate::vertex_track::VertexTrack).
//!
//! 3. **Update passes**
//!    Each pass folds the tracks, in input order, into the starting state with the
//!    [`VertexUpdator`](crate::updator::VertexUpdator). The pass converges when the
//!    transverse shift of the estimate is below `maximum_distance`; otherwise the tracks
//!    are re-linearized about the new estimate. At most `maximum_number_of_iterations`
//!    passes are run.
//!
//! 4. **Validation and smoothing**
//!    The final estimate must be finite and inside the tracker bounds. Valid vertices are
//!    smoothed by the [`VertexSmoother`](crate::smoother::VertexSmoother), if any, and
//!    returned as a [`CachingVertex`](crate::caching_vertex::CachingVertex).
//!
//! ## Example
//!
//! ```rust
//! use vertexfit::sequential_fitter::FitterParams;
//!
//! let params = FitterParams::builder()
//!     .maximum_distance(0.01)
//!     .maximum_number_of_iterations(20)
//!     .muon_system_bounds()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(params.tracker_bounds_radius, 740.0);
//! ```
//!
//! ## See also
//!
//! * [`SequentialVertexFitter`] – fit driver.
//! * [`CachingVertex`](crate::caching_vertex::CachingVertex) – fit result.

use std::cmp::Ordering::Greater;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        DEFAULT_INITIAL_ERROR_SCALE, DEFAULT_MAXIMUM_DISTANCE,
        DEFAULT_MAXIMUM_NUMBER_OF_ITERATIONS, DEFAULT_TRACKER_BOUNDS_HALF_LENGTH,
        DEFAULT_TRACKER_BOUNDS_RADIUS, MUON_SYSTEM_BOUNDS_HALF_LENGTH,
        MUON_SYSTEM_BOUNDS_RADIUS,
    },
    vertex_errors::VertexFitError,
};

pub mod fitter;

pub use fitter::SequentialVertexFitter;

/// Configuration of [`SequentialVertexFitter`].
///
/// Fields
/// -----------------
/// * `maximum_distance` – transverse shift (cm) below which a pass is considered converged.
/// * `maximum_number_of_iterations` – cap on the number of update passes.
/// * `tracker_bounds_radius`, `tracker_bounds_half_length` – a vertex is accepted only
///   if `ρ < radius` and `|z| < half_length` (cm).
/// * `initial_error_scale` – diagonal of the starting covariance when no prior is given.
/// * `smooth_eagerly` – run the smoother inside the fit instead of on first access.
///
/// Defaults
/// -----------------
/// * `maximum_distance`: 1.0
/// * `maximum_number_of_iterations`: 10
/// * `tracker_bounds_radius`: 112.0
/// * `tracker_bounds_half_length`: 273.5
/// * `initial_error_scale`: 10000.0
/// * `smooth_eagerly`: true
///
/// Serialization
/// -----------------
/// Keys are camelCase (`maximumDistance`, `maximumNumberOfIterations`, ...). Missing keys
/// take their default value; call [`FitterParams::validate`] after deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FitterParams {
    pub maximum_distance: f64,
    pub maximum_number_of_iterations: usize,
    pub tracker_bounds_radius: f64,
    pub tracker_bounds_half_length: f64,
    pub initial_error_scale: f64,
    pub smooth_eagerly: bool,
}

impl FitterParams {
    /// Equivalent to [`FitterParams::default()`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a [`FitterParamsBuilder`] initialized with the default values.
    pub fn builder() -> FitterParamsBuilder {
        FitterParamsBuilder::new()
    }

    /// Check every value against the rules enforced by [`FitterParamsBuilder::build`].
    pub fn validate(&self) -> Result<(), VertexFitError> {
        if !(self.maximum_distance.is_finite() && gt0(self.maximum_distance)) {
            return Err(VertexFitError::InvalidFitterParameter(
                "maximum_distance must be finite and > 0".into(),
            ));
        }
        if self.maximum_number_of_iterations == 0 {
            return Err(VertexFitError::InvalidFitterParameter(
                "maximum_number_of_iterations must be >= 1".into(),
            ));
        }
        if !gt0(self.tracker_bounds_radius) || !gt0(self.tracker_bounds_half_length) {
            return Err(VertexFitError::InvalidFitterParameter(
                "tracker bounds must be > 0".into(),
            ));
        }
        if !(self.initial_error_scale.is_finite() && gt0(self.initial_error_scale)) {
            return Err(VertexFitError::InvalidFitterParameter(
                "initial_error_scale must be finite and > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for FitterParams {
    fn default() -> Self {
        FitterParams {
            maximum_distance: DEFAULT_MAXIMUM_DISTANCE,
            maximum_number_of_iterations: DEFAULT_MAXIMUM_NUMBER_OF_ITERATIONS,
            tracker_bounds_radius: DEFAULT_TRACKER_BOUNDS_RADIUS,
            tracker_bounds_half_length: DEFAULT_TRACKER_BOUNDS_HALF_LENGTH,
            initial_error_scale: DEFAULT_INITIAL_ERROR_SCALE,
            smooth_eagerly: true,
        }
    }
}

/// Return true iff x > 0.0 and comparable (i.e., not NaN).
#[inline]
fn gt0(x: f64) -> bool {
    x.partial_cmp(&0.0) == Some(Greater)
}

/// Builder for [`FitterParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct FitterParamsBuilder {
    params: FitterParams,
}

impl FitterParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: FitterParams::default(),
        }
    }

    pub fn maximum_distance(mut self, v: f64) -> Self {
        self.params.maximum_distance = v;
        self
    }
    pub fn maximum_number_of_iterations(mut self, v: usize) -> Self {
        self.params.maximum_number_of_iterations = v;
        self
    }
    pub fn tracker_bounds(mut self, radius: f64, half_length: f64) -> Self {
        self.params.tracker_bounds_radius = radius;
        self.params.tracker_bounds_half_length = half_length;
        self
    }
    /// Widen the bounds to the muon system (740 cm × 960 cm).
    pub fn muon_system_bounds(self) -> Self {
        self.tracker_bounds(MUON_SYSTEM_BOUNDS_RADIUS, MUON_SYSTEM_BOUNDS_HALF_LENGTH)
    }
    pub fn initial_error_scale(mut self, v: f64) -> Self {
        self.params.initial_error_scale = v;
        self
    }
    pub fn smooth_eagerly(mut self, v: bool) -> Self {
        self.params.smooth_eagerly = v;
        self
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `maximum_distance` finite and `> 0`.
    /// * `maximum_number_of_iterations ≥ 1`.
    /// * `tracker_bounds_radius > 0`, `tracker_bounds_half_length > 0`.
    /// * `initial_error_scale` finite and `> 0`.
    ///
    /// Returns
    /// -----------------
    /// * `Err(VertexFitError::InvalidFitterParameter)` naming the first violated rule.
    pub fn build(self) -> Result<FitterParams, VertexFitError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

impl fmt::Display for FitterParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 44;
            writeln!(f, "Sequential Vertex Fitter Parameters")?;
            writeln!(f, "-----------------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Convergence]")?;
            line!(
                "maximum_distance             = {:.4} cm",
                self.maximum_distance,
                "Transverse shift accepted as converged"
            )?;
            line!(
                "maximum_number_of_iterations = {}",
                self.maximum_number_of_iterations,
                "Cap on update passes"
            )?;

            writeln!(f, "\n[Validity]")?;
            line!(
                "tracker_bounds_radius        = {:.1} cm",
                self.tracker_bounds_radius,
                "Maximum transverse radius"
            )?;
            line!(
                "tracker_bounds_half_length   = {:.1} cm",
                self.tracker_bounds_half_length,
                "Maximum |z|"
            )?;

            writeln!(f, "\n[Starting state / smoothing]")?;
            line!(
                "initial_error_scale          = {:.1e}",
                self.initial_error_scale,
                "Starting covariance diagonal"
            )?;
            line!(
                "smooth_eagerly               = {}",
                self.smooth_eagerly,
                "Smooth inside the fit"
            )?;

            Ok(())
        } else {
            write!(
                f,
                "FitterParams(maximum_distance={}, maximum_number_of_iterations={}, bounds=ρ<{:.1},|z|<{:.1}, initial_error_scale={:.1e}, smooth_eagerly={})",
                self.maximum_distance,
                self.maximum_number_of_iterations,
                self.tracker_bounds_radius,
                self.tracker_bounds_half_length,
                self.initial_error_scale,
                self.smooth_eagerly,
            )
        }
    }
}

#[cfg(test)]
mod fitter_params_test {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = FitterParams::default();
        assert_eq!(p.maximum_distance, 1.0);
        assert_eq!(p.maximum_number_of_iterations, 10);
        assert_eq!(p.tracker_bounds_radius, 112.0);
        assert_eq!(p.tracker_bounds_half_length, 273.5);
        assert_eq!(p.initial_error_scale, 10_000.0);
        assert!(p.smooth_eagerly);
        assert!(p.validate().is_ok());
        assert_eq!(FitterParams::builder().build().unwrap(), p);
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        let cases = [
            FitterParams::builder().maximum_distance(0.0),
            FitterParams::builder().maximum_distance(f64::NAN),
            FitterParams::builder().maximum_distance(f64::INFINITY),
            FitterParams::builder().maximum_number_of_iterations(0),
            FitterParams::builder().tracker_bounds(-1.0, 10.0),
            FitterParams::builder().tracker_bounds(10.0, f64::NAN),
            FitterParams::builder().initial_error_scale(0.0),
        ];
        for builder in cases {
            assert!(matches!(
                builder.build(),
                Err(VertexFitError::InvalidFitterParameter(_))
            ));
        }
    }

    #[test]
    fn test_muon_system_bounds() {
        let p = FitterParams::builder().muon_system_bounds().build().unwrap();
        assert_eq!(p.tracker_bounds_radius, 740.0);
        assert_eq!(p.tracker_bounds_half_length, 960.0);
    }

    #[test]
    fn test_gt0() {
        assert!(gt0(1.0) && !gt0(0.0) && !gt0(-1.0) && !gt0(f64::NAN));
    }

    #[test]
    fn test_display() {
        let p = FitterParams::default();
        let compact = format!("{p}");
        assert!(compact.starts_with("FitterParams(maximum_distance=1, maximum_number_of_iterations=10"));

        let table = format!("{p:#}");
        assert!(table.contains("[Convergence]"));
        assert!(table.contains("tracker_bounds_radius        = 112.0 cm"));
    }
}
