//! # Constants for the vertex fitter
//!
//! This module centralizes the **default detector envelopes** and the **numerical defaults**
//! used throughout the crate.
//!
//! ## Overview
//!
//! - Tracker and muon-system bounds used to reject fitted vertices
//! - Convergence defaults of the sequential fitter
//! - Scale of the uninformative starting covariance
//!
//! All lengths share one unit (the unit of the trajectory parameters, typically cm).

// -------------------------------------------------------------------------------------------------
// Detector envelopes
// -------------------------------------------------------------------------------------------------

/// Radial bound of the inner tracker volume.
pub const DEFAULT_TRACKER_BOUNDS_RADIUS: f64 = 112.0;

/// Longitudinal half-length of the inner tracker volume.
pub const DEFAULT_TRACKER_BOUNDS_HALF_LENGTH: f64 = 273.5;

/// Radial bound used when vertices anywhere in the muon system are accepted.
pub const MUON_SYSTEM_BOUNDS_RADIUS: f64 = 740.0;

/// Longitudinal half-length used when vertices anywhere in the muon system are accepted.
pub const MUON_SYSTEM_BOUNDS_HALF_LENGTH: f64 = 960.0;

// -------------------------------------------------------------------------------------------------
// Fitter defaults
// -------------------------------------------------------------------------------------------------

/// Default convergence threshold on the transverse shift between two passes.
pub const DEFAULT_MAXIMUM_DISTANCE: f64 = 1.0;

/// Default cap on the number of passes over the track set.
pub const DEFAULT_MAXIMUM_NUMBER_OF_ITERATIONS: usize = 10;

/// Diagonal of the covariance given to the starting state when no prior is used.
pub const DEFAULT_INITIAL_ERROR_SCALE: f64 = 10_000.0;

/// Minimum number of trajectories a linearization point finder needs.
pub const MIN_TRACKS_FOR_POINT_FINDING: usize = 2;

/// Numerical epsilon used for floating-point comparisons
pub const EPS: f64 = 1e-12;
