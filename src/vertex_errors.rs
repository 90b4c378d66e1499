use thiserror::Error;

/// Errors surfaced by the vertex fitting API.
///
/// Only caller misuse reaches the user as an `Err`: numerical trouble inside
/// the fit loop is absorbed by the driver and turned into an invalid
/// [`CachingVertex`](crate::caching_vertex::CachingVertex).
#[derive(Error, Debug, Clone)]
pub enum VertexFitError {
    #[error("Insufficient input: at least {required} trajectories required, {found} given")]
    InsufficientInput { required: usize, found: usize },

    #[error("Invalid fitter parameter: {0}")]
    InvalidFitterParameter(String),

    #[error("Invalid track weight {0}: weights must be finite and non-negative")]
    InvalidTrackWeight(f64),

    #[error("Singular matrix encountered: {0}")]
    SingularMatrix(&'static str),

    #[error("Linearized track state is invalid (non-finite or non-invertible covariance)")]
    InvalidLinearization,

    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },
}

impl PartialEq for VertexFitError {
    fn eq(&self, other: &Self) -> bool {
        use VertexFitError::*;
        match (self, other) {
            (
                InsufficientInput {
                    required: r1,
                    found: f1,
                },
                InsufficientInput {
                    required: r2,
                    found: f2,
                },
            ) => r1 == r2 && f1 == f2,
            (InvalidFitterParameter(a), InvalidFitterParameter(b)) => a == b,

            // NaN weights must still compare equal to themselves here
            (InvalidTrackWeight(a), InvalidTrackWeight(b)) => a.to_bits() == b.to_bits(),
            (SingularMatrix(a), SingularMatrix(b)) => a == b,
            (
                DimensionMismatch {
                    context: c1,
                    expected: e1,
                    found: f1,
                },
                DimensionMismatch {
                    context: c2,
                    expected: e2,
                    found: f2,
                },
            ) => c1 == c2 && e1 == e2 && f1 == f2,

            (InvalidLinearization, InvalidLinearization) => true,

            _ => false,
        }
    }
}
