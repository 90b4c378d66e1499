#![allow(dead_code)]

use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::{Matrix4, Point3, Vector4};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use vertexfit::trajectory::LineTrack;

pub const SIGMA_X0: f64 = 0.01;
pub const SIGMA_SLOPE: f64 = 0.001;

pub fn track_covariance() -> Matrix4<f64> {
    Matrix4::from_diagonal(&Vector4::new(
        SIGMA_X0.powi(2),
        SIGMA_X0.powi(2),
        SIGMA_SLOPE.powi(2),
        SIGMA_SLOPE.powi(2),
    ))
}

/// Unsmeared lines through `vertex`, one per `(tx, ty)`.
pub fn line_bundle(vertex: &Point3<f64>, slopes: &[(f64, f64)]) -> Vec<Arc<LineTrack>> {
    slopes
        .iter()
        .map(|&(tx, ty)| {
            Arc::new(LineTrack::through_point(
                vertex,
                tx,
                ty,
                0.0,
                track_covariance(),
            ))
        })
        .collect()
}

/// `n` lines from `vertex` with random slopes in `[-0.3, 0.3]`, parameters smeared
/// according to [`track_covariance`].
pub fn smeared_bundle(rng: &mut StdRng, vertex: &Point3<f64>, n: usize) -> Vec<Arc<LineTrack>> {
    let x_noise = Normal::new(0.0, SIGMA_X0).unwrap();
    let slope_noise = Normal::new(0.0, SIGMA_SLOPE).unwrap();

    (0..n)
        .map(|_| {
            let tx = rng.random_range(-0.3..0.3);
            let ty = rng.random_range(-0.3..0.3);
            let exact = LineTrack::through_point(vertex, tx, ty, 0.0, track_covariance());
            let smeared = exact.params()
                + Vector4::new(
                    x_noise.sample(rng),
                    x_noise.sample(rng),
                    slope_noise.sample(rng),
                    slope_noise.sample(rng),
                );
            Arc::new(LineTrack::new(smeared, 0.0, track_covariance()))
        })
        .collect()
}

pub fn assert_point_close(actual: &Point3<f64>, expected: &Point3<f64>, epsilon: f64) {
    assert_relative_eq!(actual.x, expected.x, epsilon = epsilon);
    assert_relative_eq!(actual.y, expected.y, epsilon = epsilon);
    assert_relative_eq!(actual.z, expected.z, epsilon = epsilon);
}
