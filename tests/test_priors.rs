mod common;

use nalgebra::{Matrix3, Point3, Vector3};
use vertexfit::sequential_fitter::{FitterParams, SequentialVertexFitter};
use vertexfit::trajectory::LineTrack;
use vertexfit::vertex_errors::VertexFitError;
use vertexfit::vertex_state::BeamSpot;

use crate::common::{assert_point_close, line_bundle};

const SLOPES: [(f64, f64); 4] = [(0.1, 0.0), (-0.1, 0.05), (0.0, -0.1), (0.07, 0.07)];

fn fitter() -> SequentialVertexFitter<LineTrack> {
    SequentialVertexFitter::for_line_tracks(FitterParams::default()).unwrap()
}

#[test]
fn test_prior_adds_three_degrees_of_freedom() {
    let vertex = Point3::new(0.1, -0.2, 5.0);
    let tracks = line_bundle(&vertex, &SLOPES);

    let fitted = fitter()
        .vertex_with_prior(&tracks, &vertex, &Matrix3::from_diagonal_element(0.01))
        .unwrap();

    assert!(fitted.is_valid());
    assert!(fitted.has_prior());
    assert_eq!(fitted.prior_state().unwrap().position(), &vertex);
    assert_eq!(fitted.degrees_of_freedom(), Some(8.0));
    assert_point_close(fitted.position().unwrap(), &vertex, 1e-6);
}

#[test]
fn test_tight_prior_pulls_the_vertex() {
    let vertex = Point3::new(0.0, 0.0, 5.0);
    let tracks = line_bundle(&vertex, &SLOPES);
    let prior_position = Point3::new(0.05, 0.0, 5.0);

    let loose = fitter()
        .vertex_with_prior(&tracks, &prior_position, &Matrix3::from_diagonal_element(1e2))
        .unwrap();
    let tight = fitter()
        .vertex_with_prior(&tracks, &prior_position, &Matrix3::from_diagonal_element(1e-8))
        .unwrap();

    let loose_x = loose.position().unwrap().x;
    let tight_x = tight.position().unwrap().x;
    assert!(loose_x.abs() < 1e-4);
    assert!((tight_x - 0.05).abs() < 1e-3);
    assert!(tight.total_chi_squared().unwrap() > loose.total_chi_squared().unwrap());
}

#[test]
fn test_beam_spot_constrains_transverse_position() {
    let vertex = Point3::new(0.05, 0.02, 3.0);
    let tracks = line_bundle(&vertex, &SLOPES);
    let spot = BeamSpot::new(Point3::new(0.05, 0.02, 0.0), 0.001, 0.001, 5.0);

    let free = fitter().vertex(&tracks).unwrap();
    let constrained = fitter().vertex_with_beam_spot(&tracks, &spot).unwrap();

    assert!(constrained.is_valid());
    assert_eq!(constrained.degrees_of_freedom(), Some(8.0));
    assert_point_close(constrained.position().unwrap(), &vertex, 1e-3);
    assert!(constrained.covariance().unwrap()[(0, 0)] < free.covariance().unwrap()[(0, 0)]);
}

#[test]
fn test_prebuilt_tracks_with_prior_and_beam_spot() {
    let vertex = Point3::new(0.0, 0.1, -2.0);
    let tracks = line_bundle(&vertex, &SLOPES);
    let fitter = fitter();
    let start = Point3::new(0.0, 0.0, 0.0);

    let with_prior = fitter
        .vertex_from_tracks_with_prior(
            fitter.linearize_tracks(&tracks, &start),
            &Point3::new(0.0, 0.1, -1.0),
            &Matrix3::from_diagonal_element(100.0),
        )
        .unwrap();
    assert!(with_prior.is_valid());
    assert!(with_prior.has_prior());
    // the prior does not move the linearization of the first pass
    assert_eq!(with_prior.iterations(), 1);
    assert!(with_prior
        .tracks()
        .iter()
        .all(|vt| vt.linearization_point() == &start));
    assert_point_close(with_prior.position().unwrap(), &vertex, 1e-3);

    let spot = BeamSpot::new(Point3::new(0.0, 0.1, 0.0), 0.01, 0.01, 10.0);
    let with_spot = fitter
        .vertex_from_tracks_with_beam_spot(fitter.linearize_tracks(&tracks, &start), &spot)
        .unwrap();
    assert!(with_spot.is_valid());
    assert_eq!(with_spot.degrees_of_freedom(), Some(8.0));
}

#[test]
fn test_singular_beam_spot_is_rejected() {
    let tracks = line_bundle(&Point3::origin(), &SLOPES);
    let spot = BeamSpot::new(Point3::origin(), 0.0, 0.0, 0.0);

    assert_eq!(
        fitter().vertex_with_beam_spot(&tracks, &spot).unwrap_err(),
        VertexFitError::SingularMatrix("vertex covariance")
    );
}

#[test]
fn test_indefinite_prior_is_rejected() {
    let vertex = Point3::new(0.0, 0.0, 1.0);
    let tracks = line_bundle(&vertex, &SLOPES);
    let covariance = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1e-4));

    assert_eq!(
        fitter()
            .vertex_with_prior(&tracks, &vertex, &covariance)
            .unwrap_err(),
        VertexFitError::SingularMatrix("vertex covariance")
    );
}

#[test]
fn test_params_from_json() {
    let params: FitterParams =
        serde_json::from_str(r#"{"maximumDistance": 0.01, "maximumNumberOfIterations": 20}"#)
            .unwrap();
    assert_eq!(params.maximum_distance, 0.01);
    assert_eq!(params.maximum_number_of_iterations, 20);
    assert_eq!(params.tracker_bounds_radius, 112.0);
    assert!(params.smooth_eagerly);
    assert!(params.validate().is_ok());

    let json = serde_json::to_string(&params).unwrap();
    assert!(json.contains("\"trackerBoundsHalfLength\":273.5"));
    assert_eq!(serde_json::from_str::<FitterParams>(&json).unwrap(), params);

    let bad: FitterParams = serde_json::from_str(r#"{"maximumNumberOfIterations": 0}"#).unwrap();
    assert!(matches!(
        bad.validate(),
        Err(VertexFitError::InvalidFitterParameter(_))
    ));
    assert!(SequentialVertexFitter::for_line_tracks(bad).is_err());
}
