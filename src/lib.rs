pub mod caching_vertex;
pub mod constants;
pub mod linalg;
pub mod linearization;
pub mod linearization_point_finder;
pub mod sequential_fitter;
pub mod smoother;
pub mod trajectory;
pub mod updator;
pub mod vertex_errors;
pub mod vertex_state;
pub mod vertex_track;
