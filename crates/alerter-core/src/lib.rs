pub mod error;
pub mod geokey;
pub mod models;
pub mod proximity;
pub mod rules;
pub mod spatial;

pub use error::CoreError;
pub use geokey::GeoCell;
pub use models::{
    validate_route_points, BoundingBox, CorrelationEvent, EventEnvelope, Hazard, HazardKind, Point,
    Route, SimulationResponse, SubmitRouteResponse, HAZARD_TTL_SECS, ROUTE_TTL_SECS,
};
pub use proximity::{distance_to_route_m, is_point_near_route, DEFAULT_PROXIMITY_THRESHOLD_M};
pub use rules::CorrelationRules;
pub use spatial::{haversine_distance, route_distance_m};
