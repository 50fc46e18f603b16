//! REST API routes.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use alerter_core::{Hazard, Point, Route, SimulationResponse, SubmitRouteResponse};

use crate::api::ws;
use crate::backoff::retry_transient;
use crate::error::ApiError;
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/v1/routes", post(submit_route).get(list_routes))
        .route("/v1/hazards", get(list_hazards))
        .route("/v1/hazards/simulate", post(simulate_hazards))
        .route("/v1/ws", get(ws::ws_handler))
}

/// Store a new flight route and return its id and great-circle length.
async fn submit_route(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<Point>>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitRouteResponse>), ApiError> {
    let Json(points) = payload.map_err(|err| ApiError::MalformedInput(err.body_text()))?;
    let route = Route::new(points, state.clock().now())?;

    let routes = state.routes();
    retry_transient(state.config().store_retry, "put_route", || routes.put_route(&route)).await?;

    let route_distance = route.distance_m();
    tracing::info!(
        "Stored route {} ({} points, {:.0} m)",
        route.id,
        route.points.len(),
        route_distance
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitRouteResponse {
            route_id: route.id,
            route_distance,
        }),
    ))
}

async fn list_routes(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Route>>, ApiError> {
    let now = state.clock().now();
    let limit = state.config().route_page_size;
    let routes = state.routes();
    let listed = retry_transient(state.config().store_retry, "list_active_routes", || {
        routes.list_active_routes(now, limit)
    })
    .await?;
    Ok(Json(listed))
}

async fn list_hazards(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Hazard>>, ApiError> {
    let now = state.clock().now();
    let limit = state.config().route_page_size;
    let hazards = state.hazards();
    let listed = retry_transient(state.config().store_retry, "list_active_hazards", || {
        hazards.list_active_hazards(now, limit)
    })
    .await?;
    Ok(Json(listed))
}

/// Run one simulation window and report how many hazards were created.
async fn simulate_hazards(State(state): State<Arc<AppState>>) -> Json<SimulationResponse> {
    let report = state
        .hazard_generator()
        .run(Some(state.subscribe_shutdown()))
        .await;

    Json(SimulationResponse {
        message: "Airspace hazards simulated successfully".to_string(),
        hazard_count: report.hazard_count,
    })
}
