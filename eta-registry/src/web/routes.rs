//! HTTP route handlers.

use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tower_http::trace::TraceLayer;

use crate::codec::{BinaryRead, BinaryWrite};
use crate::domain::{Coordinates, Operator, RouteSearchResultEntry};
use crate::favourites::FavouriteRouteStop;
use crate::geo::NearbyRoutesResult;

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(load_state))
        .route("/routes/next-chars", get(next_chars))
        .route("/routes/search", get(search_routes))
        .route("/routes/entry/:encoded", get(hydrate_entry))
        .route("/nearby", get(nearby))
        .route("/eta/:operator/:stop_id", get(eta))
        .route("/favourites", get(list_favourites))
        .route(
            "/favourites/:slot",
            put(set_favourite).delete(clear_favourite),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Loader state probe.
async fn load_state(State(state): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        state: state.registry.state(),
    })
}

/// Keypad continuations for a route-number prefix.
async fn next_chars(
    State(state): State<AppState>,
    Query(query): Query<NextCharsQuery>,
) -> Result<Json<NextCharsResponse>, AppError> {
    let prefix = query.prefix.unwrap_or_default();
    let next = state.registry.next_chars(&prefix).await?;
    Ok(Json(next.into()))
}

/// Route search by number.
async fn search_routes(
    State(state): State<AppState>,
    Query(query): Query<RouteSearchQuery>,
) -> Result<Json<RouteSearchResponse>, AppError> {
    let entries = state
        .registry
        .find_routes(&query.q, query.exact.unwrap_or(false), None)
        .await?;
    Ok(Json(RouteSearchResponse { entries }))
}

/// Decode a stripped, base64-carried search entry and re-hydrate it from
/// the current snapshot.
async fn hydrate_entry(
    State(state): State<AppState>,
    Path(encoded): Path<String>,
) -> Result<Json<RouteSearchResultEntry>, AppError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.as_bytes())
        .map_err(|e| AppError::bad_request(format!("invalid base64 entry: {e}")))?;
    let mut entry = RouteSearchResultEntry::from_bytes(&bytes)
        .map_err(|e| AppError::bad_request(format!("invalid entry payload: {e}")))?;

    let snapshot = state.registry.snapshot().await.map_err(AppError::from)?;
    let sheet = snapshot.sheet();
    entry.hydrate(
        |key| sheet.route(key).cloned(),
        |id| sheet.stop(id).cloned(),
    );
    Ok(Json(entry))
}

/// Routes near a coordinate.
async fn nearby(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<NearbyRoutesResult>, AppError> {
    let exclude: HashSet<String> = query
        .exclude
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let result = state
        .registry
        .nearby_routes(
            Coordinates::new(query.lat, query.lng),
            &exclude,
            query.interchange_from.as_deref(),
        )
        .await?;
    Ok(Json(result))
}

/// Real-time arrivals for one (stop, route) pair.
async fn eta(
    State(state): State<AppState>,
    Path((operator, stop_id)): Path<(String, String)>,
    Query(query): Query<EtaQuery>,
) -> Result<Json<EtaResponse>, AppError> {
    let operator = Operator::parse(&operator);
    let result = state
        .registry
        .eta(
            &stop_id,
            query.stop_index.unwrap_or(1),
            operator,
            &query.route_key,
        )
        .await?;

    Ok(Json(EtaResponse {
        operator: result.operator.as_str().to_string(),
        lines: result.lines.clone(),
        is_connection_error: result.is_connection_error,
        age_secs: result.age().as_secs(),
    }))
}

/// List the favourites table. Stripped entries keep the payloads small;
/// clients re-hydrate through `/routes/entry` when they need the data.
async fn list_favourites(
    State(state): State<AppState>,
) -> Json<Vec<(u8, FavouriteRouteStop, String)>> {
    let favourites = state.registry.favourites().all().await;
    let listed = favourites
        .into_iter()
        .map(|(slot, favourite)| {
            let entry = RouteSearchResultEntry::new(
                favourite.route_key.clone(),
                None,
                favourite.operator.clone(),
            )
            .with_stop_info(crate::domain::StopInfo {
                stop_id: favourite.stop_id.clone(),
                data: None,
                distance: 0.0,
                operator: favourite.operator.clone(),
                stop_index: Some(favourite.stop_index),
            });
            let encoded = URL_SAFE_NO_PAD.encode(entry.to_bytes());
            (slot, favourite, encoded)
        })
        .collect();
    Json(listed)
}

/// Pin a favourite into a slot.
async fn set_favourite(
    State(state): State<AppState>,
    Path(slot): Path<u8>,
    Json(favourite): Json<FavouriteRouteStop>,
) -> Result<StatusCode, AppError> {
    state
        .registry
        .favourites()
        .set_favourite(slot, favourite)
        .await
        .map_err(|e| AppError::from(crate::registry::RegistryError::from(e)))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Clear a favourite slot.
async fn clear_favourite(
    State(state): State<AppState>,
    Path(slot): Path<u8>,
) -> Result<StatusCode, AppError> {
    state
        .registry
        .favourites()
        .clear_favourite(slot)
        .await
        .map_err(|e| AppError::from(crate::registry::RegistryError::from(e)))?;
    Ok(StatusCode::NO_CONTENT)
}
