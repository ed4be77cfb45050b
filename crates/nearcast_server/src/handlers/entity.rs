use crate::handlers::ws;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use nearcast_core::{ClientId, CoreError, Endpoint, Entity, Group, Location, TokenId, UserData};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Accepted client/server clock difference.
pub const CLOCK_SKEW_TOLERANCE_SECS: i64 = 5;

/// Shared state for the entity handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub endpoint: Arc<Endpoint>,
}

/// Session handshake request body.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(rename = "clientid")]
    pub client_id: String,
    pub time: i64,
}

/// Session handshake response body.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    #[serde(rename = "tokenid")]
    pub token_id: String,
    pub groups: Vec<Group>,
}

/// The entity API: sync, standby, beacon, the data WebSocket and the
/// archive download.
pub fn entity_routes(state: GatewayState) -> Router {
    Router::new()
        .route("/entity/sync", post(sync))
        .route("/entity/{tokenid}/standby", post(standby))
        .route("/entity/{tokenid}/beacon", post(beacon))
        .route("/entity/{tokenid}/data", get(ws::data_socket))
        .route("/entity/{tokenid}/download", get(download))
        .with_state(state)
}

/// Reject client times outside the tolerance window.
pub fn check_clock(t: i64) -> Result<(), CoreError> {
    let skew = t - Utc::now().timestamp();
    if skew.abs() > CLOCK_SKEW_TOLERANCE_SECS {
        warn!("client/server time not synchronised ({skew} seconds)");
        return Err(CoreError::ClockSkew(skew));
    }
    Ok(())
}

pub fn error_response(code: StatusCode, message: &str) -> Response {
    warn!("request rejected: {message}");
    (code, Json(serde_json::json!({ "error": message }))).into_response()
}

fn status_for(e: &CoreError) -> StatusCode {
    match e {
        CoreError::Malformed(_) | CoreError::ClockSkew(_) => StatusCode::BAD_REQUEST,
        CoreError::Expired => StatusCode::FORBIDDEN,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Store(_) | CoreError::Broker(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /api/v1/entity/sync — exchange a client identity for a session
/// token.
async fn sync(State(state): State<GatewayState>, Json(req): Json<SyncRequest>) -> Response {
    if let Err(e) = check_clock(req.time) {
        return error_response(status_for(&e), &e.to_string());
    }
    let client_id = match ClientId::parse(&req.client_id) {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match state.endpoint.create_entity(client_id, 0).await {
        Ok(entity) => {
            info!(
                "token acquired: client={} token={}",
                client_id,
                entity.token_id()
            );
            Json(SyncResponse {
                token_id: entity.token_id().to_string(),
                groups: entity.groups(),
            })
            .into_response()
        }
        Err(e) => error_response(status_for(&e), &e.to_string()),
    }
}

/// Shared beacon/standby ingest: find the entity, vet the location, fold
/// it in and build the fan-out payload.
async fn ingest_location(
    state: &GatewayState,
    token: &str,
    loc: Location,
) -> Result<(Arc<Entity>, Vec<u8>), Response> {
    let entity = state
        .endpoint
        .get_entity(token)
        .await
        .map_err(|e| error_response(status_for(&e), &e.to_string()))?;

    loc.validate()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;
    check_clock(loc.timestamp).map_err(|e| error_response(status_for(&e), &e.to_string()))?;

    entity.update(loc);

    let user_data = UserData {
        client_id: entity.client_id().to_string(),
        location: loc,
    };
    let message = serde_json::to_vec(&user_data)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok((entity, message))
}

/// POST /api/v1/entity/{tokenid}/standby — a location update without
/// fan-out.
async fn standby(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
    Json(loc): Json<Location>,
) -> Response {
    let (entity, message) = match ingest_location(&state, &token, loc).await {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    match state.endpoint.ctx().standby(&entity, &message).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(status_for(&e), &e.to_string()),
    }
}

/// POST /api/v1/entity/{tokenid}/beacon — a location update broadcast to
/// the client's neighborhood and groups.
async fn beacon(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
    Json(loc): Json<Location>,
) -> Response {
    let (entity, message) = match ingest_location(&state, &token, loc).await {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    match state.endpoint.ctx().broadcast(&entity, &message).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(status_for(&e), &e.to_string()),
    }
}

/// GET /api/v1/entity/{tokenid}/download — the archived activity of the
/// session.
async fn download(State(state): State<GatewayState>, Path(token): Path<String>) -> Response {
    let token_id = match TokenId::parse(&token) {
        Ok(id) => id,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    match state.endpoint.ctx().get_data(token_id).await {
        Ok(activity) => Json(activity).into_response(),
        Err(e) => error_response(status_for(&e), &e.to_string()),
    }
}
