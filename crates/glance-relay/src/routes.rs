//! HTTP surface of the relay.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::warn;

use glance_common::protocol::{PayloadSlot, PublishPayload, RelayError, RoomCreated, SlotContents};
use glance_common::RoomCode;

use crate::store::{RoomStore, StoreError};

#[derive(Serialize)]
struct Health {
    active_rooms: usize,
}

enum ApiError {
    BadRequest(String),
    NotFound,
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "room not found or expired".to_string(),
            ),
            ApiError::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
        };
        (status, Json(RelayError { message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RoomNotFound => ApiError::NotFound,
            StoreError::Exhausted => {
                warn!("room code space exhausted");
                ApiError::Unavailable(e.to_string())
            }
        }
    }
}

fn parse_code(code: &str) -> Result<RoomCode, ApiError> {
    code.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid room code {code:?}")))
}

fn parse_slot(slot: &str) -> Result<PayloadSlot, ApiError> {
    match slot {
        "offer" => Ok(PayloadSlot::Offer),
        "answer" => Ok(PayloadSlot::Answer),
        other => Err(ApiError::BadRequest(format!("unknown slot {other:?}"))),
    }
}

async fn health(State(store): State<RoomStore>) -> impl IntoResponse {
    Json(Health {
        active_rooms: store.len().await,
    })
}

async fn create_room(State(store): State<RoomStore>) -> Result<Json<RoomCreated>, ApiError> {
    let code = store.create().await?;
    Ok(Json(RoomCreated {
        code,
        expires_in_secs: store.ttl().as_secs(),
    }))
}

async fn fetch_slot(
    State(store): State<RoomStore>,
    Path((code, slot)): Path<(String, String)>,
) -> Result<Json<SlotContents>, ApiError> {
    let code = parse_code(&code)?;
    let slot = parse_slot(&slot)?;
    let payload = store.fetch(code, slot).await?;
    Ok(Json(SlotContents { payload }))
}

async fn publish_slot(
    State(store): State<RoomStore>,
    Path((code, slot)): Path<(String, String)>,
    Json(body): Json<PublishPayload>,
) -> Result<StatusCode, ApiError> {
    let code = parse_code(&code)?;
    let slot = parse_slot(&slot)?;
    if body.payload.is_empty() {
        return Err(ApiError::BadRequest("empty payload".to_string()));
    }
    store.publish(code, slot, body.payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn release_room(
    State(store): State<RoomStore>,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    let code = parse_code(&code)?;
    store.remove(code).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Build the relay router over `store`.
pub fn router(store: RoomStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rooms", post(create_room))
        .route(
            "/rooms/:code/:slot",
            get(fetch_slot).put(publish_slot),
        )
        .route("/rooms/:code", delete(release_room))
        .with_state(store)
}
