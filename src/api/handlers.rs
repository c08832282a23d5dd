use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    api::{
        AppState,
        dtos::{
            ErrorResponse, HealthResponse, ValidateSourceRequest, ValidateSourceResponse,
            WebhookPayload,
        },
    },
    fetcher::FetchError,
    poller::PollError,
};

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Inbound email webhook. Only a malformed request is an HTTP error; every
/// processing outcome is a 200 with `success` set accordingly.
pub async fn email_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid JSON: {e}")),
    };

    let inbound = match payload.validate() {
        Ok(inbound) => inbound,
        Err(error) => return error_response(StatusCode::BAD_REQUEST, error),
    };

    let result = state.processor.process(inbound).await;
    (StatusCode::OK, Json(result)).into_response()
}

/// Manual poll of one feed source, bypassing its retry schedule.
pub async fn poll_source(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.poller.poll_source_by_id(id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(PollError::SourceNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "Source not found")
        }
        Err(PollError::NotAFeed(_)) => {
            error_response(StatusCode::BAD_REQUEST, "Source is not a feed")
        }
        Err(PollError::AlreadySyncing(_)) => {
            error_response(StatusCode::CONFLICT, "Source is already being polled")
        }
        Err(PollError::Storage(e)) => {
            error!(source_id = %id, error = %e, "manual poll failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
    }
}

/// Trial fetch of a feed URL before it is accepted as a source.
pub async fn validate_source(
    State(state): State<AppState>,
    Json(request): Json<ValidateSourceRequest>,
) -> Response {
    match state.fetcher.probe(&request.url).await {
        Ok(feed) => {
            info!(url = %request.url, items = feed.items.len(), "feed validated");
            (StatusCode::OK, Json(ValidateSourceResponse::from(feed))).into_response()
        }
        Err(e @ (FetchError::InvalidUrl(_) | FetchError::UnsupportedScheme(_))) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ (FetchError::EmptyFeed | FetchError::Parse(_) | FetchError::BodyTooLarge(_))) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "feed validation fetch failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "OK".to_string(),
                database: "healthy".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "database health check failed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
