//! REST API module
//!
//! Exposes the state store over the HTTP remote state protocol: GET, POST and
//! DELETE on `/state/{name}` plus the LOCK and UNLOCK extension methods.

pub mod states;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use statehouse_core::NameError;
use statehouse_state::{BackendError, StateBackend};
use tower_http::trace::TraceLayer;

/// Default limit for request bodies (state documents and lock requests)
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn StateBackend>,
    max_body_bytes: usize,
}

impl AppState {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self {
            backend,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn backend(&self) -> &dyn StateBackend {
        self.backend.as_ref()
    }
}

/// Create the API router with all routes
pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/state/{name}",
            get(states::get_state)
                .post(states::update_state)
                .delete(states::delete_state)
                // LOCK and UNLOCK are extension methods the method filters do not cover
                .fallback(states::lock_dispatch),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Error body for requests the server rejects
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

enum ErrorBody {
    Empty,
    Message(ErrorResponse),
    /// Lock metadata of the current holder, already serialized
    LockInfo(String),
}

/// API error type that converts to HTTP responses
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    /// A bare status code with no body
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            body: ErrorBody::Empty,
        }
    }

    pub fn not_found() -> Self {
        Self::status(StatusCode::NOT_FOUND)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::Message(ErrorResponse::new("bad_request", message)),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody::Message(ErrorResponse::new("internal_error", message)),
        }
    }

    /// A lock conflict reported with the current holder's lock info
    pub fn lock_conflict(status: StatusCode, lock_data: String) -> Self {
        Self {
            status,
            body: ErrorBody::LockInfo(lock_data),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.body {
            ErrorBody::Empty => self.status.into_response(),
            ErrorBody::Message(body) => (self.status, Json(body)).into_response(),
            ErrorBody::LockInfo(lock_data) => (
                self.status,
                [(header::CONTENT_TYPE, "application/json")],
                lock_data,
            )
                .into_response(),
        }
    }
}

impl From<NameError> for ApiError {
    fn from(err: NameError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Locked { lock_data } => {
                ApiError::lock_conflict(StatusCode::LOCKED, lock_data)
            }
            BackendError::NotLocked(_) => ApiError::status(StatusCode::CONFLICT),
            BackendError::InvalidLockRequest(message) => ApiError::bad_request(message),
            other => {
                tracing::error!(error = %other, "state backend failure");
                ApiError::internal("internal storage error")
            }
        }
    }
}
