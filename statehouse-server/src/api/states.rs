//! State document and lock endpoints
//!
//! Status codes follow what infrastructure tools expect from an HTTP state
//! backend: a lock conflict is 423 on writes and unlocks but 409 on LOCK, and
//! unlocking a state that is not locked is 409.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use statehouse_core::StateName;
use statehouse_state::{BackendError, LockRequest};
use tracing::instrument;

use crate::api::{ApiError, AppState};

/// Query parameters of a state update
#[derive(Debug, Deserialize)]
pub struct UpdateParams {
    /// Token of the lock the client holds, if any
    #[serde(rename = "ID")]
    pub id: Option<String>,
}

/// Query parameters of a state delete
#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    /// Any non-empty value skips the lock check
    pub force: Option<String>,
}

fn parse_name(name: String) -> Result<StateName, ApiError> {
    Ok(StateName::parse(name)?)
}

fn parse_lock_request(body: &[u8]) -> Result<LockRequest, ApiError> {
    let request: LockRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid lock request: {}", e)))?;
    request.validate()?;
    Ok(request)
}

/// Fetch a state document
///
/// GET /state/{name}
#[instrument(skip(state), level = "info")]
pub async fn get_state(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let name = parse_name(name)?;

    match state.backend().get_state(&name).await? {
        Some(document) => {
            Ok(([(header::CONTENT_TYPE, "application/json")], document).into_response())
        }
        None => Err(ApiError::not_found()),
    }
}

/// Store a state document
///
/// POST /state/{name}?ID={lock_id}
#[instrument(skip(state, params, body), fields(lock_id = ?params.id, size = body.len()), level = "info")]
pub async fn update_state(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<UpdateParams>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let name = parse_name(name)?;

    if body.is_empty() {
        return Err(ApiError::bad_request("state document is required"));
    }

    let lock_id = params.id.as_deref().filter(|id| !id.is_empty());

    match state
        .backend()
        .update_state(&name, body.to_vec(), lock_id)
        .await
    {
        Ok(()) => {
            tracing::debug!(name = %name, "updated state");
            Ok(StatusCode::OK)
        }
        Err(BackendError::Locked { lock_data }) => {
            tracing::warn!(name = %name, "update rejected, state is locked");
            Err(ApiError::lock_conflict(StatusCode::LOCKED, lock_data))
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove a state
///
/// DELETE /state/{name}?force=1
#[instrument(skip(state, params), fields(force = ?params.force), level = "info")]
pub async fn delete_state(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, ApiError> {
    let name = parse_name(name)?;
    let force = params.force.as_deref().is_some_and(|f| !f.is_empty());

    match state.backend().delete_state(&name, force).await {
        Ok(()) => {
            tracing::info!(name = %name, force, "deleted state");
            Ok(StatusCode::OK)
        }
        Err(BackendError::Locked { .. }) => {
            tracing::warn!(name = %name, "delete rejected, state is locked");
            Err(ApiError::status(StatusCode::LOCKED))
        }
        Err(e) => Err(e.into()),
    }
}

/// Route the LOCK and UNLOCK extension methods
///
/// Any other method not matched by the route is refused with 405.
pub async fn lock_dispatch(
    method: Method,
    state: State<AppState>,
    name: Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    match method.as_str() {
        "LOCK" => lock_state(state, name, body).await,
        "UNLOCK" => unlock_state(state, name, body).await,
        _ => Err(ApiError::status(StatusCode::METHOD_NOT_ALLOWED)),
    }
}

/// Lock a state
///
/// LOCK /state/{name}
#[instrument(skip(state, body), level = "info")]
pub async fn lock_state(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let name = parse_name(name)?;
    let request = parse_lock_request(&body)?;

    match state.backend().lock_state(&name, &request).await {
        Ok(()) => {
            tracing::info!(name = %name, lock_id = %request.id, "locked state");
            Ok(StatusCode::OK)
        }
        Err(BackendError::Locked { lock_data }) => {
            tracing::warn!(name = %name, lock_id = %request.id, "lock refused, state is already locked");
            Err(ApiError::lock_conflict(StatusCode::CONFLICT, lock_data))
        }
        Err(e) => Err(e.into()),
    }
}

/// Unlock a state
///
/// UNLOCK /state/{name}
#[instrument(skip(state, body), level = "info")]
pub async fn unlock_state(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let name = parse_name(name)?;
    let request = parse_lock_request(&body)?;

    match state.backend().unlock_state(&name, &request).await {
        Ok(()) => {
            tracing::info!(name = %name, lock_id = %request.id, "unlocked state");
            Ok(StatusCode::OK)
        }
        Err(e) => {
            if matches!(e, BackendError::Locked { .. }) {
                tracing::warn!(name = %name, lock_id = %request.id, "unlock refused, lock held by another token");
            }
            Err(e.into())
        }
    }
}
