//! Lock requests sent by clients to take or release a state lock

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, BackendResult};

/// Maximum length of a lock token
pub const MAX_LOCK_ID_LEN: usize = 50;

/// A lock or unlock request
///
/// Field names follow the lock info document infrastructure tools send with
/// their LOCK and UNLOCK calls. Only `id` means anything to the store; every
/// other field is carried through untouched into the stored lock metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    /// Caller-chosen lock token
    #[serde(rename = "ID")]
    pub id: String,
    /// The operation being performed (e.g., "OperationTypeApply")
    #[serde(rename = "Operation", default)]
    pub operation: Option<String>,
    /// Free-form information about the lock
    #[serde(rename = "Info", default)]
    pub info: Option<String>,
    /// Who acquired the lock (username@hostname)
    #[serde(rename = "Who", default)]
    pub who: Option<String>,
    /// Version of the tool that took the lock
    #[serde(rename = "Version", default)]
    pub version: Option<String>,
    /// When the lock was requested
    #[serde(rename = "Created", default)]
    pub created: Option<String>,
    /// Path of the state being locked
    #[serde(rename = "Path", default)]
    pub path: Option<String>,
}

impl LockRequest {
    /// Create a request for an operation with a fresh token
    pub fn new(operation: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), operation)
    }

    /// Create a request for an operation with a specific token
    pub fn with_id(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operation: Some(operation.into()),
            info: None,
            who: Some(get_lock_owner()),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            created: Some(Utc::now().to_rfc3339()),
            path: None,
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Check the token is present and within bounds
    pub fn validate(&self) -> BackendResult<()> {
        if self.id.is_empty() {
            return Err(BackendError::InvalidLockRequest(
                "lock ID is required".to_string(),
            ));
        }

        let len = self.id.chars().count();
        if len > MAX_LOCK_ID_LEN {
            return Err(BackendError::InvalidLockRequest(format!(
                "lock ID must be at most {} characters, got {}",
                MAX_LOCK_ID_LEN, len
            )));
        }

        Ok(())
    }

    /// Serialize the request into the metadata stored alongside the lock
    pub fn to_lock_data(&self) -> BackendResult<String> {
        serde_json::to_string(self).map_err(|e| {
            BackendError::Serialization(format!("Failed to serialize lock request: {}", e))
        })
    }
}

/// Get the lock owner string (username@hostname)
fn get_lock_owner() -> String {
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}@{}", username, hostname)
}
