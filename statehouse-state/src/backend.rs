//! State backend trait and error types

use std::collections::HashMap;

use async_trait::async_trait;
use statehouse_core::{StateName, Value};
use thiserror::Error;

use crate::lock::LockRequest;

/// Errors that can occur when interacting with a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// The state is locked by another lock holder
    #[error("State is locked (lock info: {lock_data})")]
    Locked {
        /// Serialized lock request of the current holder
        lock_data: String,
    },

    /// An unlock was requested for a state that holds no lock
    #[error("State is not locked: {0}")]
    NotLocked(String),

    /// The lock request is malformed
    #[error("Invalid lock request: {0}")]
    InvalidLockRequest(String),

    /// The backend type is not supported
    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    /// Configuration error
    #[error("Backend configuration error: {0}")]
    Configuration(String),

    /// The underlying storage failed; any in-flight change was rolled back
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    /// Create a Locked error carrying the current lock metadata
    pub fn locked(lock_data: impl Into<String>) -> Self {
        Self::Locked {
            lock_data: lock_data.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an unsupported backend error
    pub fn unsupported_backend(backend_type: impl Into<String>) -> Self {
        Self::UnsupportedBackend(backend_type.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Trait for state storage backends
///
/// Each mutating operation is a single atomic unit: the lock check and the
/// write it guards happen inside one transaction, and a failed operation leaves
/// the record exactly as it found it.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Prepare the backend for use (create tables, etc.)
    ///
    /// Must be safe to call more than once.
    async fn init(&self) -> BackendResult<()>;

    /// Read the current document of a state
    ///
    /// Returns `None` if the state has never been written. Lock status is
    /// ignored.
    async fn get_state(&self, name: &StateName) -> BackendResult<Option<Vec<u8>>>;

    /// Write a state document, creating the state if needed
    ///
    /// A locked state only accepts writes carrying the holder's token. The lock
    /// itself is never changed.
    async fn update_state(
        &self,
        name: &StateName,
        document: Vec<u8>,
        lock_id: Option<&str>,
    ) -> BackendResult<()>;

    /// Remove a state and its lock
    ///
    /// Fails on a locked state unless `force` is set. Removing a state that
    /// does not exist succeeds.
    async fn delete_state(&self, name: &StateName, force: bool) -> BackendResult<()>;

    /// Lock a state, creating an empty reservation if it does not exist
    ///
    /// Fails with the current lock metadata if the state is already locked,
    /// whoever holds it.
    async fn lock_state(&self, name: &StateName, request: &LockRequest) -> BackendResult<()>;

    /// Release the lock held with the request's token
    async fn unlock_state(&self, name: &StateName, request: &LockRequest) -> BackendResult<()>;
}

/// Configuration for a state backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend type (e.g., "sqlite", "memory")
    pub backend_type: String,
    /// Backend-specific attributes
    pub attributes: HashMap<String, Value>,
}

impl BackendConfig {
    /// Create a configuration with no attributes
    pub fn new(backend_type: impl Into<String>) -> Self {
        Self {
            backend_type: backend_type.into(),
            attributes: HashMap::new(),
        }
    }

    /// Set an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Get a string attribute value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.attributes.get(key) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get an integer attribute value
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.attributes.get(key) {
            Some(Value::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Get a boolean attribute value
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.attributes.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Get a boolean attribute with a default value
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }
}
