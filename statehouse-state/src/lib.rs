//! Statehouse State Store
//!
//! This crate provides the transactional state-and-lock store behind the
//! statehouse remote state backend. Clients keep named state documents here and
//! coordinate writers through an explicit lock protocol.
//!
//! # Overview
//!
//! - **StateBackend**: the store contract (get, update, delete, lock, unlock)
//! - **SqliteBackend**: durable store whose operations are SQLite transactions
//! - **MemoryBackend**: process-local store for development and tests
//! - **LockRequest**: the lock info a client sends to take or release a lock
//! - **LockState**: the lock rules shared by every backend
//!
//! # Example
//!
//! ```ignore
//! use statehouse_core::StateName;
//! use statehouse_state::{create_backend, BackendConfig, LockRequest};
//!
//! let config = BackendConfig::new("sqlite").with_attribute("path", "states.db");
//! let backend = create_backend(&config).await?;
//! let name = StateName::parse("network-prod")?;
//!
//! // Take the lock before writing
//! let lock = LockRequest::new("OperationTypeApply");
//! backend.lock_state(&name, &lock).await?;
//!
//! backend.update_state(&name, document, Some(&lock.id)).await?;
//!
//! backend.unlock_state(&name, &lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

// Re-export main types for convenience
pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{MemoryBackend, SqliteBackend, create_backend};
pub use lock::LockRequest;
pub use state::{LockState, StateRecord};
