//! In-memory backend for development and tests
//!
//! States live in a process-local map and are lost on exit. A single mutex is
//! held across each operation's lock check and mutation, which gives the same
//! per-name atomicity the SQLite backend gets from its transactions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use statehouse_core::StateName;

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::lock::LockRequest;
use crate::state::{LockState, StateRecord};

/// Process-local state backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    states: Mutex<HashMap<StateName, StateRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> BackendResult<MutexGuard<'_, HashMap<StateName, StateRecord>>> {
        self.states
            .lock()
            .map_err(|_| BackendError::storage("state map lock poisoned"))
    }

    /// Number of states currently held, including lock reservations
    pub fn len(&self) -> BackendResult<usize> {
        Ok(self.states()?.len())
    }

    pub fn is_empty(&self) -> BackendResult<bool> {
        Ok(self.states()?.is_empty())
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn init(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn get_state(&self, name: &StateName) -> BackendResult<Option<Vec<u8>>> {
        let states = self.states()?;
        Ok(states.get(name).and_then(|record| record.document.clone()))
    }

    async fn update_state(
        &self,
        name: &StateName,
        document: Vec<u8>,
        lock_id: Option<&str>,
    ) -> BackendResult<()> {
        let mut states = self.states()?;

        match states.get_mut(name) {
            Some(record) => {
                record.lock.check_write(lock_id)?;
                record.document = Some(document);
            }
            None => {
                states.insert(
                    name.clone(),
                    StateRecord::with_document(name.clone(), document),
                );
            }
        }

        Ok(())
    }

    async fn delete_state(&self, name: &StateName, force: bool) -> BackendResult<()> {
        let mut states = self.states()?;

        if let Some(record) = states.get(name) {
            record.lock.check_delete(force)?;
            states.remove(name);
        }

        Ok(())
    }

    async fn lock_state(&self, name: &StateName, request: &LockRequest) -> BackendResult<()> {
        request.validate()?;
        let lock_data = request.to_lock_data()?;
        let mut states = self.states()?;

        match states.get_mut(name) {
            Some(record) => {
                record.lock.check_lock()?;
                record.lock = LockState::Locked {
                    lock_id: request.id.clone(),
                    lock_data,
                };
            }
            None => {
                states.insert(
                    name.clone(),
                    StateRecord::reserved(name.clone(), request.id.clone(), lock_data),
                );
            }
        }

        Ok(())
    }

    async fn unlock_state(&self, name: &StateName, request: &LockRequest) -> BackendResult<()> {
        request.validate()?;
        let mut states = self.states()?;

        match states.get_mut(name) {
            Some(record) => {
                record.lock.check_unlock(name, &request.id)?;
                record.lock = LockState::Unlocked;
                Ok(())
            }
            None => Err(BackendError::NotLocked(name.to_string())),
        }
    }
}
