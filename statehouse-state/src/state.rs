//! State records and the lock rules every backend applies

use statehouse_core::StateName;

use crate::backend::{BackendError, BackendResult};

/// Lock status of a state record
///
/// A locked record always carries both the holder's token and the serialized
/// lock request; an unlocked record carries neither.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Unlocked,
    Locked {
        /// Token of the current lock holder
        lock_id: String,
        /// Serialized lock request that created the lock
        lock_data: String,
    },
}

impl LockState {
    /// Rebuild a lock state from its stored columns
    ///
    /// Returns `None` when the columns disagree (a locked row without a token
    /// or metadata, or an unlocked row carrying either).
    pub fn from_parts(
        locked: bool,
        lock_id: Option<String>,
        lock_data: Option<String>,
    ) -> Option<Self> {
        match (locked, lock_id, lock_data) {
            (true, Some(lock_id), Some(lock_data))
                if !lock_id.is_empty() && !lock_data.is_empty() =>
            {
                Some(Self::Locked { lock_id, lock_data })
            }
            (false, None, None) => Some(Self::Unlocked),
            _ => None,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    /// Metadata of the current lock, if any
    pub fn lock_data(&self) -> Option<&str> {
        match self {
            Self::Locked { lock_data, .. } => Some(lock_data),
            Self::Unlocked => None,
        }
    }

    /// A new lock may only be taken on an unlocked state
    pub fn check_lock(&self) -> BackendResult<()> {
        match self {
            Self::Unlocked => Ok(()),
            Self::Locked { lock_data, .. } => Err(BackendError::locked(lock_data)),
        }
    }

    /// Only the holder of the lock may release it
    pub fn check_unlock(&self, name: &StateName, lock_id: &str) -> BackendResult<()> {
        match self {
            Self::Locked {
                lock_id: current, ..
            } if current == lock_id => Ok(()),
            Self::Locked { lock_data, .. } => Err(BackendError::locked(lock_data)),
            Self::Unlocked => Err(BackendError::NotLocked(name.to_string())),
        }
    }

    /// Writes need no token on an unlocked state and the holder's token otherwise
    pub fn check_write(&self, lock_id: Option<&str>) -> BackendResult<()> {
        match self {
            Self::Unlocked => Ok(()),
            Self::Locked {
                lock_id: current, ..
            } if lock_id == Some(current.as_str()) => Ok(()),
            Self::Locked { lock_data, .. } => Err(BackendError::locked(lock_data)),
        }
    }

    /// Deletes are refused on a locked state unless forced; forcing skips the
    /// token entirely
    pub fn check_delete(&self, force: bool) -> BackendResult<()> {
        match self {
            Self::Locked { lock_data, .. } if !force => Err(BackendError::locked(lock_data)),
            _ => Ok(()),
        }
    }
}

/// A single named state as held by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub name: StateName,
    /// Current state document; `None` until the first write
    pub document: Option<Vec<u8>>,
    pub lock: LockState,
}

impl StateRecord {
    /// Create a record holding a document and no lock
    pub fn with_document(name: StateName, document: Vec<u8>) -> Self {
        Self {
            name,
            document: Some(document),
            lock: LockState::Unlocked,
        }
    }

    /// Create a lock reservation for a state that has no document yet
    pub fn reserved(name: StateName, lock_id: String, lock_data: String) -> Self {
        Self {
            name,
            document: None,
            lock: LockState::Locked { lock_id, lock_data },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> StateName {
        StateName::parse("network-prod").unwrap()
    }

    fn locked(id: &str) -> LockState {
        LockState::Locked {
            lock_id: id.to_string(),
            lock_data: format!("{{\"ID\":\"{}\"}}", id),
        }
    }

    fn expect_locked(result: BackendResult<()>, expected_data: &str) {
        match result {
            Err(BackendError::Locked { lock_data }) => assert_eq!(lock_data, expected_data),
            other => panic!("Expected Locked error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(
            LockState::from_parts(false, None, None),
            Some(LockState::Unlocked)
        );
        assert_eq!(
            LockState::from_parts(true, Some("a".into()), Some("{}".into())),
            Some(LockState::Locked {
                lock_id: "a".into(),
                lock_data: "{}".into()
            })
        );
        assert_eq!(LockState::from_parts(true, None, Some("{}".into())), None);
        assert_eq!(LockState::from_parts(true, Some("".into()), Some("{}".into())), None);
        assert_eq!(LockState::from_parts(false, Some("a".into()), None), None);
    }

    #[test]
    fn test_check_lock() {
        assert!(LockState::Unlocked.check_lock().is_ok());
        expect_locked(locked("a").check_lock(), "{\"ID\":\"a\"}");
    }

    #[test]
    fn test_check_unlock() {
        assert!(locked("a").check_unlock(&name(), "a").is_ok());
        expect_locked(locked("a").check_unlock(&name(), "b"), "{\"ID\":\"a\"}");

        match LockState::Unlocked.check_unlock(&name(), "a") {
            Err(BackendError::NotLocked(n)) => assert_eq!(n, "network-prod"),
            other => panic!("Expected NotLocked error, got {:?}", other),
        }
    }

    #[test]
    fn test_check_write() {
        assert!(LockState::Unlocked.check_write(None).is_ok());
        assert!(LockState::Unlocked.check_write(Some("anything")).is_ok());
        assert!(locked("a").check_write(Some("a")).is_ok());
        expect_locked(locked("a").check_write(None), "{\"ID\":\"a\"}");
        expect_locked(locked("a").check_write(Some("b")), "{\"ID\":\"a\"}");
    }

    #[test]
    fn test_check_delete() {
        assert!(LockState::Unlocked.check_delete(false).is_ok());
        assert!(locked("a").check_delete(true).is_ok());
        expect_locked(locked("a").check_delete(false), "{\"ID\":\"a\"}");
    }

    #[test]
    fn test_reserved_record() {
        let record = StateRecord::reserved(name(), "a".into(), "{}".into());
        assert!(record.document.is_none());
        assert!(record.lock.is_locked());
        assert_eq!(record.lock.lock_data(), Some("{}"));

        let record = StateRecord::with_document(name(), b"{}".to_vec());
        assert!(!record.lock.is_locked());
        assert_eq!(record.lock.lock_data(), None);
    }
}
