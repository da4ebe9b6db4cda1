//! Backend implementations for state storage

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};

/// Create a backend from configuration
///
/// This function dispatches to the appropriate backend implementation
/// based on the backend_type in the configuration, then initializes it.
pub async fn create_backend(config: &BackendConfig) -> BackendResult<Box<dyn StateBackend>> {
    let backend: Box<dyn StateBackend> = match config.backend_type.as_str() {
        "sqlite" => Box::new(SqliteBackend::from_config(config)?),
        "memory" => Box::new(MemoryBackend::new()),
        other => return Err(BackendError::unsupported_backend(other)),
    };

    backend.init().await?;
    tracing::info!(backend = %config.backend_type, "state backend ready");

    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use statehouse_core::StateName;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_unsupported_backend() {
        let config = BackendConfig::new("unsupported");

        let result = create_backend(&config).await;
        assert!(result.is_err());

        if let Err(BackendError::UnsupportedBackend(name)) = result {
            assert_eq!(name, "unsupported");
        } else {
            panic!("Expected UnsupportedBackend error");
        }
    }

    #[tokio::test]
    async fn test_create_memory_backend() {
        let backend = create_backend(&BackendConfig::new("memory")).await.unwrap();
        let name = StateName::parse("from-factory").unwrap();

        backend.update_state(&name, b"{}".to_vec(), None).await.unwrap();
        assert_eq!(backend.get_state(&name).await.unwrap(), Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn test_create_sqlite_backend_initializes_schema() {
        let dir = tempdir().unwrap();
        let config = BackendConfig::new("sqlite").with_attribute(
            "path",
            dir.path().join("factory.db").to_string_lossy().to_string(),
        );

        let backend = create_backend(&config).await.unwrap();
        let name = StateName::parse("from-factory").unwrap();
        assert_eq!(backend.get_state(&name).await.unwrap(), None);
    }
}
