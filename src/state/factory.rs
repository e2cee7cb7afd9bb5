use crate::config::{StateBackend, StateConfig};
use crate::error::{AppError, Result};
use crate::state::{InMemoryStore, SledStore, Stores};
use std::sync::Arc;

/// Create the stores selected by configuration
pub fn create_stores(config: &StateConfig) -> Result<Stores> {
    match config.backend {
        StateBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("Sled backend requires 'path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "Initializing Sled storage backend");

            let store = SledStore::new(path)?;
            Ok(Stores::from_backend(Arc::new(store)))
        }

        StateBackend::Memory => Ok(create_in_memory_stores()),
    }
}

/// Create in-memory stores (for testing and development)
pub fn create_in_memory_stores() -> Stores {
    tracing::info!("Initializing in-memory storage backend");
    Stores::from_backend(Arc::new(InMemoryStore::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_sled_stores() {
        let temp_dir = TempDir::new().unwrap();
        let config = StateConfig {
            backend: StateBackend::Sled,
            path: Some(temp_dir.path().to_path_buf()),
        };

        let stores = create_stores(&config).unwrap();
        assert!(stores.topics.list_topics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sled_requires_path() {
        let config = StateConfig {
            backend: StateBackend::Sled,
            path: None,
        };

        assert!(matches!(
            create_stores(&config),
            Err(AppError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let config = StateConfig {
            backend: StateBackend::Memory,
            path: None,
        };
        let stores = create_stores(&config).unwrap();
        assert!(stores.models.get_model(&uuid::Uuid::new_v4()).await.unwrap().is_none());
    }
}
