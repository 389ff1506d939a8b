//! Entities, repositories, and datastore backends.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::config::{StorageConfig, StorageType};

pub mod memory;
mod repository;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod store;

pub use memory::MemoryDatastore;
pub use repository::{Predicate, Repository};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatastore;
pub use store::{Datastore, RecordStore, Result, StoreError, StoreTransaction};

/// A persistable entity.
///
/// The key type is an associated type: one key type per entity type, by
/// construction, which is also what makes the unit of work's per-entity
/// repository cache sound.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Typed key, rendered to a string id for the record store.
    type Key: fmt::Display + Send + Sync;

    /// Storage kind discriminator (collection/table name).
    const KIND: &'static str;

    /// The entity's key.
    fn key(&self) -> Self::Key;
}

/// Initialize a datastore based on configuration.
pub async fn init_datastore(config: &StorageConfig) -> Result<Arc<dyn Datastore>> {
    info!(storage = ?config.storage_type, "initializing datastore");

    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryDatastore::new())),
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            if let Some(parent) = std::path::Path::new(&config.sqlite.path).parent() {
                std::fs::create_dir_all(parent)?;
            }

            let pool =
                sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.sqlite.path))
                    .await?;
            let store = SqliteDatastore::new(pool);
            store.init().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but the 'sqlite' feature is not enabled");
            Err(StoreError::UnknownStorageType(
                "sqlite (feature disabled)".to_string(),
            ))
        }
    }
}
