use async_trait::async_trait;
use sea_orm::DatabaseConnection;

use models::protocol::Model;

use crate::errors::ServiceError;

/// Durable store of protocol records.
#[async_trait]
pub trait ProtocolRepository: Send + Sync {
    /// All protocols ordered by name.
    async fn list(&self) -> Result<Vec<Model>, ServiceError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<Model>, ServiceError>;
    /// Persist `next` if the stored row is still at `expected_version`, else `ServiceError::Conflict`.
    async fn save(&self, next: Model, expected_version: i32) -> Result<Model, ServiceError>;
    /// Insert missing catalog rows, returning how many were added.
    async fn seed_defaults(&self) -> Result<usize, ServiceError>;
}

/// SeaORM-backed repository implementation.
pub struct SeaOrmProtocolRepository {
    pub db: DatabaseConnection,
}

impl SeaOrmProtocolRepository {
    pub fn new(db: DatabaseConnection) -> Self { Self { db } }
}

#[async_trait]
impl ProtocolRepository for SeaOrmProtocolRepository {
    async fn list(&self) -> Result<Vec<Model>, ServiceError> {
        models::protocol::list(&self.db).await.map_err(ServiceError::from_model)
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Model>, ServiceError> {
        models::protocol::find_by_name(&self.db, name).await.map_err(ServiceError::from_model)
    }

    async fn save(&self, next: Model, expected_version: i32) -> Result<Model, ServiceError> {
        models::protocol::save_versioned(&self.db, next, expected_version).await.map_err(ServiceError::from_model)
    }

    async fn seed_defaults(&self) -> Result<usize, ServiceError> {
        models::protocol::seed_defaults(&self.db).await.map_err(ServiceError::from_model)
    }
}

/// Simple in-memory repository for tests and local experiments
pub mod mock {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    use chrono::Utc;
    use models::protocol::{ProtocolStatus, DEFAULT_PROTOCOLS};
    use uuid::Uuid;

    #[derive(Default)]
    pub struct InMemoryProtocolRepository {
        rows: Mutex<BTreeMap<String, Model>>,
        // every status written per protocol, oldest first
        history: Mutex<HashMap<String, Vec<ProtocolStatus>>>,
    }

    impl InMemoryProtocolRepository {
        pub fn with_defaults() -> Self {
            let repo = Self::default();
            {
                let mut rows = repo.rows.lock().unwrap_or_else(|e| e.into_inner());
                for seed in DEFAULT_PROTOCOLS {
                    rows.insert(seed.name.to_string(), seed_row(seed.name, seed.display_name, seed.port));
                }
            }
            repo
        }

        /// Statuses persisted for `name` since creation.
        pub fn history(&self, name: &str) -> Vec<ProtocolStatus> {
            self.history.lock().unwrap_or_else(|e| e.into_inner()).get(name).cloned().unwrap_or_default()
        }

        /// Overwrite a row as-is, bypassing version checks.
        pub fn put(&self, row: Model) {
            self.rows.lock().unwrap_or_else(|e| e.into_inner()).insert(row.name.clone(), row);
        }
    }

    fn seed_row(name: &str, display_name: &str, port: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: name.to_string(),
            display_name: display_name.to_string(),
            is_enabled: false,
            is_installed: false,
            port: Some(port),
            ssl_enabled: false,
            config_json: None,
            status: ProtocolStatus::Uninstalled,
            error_message: None,
            installed_at: None,
            updated_at: Utc::now().into(),
            version: 0,
        }
    }

    #[async_trait]
    impl ProtocolRepository for InMemoryProtocolRepository {
        async fn list(&self) -> Result<Vec<Model>, ServiceError> {
            Ok(self.rows.lock().unwrap_or_else(|e| e.into_inner()).values().cloned().collect())
        }

        async fn get_by_name(&self, name: &str) -> Result<Option<Model>, ServiceError> {
            Ok(self.rows.lock().unwrap_or_else(|e| e.into_inner()).get(name).cloned())
        }

        async fn save(&self, next: Model, expected_version: i32) -> Result<Model, ServiceError> {
            let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
            let current = rows.get(&next.name).ok_or_else(|| ServiceError::not_found("protocol"))?;
            if current.version != expected_version {
                return Err(ServiceError::Conflict(format!(
                    "protocol {} changed since version {}",
                    next.name, expected_version
                )));
            }
            rows.insert(next.name.clone(), next.clone());
            self.history
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .entry(next.name.clone())
                .or_default()
                .push(next.status);
            Ok(next)
        }

        async fn seed_defaults(&self) -> Result<usize, ServiceError> {
            let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
            let mut inserted = 0;
            for seed in DEFAULT_PROTOCOLS {
                if !rows.contains_key(seed.name) {
                    rows.insert(seed.name.to_string(), seed_row(seed.name, seed.display_name, seed.port));
                    inserted += 1;
                }
            }
            Ok(inserted)
        }
    }
}
