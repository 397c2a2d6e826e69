//! Repository layer for data access

pub mod api_keys;
pub mod enrollments;
pub mod opt_outs;
pub mod sends;
pub mod sequences;
pub mod settings;
pub mod templates;

use crate::db::DatabasePool;
use crate::memory::MemoryStore;
use cloudgreet_common::config::DatabaseConfig;
use cloudgreet_common::{Error, Result};
use std::sync::Arc;
use tracing::info;

// Re-export repository traits
pub use api_keys::{ApiKeyId, ApiKeyRepository};
pub use enrollments::EnrollmentRepository;
pub use opt_outs::OptOutRepository;
pub use sends::SendRepository;
pub use sequences::SequenceRepository;
pub use settings::SettingsRepository;
pub use templates::TemplateRepository;

// Re-export concrete database implementations
pub use api_keys::DbApiKeyRepository;
pub use enrollments::DbEnrollmentRepository;
pub use opt_outs::DbOptOutRepository;
pub use sends::DbSendRepository;
pub use sequences::DbSequenceRepository;
pub use settings::DbSettingsRepository;
pub use templates::DbTemplateRepository;

#[derive(Clone)]
enum Backend {
    Postgres(DatabasePool),
    Memory,
}

/// Every repository behind one handle
#[derive(Clone)]
pub struct Store {
    pub templates: Arc<dyn TemplateRepository>,
    pub sequences: Arc<dyn SequenceRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub sends: Arc<dyn SendRepository>,
    pub opt_outs: Arc<dyn OptOutRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
    backend: Backend,
}

impl Store {
    /// Store backed by PostgreSQL
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            templates: Arc::new(DbTemplateRepository::new(pool.clone())),
            sequences: Arc::new(DbSequenceRepository::new(pool.clone())),
            enrollments: Arc::new(DbEnrollmentRepository::new(pool.clone())),
            sends: Arc::new(DbSendRepository::new(pool.clone())),
            opt_outs: Arc::new(DbOptOutRepository::new(pool.clone())),
            settings: Arc::new(DbSettingsRepository::new(pool.clone())),
            api_keys: Arc::new(DbApiKeyRepository::new(pool.clone())),
            backend: Backend::Postgres(pool),
        }
    }

    /// Store backed by a fresh in-memory state
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            templates: store.clone(),
            sequences: store.clone(),
            enrollments: store.clone(),
            sends: store.clone(),
            opt_outs: store.clone(),
            settings: store.clone(),
            api_keys: store,
            backend: Backend::Memory,
        }
    }

    /// Backend name
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Postgres(_) => "postgres",
            Backend::Memory => "memory",
        }
    }

    /// Check backend health
    pub async fn health_check(&self) -> Result<()> {
        match &self.backend {
            Backend::Postgres(pool) => pool.health_check().await,
            Backend::Memory => Ok(()),
        }
    }

    /// Run embedded migrations (no-op in memory)
    pub async fn migrate(&self) -> Result<()> {
        match &self.backend {
            Backend::Postgres(pool) => pool.migrate().await,
            Backend::Memory => Ok(()),
        }
    }
}

/// Create a store from configuration
pub async fn create_store(config: &DatabaseConfig) -> Result<Store> {
    match config.backend.as_str() {
        "postgres" => {
            let pool = DatabasePool::new(config).await?;
            let store = Store::postgres(pool);
            if config.run_migrations {
                store.migrate().await?;
            }
            Ok(store)
        }
        "memory" => {
            info!("Using in-memory store; data is lost on restart");
            Ok(Store::memory())
        }
        other => Err(Error::Config(format!(
            "Unsupported database backend: {}",
            other
        ))),
    }
}
