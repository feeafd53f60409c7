//! Tenant settings persistence contract
//!
//! The coordinator reads a tenant's last persisted settings when a message arrives and,
//! when a peer's snapshot differs, writes that snapshot back. Two implementations ship
//! with the crate: [`MemoryStore`] and the JSON-per-tenant [`FileStore`].

mod file;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TenantSettings;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors from a settings store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid tenant name for storage: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted tenant settings
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the settings last saved for `name`, if any
    async fn try_load(&self, name: &str) -> Result<Option<TenantSettings>, StoreError>;

    /// Persist `settings`, replacing any previous copy for the same tenant
    async fn save(&self, settings: &TenantSettings) -> Result<(), StoreError>;
}
