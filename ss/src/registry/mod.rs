//! Runtime registry contract
//!
//! The registry owns the live execution contexts of the tenants hosted by this process.
//! A reload replaces a tenant's context with a freshly built one and tears the old one
//! down, including any channel subscription it owned.

mod context;
mod local;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TenantSettings;

pub use context::TenantContext;
pub use local::{LocalRegistry, RegistryEvent};

/// Errors from the runtime registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Failed to build context for tenant {name}: {message}")]
    Build { name: String, message: String },

    #[error("Registry is shut down")]
    ShutDown,
}

/// Live tenant contexts of this process
#[async_trait]
pub trait RuntimeRegistry: Send + Sync {
    /// Build a new context for `settings.name` and retire the current one
    async fn reload(&self, settings: TenantSettings) -> Result<Arc<TenantContext>, RegistryError>;

    /// Settings of the tenant's live context
    fn try_get_settings(&self, name: &str) -> Option<TenantSettings>;

    /// Scoped access to the tenant's live context
    fn scope(&self, name: &str) -> Option<Arc<TenantContext>>;

    /// Every locally running instance of the control tenant
    fn control_instances(&self) -> Vec<Arc<TenantContext>>;

    /// Names of every tenant with a live context
    fn tenant_names(&self) -> Vec<String>;
}
