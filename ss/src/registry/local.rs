//! In-process runtime registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{RegistryError, RuntimeRegistry, TenantContext};
use crate::domain::TenantSettings;

/// Notification broadcast when the set of live contexts changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A tenant's context was rebuilt
    Reloaded { name: String, generation: u64 },
    /// Every context was released
    ShutDown,
}

/// Registry holding at most one live context per tenant
pub struct LocalRegistry {
    control_tenant: String,
    contexts: RwLock<HashMap<String, Arc<TenantContext>>>,
    generation: AtomicU64,
    shut_down: AtomicBool,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl LocalRegistry {
    pub fn new(control_tenant: impl Into<String>) -> Self {
        let control_tenant = control_tenant.into();
        debug!(%control_tenant, "LocalRegistry::new: called");
        let (event_tx, _) = broadcast::channel(64);
        Self {
            control_tenant,
            contexts: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
            event_tx,
        }
    }

    pub fn control_tenant(&self) -> &str {
        &self.control_tenant
    }

    /// Subscribe to context lifecycle notifications
    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    /// Release every context; later reloads fail
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let contexts: Vec<Arc<TenantContext>> = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, ctx)| ctx)
            .collect();
        for ctx in &contexts {
            ctx.release();
        }
        info!(released = contexts.len(), "LocalRegistry shut down");
        let _ = self.event_tx.send(RegistryEvent::ShutDown);
    }

    fn get(&self, name: &str) -> Option<Arc<TenantContext>> {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[async_trait]
impl RuntimeRegistry for LocalRegistry {
    async fn reload(&self, settings: TenantSettings) -> Result<Arc<TenantContext>, RegistryError> {
        debug!(name = %settings.name, state = %settings.state, "LocalRegistry::reload: called");
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(RegistryError::ShutDown);
        }
        if settings.name.is_empty() {
            return Err(RegistryError::Build {
                name: settings.name,
                message: "tenant name is empty".to_string(),
            });
        }

        let name = settings.name.clone();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let ctx = Arc::new(TenantContext::new(settings, generation));

        let previous = self
            .contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), ctx.clone());
        if let Some(previous) = previous {
            debug!(%name, previous = previous.generation(), "LocalRegistry::reload: releasing previous context");
            previous.release();
        }

        info!(%name, generation, "Tenant context reloaded");
        let _ = self.event_tx.send(RegistryEvent::Reloaded { name, generation });
        Ok(ctx)
    }

    fn try_get_settings(&self, name: &str) -> Option<TenantSettings> {
        self.get(name).map(|ctx| ctx.settings())
    }

    fn scope(&self, name: &str) -> Option<Arc<TenantContext>> {
        self.get(name)
    }

    fn control_instances(&self) -> Vec<Arc<TenantContext>> {
        self.get(&self.control_tenant).into_iter().collect()
    }

    fn tenant_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
