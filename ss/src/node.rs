//! Host harness wiring one process: store, runtime registry and coordinator

use std::sync::Arc;

use eyre::{Context, Result};
use tracing::{debug, info};

use crate::bus::BusRegistry;
use crate::deferred::UnitOfWork;
use crate::domain::{TenantSettings, TenantState};
use crate::registry::{LocalRegistry, RegistryError, RuntimeRegistry};
use crate::store::StateStore;
use crate::sync::{Origin, PublishOutcome, ShellSync, SyncConfig};

/// One hosting process
///
/// Local changes go through a [`UnitOfWork`] so the coordinator's reload publish runs
/// after the change has been persisted, the way a request pipeline would drive it.
pub struct Node {
    id: String,
    store: Arc<dyn StateStore>,
    registry: Arc<LocalRegistry>,
    sync: ShellSync,
}

impl Node {
    pub fn new(id: impl Into<String>, config: &SyncConfig, buses: &BusRegistry, store: Arc<dyn StateStore>) -> Self {
        let id = id.into();
        debug!(%id, "Node::new: called");
        let registry = Arc::new(LocalRegistry::new(config.control_tenant.clone()));
        let sync = ShellSync::new(config.clone(), buses, store.clone(), registry.clone());
        Self {
            id,
            store,
            registry,
            sync,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sync(&self) -> &ShellSync {
        &self.sync
    }

    pub fn registry(&self) -> &Arc<LocalRegistry> {
        &self.registry
    }

    /// Bring the node up: control tenant first, then the listed tenants, then subscribe
    pub async fn start(&self, tenants: &[String]) -> Result<()> {
        debug!(id = %self.id, ?tenants, "Node::start: called");
        let control = self.sync.config().control_tenant.clone();

        let settings = match self
            .store
            .try_load(&control)
            .await
            .context("Failed to load control tenant")?
        {
            Some(settings) => settings,
            None => {
                let settings = TenantSettings::new(&control).with_state(TenantState::Running);
                self.store
                    .save(&settings)
                    .await
                    .context("Failed to create control tenant")?;
                info!(id = %self.id, %control, "Created control tenant");
                settings
            }
        };
        self.registry
            .reload(settings)
            .await
            .context("Failed to start control tenant")?;

        for name in tenants.iter().filter(|name| **name != control) {
            match self
                .store
                .try_load(name)
                .await
                .context(format!("Failed to load tenant {}", name))?
            {
                Some(settings) => {
                    self.registry
                        .reload(settings)
                        .await
                        .context(format!("Failed to start tenant {}", name))?;
                }
                None => debug!(id = %self.id, %name, "Node::start: tenant not stored here yet"),
            }
        }

        self.sync.control_initialized().await;
        info!(id = %self.id, tenants = ?self.registry.tenant_names(), "Node started");
        Ok(())
    }

    /// Persist a new tenant and bring it up locally
    pub async fn create_tenant(&self, settings: TenantSettings) -> Result<PublishOutcome> {
        debug!(id = %self.id, name = %settings.name, "Node::create_tenant: called");
        self.store
            .save(&settings)
            .await
            .context(format!("Failed to save tenant {}", settings.name))?;
        self.reload_scoped("create-tenant", settings).await
    }

    /// Change a tenant's settings and reload it
    pub async fn update_tenant(&self, name: &str, f: impl FnOnce(&mut TenantSettings)) -> Result<PublishOutcome> {
        debug!(id = %self.id, %name, "Node::update_tenant: called");
        let mut settings = self.current(name).await?;
        f(&mut settings);
        self.store
            .save(&settings)
            .await
            .context(format!("Failed to save tenant {}", name))?;
        self.reload_scoped("update-tenant", settings).await
    }

    /// Run setup for a tenant, announcing it to peers first
    pub async fn setup_tenant(&self, name: &str, f: impl FnOnce(&mut TenantSettings)) -> Result<PublishOutcome> {
        debug!(id = %self.id, %name, "Node::setup_tenant: called");
        let mut settings = self.current(name).await?;

        let announced = self.sync.tenant_initializing(name).await;
        debug!(id = %self.id, %name, ?announced, "Node::setup_tenant: initialize announced");
        if let Some(ctx) = self.registry.scope(name) {
            ctx.update_settings(|s| s.state = TenantState::Initializing);
        }

        f(&mut settings);
        settings.state = TenantState::Running;
        self.store
            .save(&settings)
            .await
            .context(format!("Failed to save tenant {}", name))?;
        self.reload_scoped("setup-tenant", settings).await
    }

    /// Live settings of a tenant on this node
    pub fn settings(&self, name: &str) -> Option<TenantSettings> {
        self.registry.try_get_settings(name)
    }

    /// Persisted settings of a tenant on this node
    pub async fn stored(&self, name: &str) -> Result<Option<TenantSettings>> {
        self.store
            .try_load(name)
            .await
            .context(format!("Failed to load tenant {}", name))
    }

    pub fn shutdown(&self) {
        info!(id = %self.id, "Node shutting down");
        self.registry.shutdown();
    }

    async fn current(&self, name: &str) -> Result<TenantSettings> {
        if let Some(settings) = self.stored(name).await? {
            return Ok(settings);
        }
        self.registry
            .try_get_settings(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
            .context(format!("Tenant {} is unknown on node {}", name, self.id))
    }

    async fn reload_scoped(&self, label: &str, settings: TenantSettings) -> Result<PublishOutcome> {
        let name = settings.name.clone();
        let uow = UnitOfWork::new(format!("{}:{}", label, name));
        self.registry
            .reload(settings)
            .await
            .context(format!("Failed to reload tenant {}", name))?;
        let outcome = self.sync.tenant_reloaded(&name, Origin::Scoped(&uow));
        let ran = uow.complete().await;
        debug!(id = %self.id, %name, ?outcome, ran, "Node::reload_scoped: done");
        Ok(outcome)
    }
}
