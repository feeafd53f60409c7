//! The synchronization coordinator

use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use super::config::SyncConfig;
use super::metrics::{Counters, SyncMetrics, bump};
use super::outcome::{Origin, PersistResult, PublishOutcome, ReceiveOutcome, ReloadReport, Suppression};
use super::state::{SubscriptionPhase, SubscriptionState};
use crate::bus::{BusError, BusRegistry, MessageBus, MessageHandler};
use crate::codec::{self, ParseResult, PayloadError};
use crate::domain::{EventKind, ShellEvent, TenantSettings, TenantState};
use crate::registry::RuntimeRegistry;
use crate::store::StateStore;

struct Inner {
    config: SyncConfig,
    /// Resolved once at construction
    bus: Option<Arc<dyn MessageBus>>,
    store: Arc<dyn StateStore>,
    registry: Arc<dyn RuntimeRegistry>,
    subscription: Arc<SubscriptionState>,
    counters: Counters,
}

/// Keeps this process's tenants in step with the fleet over a pub/sub channel
///
/// Cheap to clone; every clone drives the same coordinator. The subscription handler
/// only holds a weak reference, so dropping the last clone makes pending deliveries
/// no-ops.
#[derive(Clone)]
pub struct ShellSync {
    inner: Arc<Inner>,
}

impl ShellSync {
    /// Create a coordinator with its own subscription state
    pub fn new(
        config: SyncConfig,
        buses: &BusRegistry,
        store: Arc<dyn StateStore>,
        registry: Arc<dyn RuntimeRegistry>,
    ) -> Self {
        Self::with_state(config, buses, store, registry, Arc::new(SubscriptionState::new()))
    }

    /// Create a coordinator sharing an existing subscription state
    pub fn with_state(
        config: SyncConfig,
        buses: &BusRegistry,
        store: Arc<dyn StateStore>,
        registry: Arc<dyn RuntimeRegistry>,
        subscription: Arc<SubscriptionState>,
    ) -> Self {
        let bus = buses.select(&config.bus);
        match &bus {
            Some(bus) => info!(bus = bus.name(), channel = %config.channel, "Shell sync bound to message bus"),
            None => info!(registered = buses.len(), "No message bus configured, shell sync is local-only"),
        }

        Self {
            inner: Arc::new(Inner {
                config,
                bus,
                store,
                registry,
                subscription,
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn has_bus(&self) -> bool {
        self.inner.bus.is_some()
    }

    pub fn bus_name(&self) -> Option<&str> {
        self.inner.bus.as_deref().map(|b| b.name())
    }

    pub fn subscription_phase(&self) -> SubscriptionPhase {
        self.inner.subscription.phase()
    }

    pub fn metrics(&self) -> SyncMetrics {
        self.inner.counters.snapshot()
    }

    // === Subscription ===

    /// The control tenant finished initializing: subscribe to the channel once
    ///
    /// Returns `true` for the call that ran the subscribe cycle. Without a bus this is a
    /// no-op and the subscription state is left untouched.
    pub async fn control_initialized(&self) -> bool {
        debug!(phase = ?self.subscription_phase(), "control_initialized: called");
        let Some(bus) = self.inner.bus.clone() else {
            debug!("control_initialized: no bus, nothing to subscribe");
            return false;
        };

        match self.inner.subscription.run_once(|| self.subscribe_with_retry(&bus)).await {
            Some(Ok(count)) => {
                info!(count, channel = %self.inner.config.channel, "Subscribed to tenant lifecycle channel");
                true
            }
            Some(Err(e)) => {
                warn!(error = %e, "Subscribe failed, this process will not receive tenant events");
                true
            }
            None => {
                debug!("control_initialized: already subscribed");
                false
            }
        }
    }

    async fn subscribe_with_retry(&self, bus: &Arc<dyn MessageBus>) -> Result<usize, BusError> {
        let attempts = self.inner.config.subscribe_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.subscribe_control_instances(bus).await {
                Ok(count) => return Ok(count),
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "Subscribe attempt failed, retrying");
                    tokio::time::sleep(self.inner.config.subscribe_retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Subscribe on every running control context; each context owns its subscription
    async fn subscribe_control_instances(&self, bus: &Arc<dyn MessageBus>) -> Result<usize, BusError> {
        let instances = self.inner.registry.control_instances();
        debug!(instances = instances.len(), "subscribe_control_instances: called");
        if instances.is_empty() {
            warn!(control = %self.inner.config.control_tenant, "No running control tenant to subscribe through");
        }

        let mut subscribed = 0;
        for ctx in instances {
            let subscription = match bus.subscribe(&self.inner.config.channel, self.message_handler()).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    bump(&self.inner.counters.subscribe_failures);
                    return Err(e);
                }
            };
            if ctx.attach(subscription) {
                subscribed += 1;
            }
        }
        Ok(subscribed)
    }

    /// Re-run the subscribe step on every control context, bypassing the one-shot state
    async fn resubscribe(&self) -> usize {
        let Some(bus) = self.inner.bus.clone() else {
            return 0;
        };
        match self.subscribe_control_instances(&bus).await {
            Ok(count) => {
                self.inner
                    .counters
                    .resubscribes
                    .fetch_add(count as u64, Ordering::Relaxed);
                info!(count, "Re-subscribed control tenant to lifecycle channel");
                count
            }
            Err(e) => {
                warn!(error = %e, "Re-subscribe failed, this process will not receive tenant events");
                0
            }
        }
    }

    fn message_handler(&self) -> MessageHandler {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |channel: String, message: String| -> BoxFuture<'static, ()> {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    let outcome = ShellSync { inner }.handle_message(&channel, &message).await;
                    debug!(?outcome, "message handler: done");
                }
            })
        })
    }

    // === Receive path ===

    /// Apply one raw channel message to this process
    ///
    /// Safe to call any number of times for the same message. Waits for the registry
    /// reload before returning.
    pub async fn handle_message(&self, channel: &str, raw: &str) -> ReceiveOutcome {
        debug!(%channel, len = raw.len(), "handle_message: called");
        let counters = &self.inner.counters;
        bump(&counters.messages_received);

        let (event, payload_error) = match codec::decode(raw) {
            ParseResult::Event(event) => (event, None),
            ParseResult::Degraded { event, error } => {
                warn!(tenant = %event.tenant, %error, "Unusable snapshot in reload event, using local settings");
                bump(&counters.payloads_degraded);
                (event, Some(error))
            }
            ParseResult::Ignored(reason) => {
                debug!(?reason, "handle_message: ignoring message");
                bump(&counters.messages_ignored);
                return ReceiveOutcome::Ignored(reason);
            }
        };

        let local = match self.inner.store.try_load(&event.tenant).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(tenant = %event.tenant, error = %e, "Failed to load persisted settings");
                None
            }
        };

        match event.kind {
            EventKind::Reload => self.apply_reload(event, local, payload_error).await,
            EventKind::Initialize => self.apply_initialize(&event.tenant, local),
        }
    }

    async fn apply_reload(
        &self,
        event: ShellEvent,
        local: Option<TenantSettings>,
        payload_error: Option<PayloadError>,
    ) -> ReceiveOutcome {
        let counters = &self.inner.counters;
        let tenant = event.tenant;
        let mut adopted = false;
        let mut persist = None;

        let resolved = match event.payload {
            Some(remote) if local.as_ref() != Some(&remote) => {
                debug!(%tenant, had_local = local.is_some(), "apply_reload: adopting peer snapshot");
                bump(&counters.snapshots_adopted);
                adopted = true;
                persist = Some(self.persist(&remote).await);
                Some(remote)
            }
            _ => local,
        };

        let Some(settings) = resolved else {
            debug!(%tenant, "apply_reload: no settings to reload from");
            return ReceiveOutcome::Unresolved { tenant };
        };

        let generation = match self.inner.registry.reload(settings).await {
            Ok(ctx) => ctx.generation(),
            Err(e) => {
                warn!(%tenant, error = %e, "Failed to reload tenant for channel event");
                bump(&counters.reload_failures);
                return ReceiveOutcome::ReloadFailed {
                    tenant,
                    error: e.to_string(),
                };
            }
        };
        bump(&counters.reloads_applied);
        info!(%tenant, generation, adopted, "Reloaded tenant for channel event");

        // The rebuilt control context does not carry the subscription the old one owned
        let resubscribed = if self.inner.config.is_control(&tenant) {
            self.resubscribe().await
        } else {
            0
        };

        ReceiveOutcome::Reloaded(ReloadReport {
            tenant,
            adopted,
            persist,
            payload_error,
            resubscribed,
            generation,
        })
    }

    async fn persist(&self, settings: &TenantSettings) -> PersistResult {
        match self.inner.store.save(settings).await {
            Ok(()) => PersistResult::Saved,
            Err(e) => {
                warn!(tenant = %settings.name, error = %e, "Failed to persist peer snapshot, reloading from it anyway");
                bump(&self.inner.counters.persist_failures);
                PersistResult::Failed(e.to_string())
            }
        }
    }

    fn apply_initialize(&self, tenant: &str, local: Option<TenantSettings>) -> ReceiveOutcome {
        if local.is_none() {
            debug!(%tenant, "apply_initialize: tenant unknown to local storage");
            return ReceiveOutcome::Unresolved {
                tenant: tenant.to_string(),
            };
        }
        let Some(ctx) = self.inner.registry.scope(tenant) else {
            debug!(%tenant, "apply_initialize: tenant not loaded here");
            return ReceiveOutcome::NotLoaded {
                tenant: tenant.to_string(),
            };
        };

        ctx.update_settings(|s| s.state = TenantState::Initializing);
        bump(&self.inner.counters.marked_initializing);
        info!(%tenant, "Tenant marked initializing by peer");
        ReceiveOutcome::MarkedInitializing {
            tenant: tenant.to_string(),
        }
    }

    // === Publish path ===

    /// A node is about to run setup for `tenant`
    pub async fn tenant_initializing(&self, tenant: &str) -> PublishOutcome {
        debug!(%tenant, "tenant_initializing: called");
        let Some(bus) = self.inner.bus.clone() else {
            return self.suppressed(tenant, Suppression::NoBus);
        };
        self.publish(&bus, &ShellEvent::initialize(tenant)).await
    }

    /// `tenant` was reloaded locally
    ///
    /// Queues a snapshot publish on the origin's unit of work unless the reload came from
    /// a channel message or a peer is still setting the tenant up.
    pub fn tenant_reloaded(&self, tenant: &str, origin: Origin<'_>) -> PublishOutcome {
        debug!(%tenant, ?origin, "tenant_reloaded: called");
        let is_control = self.inner.config.is_control(tenant);
        if self.inner.bus.is_none() && !is_control {
            return self.suppressed(tenant, Suppression::NoBus);
        }

        let Origin::Scoped(scheduler) = origin else {
            return self.suppressed(tenant, Suppression::InternalOrigin);
        };

        if self
            .inner
            .registry
            .try_get_settings(tenant)
            .is_some_and(|s| s.is_initializing())
        {
            return self.suppressed(tenant, Suppression::Initializing);
        }

        let sync = self.clone();
        let name = tenant.to_string();
        scheduler.schedule(
            self.inner.config.publish_order,
            Box::pin(async move {
                let outcome = sync.publish_reload(&name).await;
                debug!(tenant = %name, ?outcome, "deferred reload publish: done");
            }),
        );
        debug!(%tenant, order = self.inner.config.publish_order, "tenant_reloaded: publish deferred");
        PublishOutcome::Deferred
    }

    async fn publish_reload(&self, tenant: &str) -> PublishOutcome {
        let control = &self.inner.config.control_tenant;
        // Events always go out through the control tenant's scope
        let Some(_control_scope) = self.inner.registry.scope(control) else {
            warn!(%tenant, %control, "Control tenant not running, cannot publish reload");
            return self.suppressed(tenant, Suppression::ControlUnavailable);
        };

        if self.inner.config.is_control(tenant) {
            self.resubscribe().await;
        }

        let Some(bus) = self.inner.bus.clone() else {
            return self.suppressed(tenant, Suppression::NoBus);
        };
        let Some(settings) = self.inner.registry.try_get_settings(tenant) else {
            warn!(%tenant, "Tenant vanished before its reload could be published");
            return self.suppressed(tenant, Suppression::UnknownTenant);
        };

        self.publish(&bus, &ShellEvent::reload_with(settings)).await
    }

    async fn publish(&self, bus: &Arc<dyn MessageBus>, event: &ShellEvent) -> PublishOutcome {
        let counters = &self.inner.counters;
        let raw = match codec::encode(event) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(tenant = %event.tenant, error = %e, "Cannot encode tenant event");
                bump(&counters.publish_failures);
                return PublishOutcome::Failed(e.to_string());
            }
        };

        match bus.publish(&self.inner.config.channel, &raw).await {
            Ok(()) => {
                bump(&counters.messages_published);
                debug!(tenant = %event.tenant, kind = %event.kind, "publish: sent");
                PublishOutcome::Published
            }
            Err(e) => {
                warn!(tenant = %event.tenant, kind = %event.kind, error = %e, "Publish failed, change stays local");
                bump(&counters.publish_failures);
                PublishOutcome::Failed(e.to_string())
            }
        }
    }

    fn suppressed(&self, tenant: &str, reason: Suppression) -> PublishOutcome {
        debug!(%tenant, ?reason, "publish suppressed");
        bump(&self.inner.counters.publishes_suppressed);
        PublishOutcome::Suppressed(reason)
    }
}
