//! Live execution context of one tenant

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::bus::Subscription;
use crate::domain::{TenantSettings, TenantState};

/// One built instance of a tenant
///
/// Holds the in-memory copy of the settings and the channel subscriptions made on behalf
/// of this instance. Subscriptions are keyed by channel; attaching a second subscription
/// for the same channel replaces (and thereby cancels) the first.
pub struct TenantContext {
    id: Uuid,
    generation: u64,
    settings: RwLock<TenantSettings>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    released: AtomicBool,
}

impl TenantContext {
    pub(crate) fn new(settings: TenantSettings, generation: u64) -> Self {
        let id = Uuid::now_v7();
        debug!(%id, name = %settings.name, generation, "TenantContext::new: called");
        Self {
            id,
            generation,
            settings: RwLock::new(settings),
            subscriptions: Mutex::new(HashMap::new()),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Registry-wide build counter value; a reload always yields a larger one
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    pub fn settings(&self) -> TenantSettings {
        self.read().clone()
    }

    pub fn state(&self) -> TenantState {
        self.read().state
    }

    /// Mutate the in-memory settings; persisted storage is not touched
    pub fn update_settings(&self, f: impl FnOnce(&mut TenantSettings)) {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut settings);
        debug!(name = %settings.name, state = %settings.state, "TenantContext::update_settings: applied");
    }

    /// Hand a subscription to this context
    ///
    /// Returns `false` (and cancels the subscription) if the context was already released.
    pub fn attach(&self, subscription: Subscription) -> bool {
        let channel = subscription.channel().to_string();
        let mut subscriptions = self.subscriptions();
        // Checked under the lock so a concurrent release cannot miss this subscription
        if self.is_released() {
            drop(subscriptions);
            debug!(id = %self.id, %channel, "TenantContext::attach: context released, dropping subscription");
            return false;
        }
        let previous = subscriptions.insert(channel.clone(), subscription);
        drop(subscriptions);
        debug!(id = %self.id, %channel, replaced = previous.is_some(), "TenantContext::attach: attached");
        true
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions().contains_key(channel)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions().len()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Tear the context down: cancel every owned subscription
    pub(crate) fn release(&self) {
        let dropped: Vec<Subscription> = {
            let mut subscriptions = self.subscriptions();
            if self.released.swap(true, Ordering::SeqCst) {
                return;
            }
            subscriptions.drain().map(|(_, s)| s).collect()
        };
        debug!(id = %self.id, generation = self.generation, subscriptions = dropped.len(), "TenantContext::release: called");
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TenantSettings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<String, Subscription>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TenantContext {
    fn drop(&mut self) {
        self.release();
    }
}
