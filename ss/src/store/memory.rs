//! Map-backed settings store

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{StateStore, StoreError};
use crate::domain::TenantSettings;

#[derive(Default)]
pub struct MemoryStore {
    settings: RwLock<HashMap<String, TenantSettings>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail until reset
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.settings.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn try_load(&self, name: &str) -> Result<Option<TenantSettings>, StoreError> {
        debug!(%name, "MemoryStore::try_load: called");
        Ok(self.settings.read().await.get(name).cloned())
    }

    async fn save(&self, settings: &TenantSettings) -> Result<(), StoreError> {
        debug!(name = %settings.name, state = %settings.state, "MemoryStore::save: called");
        if self.fail_saves.load(Ordering::SeqCst) {
            warn!(name = %settings.name, "MemoryStore::save: injected failure");
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        self.settings
            .write()
            .await
            .insert(settings.name.clone(), settings.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TenantState;

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        assert!(store.try_load("alpha").await.unwrap().is_none());

        let settings = TenantSettings::new("alpha").with_state(TenantState::Running);
        store.save(&settings).await.unwrap();

        assert_eq!(store.try_load("alpha").await.unwrap(), Some(settings));
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.names().await, vec!["alpha".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_save_failure_keeps_previous_copy() {
        let store = MemoryStore::new();
        let v1 = TenantSettings::new("alpha").with_value("v", 1);
        store.save(&v1).await.unwrap();

        store.set_fail_saves(true);
        let v2 = v1.clone().with_value("v", 2);
        assert!(matches!(store.save(&v2).await, Err(StoreError::Unavailable(_))));
        assert_eq!(store.try_load("alpha").await.unwrap(), Some(v1));
    }
}
