//! Application settings.
//!
//! Settings are stored as namespaced string keys mapping to
//! JSON-serialized values, so a value survives exactly as the client
//! wrote it. Typed accessors live on the service; the repository only
//! moves strings.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;

use crate::errors::Result;

/// Whether the user has enabled cloud sync. JSON boolean.
pub const SETTING_SYNC_ENABLED: &str = "sync.enabled";

/// Storage seam for settings.
#[async_trait]
pub trait SettingsRepositoryTrait: Send + Sync {
    fn get_setting(&self, setting_key: &str) -> Result<Option<String>>;
    async fn set_setting(&self, setting_key: &str, setting_value: &str) -> Result<()>;
}

#[async_trait]
pub trait SettingsServiceTrait: Send + Sync {
    fn is_sync_enabled(&self) -> Result<bool>;
    async fn set_sync_enabled(&self, enabled: bool) -> Result<()>;
}

#[derive(Clone)]
pub struct SettingsService {
    repository: Arc<dyn SettingsRepositoryTrait>,
}

impl SettingsService {
    pub fn new(repository: Arc<dyn SettingsRepositoryTrait>) -> Self {
        SettingsService { repository }
    }

    fn read_bool(&self, setting_key: &str, default: bool) -> Result<bool> {
        let Some(raw) = self.repository.get_setting(setting_key)? else {
            return Ok(default);
        };
        match serde_json::from_str::<bool>(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("Ignoring malformed setting {}: {}", setting_key, e);
                Ok(default)
            }
        }
    }
}

#[async_trait]
impl SettingsServiceTrait for SettingsService {
    fn is_sync_enabled(&self) -> Result<bool> {
        self.read_bool(SETTING_SYNC_ENABLED, false)
    }

    async fn set_sync_enabled(&self, enabled: bool) -> Result<()> {
        let encoded = serde_json::to_string(&enabled)?;
        self.repository
            .set_setting(SETTING_SYNC_ENABLED, &encoded)
            .await
    }
}
