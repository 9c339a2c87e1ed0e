//! Secret storage seam.
//!
//! The embedding application decides where secrets live (platform
//! keychain, encrypted file). Core only needs to read the sync access
//! token when checking the authenticated precondition.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::{Error, Result};

/// Key under which the sync access token is stored.
pub const SYNC_ACCESS_TOKEN_KEY: &str = "sync_access_token";

/// Abstraction over secret storage.
pub trait SecretStore: Send + Sync {
    fn get_secret(&self, key: &str) -> Result<Option<String>>;
    fn set_secret(&self, key: &str, value: &str) -> Result<()>;
    fn delete_secret(&self, key: &str) -> Result<()>;
}

/// In-memory secret store for tests and embedders without a keychain.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>> {
        let secrets = self
            .secrets
            .read()
            .map_err(|e| Error::SecretStore(e.to_string()))?;
        Ok(secrets.get(key).cloned())
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<()> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|e| Error::SecretStore(e.to_string()))?;
        secrets.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_secret(&self, key: &str) -> Result<()> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|e| Error::SecretStore(e.to_string()))?;
        secrets.remove(key);
        Ok(())
    }
}
