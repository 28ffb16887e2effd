//! Credential storage for the active session and the login hand-off.
//!
//! This module provides:
//! - `KeyValueStore`: synchronous key-value backend contract
//! - `MemoryStore`: tab-scoped backend, gone when the process exits
//! - `FileStore`: profile-scoped backend persisted as JSON on disk
//! - `CredentialStore`: the pair of scopes, addressed through `StoreKey`
//!
//! Every key has exactly one scope (see `StoreKey::scope`), so a value
//! written through `CredentialStore` is always read back from the same place.

pub mod file;
pub mod keys;
pub mod memory;

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::auth::Tier;

pub use file::FileStore;
pub use keys::{Scope, StoreKey};
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write store file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode store contents: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Synchronous key-value storage backend.
///
/// Implementations have no side effects beyond their own storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove several keys. Backends that persist should do this in one write.
    fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError>;
}

/// Tab-scoped and profile-scoped storage behind a single typed interface.
/// Clone is cheap - both backends are behind `Arc`.
#[derive(Clone)]
pub struct CredentialStore {
    tab: Arc<dyn KeyValueStore>,
    profile: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(tab: Arc<dyn KeyValueStore>, profile: Arc<dyn KeyValueStore>) -> Self {
        Self { tab, profile }
    }

    /// Both scopes in memory. Nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    fn backend(&self, scope: Scope) -> &dyn KeyValueStore {
        match scope {
            Scope::Tab => self.tab.as_ref(),
            Scope::Profile => self.profile.as_ref(),
        }
    }

    /// Read a key. Empty values are treated as absent.
    pub fn get(&self, key: StoreKey) -> Option<String> {
        self.backend(key.scope())
            .get(key.name())
            .filter(|value| !value.is_empty())
    }

    pub fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        self.backend(key.scope()).set(key.name(), value)
    }

    pub fn remove(&self, key: StoreKey) -> Result<(), StoreError> {
        self.backend(key.scope()).remove(key.name())
    }

    /// Access credential for the given tier
    pub fn access_token(&self, tier: Tier) -> Option<String> {
        self.get(StoreKey::AccessToken(tier))
    }

    /// Explicitly stored refresh credential, if any
    pub fn refresh_token(&self) -> Option<String> {
        self.get(StoreKey::RefreshToken)
    }

    /// Remove every session key from the profile scope in a single write.
    pub fn clear_session(&self) -> Result<(), StoreError> {
        let names: Vec<&str> = StoreKey::SESSION.iter().map(|k| k.name()).collect();
        debug!(keys = names.len(), "Clearing session credentials");
        self.profile.remove_all(&names)
    }

    /// Remove the login/OTP hand-off keys from the tab scope.
    pub fn clear_handoff(&self) -> Result<(), StoreError> {
        let names: Vec<&str> = StoreKey::HANDOFF.iter().map(|k| k.name()).collect();
        self.tab.remove_all(&names)
    }

    /// Wipe both scopes.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.clear_session()?;
        self.tab.clear()
    }
}
