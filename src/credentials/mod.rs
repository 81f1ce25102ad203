//! Credential stores and the context that owns them.
//!
//! A [`SecretStore`] caches one secret string in memory in front of a
//! [`SecretStorage`] entry. [`CredentialContext`] bundles the session-token
//! store, the cipher store and the [`KeyCache`]; the gateway, the codec and
//! the bootstrap all share one context through an `Arc`.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::crypto::{DerivedKey, KeyCache, KeyDerivation, Sha256Derivation};
use crate::error::ClientError;
use crate::storage::{SecretStorage, CIPHER_KEY, TOKEN_KEY};

/// Trim surrounding whitespace; empty becomes absent.
pub fn normalize_secret(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// A single secret persisted under one storage key.
///
/// The first `get` reads storage and caches the outcome, including "absent";
/// later reads are served from memory. `set` and `clear` update storage and
/// the cache together.
pub struct SecretStore {
    key: &'static str,
    storage: Arc<dyn SecretStorage>,
    // Outer None: storage not read yet.
    cached: Mutex<Option<Option<Zeroizing<String>>>>,
}

impl SecretStore {
    pub fn new(key: &'static str, storage: Arc<dyn SecretStorage>) -> Self {
        Self {
            key,
            storage,
            cached: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn get(&self) -> Option<String> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        let value = cached.get_or_insert_with(|| {
            self.storage
                .get(self.key)
                .and_then(|raw| normalize_secret(&raw))
                .map(Zeroizing::new)
        });
        value.as_ref().map(|secret| secret.to_string())
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }

    /// Normalize and persist `value`. A blank value clears the entry.
    ///
    /// On a storage error neither the durable entry nor the cache changes.
    pub fn set(&self, value: &str) -> Result<(), ClientError> {
        let Some(normalized) = normalize_secret(value) else {
            return self.clear();
        };
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        self.storage
            .set(self.key, &normalized)
            .map_err(|source| ClientError::Storage {
                key: self.key.to_string(),
                source,
            })?;
        *cached = Some(Some(Zeroizing::new(normalized)));
        Ok(())
    }

    /// Remove the secret. The in-memory value is dropped even if the durable
    /// delete fails, so a stale secret is never served again in this process.
    pub fn clear(&self) -> Result<(), ClientError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *cached = Some(None);
        self.storage
            .delete(self.key)
            .map_err(|source| ClientError::Storage {
                key: self.key.to_string(),
                source,
            })
    }
}

/// Explicitly constructed credential state: token, cipher and derived key.
pub struct CredentialContext {
    token: SecretStore,
    cipher: SecretStore,
    keys: KeyCache,
}

impl CredentialContext {
    pub fn new(storage: Arc<dyn SecretStorage>) -> Self {
        Self::with_key_derivation(storage, Arc::new(Sha256Derivation))
    }

    pub fn with_key_derivation(
        storage: Arc<dyn SecretStorage>,
        derivation: Arc<dyn KeyDerivation>,
    ) -> Self {
        Self {
            token: SecretStore::new(TOKEN_KEY, Arc::clone(&storage)),
            cipher: SecretStore::new(CIPHER_KEY, storage),
            keys: KeyCache::new(derivation),
        }
    }

    pub fn session_token(&self) -> Option<String> {
        self.token.get()
    }

    pub fn set_session_token(&self, token: &str) -> Result<(), ClientError> {
        self.token.set(token)
    }

    pub fn clear_session_token(&self) -> Result<(), ClientError> {
        self.token.clear()
    }

    pub fn cipher(&self) -> Option<String> {
        self.cipher.get()
    }

    pub fn set_cipher(&self, cipher: &str) -> Result<(), ClientError> {
        self.keys.invalidate();
        self.cipher.set(cipher)
    }

    pub fn clear_cipher(&self) -> Result<(), ClientError> {
        self.keys.invalidate();
        self.cipher.clear()
    }

    /// Key derived from the current cipher, or `None` when no cipher is set.
    pub fn derived_key(&self) -> Result<Option<Arc<DerivedKey>>, ClientError> {
        let cipher = self.cipher.get().map(Zeroizing::new);
        self.keys.get(cipher.as_ref().map(|c| c.as_str()))
    }

    pub fn key_cache(&self) -> &KeyCache {
        &self.keys
    }

    /// Clear token and cipher and drop the derived key.
    ///
    /// Every step runs even if an earlier one fails; the first storage error
    /// is returned after all in-memory state is already cleared.
    pub fn teardown(&self) -> Result<(), ClientError> {
        let token = self.token.clear();
        let cipher = self.cipher.clear();
        self.keys.invalidate();
        info!("credentials cleared");

        for result in [&token, &cipher] {
            if let Err(e) = result {
                warn!(error = %e, "durable credential entry could not be removed");
            }
        }
        token.and(cipher)
    }
}
