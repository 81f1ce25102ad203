//! Crypto module: cipher-secret key derivation and the derived-key cache.
//!
//! The derived key is SHA-256 of the cipher secret's UTF-8 bytes, used as an
//! AES-256 key-wrap key (JWE `A256KW`). It is never persisted; [`KeyCache`]
//! keeps at most one derivation alive, keyed by the exact secret value.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use aes_kw::KekAes256;
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::ClientError;

/// Symmetric key-wrap key derived from a cipher secret. Zeroed on drop.
pub struct DerivedKey {
    bytes: Zeroizing<[u8; 32]>,
}

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// AES-256 key-wrap instance over this key.
    pub(crate) fn key_wrap(&self) -> KekAes256 {
        KekAes256::from(*self.bytes)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Backend that turns a cipher secret into key material.
///
/// An `Err` means the required primitive is not usable in this environment;
/// [`KeyCache`] surfaces it as [`ClientError::CryptoUnavailable`].
pub trait KeyDerivation: Send + Sync {
    fn derive(&self, secret: &str) -> anyhow::Result<DerivedKey>;
}

/// `SHA-256(utf8(secret))` used directly as the 256-bit wrap key.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Derivation;

impl KeyDerivation for Sha256Derivation {
    fn derive(&self, secret: &str) -> anyhow::Result<DerivedKey> {
        Ok(DerivedKey::from_bytes(Sha256::digest(secret.as_bytes()).into()))
    }
}

type DerivationCell = Arc<OnceLock<Result<Arc<DerivedKey>, String>>>;

struct CachedDerivation {
    secret: Zeroizing<String>,
    cell: DerivationCell,
}

/// Memoizes the derived key for the current cipher secret.
///
/// The cache stores the derivation cell itself, not only its result, so
/// callers arriving while a derivation is running wait on that one instead of
/// starting their own.
pub struct KeyCache {
    derivation: Arc<dyn KeyDerivation>,
    slot: Mutex<Option<CachedDerivation>>,
    derivations: AtomicUsize,
}

impl KeyCache {
    pub fn new(derivation: Arc<dyn KeyDerivation>) -> Self {
        Self {
            derivation,
            slot: Mutex::new(None),
            derivations: AtomicUsize::new(0),
        }
    }

    /// Key for `secret`, deriving it at most once per distinct secret value.
    ///
    /// `None` secret yields `Ok(None)`: encryption is optional.
    pub fn get(&self, secret: Option<&str>) -> Result<Option<Arc<DerivedKey>>, ClientError> {
        let Some(secret) = secret else {
            return Ok(None);
        };

        let cell = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(cached) if cached.secret.as_str() == secret => {
                    debug!("derived key served from cache");
                    Arc::clone(&cached.cell)
                }
                _ => {
                    let cell = DerivationCell::default();
                    *slot = Some(CachedDerivation {
                        secret: Zeroizing::new(secret.to_string()),
                        cell: Arc::clone(&cell),
                    });
                    cell
                }
            }
        };

        let outcome = cell.get_or_init(|| {
            self.derivations.fetch_add(1, Ordering::SeqCst);
            debug!("deriving key from cipher secret");
            self.derivation
                .derive(secret)
                .map(Arc::new)
                .map_err(|e| format!("{e:#}"))
        });

        match outcome {
            Ok(key) => Ok(Some(Arc::clone(key))),
            Err(msg) => {
                // Evict the failed cell so a later call can retry.
                let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot
                    .as_ref()
                    .is_some_and(|cached| Arc::ptr_eq(&cached.cell, &cell))
                {
                    *slot = None;
                }
                Err(ClientError::CryptoUnavailable(msg.clone()))
            }
        }
    }

    /// Drop any cached or in-flight derivation.
    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// True if a completed key is currently cached.
    pub fn has_cached_key(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|cached| cached.cell.get())
            .is_some_and(|outcome| outcome.is_ok())
    }

    /// Number of derivations performed over the cache's lifetime.
    pub fn derivation_count(&self) -> usize {
        self.derivations.load(Ordering::SeqCst)
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(Arc::new(Sha256Derivation))
    }
}
