//! Exchange API credentials, held in memory and persisted as one encrypted blob.

use crate::core::crypto::Cipher;
use crate::core::exchange::{ExchangeAccount, ExchangeKind};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Storage key of the encrypted credential document.
pub const CREDENTIALS_KEY: &str = "exchange_credentials";

/// Default number of OKX account slots.
pub const DEFAULT_OKX_SLOTS: usize = 2;

/// Byte-blob persistence port.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredential {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

impl ApiCredential {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassphraseCredential {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub passphrase: String,
}

impl PassphraseCredential {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            passphrase: passphrase.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty() && !self.passphrase.is_empty()
    }
}

impl fmt::Debug for PassphraseCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassphraseCredential")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Every credential the app knows about, serialized as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    #[serde(default)]
    pub bybit: ApiCredential,
    #[serde(default)]
    pub binance: ApiCredential,
    #[serde(default)]
    pub okx: Vec<PassphraseCredential>,
}

impl CredentialSet {
    fn empty(okx_slots: usize) -> Self {
        Self {
            okx: vec![PassphraseCredential::default(); okx_slots],
            ..Default::default()
        }
    }

    /// Pads OKX slots up to `okx_slots`. Extra persisted slots are kept so a
    /// later save does not drop them.
    fn with_okx_slots(mut self, okx_slots: usize) -> Self {
        if self.okx.len() > okx_slots {
            warn!(
                "Stored credentials hold {} OKX slots, only {okx_slots} configured; keeping all",
                self.okx.len()
            );
        } else {
            self.okx.resize(okx_slots, PassphraseCredential::default());
        }
        self
    }
}

/// Argument of [`CredentialStore::set`], one variant per exchange kind.
#[derive(Debug, Clone)]
pub enum CredentialUpdate {
    Bybit(ApiCredential),
    Binance(ApiCredential),
    Okx {
        slot: usize,
        credential: PassphraseCredential,
    },
}

impl CredentialUpdate {
    pub fn kind(&self) -> ExchangeKind {
        match self {
            CredentialUpdate::Bybit(_) => ExchangeKind::Bybit,
            CredentialUpdate::Binance(_) => ExchangeKind::Binance,
            CredentialUpdate::Okx { .. } => ExchangeKind::Okx,
        }
    }

    fn validate(&self) -> Result<()> {
        let (key, secret, passphrase) = match self {
            CredentialUpdate::Bybit(c) | CredentialUpdate::Binance(c) => {
                (&c.api_key, &c.api_secret, None)
            }
            CredentialUpdate::Okx { credential, .. } => (
                &credential.api_key,
                &credential.api_secret,
                Some(&credential.passphrase),
            ),
        };
        if key.trim().is_empty() || secret.trim().is_empty() {
            bail!("{} API key and secret must not be empty", self.kind());
        }
        if passphrase.is_some_and(|p| p.trim().is_empty()) {
            bail!("{} passphrase must not be empty", self.kind());
        }
        Ok(())
    }
}

/// A credential borrowed for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Api(ApiCredential),
    Passphrase(PassphraseCredential),
}

/// Owns all exchange credentials. The only writer of the persisted blob.
pub struct CredentialStore {
    state: RwLock<CredentialSet>,
    // Serializes blob reads and writes so `load` never sees a half-written `save`.
    io_lock: Mutex<()>,
    blobs: Arc<dyn BlobStore>,
    cipher: Arc<dyn Cipher>,
    okx_slots: usize,
}

impl CredentialStore {
    /// Creates an empty store without touching persistence.
    pub fn new(blobs: Arc<dyn BlobStore>, cipher: Arc<dyn Cipher>, okx_slots: usize) -> Self {
        Self {
            state: RwLock::new(CredentialSet::empty(okx_slots)),
            io_lock: Mutex::new(()),
            blobs,
            cipher,
            okx_slots,
        }
    }

    /// Creates the store and loads any persisted credentials.
    pub fn open(blobs: Arc<dyn BlobStore>, cipher: Arc<dyn Cipher>, okx_slots: usize) -> Self {
        let store = Self::new(blobs, cipher, okx_slots);
        store.load();
        store
    }

    pub fn okx_slots(&self) -> usize {
        self.okx_slots
    }

    /// Replaces in-memory state with the persisted blob. A missing, unreadable
    /// or undecryptable blob resets to empty credentials; corrupt blobs are discarded.
    pub fn load(&self) {
        let _guard = self.io_lock.lock().unwrap_or_else(|e| e.into_inner());

        let loaded = match self.blobs.get(CREDENTIALS_KEY) {
            // The blob may be fine, so it stays in place.
            Err(e) => {
                warn!("Failed to read credential blob, starting empty: {e:#}");
                CredentialSet::empty(self.okx_slots)
            }
            Ok(None) => {
                debug!("No persisted credentials found");
                CredentialSet::empty(self.okx_slots)
            }
            Ok(Some(sealed)) => match self.decode(&sealed) {
                Ok(set) => {
                    debug!("Loaded persisted credentials");
                    set.with_okx_slots(self.okx_slots)
                }
                Err(e) => {
                    warn!("Discarding unreadable credential blob: {e:#}");
                    if let Err(e) = self.blobs.remove(CREDENTIALS_KEY) {
                        warn!("Failed to remove credential blob: {e:#}");
                    }
                    CredentialSet::empty(self.okx_slots)
                }
            },
        };

        *self.state.write().unwrap_or_else(|e| e.into_inner()) = loaded;
    }

    fn decode(&self, sealed: &[u8]) -> Result<CredentialSet> {
        let plaintext = self.cipher.open(sealed)?;
        serde_json::from_slice(&plaintext).context("Failed to parse credentials")
    }

    /// Encrypts and writes every credential, replacing the previous blob.
    pub fn save(&self) -> Result<()> {
        let _guard = self.io_lock.lock().unwrap_or_else(|e| e.into_inner());
        let set = self.snapshot();
        let plaintext = serde_json::to_vec(&set).context("Failed to serialize credentials")?;
        let sealed = self.cipher.seal(&plaintext)?;
        self.blobs
            .put(CREDENTIALS_KEY, &sealed)
            .context("Failed to persist credentials")?;
        debug!("Persisted credentials");
        Ok(())
    }

    /// Updates one credential slot and persists. An out-of-range OKX slot is
    /// ignored with a warning. If persisting fails, the in-memory change is undone.
    pub fn set(&self, update: CredentialUpdate) -> Result<()> {
        update.validate()?;
        let kind = update.kind();

        // Holds the slot's old value, so a failed save undoes only this change.
        let previous = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            match &update {
                CredentialUpdate::Bybit(c) => {
                    CredentialUpdate::Bybit(std::mem::replace(&mut state.bybit, c.clone()))
                }
                CredentialUpdate::Binance(c) => {
                    CredentialUpdate::Binance(std::mem::replace(&mut state.binance, c.clone()))
                }
                CredentialUpdate::Okx { slot, credential } => match state.okx.get_mut(*slot) {
                    Some(existing) => CredentialUpdate::Okx {
                        slot: *slot,
                        credential: std::mem::replace(existing, credential.clone()),
                    },
                    None => {
                        warn!(
                            "Ignoring OKX credentials for slot {slot}: only {} slots configured",
                            self.okx_slots
                        );
                        return Ok(());
                    }
                },
            }
        };

        if let Err(e) = self.save() {
            self.restore(&update, previous);
            return Err(e);
        }
        info!("Saved {kind} credentials");
        Ok(())
    }

    /// Puts `previous` back unless another writer already replaced `applied`.
    fn restore(&self, applied: &CredentialUpdate, previous: CredentialUpdate) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match (applied, previous) {
            (CredentialUpdate::Bybit(applied), CredentialUpdate::Bybit(previous)) => {
                if state.bybit == *applied {
                    state.bybit = previous;
                }
            }
            (CredentialUpdate::Binance(applied), CredentialUpdate::Binance(previous)) => {
                if state.binance == *applied {
                    state.binance = previous;
                }
            }
            (
                CredentialUpdate::Okx {
                    slot,
                    credential: applied,
                },
                CredentialUpdate::Okx {
                    credential: previous,
                    ..
                },
            ) => {
                if let Some(existing) = state.okx.get_mut(*slot) {
                    if existing == applied {
                        *existing = previous;
                    }
                }
            }
            _ => {}
        }
    }

    /// Forgets every credential and deletes the persisted blob.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.io_lock.lock().unwrap_or_else(|e| e.into_inner());
        *self.state.write().unwrap_or_else(|e| e.into_inner()) =
            CredentialSet::empty(self.okx_slots);
        self.blobs
            .remove(CREDENTIALS_KEY)
            .context("Failed to delete persisted credentials")?;
        info!("Cleared all credentials");
        Ok(())
    }

    pub fn snapshot(&self) -> CredentialSet {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The complete credential for an account, if one is set.
    pub fn credential(&self, account: &ExchangeAccount) -> Option<Credential> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match account {
            ExchangeAccount::Bybit => Some(&state.bybit)
                .filter(|c| c.is_complete())
                .cloned()
                .map(Credential::Api),
            ExchangeAccount::Binance => Some(&state.binance)
                .filter(|c| c.is_complete())
                .cloned()
                .map(Credential::Api),
            ExchangeAccount::Okx { slot } => state
                .okx
                .get(*slot)
                .filter(|c| c.is_complete())
                .cloned()
                .map(Credential::Passphrase),
        }
    }
}
