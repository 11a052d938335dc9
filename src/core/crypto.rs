//! At-rest encryption for the credential blob.

use anyhow::{Result, anyhow};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use std::fs;

const NONCE_LEN: usize = 12;
const KEY_INFO: &[u8] = b"xbal credentials v1";

/// Symmetric seal/open over opaque bytes.
pub trait Cipher: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>>;
}

/// A stable, environment-bound value the encryption key is derived from.
pub trait HostIdentity: Send + Sync {
    fn host_id(&self) -> String;
}

/// Reads `XBAL_HOST_ID`, then `/etc/machine-id`, then the host name.
pub struct SystemHostIdentity;

impl HostIdentity for SystemHostIdentity {
    fn host_id(&self) -> String {
        if let Ok(id) = std::env::var("XBAL_HOST_ID") {
            if !id.trim().is_empty() {
                return id.trim().to_string();
            }
        }
        if let Ok(id) = fs::read_to_string("/etc/machine-id") {
            if !id.trim().is_empty() {
                return id.trim().to_string();
            }
        }
        ["HOSTNAME", "COMPUTERNAME"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| "localhost".to_string())
    }
}

/// A fixed identifier, for tests and explicit deployments.
pub struct FixedHostIdentity(pub String);

impl HostIdentity for FixedHostIdentity {
    fn host_id(&self) -> String {
        self.0.clone()
    }
}

/// ChaCha20-Poly1305 with an HKDF-SHA256 key. Sealed layout is `nonce || ciphertext`.
pub struct ChaChaCipher {
    key: [u8; 32],
}

impl ChaChaCipher {
    pub fn from_host(identity: &dyn HostIdentity) -> Self {
        let host_id = identity.host_id();
        let hk = Hkdf::<Sha256>::new(None, host_id.as_bytes());
        let mut key = [0u8; 32];
        hk.expand(KEY_INFO, &mut key)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        Self { key }
    }
}

impl Cipher for ChaChaCipher {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| anyhow!("Failed to encrypt credentials"))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() <= NONCE_LEN {
            return Err(anyhow!("Encrypted credentials are truncated"));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow!("Failed to decrypt credentials"))
    }
}
