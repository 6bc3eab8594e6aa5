//! Authenticated-encryption decorator over any [`BlobStore`].
//!
//! Wire format per blob: the stored name gains a `.nacl` suffix, the body
//! is a 24-byte random nonce followed by the XSalsa20-Poly1305 ciphertext.
//! Decrypt-verify failure surfaces as [`StoreError::Integrity`].

use crypto_secretbox::aead::{Aead, AeadCore, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use rand::rngs::OsRng;

use crate::{BlobStore, StoreError};

/// Length of the secretbox nonce prefix.
pub const NONCE_LEN: usize = 24;

/// Suffix appended to every blob name in the underlying store.
pub const BLOB_SUFFIX: &str = ".nacl";

/// Encrypting decorator around another blob store.
pub struct SecretboxStore<S> {
    inner: S,
    cipher: XSalsa20Poly1305,
}

impl<S: BlobStore> SecretboxStore<S> {
    /// Wrap `inner`, encrypting with the given 32-byte secret key.
    pub fn new(inner: S, key: [u8; 32]) -> Self {
        let cipher = XSalsa20Poly1305::new(Key::from_slice(&key));
        Self { inner, cipher }
    }

    /// The wrapped store.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn stored_name(name: &str) -> String {
        format!("{name}{BLOB_SUFFIX}")
    }
}

impl<S: BlobStore> BlobStore for SecretboxStore<S> {
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let data = self.inner.read(&Self::stored_name(name))?;
        if data.len() < NONCE_LEN {
            return Err(StoreError::Integrity(format!(
                "encrypted blob {name} is too short ({} bytes)",
                data.len()
            )));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                tracing::error!(blob = name, "authentication failed for encrypted blob");
                StoreError::Integrity(format!("authentication failed for blob {name}"))
            })
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let nonce = XSalsa20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, data)
            .map_err(|_| StoreError::Integrity(format!("failed to encrypt blob {name}")))?;

        let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        body.extend_from_slice(nonce.as_slice());
        body.extend_from_slice(&ciphertext);
        self.inner.write(&Self::stored_name(name), &body)
    }
}
