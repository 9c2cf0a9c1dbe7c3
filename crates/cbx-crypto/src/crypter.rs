//! One-shot helpers over the streaming engines
//!
//! `Encrypter` and `Decrypter` build a fresh engine per message, so a single
//! instance can be shared across threads. `decrypt` always uses the buffered
//! engine: plaintext is only handed out after the trailer verified.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::cipher::{Cipher, CipherError};
use crate::decrypt::DecryptEngine;
use crate::encrypt::{EncryptEngine, EncryptParameters};
use crate::key::Key;
use crate::random::RandomSource;
use crate::result::{CipherResult, ResultKind};
use crate::IV_SIZE;

#[derive(Clone)]
pub struct Encrypter {
    random: Arc<dyn RandomSource>,
}

impl Encrypter {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// Encrypt `data` under a fresh random IV.
    pub fn encrypt(&self, key: &Arc<Key>, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.run(EncryptParameters::new(Arc::clone(key)), data)
    }

    pub fn encrypt_with_iv(
        &self,
        key: &Arc<Key>,
        iv: [u8; IV_SIZE],
        data: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        self.run(EncryptParameters::with_iv(Arc::clone(key), iv), data)
    }

    /// Encrypt and encode as unpadded base64url.
    pub fn encrypt_to_string(&self, key: &Arc<Key>, data: &[u8]) -> Result<String, CipherError> {
        self.encrypt(key, data).map(|bytes| URL_SAFE_NO_PAD.encode(bytes))
    }

    fn run(&self, parameters: EncryptParameters, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut engine = EncryptEngine::new(Arc::clone(&self.random));
        engine.initialize(parameters)?;
        let mut out = vec![0u8; engine.final_output_size(data.len())];
        let written = engine.finalize(data, &mut out)?;
        out.truncate(written);
        Ok(out)
    }
}

impl std::fmt::Debug for Encrypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encrypter").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Decrypter;

impl Decrypter {
    pub fn new() -> Self {
        Self
    }

    /// Verify and decrypt a whole message. On success the result carries the plaintext.
    pub fn decrypt(&self, key: &Arc<Key>, data: &[u8]) -> Result<CipherResult, CipherError> {
        let mut engine = DecryptEngine::buffered();
        engine.initialize(Arc::clone(key))?;
        engine.finalize(data, &mut [])?;
        engine.result().cloned().ok_or(CipherError::NotInitialized)
    }

    /// Decode unpadded base64url, then [`Decrypter::decrypt`].
    pub fn decrypt_str(&self, key: &Arc<Key>, text: &str) -> Result<CipherResult, CipherError> {
        match URL_SAFE_NO_PAD.decode(text.trim()) {
            Ok(bytes) => self.decrypt(key, &bytes),
            Err(_) => {
                tracing::warn!("ciphertext is not valid base64url");
                Ok(CipherResult::failure(ResultKind::InvalidEncoding))
            }
        }
    }
}

/// An encrypter and decrypter bound to one key.
#[derive(Debug, Clone)]
pub struct BoundCrypter {
    key: Arc<Key>,
    encrypter: Encrypter,
    decrypter: Decrypter,
}

impl BoundCrypter {
    pub fn new(key: Arc<Key>, random: Arc<dyn RandomSource>) -> Self {
        Self {
            key,
            encrypter: Encrypter::new(random),
            decrypter: Decrypter::new(),
        }
    }

    pub fn key(&self) -> &Arc<Key> {
        &self.key
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.encrypter.encrypt(&self.key, data)
    }

    pub fn encrypt_to_string(&self, data: &[u8]) -> Result<String, CipherError> {
        self.encrypter.encrypt_to_string(&self.key, data)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<CipherResult, CipherError> {
        self.decrypter.decrypt(&self.key, data)
    }

    pub fn decrypt_str(&self, text: &str) -> Result<CipherResult, CipherError> {
        self.decrypter.decrypt_str(&self.key, text)
    }
}
