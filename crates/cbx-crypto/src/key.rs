//! Symmetric key value: encryption secret + authentication secret
//!
//! Key document format (JSON, secrets base64url without padding):
//! ```text
//! {"type":"cbx-key","version":1,"name":...,"description":...,
//!  "encryptionSecret":"...","authenticationSecret":"..."}
//! ```

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::random::RandomSource;

/// Valid encryption secret sizes in bytes (AES-128/192/256).
pub const ENCRYPTION_SECRET_SIZES: [usize; 3] = [16, 24, 32];

/// Valid authentication secret sizes in bytes (HMAC-SHA-224/256/384/512).
pub const AUTHENTICATION_SECRET_SIZES: [usize; 4] = [28, 32, 48, 64];

const KEY_DOCUMENT_TYPE: &str = "cbx-key";
const KEY_DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid encryption secret size: {0} bits (expected 128, 192 or 256)")]
    InvalidEncryptionSecretSize(usize),

    #[error("invalid authentication secret size: {0} bits (expected 224, 256, 384 or 512)")]
    InvalidAuthenticationSecretSize(usize),

    #[error("invalid key document: {0}")]
    InvalidDocument(String),

    #[error("unsupported key document type {0:?}")]
    UnsupportedType(String),

    #[error("unsupported key document version {0}")]
    UnsupportedVersion(u32),
}

/// An immutable symmetric key. Secrets are zeroized on drop.
///
/// A single `Key` may back any number of engines; wrap it in an `Arc` to share it.
#[derive(Clone)]
pub struct Key {
    encryption_secret: Vec<u8>,
    authentication_secret: Vec<u8>,
    name: Option<String>,
    description: Option<String>,
}

impl Key {
    pub fn new(
        encryption_secret: Vec<u8>,
        authentication_secret: Vec<u8>,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Self, KeyError> {
        // Wrap immediately so rejected secrets are still wiped.
        let encryption_secret = Zeroizing::new(encryption_secret);
        let authentication_secret = Zeroizing::new(authentication_secret);

        if !ENCRYPTION_SECRET_SIZES.contains(&encryption_secret.len()) {
            return Err(KeyError::InvalidEncryptionSecretSize(
                encryption_secret.len() * 8,
            ));
        }
        if !AUTHENTICATION_SECRET_SIZES.contains(&authentication_secret.len()) {
            return Err(KeyError::InvalidAuthenticationSecretSize(
                authentication_secret.len() * 8,
            ));
        }

        Ok(Self {
            encryption_secret: encryption_secret.to_vec(),
            authentication_secret: authentication_secret.to_vec(),
            name,
            description,
        })
    }

    pub fn encryption_secret(&self) -> &[u8] {
        &self.encryption_secret
    }

    pub fn authentication_secret(&self) -> &[u8] {
        &self.authentication_secret
    }

    pub fn encryption_secret_bits(&self) -> usize {
        self.encryption_secret.len() * 8
    }

    pub fn authentication_secret_bits(&self) -> usize {
        self.authentication_secret.len() * 8
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Serialize to a pretty-printed key document.
    pub fn to_json(&self) -> Result<String, KeyError> {
        let doc = KeyDocument {
            kind: KEY_DOCUMENT_TYPE.to_string(),
            version: KEY_DOCUMENT_VERSION,
            name: self.name.clone(),
            description: self.description.clone(),
            encryption_secret: URL_SAFE_NO_PAD.encode(&self.encryption_secret),
            authentication_secret: URL_SAFE_NO_PAD.encode(&self.authentication_secret),
        };
        serde_json::to_string_pretty(&doc).map_err(|e| KeyError::InvalidDocument(e.to_string()))
    }

    /// Parse a key document produced by [`Key::to_json`].
    pub fn from_json(json: &str) -> Result<Self, KeyError> {
        let doc: KeyDocument =
            serde_json::from_str(json).map_err(|e| KeyError::InvalidDocument(e.to_string()))?;

        if doc.kind != KEY_DOCUMENT_TYPE {
            return Err(KeyError::UnsupportedType(doc.kind.clone()));
        }
        if doc.version != KEY_DOCUMENT_VERSION {
            return Err(KeyError::UnsupportedVersion(doc.version));
        }

        let encryption_secret = URL_SAFE_NO_PAD
            .decode(doc.encryption_secret.as_bytes())
            .map_err(|e| KeyError::InvalidDocument(format!("encryptionSecret: {e}")))?;
        let authentication_secret = URL_SAFE_NO_PAD
            .decode(doc.authentication_secret.as_bytes())
            .map_err(|e| KeyError::InvalidDocument(format!("authenticationSecret: {e}")))?;

        Self::new(
            encryption_secret,
            authentication_secret,
            doc.name.clone(),
            doc.description.clone(),
        )
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.encryption_secret.zeroize();
        self.authentication_secret.zeroize();
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("encryption_secret", &"[REDACTED]")
            .field("authentication_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyDocument {
    #[serde(rename = "type")]
    kind: String,
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    encryption_secret: String,
    authentication_secret: String,
}

impl Drop for KeyDocument {
    fn drop(&mut self) {
        self.encryption_secret.zeroize();
        self.authentication_secret.zeroize();
    }
}

/// Generates keys from an injected random source.
#[derive(Clone)]
pub struct KeyFactory {
    random: Arc<dyn RandomSource>,
}

impl KeyFactory {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// Generate a key with the given secret sizes in bits.
    pub fn generate_key(
        &self,
        encryption_secret_bits: usize,
        authentication_secret_bits: usize,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Key, KeyError> {
        if encryption_secret_bits % 8 != 0
            || !ENCRYPTION_SECRET_SIZES.contains(&(encryption_secret_bits / 8))
        {
            return Err(KeyError::InvalidEncryptionSecretSize(encryption_secret_bits));
        }
        if authentication_secret_bits % 8 != 0
            || !AUTHENTICATION_SECRET_SIZES.contains(&(authentication_secret_bits / 8))
        {
            return Err(KeyError::InvalidAuthenticationSecretSize(
                authentication_secret_bits,
            ));
        }

        let key = Key::new(
            self.random.generate(encryption_secret_bits / 8),
            self.random.generate(authentication_secret_bits / 8),
            name,
            description,
        )?;
        tracing::debug!(
            encryption_bits = encryption_secret_bits,
            authentication_bits = authentication_secret_bits,
            "generated key"
        );
        Ok(key)
    }
}

impl std::fmt::Debug for KeyFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFactory").finish_non_exhaustive()
    }
}
