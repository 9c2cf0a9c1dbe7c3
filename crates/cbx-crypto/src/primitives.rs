//! Key-derived primitive state: AES key schedules and HMAC instances
//!
//! Both are selected from the secret sizes of a validated [`Key`]:
//! - encryption secret 16/24/32 bytes → AES-128/192/256
//! - authentication secret 224/384/512 bits → HMAC-SHA-224/384/512, anything else HMAC-SHA-256

use aes::cipher::generic_array::GenericArray;
use aes::cipher::KeyInit;
use aes::{Aes128, Aes192, Aes256};
use hmac::{Hmac, Mac as _};
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::key::{Key, KeyError};

/// An expanded AES key schedule.
#[derive(Clone)]
pub enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    pub fn from_key(key: &Key) -> Result<Self, KeyError> {
        let secret = key.encryption_secret();
        let cipher = match secret.len() {
            16 => Self::Aes128(Aes128::new(GenericArray::from_slice(secret))),
            24 => Self::Aes192(Aes192::new(GenericArray::from_slice(secret))),
            32 => Self::Aes256(Aes256::new(GenericArray::from_slice(secret))),
            other => return Err(KeyError::InvalidEncryptionSecretSize(other * 8)),
        };
        Ok(cipher)
    }
}

/// HMAC digest variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl MacAlgorithm {
    pub fn for_secret_bits(bits: usize) -> Self {
        match bits {
            224 => Self::Sha224,
            384 => Self::Sha384,
            512 => Self::Sha512,
            _ => Self::Sha256,
        }
    }

    /// Full digest length in bytes; also the trailer tag size.
    pub fn output_size(self) -> usize {
        match self {
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// A keyed, running HMAC computation.
#[derive(Clone)]
pub enum Mac {
    Sha224(Hmac<Sha224>),
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
    Sha512(Hmac<Sha512>),
}

impl Mac {
    pub fn from_key(key: &Key) -> Result<Self, KeyError> {
        let secret = key.authentication_secret();
        let bits = key.authentication_secret_bits();
        let invalid = |_| KeyError::InvalidAuthenticationSecretSize(bits);

        let mac = match MacAlgorithm::for_secret_bits(bits) {
            MacAlgorithm::Sha224 => {
                Self::Sha224(<Hmac<Sha224> as KeyInit>::new_from_slice(secret).map_err(invalid)?)
            }
            MacAlgorithm::Sha256 => {
                Self::Sha256(<Hmac<Sha256> as KeyInit>::new_from_slice(secret).map_err(invalid)?)
            }
            MacAlgorithm::Sha384 => {
                Self::Sha384(<Hmac<Sha384> as KeyInit>::new_from_slice(secret).map_err(invalid)?)
            }
            MacAlgorithm::Sha512 => {
                Self::Sha512(<Hmac<Sha512> as KeyInit>::new_from_slice(secret).map_err(invalid)?)
            }
        };
        Ok(mac)
    }

    pub fn algorithm(&self) -> MacAlgorithm {
        match self {
            Self::Sha224(_) => MacAlgorithm::Sha224,
            Self::Sha256(_) => MacAlgorithm::Sha256,
            Self::Sha384(_) => MacAlgorithm::Sha384,
            Self::Sha512(_) => MacAlgorithm::Sha512,
        }
    }

    pub fn output_size(&self) -> usize {
        self.algorithm().output_size()
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha224(m) => m.update(data),
            Self::Sha256(m) => m.update(data),
            Self::Sha384(m) => m.update(data),
            Self::Sha512(m) => m.update(data),
        }
    }

    /// Write the leading `out.len()` bytes of the tag into `out` and rekey for reuse.
    ///
    /// `out` must not be longer than [`Mac::output_size`].
    pub fn finalize_reset_into(&mut self, out: &mut [u8]) {
        let len = out.len();
        match self {
            Self::Sha224(m) => out.copy_from_slice(&m.finalize_reset().into_bytes()[..len]),
            Self::Sha256(m) => out.copy_from_slice(&m.finalize_reset().into_bytes()[..len]),
            Self::Sha384(m) => out.copy_from_slice(&m.finalize_reset().into_bytes()[..len]),
            Self::Sha512(m) => out.copy_from_slice(&m.finalize_reset().into_bytes()[..len]),
        }
    }
}
