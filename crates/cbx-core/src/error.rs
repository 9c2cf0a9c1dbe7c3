use cbx_crypto::{CipherError, KeyError, ResultKind};
use thiserror::Error;

pub type CbxResult<T> = Result<T, CbxError>;

#[derive(Debug, Error)]
pub enum CbxError {
    #[error("config error: {0}")]
    Config(String),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Ciphertext was rejected; no plaintext may be used
    #[error("decryption failed: {0}")]
    Rejected(ResultKind),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
