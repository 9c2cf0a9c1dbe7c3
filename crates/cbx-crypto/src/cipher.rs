//! Lifecycle contract shared by the encrypt and decrypt engines
//!
//! ```text
//! Uninitialized --initialize--> Initialized --finalize--> Finalized
//!                                   ^  |                      |
//!                                   |  +--process (0..n)      |
//!                                   +------------reset--------+
//! ```
//!
//! Every call that writes into a caller buffer first computes the exact number
//! of bytes it will produce and refuses to run if the buffer is smaller.

use thiserror::Error;

use crate::key::KeyError;
use crate::result::CipherResult;

/// Contract violations. These indicate a caller bug and are never used for
/// rejected ciphertext (see [`CipherResult`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("cipher is not initialized")]
    NotInitialized,

    #[error("cipher is already finalized")]
    Finalized,

    #[error("output buffer too small: {required} bytes required, {available} available")]
    OutputTooSmall { required: usize, available: usize },

    #[error("unusable key: {0}")]
    Key(#[from] KeyError),

    #[error("random source returned {actual} bytes, expected {expected}")]
    InsufficientRandom { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    Finalized,
}

impl Phase {
    /// Guard for `process` / `finalize`.
    pub fn ensure_processing(self) -> Result<(), CipherError> {
        match self {
            Phase::Uninitialized => Err(CipherError::NotInitialized),
            Phase::Initialized => Ok(()),
            Phase::Finalized => Err(CipherError::Finalized),
        }
    }
}

/// Fail unless `output` can hold `required` bytes.
pub fn ensure_capacity(output: &[u8], required: usize) -> Result<(), CipherError> {
    if output.len() < required {
        return Err(CipherError::OutputTooSmall {
            required,
            available: output.len(),
        });
    }
    Ok(())
}

/// An incremental cipher.
pub trait Cipher {
    /// What `initialize` binds: a key, plus an IV for encryption.
    type Parameters;

    fn is_initialized(&self) -> bool;

    /// Bind parameters and start a fresh stream. May be called again at any time.
    fn initialize(&mut self, parameters: Self::Parameters) -> Result<(), CipherError>;

    /// Bytes `process` will write for `input_len` more input bytes.
    fn process_output_size(&self, input_len: usize) -> usize;

    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, CipherError>;

    /// Bytes `finalize` will write for `input_len` last input bytes.
    fn final_output_size(&self, input_len: usize) -> usize;

    /// Process `input` as the last piece of the stream and complete it.
    fn finalize(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, CipherError>;

    /// Return to the state right after the last `initialize`.
    fn reset(&mut self) -> Result<(), CipherError>;

    /// Outcome recorded by `finalize`, or by a failing `process`.
    fn result(&self) -> Option<&CipherResult>;
}
