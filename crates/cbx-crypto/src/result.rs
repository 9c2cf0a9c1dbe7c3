//! Outcome of a decryption attempt
//!
//! Rejected ciphertext is an expected outcome, not a programming error, so it is
//! reported here rather than through [`crate::CipherError`].

use std::fmt;

use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultKind {
    Success,
    /// Input was too short or not a whole number of chunks
    InvalidSize,
    /// Text envelope could not be decoded
    InvalidEncoding,
    /// A block tag or the trailer tag did not verify
    InvalidMac,
    UnsupportedVersion,
    UnsupportedType,
    /// PKCS#7 padding was absent or malformed
    InvalidPadding,
    /// Reserved for password-based envelopes
    TooManyIterations,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::InvalidSize => "invalid size",
            Self::InvalidEncoding => "invalid encoding",
            Self::InvalidMac => "invalid MAC",
            Self::UnsupportedVersion => "unsupported version",
            Self::UnsupportedType => "unsupported type",
            Self::InvalidPadding => "invalid padding",
            Self::TooManyIterations => "too many iterations",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a cipher run. `data` is only present for successful buffered runs.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherResult {
    kind: ResultKind,
    data: Option<Zeroizing<Vec<u8>>>,
}

impl CipherResult {
    pub fn success() -> Self {
        Self {
            kind: ResultKind::Success,
            data: None,
        }
    }

    pub fn success_with_data(data: Vec<u8>) -> Self {
        Self {
            kind: ResultKind::Success,
            data: Some(Zeroizing::new(data)),
        }
    }

    /// A failed result. Failures never carry data.
    pub fn failure(kind: ResultKind) -> Self {
        debug_assert_ne!(kind, ResultKind::Success);
        Self { kind, data: None }
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    pub fn is_successful(&self) -> bool {
        self.kind == ResultKind::Success
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref().map(Vec::as_slice)
    }

    /// Take the plaintext out. The caller becomes responsible for wiping it.
    pub fn into_data(mut self) -> Option<Vec<u8>> {
        self.data.take().map(|mut data| std::mem::take(&mut *data))
    }
}

impl fmt::Debug for CipherResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherResult")
            .field("kind", &self.kind)
            .field("data_len", &self.data.as_ref().map(|d| d.len()))
            .finish()
    }
}
