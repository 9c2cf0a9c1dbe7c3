//! cbx-crypto: incremental authenticated encryption for Cipherbox
//!
//! Architecture: AES-CBC (PKCS#7) with per-block truncated HMAC tags and a
//! full-length trailer HMAC, processed a chunk at a time.
//!
//! Wire format:
//! ```text
//! [1: version=1][1: type=1][16: IV]                       header (18 bytes)
//! [16: ciphertext block B_i][2: HMAC(auth, B_i)[..2]] *    chunks (18 bytes each)
//! [N: HMAC(auth, header || B_0 || ... || B_n)]             trailer (28/32/48/64 bytes)
//! ```
//!
//! Engines:
//! ```text
//! EncryptEngine::initialize(key[, iv]) → process(plaintext)* → finalize() → stream
//! DecryptEngine::initialize(key)       → process(stream)*    → finalize() → CipherResult
//! ```

pub mod cbc_stream;
pub mod cipher;
pub mod crypter;
pub mod decrypt;
pub mod encrypt;
pub mod frame;
pub mod io;
pub mod key;
pub mod primitives;
pub mod random;
pub mod result;

pub use cipher::{Cipher, CipherError, Phase};
pub use crypter::{BoundCrypter, Decrypter, Encrypter};
pub use decrypt::DecryptEngine;
pub use encrypt::{EncryptEngine, EncryptParameters};
pub use io::{decrypt_stream, encrypt_stream, StreamStats};
pub use key::{Key, KeyError, KeyFactory};
pub use random::{OsRandomSource, RandomSource};
pub use result::{CipherResult, ResultKind};

/// Size of the CBC initialization vector in bytes
pub const IV_SIZE: usize = 16;

/// Size of an AES block in bytes
pub const BLOCK_SIZE: usize = 16;
