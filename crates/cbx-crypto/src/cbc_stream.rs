//! Incremental AES-CBC with PKCS#7 padding
//!
//! The `cbc` crate works a block at a time; these wrappers add the partial-block
//! buffering needed to accept input of any length per call.
//!
//! Output discipline:
//! - encryption emits every complete block on `update`; `finish` emits exactly one
//!   padded block
//! - decryption holds back the last complete block on `update` so that `finish`
//!   can strip the padding

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, InnerIvInit};
use zeroize::Zeroize;

use crate::primitives::BlockCipher;
use crate::{BLOCK_SIZE, IV_SIZE};

#[derive(Clone)]
enum EncryptMode {
    Aes128(cbc::Encryptor<Aes128>),
    Aes192(cbc::Encryptor<Aes192>),
    Aes256(cbc::Encryptor<Aes256>),
}

impl EncryptMode {
    fn new(cipher: &BlockCipher, iv: &[u8; IV_SIZE]) -> Self {
        let iv = GenericArray::from_slice(iv);
        match cipher {
            BlockCipher::Aes128(c) => Self::Aes128(cbc::Encryptor::inner_iv_init(c.clone(), iv)),
            BlockCipher::Aes192(c) => Self::Aes192(cbc::Encryptor::inner_iv_init(c.clone(), iv)),
            BlockCipher::Aes256(c) => Self::Aes256(cbc::Encryptor::inner_iv_init(c.clone(), iv)),
        }
    }

    fn encrypt_block(&mut self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(m) => m.encrypt_block_mut(block),
            Self::Aes192(m) => m.encrypt_block_mut(block),
            Self::Aes256(m) => m.encrypt_block_mut(block),
        }
    }
}

#[derive(Clone)]
enum DecryptMode {
    Aes128(cbc::Decryptor<Aes128>),
    Aes192(cbc::Decryptor<Aes192>),
    Aes256(cbc::Decryptor<Aes256>),
}

impl DecryptMode {
    fn new(cipher: &BlockCipher, iv: &[u8; IV_SIZE]) -> Self {
        let iv = GenericArray::from_slice(iv);
        match cipher {
            BlockCipher::Aes128(c) => Self::Aes128(cbc::Decryptor::inner_iv_init(c.clone(), iv)),
            BlockCipher::Aes192(c) => Self::Aes192(cbc::Decryptor::inner_iv_init(c.clone(), iv)),
            BlockCipher::Aes256(c) => Self::Aes256(cbc::Decryptor::inner_iv_init(c.clone(), iv)),
        }
    }

    fn decrypt_block(&mut self, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(m) => m.decrypt_block_mut(block),
            Self::Aes192(m) => m.decrypt_block_mut(block),
            Self::Aes256(m) => m.decrypt_block_mut(block),
        }
    }
}

/// PKCS#7 padding was missing or malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingError;

/// Streaming CBC encryptor. Buffered plaintext is wiped on drop.
#[derive(Clone)]
pub struct CbcEncryptor {
    mode: EncryptMode,
    pending: [u8; BLOCK_SIZE],
    pending_len: usize,
}

impl CbcEncryptor {
    pub fn new(cipher: &BlockCipher, iv: &[u8; IV_SIZE]) -> Self {
        Self {
            mode: EncryptMode::new(cipher, iv),
            pending: [0u8; BLOCK_SIZE],
            pending_len: 0,
        }
    }

    /// Bytes `update` will emit for `input_len` more bytes of plaintext.
    pub fn update_output_size(&self, input_len: usize) -> usize {
        (self.pending_len + input_len) / BLOCK_SIZE * BLOCK_SIZE
    }

    /// Bytes `update` followed by `finish` will emit.
    pub fn output_size(&self, input_len: usize) -> usize {
        self.update_output_size(input_len) + BLOCK_SIZE
    }

    /// Encrypt all complete blocks; `out` must hold `update_output_size(input.len())` bytes.
    pub fn update(&mut self, mut input: &[u8], out: &mut [u8]) -> usize {
        let mut written = 0;

        if self.pending_len > 0 {
            let take = (BLOCK_SIZE - self.pending_len).min(input.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&input[..take]);
            self.pending_len += take;
            input = &input[take..];

            if self.pending_len < BLOCK_SIZE {
                return 0;
            }
            let block = &mut out[..BLOCK_SIZE];
            block.copy_from_slice(&self.pending);
            self.mode.encrypt_block(block);
            self.pending.zeroize();
            self.pending_len = 0;
            written = BLOCK_SIZE;
        }

        let full = input.len() / BLOCK_SIZE * BLOCK_SIZE;
        for block_in in input[..full].chunks_exact(BLOCK_SIZE) {
            let block = &mut out[written..written + BLOCK_SIZE];
            block.copy_from_slice(block_in);
            self.mode.encrypt_block(block);
            written += BLOCK_SIZE;
        }

        let rest = &input[full..];
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
        written
    }

    /// Pad and encrypt the final block into `out[..BLOCK_SIZE]`.
    pub fn finish(&mut self, out: &mut [u8]) -> usize {
        let pad = (BLOCK_SIZE - self.pending_len) as u8;
        let block = &mut out[..BLOCK_SIZE];
        block[..self.pending_len].copy_from_slice(&self.pending[..self.pending_len]);
        block[self.pending_len..].fill(pad);
        self.mode.encrypt_block(block);
        self.pending.zeroize();
        self.pending_len = 0;
        BLOCK_SIZE
    }
}

impl Drop for CbcEncryptor {
    fn drop(&mut self) {
        self.pending.zeroize();
    }
}

/// Streaming CBC decryptor. Accepts whole ciphertext blocks only.
#[derive(Clone)]
pub struct CbcDecryptor {
    mode: DecryptMode,
    held: [u8; BLOCK_SIZE],
    holding: bool,
}

impl CbcDecryptor {
    pub fn new(cipher: &BlockCipher, iv: &[u8; IV_SIZE]) -> Self {
        Self {
            mode: DecryptMode::new(cipher, iv),
            held: [0u8; BLOCK_SIZE],
            holding: false,
        }
    }

    /// Bytes `update` will emit for `input_len` more bytes of ciphertext
    /// (a multiple of the block size).
    pub fn update_output_size(&self, input_len: usize) -> usize {
        let total = input_len + if self.holding { BLOCK_SIZE } else { 0 };
        total.saturating_sub(BLOCK_SIZE)
    }

    /// Upper bound on bytes `update` followed by `finish` will emit.
    pub fn output_size(&self, input_len: usize) -> usize {
        let total = input_len + if self.holding { BLOCK_SIZE } else { 0 };
        total.saturating_sub(1)
    }

    /// Decrypt whole blocks, keeping the newest one back.
    pub fn update(&mut self, input: &[u8], out: &mut [u8]) -> usize {
        debug_assert_eq!(input.len() % BLOCK_SIZE, 0);
        let mut written = 0;

        for block_in in input.chunks_exact(BLOCK_SIZE) {
            if self.holding {
                out[written..written + BLOCK_SIZE].copy_from_slice(&self.held);
                written += BLOCK_SIZE;
            }
            self.held.copy_from_slice(block_in);
            self.mode.decrypt_block(&mut self.held);
            self.holding = true;
        }
        written
    }

    /// Strip padding from the held-back block and write the remaining plaintext.
    pub fn finish(&mut self, out: &mut [u8]) -> Result<usize, PaddingError> {
        if !self.holding {
            return Err(PaddingError);
        }
        let pad = self.held[BLOCK_SIZE - 1] as usize;
        if pad == 0 || pad > BLOCK_SIZE {
            return Err(PaddingError);
        }
        if self.held[BLOCK_SIZE - pad..]
            .iter()
            .any(|&b| b as usize != pad)
        {
            return Err(PaddingError);
        }

        let len = BLOCK_SIZE - pad;
        out[..len].copy_from_slice(&self.held[..len]);
        self.held.zeroize();
        self.holding = false;
        Ok(len)
    }
}

impl Drop for CbcDecryptor {
    fn drop(&mut self) {
        self.held.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;

    const IV: [u8; IV_SIZE] = *b"1234567890123456";

    fn cipher() -> BlockCipher {
        let key = Key::new(b"1234567890123456".to_vec(), vec![0u8; 32], None, None).unwrap();
        BlockCipher::from_key(&key).unwrap()
    }

    fn encrypt_all(data: &[u8], split: usize) -> Vec<u8> {
        let mut enc = CbcEncryptor::new(&cipher(), &IV);
        let mut out = vec![0u8; enc.output_size(data.len())];
        let (a, b) = data.split_at(split.min(data.len()));
        let mut n = enc.update(a, &mut out);
        n += enc.update(b, &mut out[n..]);
        n += enc.finish(&mut out[n..]);
        out.truncate(n);
        out
    }

    #[test]
    fn test_encrypt_sizes() {
        let enc = CbcEncryptor::new(&cipher(), &IV);
        assert_eq!(enc.update_output_size(0), 0);
        assert_eq!(enc.update_output_size(15), 0);
        assert_eq!(enc.update_output_size(16), 16);
        assert_eq!(enc.output_size(0), 16);
        assert_eq!(enc.output_size(16), 32);
        assert_eq!(enc.output_size(21), 32);
    }

    #[test]
    fn test_split_does_not_change_ciphertext() {
        let data: Vec<u8> = (0..100u8).collect();
        let whole = encrypt_all(&data, 0);
        for split in [1, 15, 16, 17, 33, 99, 100] {
            assert_eq!(encrypt_all(&data, split), whole, "split at {split}");
        }
        assert_eq!(whole.len(), 112);
    }

    #[test]
    fn test_decrypt_roundtrip() {
        for len in [0usize, 1, 15, 16, 17, 32, 47] {
            let data = vec![0x5Au8; len];
            let ct = encrypt_all(&data, len / 2);

            let mut dec = CbcDecryptor::new(&cipher(), &IV);
            let mut out = vec![0u8; dec.output_size(ct.len())];
            assert_eq!(dec.update_output_size(ct.len()), ct.len() - BLOCK_SIZE);
            let mut n = dec.update(&ct, &mut out);
            n += dec.finish(&mut out[n..]).unwrap();
            assert_eq!(&out[..n], &data[..]);
        }
    }

    #[test]
    fn test_decrypt_holds_back_last_block() {
        let ct = encrypt_all(&[1u8; 40], 0);
        let mut dec = CbcDecryptor::new(&cipher(), &IV);
        let mut out = vec![0u8; 64];

        assert_eq!(dec.update(&ct[..16], &mut out), 0);
        assert_eq!(dec.update_output_size(16), 16);
        assert_eq!(dec.update(&ct[16..32], &mut out), 16);
        assert_eq!(dec.update(&ct[32..], &mut out), 16);
        assert_eq!(dec.finish(&mut out).unwrap(), 8);
    }

    #[test]
    fn test_finish_without_blocks_fails() {
        let mut dec = CbcDecryptor::new(&cipher(), &IV);
        assert_eq!(dec.finish(&mut [0u8; 16]), Err(PaddingError));
    }

    #[test]
    fn test_bad_padding_detected() {
        let ct = encrypt_all(b"short", 0);
        // A wrong IV flips the padding bytes of a single-block message
        let mut dec = CbcDecryptor::new(&cipher(), &[0u8; IV_SIZE]);
        let mut out = [0u8; 16];
        dec.update(&ct, &mut out);
        assert_eq!(dec.finish(&mut out), Err(PaddingError));
    }
}
