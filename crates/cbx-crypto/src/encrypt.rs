//! Incremental encryption: plaintext in, header + tagged chunks + trailer out
//!
//! Per call the engine CBC-encrypts into the caller's buffer as contiguous
//! ciphertext, feeds that span to the trailer MAC, then rewrites it in place
//! into 18-byte chunks (see [`frame::interleave_block_tags`]).

use std::sync::Arc;

use crate::cbc_stream::CbcEncryptor;
use crate::cipher::{ensure_capacity, Cipher, CipherError, Phase};
use crate::frame::{self, Header, HEADER_SIZE};
use crate::key::Key;
use crate::primitives::{BlockCipher, Mac};
use crate::random::RandomSource;
use crate::result::CipherResult;
use crate::{BLOCK_SIZE, IV_SIZE};

/// Key plus optional explicit IV. Without an IV a fresh one is drawn from the
/// engine's random source on every `initialize`.
#[derive(Debug, Clone)]
pub struct EncryptParameters {
    pub key: Arc<Key>,
    pub iv: Option<[u8; IV_SIZE]>,
}

impl EncryptParameters {
    pub fn new(key: Arc<Key>) -> Self {
        Self { key, iv: None }
    }

    /// Never reuse an IV with the same key for different plaintexts.
    pub fn with_iv(key: Arc<Key>, iv: [u8; IV_SIZE]) -> Self {
        Self { key, iv: Some(iv) }
    }
}

impl From<Arc<Key>> for EncryptParameters {
    fn from(key: Arc<Key>) -> Self {
        Self::new(key)
    }
}

#[derive(Clone)]
struct EncryptState {
    cbc: CbcEncryptor,
    block_mac: Mac,
    final_mac: Mac,
    header_sent: bool,
}

impl EncryptState {
    fn write_header(&mut self, iv: &[u8; IV_SIZE], output: &mut [u8]) -> usize {
        if self.header_sent {
            return 0;
        }
        let header = Header::new(*iv).to_bytes();
        output[..HEADER_SIZE].copy_from_slice(&header);
        self.final_mac.update(&header);
        self.header_sent = true;
        HEADER_SIZE
    }

    /// Authenticate `raw_len` bytes of fresh ciphertext at the start of `buf`.
    fn authenticate(&mut self, buf: &mut [u8], raw_len: usize) -> usize {
        self.final_mac.update(&buf[..raw_len]);
        let blocks = raw_len / BLOCK_SIZE;
        frame::interleave_block_tags(buf, blocks, &mut self.block_mac);
        frame::chunked_size(raw_len)
    }

    fn process(&mut self, iv: &[u8; IV_SIZE], input: &[u8], output: &mut [u8]) -> usize {
        if self.cbc.update_output_size(input.len()) == 0 {
            self.cbc.update(input, &mut []);
            return 0;
        }
        let mut written = self.write_header(iv, output);
        let raw = self.cbc.update(input, &mut output[written..]);
        written += self.authenticate(&mut output[written..], raw);
        written
    }
}

struct Bound {
    iv: [u8; IV_SIZE],
    initial: EncryptState,
    current: EncryptState,
}

/// Streaming encryptor. One instance per stream; not for concurrent use.
pub struct EncryptEngine {
    random: Arc<dyn RandomSource>,
    phase: Phase,
    bound: Option<Bound>,
    result: Option<CipherResult>,
}

impl EncryptEngine {
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        Self {
            random,
            phase: Phase::Uninitialized,
            bound: None,
            result: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// IV bound by the last `initialize`.
    pub fn iv(&self) -> Option<[u8; IV_SIZE]> {
        self.bound.as_ref().map(|b| b.iv)
    }

    fn random_iv(&self) -> Result<[u8; IV_SIZE], CipherError> {
        let bytes = self.random.generate(IV_SIZE);
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| CipherError::InsufficientRandom {
                expected: IV_SIZE,
                actual: bytes.len(),
            })
    }
}

impl Cipher for EncryptEngine {
    type Parameters = EncryptParameters;

    fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }

    fn initialize(&mut self, parameters: EncryptParameters) -> Result<(), CipherError> {
        let iv = match parameters.iv {
            Some(iv) => iv,
            None => self.random_iv()?,
        };
        let cipher = BlockCipher::from_key(&parameters.key)?;
        let mac = Mac::from_key(&parameters.key)?;
        tracing::debug!(
            encryption_bits = parameters.key.encryption_secret_bits(),
            mac = ?mac.algorithm(),
            explicit_iv = parameters.iv.is_some(),
            "encrypt engine initialized"
        );

        let state = EncryptState {
            cbc: CbcEncryptor::new(&cipher, &iv),
            block_mac: mac.clone(),
            final_mac: mac,
            header_sent: false,
        };
        self.bound = Some(Bound {
            iv,
            initial: state.clone(),
            current: state,
        });
        self.phase = Phase::Initialized;
        self.result = None;
        Ok(())
    }

    fn process_output_size(&self, input_len: usize) -> usize {
        let Some(bound) = &self.bound else {
            return 0;
        };
        let state = &bound.current;
        let size = frame::chunked_size(state.cbc.update_output_size(input_len));
        if size > 0 && !state.header_sent {
            size + HEADER_SIZE
        } else {
            size
        }
    }

    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, CipherError> {
        self.phase.ensure_processing()?;
        ensure_capacity(output, self.process_output_size(input.len()))?;
        let bound = self.bound.as_mut().ok_or(CipherError::NotInitialized)?;

        Ok(bound.current.process(&bound.iv, input, output))
    }

    fn final_output_size(&self, input_len: usize) -> usize {
        let Some(bound) = &self.bound else {
            return 0;
        };
        let state = &bound.current;
        let header = if state.header_sent { 0 } else { HEADER_SIZE };
        frame::chunked_size(state.cbc.output_size(input_len))
            + state.final_mac.output_size()
            + header
    }

    fn finalize(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, CipherError> {
        self.phase.ensure_processing()?;
        ensure_capacity(output, self.final_output_size(input.len()))?;
        let bound = self.bound.as_mut().ok_or(CipherError::NotInitialized)?;
        let state = &mut bound.current;

        let mut written = state.process(&bound.iv, input, output);
        written += state.write_header(&bound.iv, &mut output[written..]);
        let raw = state.cbc.finish(&mut output[written..]);
        written += state.authenticate(&mut output[written..], raw);

        let tag_size = state.final_mac.output_size();
        state
            .final_mac
            .finalize_reset_into(&mut output[written..written + tag_size]);
        written += tag_size;

        self.phase = Phase::Finalized;
        self.result = Some(CipherResult::success());
        tracing::trace!(bytes = written, "encrypt engine finalized");
        Ok(written)
    }

    fn reset(&mut self) -> Result<(), CipherError> {
        let bound = self.bound.as_mut().ok_or(CipherError::NotInitialized)?;
        bound.current = bound.initial.clone();
        self.phase = Phase::Initialized;
        self.result = None;
        Ok(())
    }

    fn result(&self) -> Option<&CipherResult> {
        self.result.as_ref()
    }
}

impl std::fmt::Debug for EncryptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptEngine")
            .field("phase", &self.phase)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::OsRandomSource;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    const VECTOR: &str = "AQExMjM0NTY3ODkwMTIzNDU2T5xLPdYzBeLJW8xyiDdJlARuJu2o4QnrWgwEVekzq_uQOat_qDHhGSRzIGUQo-U-BdePDs_-jLRS8U4RCmUjyg";

    fn vector_key() -> Arc<Key> {
        Arc::new(
            Key::new(
                b"1234567890123456".to_vec(),
                b"1234567890123456789012345678".to_vec(),
                None,
                None,
            )
            .unwrap(),
        )
    }

    fn engine() -> EncryptEngine {
        EncryptEngine::new(Arc::new(OsRandomSource))
    }

    fn encrypt_in_pieces(engine: &mut EncryptEngine, data: &[u8], piece: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in data.chunks(piece.max(1)) {
            let mut buf = vec![0u8; engine.process_output_size(chunk.len())];
            let n = engine.process(chunk, &mut buf).unwrap();
            assert_eq!(n, buf.len(), "process size must be exact");
            out.extend_from_slice(&buf);
        }
        let mut buf = vec![0u8; engine.final_output_size(0)];
        let n = engine.finalize(&[], &mut buf).unwrap();
        assert_eq!(n, buf.len(), "final size must be exact");
        out.extend_from_slice(&buf);
        out
    }

    #[test]
    fn test_known_vector() {
        let mut e = engine();
        e.initialize(EncryptParameters::with_iv(vector_key(), *b"1234567890123456"))
            .unwrap();
        let out = encrypt_in_pieces(&mut e, b"foobarbazquxdoomsplat", 64);
        assert_eq!(URL_SAFE_NO_PAD.encode(&out), VECTOR);
        assert!(e.result().unwrap().is_successful());
    }

    #[test]
    fn test_known_vector_any_chunking() {
        for piece in 1..=22 {
            let mut e = engine();
            e.initialize(EncryptParameters::with_iv(vector_key(), *b"1234567890123456"))
                .unwrap();
            let out = encrypt_in_pieces(&mut e, b"foobarbazquxdoomsplat", piece);
            assert_eq!(URL_SAFE_NO_PAD.encode(&out), VECTOR, "piece size {piece}");
        }
    }

    #[test]
    fn test_finalize_with_input_matches_process_then_finalize() {
        let mut e = engine();
        e.initialize(EncryptParameters::with_iv(vector_key(), *b"1234567890123456"))
            .unwrap();
        let data = b"foobarbazquxdoomsplat";
        let mut out = vec![0u8; e.final_output_size(data.len())];
        let n = e.finalize(data, &mut out).unwrap();
        assert_eq!(n, out.len());
        assert_eq!(URL_SAFE_NO_PAD.encode(&out), VECTOR);
    }

    #[test]
    fn test_empty_plaintext_layout() {
        let mut e = engine();
        e.initialize(EncryptParameters::new(vector_key())).unwrap();
        let out = encrypt_in_pieces(&mut e, b"", 1);
        // header + one padded block chunk + SHA-224 trailer
        assert_eq!(out.len(), 18 + 18 + 28);
        assert_eq!(&out[..2], &[1, 1]);
        assert_eq!(&out[2..18], &e.iv().unwrap());
    }

    #[test]
    fn test_process_emits_nothing_until_full_block() {
        let mut e = engine();
        e.initialize(EncryptParameters::new(vector_key())).unwrap();
        assert_eq!(e.process_output_size(15), 0);
        assert_eq!(e.process(&[0u8; 15], &mut []).unwrap(), 0);
        // one more byte completes a block: header + chunk
        assert_eq!(e.process_output_size(1), 36);
        let mut buf = [0u8; 36];
        assert_eq!(e.process(&[0u8], &mut buf).unwrap(), 36);
        assert_eq!(e.process_output_size(16), 18);
    }

    #[test]
    fn test_fixed_iv_is_deterministic() {
        let run = || {
            let mut e = engine();
            e.initialize(EncryptParameters::with_iv(vector_key(), [9u8; IV_SIZE]))
                .unwrap();
            encrypt_in_pieces(&mut e, b"same plaintext", 5)
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_random_iv_differs() {
        let run = || {
            let mut e = engine();
            e.initialize(EncryptParameters::new(vector_key())).unwrap();
            encrypt_in_pieces(&mut e, b"same plaintext", 5)
        };
        assert_ne!(run(), run());
    }

    #[test]
    fn test_not_initialized() {
        let mut e = engine();
        assert!(!e.is_initialized());
        assert_eq!(
            e.process(b"x", &mut [0u8; 64]),
            Err(CipherError::NotInitialized)
        );
        assert_eq!(
            e.finalize(b"", &mut [0u8; 128]),
            Err(CipherError::NotInitialized)
        );
        assert_eq!(e.reset(), Err(CipherError::NotInitialized));
    }

    #[test]
    fn test_finalized_rejects_further_use() {
        let mut e = engine();
        e.initialize(EncryptParameters::new(vector_key())).unwrap();
        encrypt_in_pieces(&mut e, b"abc", 3);
        assert_eq!(e.phase(), Phase::Finalized);
        assert_eq!(
            e.process(b"x", &mut [0u8; 64]),
            Err(CipherError::Finalized)
        );
        assert_eq!(
            e.finalize(b"", &mut [0u8; 128]),
            Err(CipherError::Finalized)
        );
    }

    #[test]
    fn test_output_too_small() {
        let mut e = engine();
        e.initialize(EncryptParameters::new(vector_key())).unwrap();
        assert_eq!(
            e.process(&[0u8; 16], &mut [0u8; 35]),
            Err(CipherError::OutputTooSmall {
                required: 36,
                available: 35
            })
        );
        assert_eq!(
            e.finalize(&[], &mut [0u8; 10]),
            Err(CipherError::OutputTooSmall {
                required: 64,
                available: 10
            })
        );
        // Nothing was consumed by the rejected calls
        assert_eq!(e.process_output_size(16), 36);
    }

    #[test]
    fn test_reset_replays_stream() {
        let mut e = engine();
        e.initialize(EncryptParameters::new(vector_key())).unwrap();
        let first = encrypt_in_pieces(&mut e, b"reset me please, twice over", 7);

        e.reset().unwrap();
        assert_eq!(e.phase(), Phase::Initialized);
        assert!(e.result().is_none());
        let second = encrypt_in_pieces(&mut e, b"reset me please, twice over", 4);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reset_discards_partial_block() {
        let mut e = engine();
        e.initialize(EncryptParameters::with_iv(vector_key(), *b"1234567890123456"))
            .unwrap();
        e.process(b"garbage", &mut []).unwrap();
        e.reset().unwrap();
        let out = encrypt_in_pieces(&mut e, b"foobarbazquxdoomsplat", 8);
        assert_eq!(URL_SAFE_NO_PAD.encode(&out), VECTOR);
    }

    #[test]
    fn test_trailer_size_follows_key() {
        for (auth, trailer) in [(28, 28), (32, 32), (48, 48), (64, 64)] {
            let key = Arc::new(Key::new(vec![1u8; 32], vec![2u8; auth], None, None).unwrap());
            let mut e = engine();
            e.initialize(EncryptParameters::new(key)).unwrap();
            assert_eq!(e.final_output_size(0), 18 + 18 + trailer);
            assert_eq!(e.final_output_size(16), 18 + 36 + trailer);
        }
    }
}
