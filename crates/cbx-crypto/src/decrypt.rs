//! Incremental decryption: header + tagged chunks + trailer in, plaintext out
//!
//! The trailer tag has a fixed length per key but is indistinguishable from
//! chunk bytes on a forward pass, so the engine always keeps the newest
//! `trailer_size` input bytes unconsumed. A chunk is released only once at
//! least `trailer_size` bytes follow it; the hold-back buffer therefore never
//! exceeds `trailer_size + CHUNK_SIZE` bytes.
//!
//! Two output modes:
//! - streaming ([`DecryptEngine::new`]): block-verified plaintext is written on
//!   every call; callers must discard it unless the final result succeeds
//! - buffered ([`DecryptEngine::buffered`]): nothing is written, and a
//!   successful `finalize` returns the whole plaintext in the result

use std::sync::Arc;

use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, Zeroizing};

use crate::cbc_stream::CbcDecryptor;
use crate::cipher::{ensure_capacity, Cipher, CipherError, Phase};
use crate::frame::{self, Header, CHUNK_SIZE, HEADER_SIZE};
use crate::key::Key;
use crate::primitives::{BlockCipher, Mac};
use crate::result::{CipherResult, ResultKind};
use crate::BLOCK_SIZE;

#[derive(Clone)]
struct DecryptState {
    block_mac: Mac,
    final_mac: Mac,
    header: [u8; HEADER_SIZE],
    header_len: usize,
    /// Present once the header has been accepted
    cbc: Option<CbcDecryptor>,
    held: Vec<u8>,
    chunks: usize,
    plaintext: Zeroizing<Vec<u8>>,
}

impl DecryptState {
    fn new(mac: Mac) -> Self {
        let held = Vec::with_capacity(mac.output_size() + CHUNK_SIZE);
        Self {
            block_mac: mac.clone(),
            final_mac: mac,
            header: [0u8; HEADER_SIZE],
            header_len: 0,
            cbc: None,
            held,
            chunks: 0,
            plaintext: Zeroizing::new(Vec::new()),
        }
    }

    fn trailer_size(&self) -> usize {
        self.final_mac.output_size()
    }

    /// Chunks that `input_len` more bytes would make consumable.
    fn consumable_chunks(&self, input_len: usize) -> usize {
        let missing_header = if self.cbc.is_some() {
            0
        } else {
            HEADER_SIZE - self.header_len
        };
        let available = self.held.len() + input_len.saturating_sub(missing_header);
        available.saturating_sub(self.trailer_size()) / CHUNK_SIZE
    }

    fn plaintext_size(&self, input_len: usize) -> usize {
        let ciphertext = self.consumable_chunks(input_len) * BLOCK_SIZE;
        match &self.cbc {
            Some(cbc) => cbc.update_output_size(ciphertext),
            None => ciphertext.saturating_sub(BLOCK_SIZE),
        }
    }

    fn consume(
        &mut self,
        cipher: &BlockCipher,
        buffered: bool,
        mut input: &[u8],
        output: &mut [u8],
    ) -> Result<usize, ResultKind> {
        if self.cbc.is_none() {
            let take = (HEADER_SIZE - self.header_len).min(input.len());
            self.header[self.header_len..self.header_len + take].copy_from_slice(&input[..take]);
            self.header_len += take;
            input = &input[take..];
            if self.header_len < HEADER_SIZE {
                return Ok(0);
            }

            let header = Header::parse(&self.header)?;
            self.final_mac.update(&self.header);
            self.cbc = Some(CbcDecryptor::new(cipher, &header.iv));
        }

        let available = self.held.len() + input.len();
        let chunks = available.saturating_sub(self.trailer_size()) / CHUNK_SIZE;
        if chunks == 0 {
            self.held.extend_from_slice(input);
            return Ok(0);
        }

        // Verify every tag of this call before releasing any plaintext.
        let mut ciphertext = Vec::with_capacity(chunks * BLOCK_SIZE);
        let mut tags_ok = Choice::from(1u8);
        let mut chunk = [0u8; CHUNK_SIZE];
        let (mut from_held, mut from_input) = (0, 0);
        for _ in 0..chunks {
            let h = (self.held.len() - from_held).min(CHUNK_SIZE);
            chunk[..h].copy_from_slice(&self.held[from_held..from_held + h]);
            chunk[h..].copy_from_slice(&input[from_input..from_input + CHUNK_SIZE - h]);
            from_held += h;
            from_input += CHUNK_SIZE - h;

            let (block, tag) = chunk.split_at(BLOCK_SIZE);
            let expected = frame::block_tag(&mut self.block_mac, block);
            tags_ok &= expected[..].ct_eq(tag);
            ciphertext.extend_from_slice(block);
        }
        self.held.drain(..from_held);
        self.held.extend_from_slice(&input[from_input..]);

        if !bool::from(tags_ok) {
            return Err(ResultKind::InvalidMac);
        }
        self.final_mac.update(&ciphertext);
        self.chunks += chunks;

        let Some(cbc) = self.cbc.as_mut() else {
            return Ok(0);
        };
        if buffered {
            let start = self.plaintext.len();
            let len = cbc.update_output_size(ciphertext.len());
            reserve_zeroizing(&mut self.plaintext, len);
            self.plaintext.resize(start + len, 0);
            cbc.update(&ciphertext, &mut self.plaintext[start..]);
            Ok(0)
        } else {
            Ok(cbc.update(&ciphertext, output))
        }
    }

    fn finish(&mut self, buffered: bool, output: &mut [u8]) -> Result<usize, ResultKind> {
        let trailer_size = self.trailer_size();
        let Some(cbc) = self.cbc.as_mut() else {
            return Err(ResultKind::InvalidSize);
        };
        if self.chunks == 0 || self.held.len() != trailer_size {
            return Err(ResultKind::InvalidSize);
        }

        let mut expected = [0u8; 64];
        let expected = &mut expected[..trailer_size];
        self.final_mac.finalize_reset_into(expected);
        if !bool::from(expected.ct_eq(&self.held[..])) {
            return Err(ResultKind::InvalidMac);
        }

        if buffered {
            let mut last = [0u8; BLOCK_SIZE];
            let len = cbc
                .finish(&mut last)
                .map_err(|_| ResultKind::InvalidPadding)?;
            reserve_zeroizing(&mut self.plaintext, len);
            self.plaintext.extend_from_slice(&last[..len]);
            last.zeroize();
            Ok(0)
        } else {
            cbc.finish(output).map_err(|_| ResultKind::InvalidPadding)
        }
    }
}

/// Make room for `additional` bytes without letting `Vec` reallocate in place.
///
/// A plain `reserve` frees the old allocation with the plaintext still in it;
/// here the contents move to a fresh buffer and the old one is wiped on drop.
fn reserve_zeroizing(buf: &mut Zeroizing<Vec<u8>>, additional: usize) {
    if buf.capacity() - buf.len() >= additional {
        return;
    }
    let capacity = (buf.capacity() * 2).max(buf.len() + additional);
    let mut grown = Zeroizing::new(Vec::with_capacity(capacity));
    grown.extend_from_slice(&buf[..]);
    std::mem::swap(buf, &mut grown);
}

struct Bound {
    cipher: BlockCipher,
    initial: DecryptState,
    current: DecryptState,
}

/// Streaming decryptor. One instance per stream; not for concurrent use.
pub struct DecryptEngine {
    buffered: bool,
    phase: Phase,
    bound: Option<Bound>,
    result: Option<CipherResult>,
}

impl DecryptEngine {
    /// Engine that writes verified plaintext as chunks arrive.
    pub fn new() -> Self {
        Self::with_mode(false)
    }

    /// Engine that releases plaintext only through a successful result.
    pub fn buffered() -> Self {
        Self::with_mode(true)
    }

    fn with_mode(buffered: bool) -> Self {
        Self {
            buffered,
            phase: Phase::Uninitialized,
            bound: None,
            result: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    fn fail(&mut self, kind: ResultKind) {
        tracing::warn!(result = %kind, "ciphertext rejected");
        if let Some(bound) = self.bound.as_mut() {
            bound.current.plaintext.zeroize();
        }
        self.phase = Phase::Finalized;
        self.result = Some(CipherResult::failure(kind));
    }
}

impl Default for DecryptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Cipher for DecryptEngine {
    type Parameters = Arc<Key>;

    fn is_initialized(&self) -> bool {
        self.bound.is_some()
    }

    fn initialize(&mut self, key: Arc<Key>) -> Result<(), CipherError> {
        let cipher = BlockCipher::from_key(&key)?;
        let mac = Mac::from_key(&key)?;
        tracing::debug!(
            mac = ?mac.algorithm(),
            buffered = self.buffered,
            "decrypt engine initialized"
        );

        let state = DecryptState::new(mac);
        self.bound = Some(Bound {
            cipher,
            initial: state.clone(),
            current: state,
        });
        self.phase = Phase::Initialized;
        self.result = None;
        Ok(())
    }

    fn process_output_size(&self, input_len: usize) -> usize {
        match &self.bound {
            Some(bound) if !self.buffered => bound.current.plaintext_size(input_len),
            _ => 0,
        }
    }

    fn process(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, CipherError> {
        self.phase.ensure_processing()?;
        ensure_capacity(output, self.process_output_size(input.len()))?;
        let bound = self.bound.as_mut().ok_or(CipherError::NotInitialized)?;

        match bound
            .current
            .consume(&bound.cipher, self.buffered, input, output)
        {
            Ok(written) => Ok(written),
            Err(kind) => {
                self.fail(kind);
                Ok(0)
            }
        }
    }

    /// Upper bound: the padding length is only known once the last block is decrypted.
    fn final_output_size(&self, input_len: usize) -> usize {
        if self.buffered || self.bound.is_none() {
            return 0;
        }
        self.process_output_size(input_len) + BLOCK_SIZE - 1
    }

    fn finalize(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, CipherError> {
        self.phase.ensure_processing()?;
        ensure_capacity(output, self.final_output_size(input.len()))?;
        let buffered = self.buffered;
        let bound = self.bound.as_mut().ok_or(CipherError::NotInitialized)?;
        let state = &mut bound.current;

        let outcome = state
            .consume(&bound.cipher, buffered, input, output)
            .and_then(|written| {
                state
                    .finish(buffered, &mut output[written..])
                    .map(|n| written + n)
                    .map_err(|kind| {
                        output[..written].zeroize();
                        kind
                    })
            });

        match outcome {
            Ok(written) => {
                let result = if buffered {
                    CipherResult::success_with_data(std::mem::take(&mut *state.plaintext))
                } else {
                    CipherResult::success()
                };
                tracing::trace!(chunks = state.chunks, "decrypt engine finalized");
                self.phase = Phase::Finalized;
                self.result = Some(result);
                Ok(written)
            }
            Err(kind) => {
                self.fail(kind);
                Ok(0)
            }
        }
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

impl std::fmt::Debug for DecryptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptEngine")
            .field("buffered", &self.buffered)
            .field("phase", &self.phase)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}
