//! Wire framing: header layout and per-block tag interleaving
//!
//! ```text
//! header  = [version: u8][type: u8][iv: 16]
//! chunk   = [ciphertext block: 16][HMAC(auth, block)[..2]]
//! trailer = HMAC(auth, header || block_0 || ... || block_n)
//! ```

use crate::primitives::Mac;
use crate::result::ResultKind;
use crate::{BLOCK_SIZE, IV_SIZE};

/// Current wire format version
pub const VERSION: u8 = 1;

/// Current wire format type
pub const TYPE: u8 = 1;

/// Size of the stream header in bytes
pub const HEADER_SIZE: usize = 2 + IV_SIZE;

/// Size of a truncated per-block tag in bytes
pub const BLOCK_TAG_SIZE: usize = 2;

/// Size of one ciphertext block plus its tag
pub const CHUNK_SIZE: usize = BLOCK_SIZE + BLOCK_TAG_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub kind: u8,
    pub iv: [u8; IV_SIZE],
}

impl Header {
    pub fn new(iv: [u8; IV_SIZE]) -> Self {
        Self {
            version: VERSION,
            kind: TYPE,
            iv,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.version;
        bytes[1] = self.kind;
        bytes[2..].copy_from_slice(&self.iv);
        bytes
    }

    /// Parse and validate a header; the version is checked before the type.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self, ResultKind> {
        if bytes[0] != VERSION {
            return Err(ResultKind::UnsupportedVersion);
        }
        if bytes[1] != TYPE {
            return Err(ResultKind::UnsupportedType);
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[2..]);
        Ok(Self::new(iv))
    }
}

/// Framed size of `ciphertext_len` bytes of whole ciphertext blocks.
pub fn chunked_size(ciphertext_len: usize) -> usize {
    ciphertext_len / BLOCK_SIZE * CHUNK_SIZE
}

/// Truncated tag for one ciphertext block. `mac` is left ready for the next block.
pub fn block_tag(mac: &mut Mac, block: &[u8]) -> [u8; BLOCK_TAG_SIZE] {
    let mut tag = [0u8; BLOCK_TAG_SIZE];
    mac.update(block);
    mac.finalize_reset_into(&mut tag);
    tag
}

/// Rewrite `blocks` contiguous ciphertext blocks at the start of `buf` into
/// interleaved chunks, in place.
///
/// `buf` must be at least `blocks * CHUNK_SIZE` long. Block `i` moves from
/// `16i` to `18i`; walking from the highest block down means every source
/// range still unread lies entirely below the destination being written
/// (`16j + 16 <= 18i` for all `j < i`).
pub fn interleave_block_tags(buf: &mut [u8], blocks: usize, mac: &mut Mac) {
    for i in (0..blocks).rev() {
        let src = i * BLOCK_SIZE;
        let dst = i * CHUNK_SIZE;
        buf.copy_within(src..src + BLOCK_SIZE, dst);
        let tag = block_tag(mac, &buf[dst..dst + BLOCK_SIZE]);
        buf[dst + BLOCK_SIZE..dst + CHUNK_SIZE].copy_from_slice(&tag);
    }
}
