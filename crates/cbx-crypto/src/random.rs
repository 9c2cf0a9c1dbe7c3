//! Random byte source, injected into engines that need IVs or fresh key material

use rand::rngs::OsRng;
use rand::RngCore;

/// Supplies random bytes. Implementations must be safe to share across threads.
pub trait RandomSource: Send + Sync {
    fn generate(&self, len: usize) -> Vec<u8>;
}

/// Operating-system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn generate(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        bytes
    }
}
