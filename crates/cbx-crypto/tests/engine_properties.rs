//! Property tests for the streaming engines.
//!
//! Streams are cut at arbitrary points on both sides; output must not depend
//! on where the cuts fall, and every size prediction must hold exactly.

use std::sync::Arc;

use cbx_crypto::{
    Cipher, DecryptEngine, EncryptEngine, EncryptParameters, Key, OsRandomSource, ResultKind,
};
use proptest::prelude::*;

const ENCRYPTION_BYTES: [usize; 3] = [16, 24, 32];
const AUTHENTICATION_BYTES: [usize; 4] = [28, 32, 48, 64];

fn key(enc: usize, auth: usize) -> Arc<Key> {
    let enc_secret = (0..enc).map(|i| i as u8).collect();
    let auth_secret = (0..auth).map(|i| (i as u8).wrapping_mul(3)).collect();
    Arc::new(Key::new(enc_secret, auth_secret, None, None).unwrap())
}

/// Split `data` at the given offsets, each wrapped to its length.
fn cut<'a>(data: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
    points.sort_unstable();
    let mut pieces = Vec::new();
    let mut start = 0;
    for p in points {
        pieces.push(&data[start..p]);
        start = p;
    }
    pieces.push(&data[start..]);
    pieces
}

fn encrypt(key: &Arc<Key>, iv: [u8; 16], pieces: &[&[u8]]) -> Vec<u8> {
    let mut engine = EncryptEngine::new(Arc::new(OsRandomSource));
    engine
        .initialize(EncryptParameters::with_iv(Arc::clone(key), iv))
        .unwrap();
    let mut out = Vec::new();
    for piece in pieces {
        let mut buf = vec![0u8; engine.process_output_size(piece.len())];
        let n = engine.process(piece, &mut buf).unwrap();
        assert_eq!(n, buf.len());
        out.extend_from_slice(&buf);
    }
    let mut buf = vec![0u8; engine.final_output_size(0)];
    let n = engine.finalize(&[], &mut buf).unwrap();
    assert_eq!(n, buf.len());
    out.extend_from_slice(&buf);
    out
}

/// Returns the released plaintext and the final result kind.
fn decrypt(key: &Arc<Key>, pieces: &[&[u8]]) -> (Vec<u8>, ResultKind) {
    let mut engine = DecryptEngine::new();
    engine.initialize(Arc::clone(key)).unwrap();
    let mut out = Vec::new();
    for piece in pieces {
        let mut buf = vec![0u8; engine.process_output_size(piece.len())];
        let n = engine.process(piece, &mut buf).unwrap();
        if let Some(result) = engine.result() {
            return (out, result.kind());
        }
        assert_eq!(n, buf.len());
        out.extend_from_slice(&buf);
    }
    let mut buf = vec![0u8; engine.final_output_size(0)];
    let n = engine.finalize(&[], &mut buf).unwrap();
    out.extend_from_slice(&buf[..n]);
    (out, engine.result().unwrap().kind())
}

proptest! {
    #[test]
    fn roundtrip_with_arbitrary_cuts(
        data in proptest::collection::vec(any::<u8>(), 0..=600),
        enc in 0usize..3,
        auth in 0usize..4,
        iv in any::<[u8; 16]>(),
        enc_cuts in proptest::collection::vec(any::<usize>(), 0..6),
        dec_cuts in proptest::collection::vec(any::<usize>(), 0..6),
    ) {
        let key = key(ENCRYPTION_BYTES[enc], AUTHENTICATION_BYTES[auth]);
        let whole = encrypt(&key, iv, &[data.as_slice()]);
        let pieced = encrypt(&key, iv, &cut(&data, &enc_cuts));
        prop_assert_eq!(&pieced, &whole, "ciphertext must not depend on cuts");

        let blocks = data.len() / 16 + 1;
        prop_assert_eq!(whole.len(), 18 + blocks * 18 + AUTHENTICATION_BYTES[auth]);

        let (plain, kind) = decrypt(&key, &cut(&whole, &dec_cuts));
        prop_assert_eq!(kind, ResultKind::Success);
        prop_assert_eq!(plain, data);
    }

    #[test]
    fn any_single_byte_change_is_rejected(
        data in proptest::collection::vec(any::<u8>(), 0..=100),
        position in any::<usize>(),
        flip in 1u8..=255,
        dec_cuts in proptest::collection::vec(any::<usize>(), 0..4),
    ) {
        let key = key(32, 32);
        let mut ct = encrypt(&key, [3u8; 16], &[data.as_slice()]);
        let position = position % ct.len();
        ct[position] ^= flip;

        let (_, kind) = decrypt(&key, &cut(&ct, &dec_cuts));
        prop_assert_ne!(kind, ResultKind::Success);
        let expected = match position {
            0 => ResultKind::UnsupportedVersion,
            1 => ResultKind::UnsupportedType,
            _ => ResultKind::InvalidMac,
        };
        prop_assert_eq!(kind, expected);
    }

    #[test]
    fn truncation_is_rejected(
        data in proptest::collection::vec(any::<u8>(), 0..=100),
        keep in any::<usize>(),
    ) {
        let key = key(16, 48);
        let ct = encrypt(&key, [5u8; 16], &[data.as_slice()]);
        let keep = keep % ct.len();
        let (_, kind) = decrypt(&key, &[&ct[..keep]]);
        prop_assert!(
            matches!(kind, ResultKind::InvalidSize | ResultKind::InvalidMac),
            "kept {} of {} bytes: {:?}", keep, ct.len(), kind
        );
    }
}
