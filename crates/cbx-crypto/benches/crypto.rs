use std::sync::Arc;

use cbx_crypto::{BoundCrypter, Cipher, DecryptEngine, Key, OsRandomSource};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn crypter() -> BoundCrypter {
    let key = Key::new(vec![0x11; 32], vec![0x22; 64], None, None).unwrap();
    BoundCrypter::new(Arc::new(key), Arc::new(OsRandomSource))
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let crypter = crypter();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| crypter.encrypt(divan::black_box(&data)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_buffered(bencher: divan::Bencher, size: usize) {
    let crypter = crypter();
    let encrypted = crypter.encrypt(&make_data(size)).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| crypter.decrypt(divan::black_box(&encrypted)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt_streaming(bencher: divan::Bencher, size: usize) {
    let crypter = crypter();
    let encrypted = crypter.encrypt(&make_data(size)).unwrap();
    let mut out = vec![0u8; size + 16];
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench_local(|| {
            let mut engine = DecryptEngine::new();
            engine.initialize(Arc::clone(crypter.key())).unwrap();
            engine
                .finalize(divan::black_box(&encrypted), &mut out)
                .unwrap()
        });
}

fn main() {
    divan::main();
}
