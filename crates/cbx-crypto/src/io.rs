//! Drive an engine over `std::io` readers and writers

use std::io::{ErrorKind, Read, Write};

use anyhow::{Context, Result};

use crate::cipher::Cipher;
use crate::decrypt::DecryptEngine;
use crate::encrypt::EncryptEngine;
use crate::result::CipherResult;

/// Read buffer size used by [`encrypt_stream`] and [`decrypt_stream`]
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Byte counts of one pass over a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Encrypt everything `reader` yields into `writer`. `engine` must be initialized.
pub fn encrypt_stream<R: Read, W: Write>(
    engine: &mut EncryptEngine,
    reader: R,
    writer: W,
) -> Result<StreamStats> {
    pump(engine, reader, writer, DEFAULT_BUFFER_SIZE)
}

/// Decrypt everything `reader` yields into `writer`.
///
/// Plaintext is written as it is released, before the trailer is checked.
/// Whatever reached `writer` must be discarded unless the returned result is
/// successful.
pub fn decrypt_stream<R: Read, W: Write>(
    engine: &mut DecryptEngine,
    reader: R,
    writer: W,
) -> Result<CipherResult> {
    decrypt_stream_with_buffer(engine, reader, writer, DEFAULT_BUFFER_SIZE)
}

pub fn decrypt_stream_with_buffer<R: Read, W: Write>(
    engine: &mut DecryptEngine,
    reader: R,
    writer: W,
    buffer_size: usize,
) -> Result<CipherResult> {
    pump(engine, reader, writer, buffer_size)?;
    engine
        .result()
        .cloned()
        .context("decrypt engine produced no result")
}

/// Feed `reader` through `engine` in `buffer_size` reads, then finalize.
///
/// Stops early, without error, if the engine finalizes itself on rejected input.
pub fn pump<C: Cipher, R: Read, W: Write>(
    engine: &mut C,
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
) -> Result<StreamStats> {
    let mut input = vec![0u8; buffer_size.max(1)];
    let mut output = Vec::new();
    let mut stats = StreamStats::default();

    loop {
        let n = match reader.read(&mut input) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("reading input"),
        };
        stats.bytes_read += n as u64;

        output.resize(engine.process_output_size(n), 0);
        let written = engine
            .process(&input[..n], &mut output)
            .context("processing input")?;
        if engine.result().is_some() {
            tracing::debug!(bytes_read = stats.bytes_read, "stream rejected early");
            return Ok(stats);
        }
        writer
            .write_all(&output[..written])
            .context("writing output")?;
        stats.bytes_written += written as u64;
    }

    output.resize(engine.final_output_size(0), 0);
    let written = engine
        .finalize(&[], &mut output)
        .context("finalizing stream")?;
    writer
        .write_all(&output[..written])
        .context("writing output")?;
    writer.flush().context("flushing output")?;
    stats.bytes_written += written as u64;

    tracing::debug!(
        bytes_read = stats.bytes_read,
        bytes_written = stats.bytes_written,
        "stream complete"
    );
    Ok(stats)
}
