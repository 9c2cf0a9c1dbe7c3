//! cbx: Cipherbox command-line client
//!
//! Commands:
//!   generate-key [--out <path>]         - create a key document
//!   encrypt [<input>] [-o <output>]     - encrypt a file or stdin
//!   decrypt [<input>] [-o <output>]     - verify and decrypt a file or stdin
//!   config show                         - display current configuration
//!
//! Decrypted output is never left behind unless the whole message verified:
//! file output goes through a `.partial` sibling that is renamed on success,
//! and stdout output is buffered until the trailer checks out.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cbx_core::config::{CbxConfig, LogFormat};
use cbx_core::{keyfile, CbxError};
use cbx_crypto::io::{decrypt_stream_with_buffer, pump};
use cbx_crypto::{
    Cipher, DecryptEngine, Decrypter, EncryptEngine, EncryptParameters, Encrypter, Key,
    KeyFactory, OsRandomSource,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cbx",
    version,
    about = "Cipherbox authenticated encryption",
    long_about = "cbx: encrypt and decrypt files with AES-CBC and chunked HMAC authentication"
)]
struct Cli {
    /// Path to cbx.toml configuration file
    #[arg(long, short = 'c', env = "CBX_CONFIG", default_value = "cbx.toml")]
    config: PathBuf,

    /// Log level or filter directive (overrides config)
    #[arg(long, env = "CBX_LOG")]
    log: Option<String>,

    /// Log format (overrides config)
    #[arg(long, env = "CBX_LOG_FORMAT")]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormatArg {
    Json,
    Text,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Text => LogFormat::Text,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new key document
    #[command(name = "generate-key")]
    GenerateKey {
        /// Where to write the key (default: crypto.key_file, else stdout)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        /// AES key size in bits: 128, 192 or 256 (default from config)
        #[arg(long)]
        encryption_bits: Option<usize>,
        /// HMAC key size in bits: 224, 256, 384 or 512 (default from config)
        #[arg(long)]
        authentication_bits: Option<usize>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Replace an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Encrypt a file or stdin
    Encrypt {
        /// Input file (default: stdin)
        input: Option<PathBuf>,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Key document (overrides crypto.key_file)
        #[arg(long, short = 'k', env = "CBX_KEY_FILE")]
        key: Option<PathBuf>,
        /// Write base64url text instead of raw bytes
        #[arg(long)]
        text: bool,
    },

    /// Verify and decrypt a file or stdin
    Decrypt {
        /// Input file (default: stdin)
        input: Option<PathBuf>,
        /// Output file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Key document (overrides crypto.key_file)
        #[arg(long, short = 'k', env = "CBX_KEY_FILE")]
        key: Option<PathBuf>,
        /// Input is base64url text
        #[arg(long)]
        text: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    let format = cli
        .log_format
        .map(LogFormat::from)
        .unwrap_or(config.logging.format);
    init_logging(level, format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "cbx starting"
    );

    match cli.command {
        Commands::GenerateKey {
            out,
            encryption_bits,
            authentication_bits,
            name,
            description,
            force,
        } => cmd_generate_key(
            &config,
            out.as_deref(),
            encryption_bits,
            authentication_bits,
            name,
            description,
            force,
        ),
        Commands::Encrypt {
            input,
            output,
            key,
            text,
        } => {
            let key = resolve_key(&config, key.as_deref())?;
            cmd_encrypt(&config, &key, input.as_deref(), output.as_deref(), text)
        }
        Commands::Decrypt {
            input,
            output,
            key,
            text,
        } => {
            let key = resolve_key(&config, key.as_deref())?;
            cmd_decrypt(&config, &key, input.as_deref(), output.as_deref(), text)
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout may carry ciphertext or plaintext, so logs always go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

fn load_config(path: &Path) -> Result<CbxConfig> {
    CbxConfig::load_or_default(path)
        .with_context(|| format!("loading config: {}", path.display()))
}

fn resolve_key(config: &CbxConfig, cli_key: Option<&Path>) -> Result<Arc<Key>> {
    let path = cli_key
        .or(config.crypto.key_file.as_deref())
        .context("no key given\nPass --key <file> or set crypto.key_file in the config.")?;
    let key = keyfile::load_key(path)
        .with_context(|| format!("loading key: {}", path.display()))?;
    Ok(Arc::new(key))
}

// ── Progress ──────────────────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        )
        .context("progress template")?
        .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    Ok(pb)
}

/// Open `input` (or stdin), wrapped in a progress bar for files when enabled.
fn open_input(
    config: &CbxConfig,
    input: Option<&Path>,
    prefix: &str,
) -> Result<(Box<dyn Read>, Option<ProgressBar>)> {
    let Some(path) = input else {
        return Ok((Box::new(io::stdin().lock()), None));
    };
    let file = File::open(path)
        .with_context(|| format!("opening input: {}", path.display()))?;
    if !config.io.progress {
        return Ok((Box::new(BufReader::new(file)), None));
    }
    let len = file
        .metadata()
        .with_context(|| format!("reading metadata: {}", path.display()))?
        .len();
    let pb = make_progress_bar(len, prefix)?;
    let reader = pb.wrap_read(BufReader::new(file));
    Ok((Box::new(reader), Some(pb)))
}

/// Plaintext destinations (`private`) are created owner-only on Unix.
fn open_output(output: Option<&Path>, private: bool) -> Result<Box<dyn Write>> {
    match output {
        Some(path) => {
            let file = if private {
                create_private(path)
            } else {
                File::create(path)
            };
            let file = file
                .with_context(|| format!("creating output: {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

// ── `cbx generate-key` ────────────────────────────────────────────────────────

fn cmd_generate_key(
    config: &CbxConfig,
    out: Option<&Path>,
    encryption_bits: Option<usize>,
    authentication_bits: Option<usize>,
    name: Option<String>,
    description: Option<String>,
    force: bool,
) -> Result<()> {
    let factory = KeyFactory::new(Arc::new(OsRandomSource));
    let key = factory
        .generate_key(
            encryption_bits.unwrap_or(config.crypto.encryption_bits),
            authentication_bits.unwrap_or(config.crypto.authentication_bits),
            name,
            description,
        )
        .map_err(CbxError::from)?;

    match out.or(config.crypto.key_file.as_deref()) {
        Some(path) => {
            keyfile::save_key(path, &key, force)
                .with_context(|| format!("writing key: {}", path.display()))?;
            eprintln!("key written to {}", path.display());
        }
        None => println!("{}", key.to_json().map_err(CbxError::from)?),
    }
    Ok(())
}

// ── `cbx encrypt` ─────────────────────────────────────────────────────────────

fn cmd_encrypt(
    config: &CbxConfig,
    key: &Arc<Key>,
    input: Option<&Path>,
    output: Option<&Path>,
    text: bool,
) -> Result<()> {
    let text = text || config.crypto.text_output;
    let (reader, pb) = open_input(config, input, "encrypt")?;
    let mut writer = open_output(output, false)?;

    if text {
        let plaintext = read_all(reader)?;
        let encoded = Encrypter::new(Arc::new(OsRandomSource))
            .encrypt_to_string(key, &plaintext)
            .map_err(CbxError::from)?;
        writeln!(writer, "{encoded}").context("writing output")?;
        writer.flush().context("flushing output")?;
    } else {
        let mut engine = EncryptEngine::new(Arc::new(OsRandomSource));
        engine
            .initialize(EncryptParameters::new(Arc::clone(key)))
            .map_err(CbxError::from)?;
        let stats = pump(&mut engine, reader, &mut writer, config.io.buffer_size)?;
        tracing::info!(
            bytes_in = stats.bytes_read,
            bytes_out = stats.bytes_written,
            "encrypted"
        );
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    Ok(())
}

// ── `cbx decrypt` ─────────────────────────────────────────────────────────────

fn cmd_decrypt(
    config: &CbxConfig,
    key: &Arc<Key>,
    input: Option<&Path>,
    output: Option<&Path>,
    text: bool,
) -> Result<()> {
    let text = text || config.crypto.text_output;
    let (reader, pb) = open_input(config, input, "decrypt")?;

    let outcome = match output {
        Some(path) if !text => decrypt_to_file(config, key, reader, path),
        _ => decrypt_buffered(key, reader, output, text),
    };

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    outcome
}

/// Stream into an owner-only `<path>.partial`, then rename into place once verified.
fn decrypt_to_file(
    config: &CbxConfig,
    key: &Arc<Key>,
    reader: impl Read,
    path: &Path,
) -> Result<()> {
    let partial = partial_path(path);
    let file = create_private(&partial)
        .with_context(|| format!("creating output: {}", partial.display()))?;

    let mut engine = DecryptEngine::new();
    engine.initialize(Arc::clone(key)).map_err(CbxError::from)?;
    let result = decrypt_stream_with_buffer(
        &mut engine,
        reader,
        BufWriter::new(file),
        config.io.buffer_size,
    );

    match result {
        Ok(result) if result.is_successful() => {
            std::fs::rename(&partial, path)
                .with_context(|| format!("moving output into place: {}", path.display()))?;
            Ok(())
        }
        Ok(result) => {
            discard(&partial);
            Err(CbxError::Rejected(result.kind()).into())
        }
        Err(e) => {
            discard(&partial);
            Err(e)
        }
    }
}

fn decrypt_buffered(
    key: &Arc<Key>,
    reader: impl Read,
    output: Option<&Path>,
    text: bool,
) -> Result<()> {
    let input = read_all(reader)?;
    let decrypter = Decrypter::new();
    let result = if text {
        let encoded = std::str::from_utf8(&input).context("text input is not UTF-8")?;
        decrypter.decrypt_str(key, encoded)
    } else {
        decrypter.decrypt(key, &input)
    };
    let result = result.map_err(CbxError::from)?;

    if !result.is_successful() {
        return Err(CbxError::Rejected(result.kind()).into());
    }
    let mut writer = open_output(output, true)?;
    writer
        .write_all(result.data().unwrap_or_default())
        .context("writing output")?;
    writer.flush().context("flushing output")?;
    Ok(())
}

#[cfg(unix)]
fn create_private(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> io::Result<File> {
    File::create(path)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), "failed to remove partial output: {e}");
    }
}

fn read_all(mut reader: impl Read) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("reading input")?;
    Ok(buf)
}

// ── `cbx config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &CbxConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
