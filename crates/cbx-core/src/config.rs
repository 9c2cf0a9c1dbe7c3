use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use cbx_crypto::key::{AUTHENTICATION_SECRET_SIZES, ENCRYPTION_SECRET_SIZES};

use crate::error::{CbxError, CbxResult};

/// Top-level configuration (loaded from cbx.toml)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CbxConfig {
    pub logging: LoggingConfig,
    pub crypto: CryptoConfig,
    pub io: IoConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or EnvFilter directive (default: warn). RUST_LOG overrides.
    pub level: String,
    /// Log format: "json" or "text"
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Key document used when no --key is given
    pub key_file: Option<PathBuf>,
    /// AES key size for generate-key (128, 192 or 256)
    pub encryption_bits: usize,
    /// HMAC key size for generate-key (224, 256, 384 or 512)
    pub authentication_bits: usize,
    /// Treat ciphertext as base64url text on both encrypt output and decrypt input
    pub text_output: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Read buffer size in bytes for file streaming
    pub buffer_size: usize,
    /// Show a progress bar for file input
    pub progress: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: LogFormat::Text,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_file: None,
            encryption_bits: 256,
            authentication_bits: 512,
            text_output: false,
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            buffer_size: cbx_crypto::io::DEFAULT_BUFFER_SIZE,
            progress: true,
        }
    }
}

impl CbxConfig {
    pub fn from_toml_str(s: &str) -> CbxResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| CbxError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or defaults if the file does not exist.
    pub fn load_or_default(path: &Path) -> CbxResult<Self> {
        if !path.exists() {
            tracing::debug!("config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| CbxError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> CbxResult<()> {
        let bits_ok = |bits: usize, sizes: &[usize]| bits % 8 == 0 && sizes.contains(&(bits / 8));
        if !bits_ok(self.crypto.encryption_bits, &ENCRYPTION_SECRET_SIZES) {
            return Err(CbxError::Config(format!(
                "crypto.encryption_bits must be 128, 192 or 256 (got {})",
                self.crypto.encryption_bits
            )));
        }
        if !bits_ok(self.crypto.authentication_bits, &AUTHENTICATION_SECRET_SIZES) {
            return Err(CbxError::Config(format!(
                "crypto.authentication_bits must be 224, 256, 384 or 512 (got {})",
                self.crypto.authentication_bits
            )));
        }
        if self.io.buffer_size == 0 {
            return Err(CbxError::Config("io.buffer_size must be non-zero".into()));
        }
        Ok(())
    }
}
