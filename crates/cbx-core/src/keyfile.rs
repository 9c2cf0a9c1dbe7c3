//! Key documents on disk
//!
//! Key files hold the JSON document produced by [`Key::to_json`]. They are
//! written owner-only (0600) on Unix, and loading one that group or other can
//! read logs a warning.

use std::path::Path;

use cbx_crypto::Key;
use zeroize::Zeroizing;

use crate::error::{CbxError, CbxResult};

/// Write `key` to `path`. Refuses to replace an existing file unless `overwrite`.
pub fn save_key(path: &Path, key: &Key, overwrite: bool) -> CbxResult<()> {
    if path.exists() && !overwrite {
        return Err(CbxError::Config(format!(
            "refusing to overwrite existing key file: {}",
            path.display()
        )));
    }
    let json = Zeroizing::new(key.to_json()?);
    write_secure(path, json.as_bytes())?;
    tracing::debug!(path = %path.display(), "wrote key file");
    Ok(())
}

pub fn load_key(path: &Path) -> CbxResult<Key> {
    warn_if_readable_by_others(path);
    let json = Zeroizing::new(std::fs::read_to_string(path)?);
    Ok(Key::from_json(&json)?)
}

#[cfg(unix)]
fn write_secure(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content)
}

#[cfg(not(unix))]
fn write_secure(path: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, content)
}

#[cfg(unix)]
fn warn_if_readable_by_others(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(
                path = %path.display(),
                mode = %format!("{:o}", mode & 0o777),
                "key file is accessible by group or others"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_readable_by_others(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Key {
        Key::new(
            vec![1u8; 16],
            vec![2u8; 32],
            Some("test".into()),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        save_key(&path, &key(), false).unwrap();

        let loaded = load_key(&path).unwrap();
        assert_eq!(loaded.encryption_secret(), &[1u8; 16]);
        assert_eq!(loaded.authentication_secret(), &[2u8; 32]);
        assert_eq!(loaded.name(), Some("test"));
    }

    #[test]
    fn test_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        save_key(&path, &key(), false).unwrap();
        assert!(matches!(
            save_key(&path, &key(), false),
            Err(CbxError::Config(_))
        ));
        save_key(&path, &key(), true).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        save_key(&path, &key(), false).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_key(&path), Err(CbxError::Key(_))));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_key(&dir.path().join("absent.json")),
            Err(CbxError::Io(_))
        ));
    }
}
