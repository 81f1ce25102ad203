//! Durable key/value backends for client-side secrets and preferences.
//!
//! Each backend stores plain strings under fixed key names. Which backend a
//! [`crate::credentials::CredentialContext`] uses is decided when it is
//! constructed: [`FileStorage`] for the CLI, [`MemoryStorage`] for tests and
//! embedded use, [`NoopStorage`] where nothing may be persisted at all.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

/// Storage key for the bearer session token.
pub const TOKEN_KEY: &str = "expenseowl_token";

/// Storage key for the user's cipher secret.
pub const CIPHER_KEY: &str = "expenseowl_cipher";

/// Storage key for the UI theme preference.
pub const THEME_KEY: &str = "theme";

/// Keys holding credentials; their files are expected to be 0600.
const SECRET_KEYS: [&str; 2] = [TOKEN_KEY, CIPHER_KEY];

pub trait SecretStorage: Send + Sync {
    /// Read the value stored under `key`. Never fails: unreadable entries are
    /// reported as absent.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// Remove `key`. Removing a missing key succeeds.
    fn delete(&self, key: &str) -> io::Result<()>;
}

/// In-process storage. Values live as long as the instance.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecretStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Storage for environments with no durable storage. Reads are always absent
/// and writes are discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStorage;

impl SecretStorage for NoopStorage {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) -> io::Result<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> io::Result<()> {
        Ok(())
    }
}

/// One file per key inside a state directory.
///
/// Files are replaced atomically (write to a temp file, then rename) and are
/// restricted to owner read/write on Unix, since they hold the session token
/// and the cipher secret in the clear.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl SecretStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                if SECRET_KEYS.contains(&key) {
                    if let Some(mode) = insecure_mode(&path) {
                        warn!(
                            path = %path.display(),
                            mode = %format!("{mode:04o}"),
                            "secret file is readable by other users (expected 0600); fix with chmod 600"
                        );
                    }
                }
                Some(content)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable storage entry treated as absent");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        write_atomic(&self.path_for(key), value.as_bytes())
    }

    fn delete(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Write `contents` to `dest` via a sibling temp file and rename, then enforce
/// 0600 on Unix.
fn write_atomic(dest: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| io::Error::other("storage path has no parent directory"))?;
    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::other("storage path has no file name"))?;
    let tmp = parent.join(format!(".{file_name}.tmp"));

    std::fs::write(&tmp, contents)?;
    restrict_permissions(&tmp)?;

    if let Err(e) = std::fs::rename(&tmp, dest) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Permission bits of `path` if they allow group or other access (Unix only).
#[cfg(unix)]
pub fn insecure_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path).ok()?.permissions().mode() & 0o777;
    (mode != 0o600).then_some(mode)
}

#[cfg(not(unix))]
pub fn insecure_mode(_path: &Path) -> Option<u32> {
    None
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
