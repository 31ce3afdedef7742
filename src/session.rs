//! Session file handling
//!
//! Provides:
//! - File-based session locking to prevent parallel runs on one session
//! - Conversion between the on-disk session file and the portable token

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use fs2::FileExt;
use tracing::debug;

use crate::client::SessionToken;
use crate::error::{Error, Result};

/// Session lock guard that ensures exclusive access to the Telegram session.
pub struct SessionLock {
    lock_file: Option<File>,
    lock_path: PathBuf,
}

impl SessionLock {
    /// Acquire an exclusive lock at `lock_path`.
    pub fn acquire(lock_path: impl Into<PathBuf>) -> Result<Self> {
        let lock_path = lock_path.into();
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                lock_file: Some(lock_file),
                lock_path,
            }),
            Err(_) => {
                eprintln!(
                    r#"
⚠️  ERROR: the Telegram session is already in use by another run!

Telegram expects one client per session at a time.
Wait for the other run to finish and try again.
"#
                );
                Err(Error::SessionLocked)
            }
        }
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(ref file) = self.lock_file {
            let _ = file.unlock();
        }
        self.lock_file = None;
        let _ = fs::remove_file(&self.lock_path);
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Every SQLite database file starts with this header.
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

fn decode_token(token: &SessionToken) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(token.as_str())
        .map_err(|e| Error::InvalidSession(format!("malformed session token: {}", e)))
}

/// Check that a non-empty `token` decodes to a session database.
pub fn validate_token(token: &SessionToken) -> Result<()> {
    let bytes = decode_token(token)?;
    if !bytes.starts_with(SQLITE_HEADER) {
        return Err(Error::InvalidSession(
            "session token does not hold a session database".into(),
        ));
    }
    Ok(())
}

/// Encode the session file at `path` as a portable token.
pub fn export_token(path: &Path) -> Result<SessionToken> {
    let bytes = fs::read(path)?;
    Ok(SessionToken::new(URL_SAFE_NO_PAD.encode(bytes)))
}

/// Materialize `token` at `path`, replacing whatever was there.
///
/// An empty token removes the file so the next open starts a fresh login.
pub fn import_token(token: &SessionToken, path: &Path) -> Result<()> {
    if token.is_empty() {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed stale session file {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(Error::IoError(err)),
        }
        return Ok(());
    }

    let bytes = decode_token(token)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}
