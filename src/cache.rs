//! Session cache persisted as a JSON file.
//!
//! The file holds one entry per account e-mail:
//!
//! ```json
//! { "me@example.com": { "url": "https://auth.tesla.com/", "sso": { "access_token": "..." } } }
//! ```
//!
//! It contains refresh tokens, so it is always written with owner-only
//! permissions. Otherwise a second user could read a refresh token, rotate it
//! on the server and then fail to store the replacement. A save goes to a
//! temporary file next to the cache that replaces it once complete, so the
//! token is never readable by others and a failed write leaves the old file.

use crate::auth::SsoToken;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, Write},
    path::Path,
};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to write session cache {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize session cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedSession {
    /// SSO service the token was issued by
    pub url: String,
    pub sso: SsoToken,

    /// Entries written by other tools sharing the cache file
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachedSession {
    pub fn new(url: impl Into<String>, sso: SsoToken) -> Self {
        Self {
            url: url.into(),
            sso,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SessionCache {
    sessions: BTreeMap<String, CachedSession>,
}

impl SessionCache {
    /// Loads the cache from disk.
    ///
    /// A missing file yields an empty cache. An unreadable or malformed file is
    /// logged and treated as empty; it is replaced on the next save.
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no session cache yet");
                return Self::default();
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "session cache is unreadable, ignoring it"
                );
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "session cache is malformed, ignoring it"
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(self)?;
        let write_err = |source| CacheError::Write {
            path: path.display().to_string(),
            source,
        };

        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(write_err)?;
                parent
            }
            None => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir).map_err(write_err)?;
        restrict_permissions(file.as_file()).map_err(write_err)?;
        file.write_all(json.as_bytes()).map_err(write_err)?;
        file.as_file().sync_all().map_err(write_err)?;
        file.persist(path).map_err(|e| write_err(e.error))?;

        debug!(path = %path.display(), sessions = self.sessions.len(), "session cache saved");
        Ok(())
    }

    pub fn get(&self, email: &str) -> Option<&CachedSession> {
        self.sessions.get(email)
    }

    pub fn insert(&mut self, email: impl Into<String>, session: CachedSession) {
        self.sessions.insert(email.into(), session);
    }

    pub fn remove(&mut self, email: &str) -> Option<CachedSession> {
        self.sessions.remove(email)
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}
