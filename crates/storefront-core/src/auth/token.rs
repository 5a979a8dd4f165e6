use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Token file name in cache directory
const TOKEN_FILE: &str = "token.json";

/// Access token lifetime in minutes.
/// Matches the max-age the backend puts on its access cookie.
const ACCESS_TOKEN_LIFETIME_MINUTES: i64 = 60;

/// Name of the cookie the backend reads its JWT from.
pub const ACCESS_COOKIE: &str = "access_token";

/// How the backend handed the token over, and so how it wants it back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// From a login response body; replayed as `Authorization: Bearer`.
    #[default]
    Bearer,
    /// From the `access_token` cookie; replayed as that cookie.
    Cookie,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access: String,
    #[serde(default)]
    pub source: TokenSource,
    pub issued_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(access: String, source: TokenSource) -> Self {
        Self {
            access,
            source,
            issued_at: Utc::now(),
        }
    }

    pub fn bearer(access: impl Into<String>) -> Self {
        Self::new(access.into(), TokenSource::Bearer)
    }

    pub fn cookie(access: impl Into<String>) -> Self {
        Self::new(access.into(), TokenSource::Cookie)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::minutes(ACCESS_TOKEN_LIFETIME_MINUTES)
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        (self.expires_at() - Utc::now()).num_minutes().max(0)
    }
}

impl fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredToken")
            .field("access", &"<redacted>")
            .field("source", &self.source)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// The credential attached to outbound requests.
///
/// Shared between the HTTP client (reads it on every request) and whatever
/// logs in or out (writes it). When opened on a directory, every change is
/// written through to `token.json` there.
pub struct TokenStore {
    path: Option<PathBuf>,
    data: RwLock<Option<StoredToken>>,
}

impl TokenStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(None),
        }
    }

    /// Open the store persisted under `cache_dir`, loading a saved token.
    ///
    /// A missing, unreadable or expired token file leaves the store empty.
    pub fn open(cache_dir: PathBuf) -> Self {
        let store = Self {
            path: Some(cache_dir.join(TOKEN_FILE)),
            data: RwLock::new(None),
        };
        match store.load() {
            Ok(loaded) => debug!(loaded, "Token store opened"),
            Err(e) => warn!(error = %e, "Ignoring unreadable token file"),
        }
        store
    }

    /// Load the token from disk, returning whether a live token was found.
    pub fn load(&self) -> Result<bool> {
        let Some(ref path) = self.path else {
            return Ok(false);
        };
        if !path.exists() {
            return Ok(false);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read token file")?;
        let token: StoredToken =
            serde_json::from_str(&contents).context("Failed to parse token file")?;

        if token.is_expired() {
            debug!("Saved token has expired");
            return Ok(false);
        }

        *self.write() = Some(token);
        Ok(true)
    }

    /// Replace the held token and persist it.
    ///
    /// The in-memory token is replaced even when writing the file fails, so
    /// the current process stays logged in.
    pub fn store(&self, token: StoredToken) -> Result<()> {
        *self.write() = Some(token.clone());

        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create token directory")?;
        }
        let contents = serde_json::to_string_pretty(&token)?;
        std::fs::write(path, contents).context("Failed to write token file")?;
        Ok(())
    }

    /// Forget the token, removing the file if there is one.
    pub fn clear(&self) -> Result<()> {
        *self.write() = None;
        if let Some(ref path) = self.path {
            if path.exists() {
                std::fs::remove_file(path).context("Failed to remove token file")?;
            }
        }
        Ok(())
    }

    /// The access token to send, if one is held and still live.
    pub fn access_token(&self) -> Option<String> {
        self.live_token().map(|t| t.access)
    }

    /// The held token if it has not expired.
    pub fn live_token(&self) -> Option<StoredToken> {
        self.read().as_ref().filter(|t| !t.is_expired()).cloned()
    }

    pub fn token(&self) -> Option<StoredToken> {
        self.read().clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<StoredToken>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<StoredToken>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("path", &self.path)
            .field("token", &*self.read())
            .finish()
    }
}
