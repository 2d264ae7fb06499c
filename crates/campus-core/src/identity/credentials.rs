//! Persisted session credentials.
//!
//! Stored in `<home>/credentials.json` with restricted permissions (0600),
//! keyed by issuer URL so several realms can coexist.
//! Tokens are never logged or displayed in full.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::paths;

pub(crate) fn now_millis_u64() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(u64::MAX)
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Tokens issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// The access token (short-lived)
    pub access: String,
    /// The refresh token, if the provider issued one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    /// Access token expiry in milliseconds since epoch
    pub expires: u64,
    /// Refresh token expiry in milliseconds since epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires: Option<u64>,
    /// ID token, used as a logout hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl Credentials {
    /// Returns true if the access token is expired.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::ZERO)
    }

    /// Returns true if the access token expires within `window`.
    pub fn expires_within(&self, window: Duration) -> bool {
        self.expires_within_at(window, now_millis_u64())
    }

    fn expires_within_at(&self, window: Duration, now_ms: u64) -> bool {
        now_ms.saturating_add(duration_millis(window)) >= self.expires
    }

    /// Returns true if a refresh token is present and not known to be expired.
    pub fn can_refresh(&self) -> bool {
        self.refresh.is_some()
            && self
                .refresh_expires
                .is_none_or(|expires| now_millis_u64() < expires)
    }

    /// Remaining access token lifetime (zero once expired).
    pub fn remaining(&self) -> Duration {
        Duration::from_millis(self.expires.saturating_sub(now_millis_u64()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialCache {
    #[serde(flatten)]
    issuers: HashMap<String, Credentials>,
}

/// File-backed credential store.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<home>/credentials.json`.
    pub fn default_location() -> Self {
        Self::new(paths::credentials_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the credentials for `issuer`, if any.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self, issuer: &str) -> Result<Option<Credentials>> {
        Ok(self.read_cache()?.issuers.remove(issuer))
    }

    /// Saves the credentials for `issuer`, keeping other issuers' entries.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, issuer: &str, creds: &Credentials) -> Result<()> {
        let mut cache = self.read_cache().unwrap_or_default();
        cache.issuers.insert(issuer.to_string(), creds.clone());
        self.write_cache(&cache)
    }

    /// Removes the credentials for `issuer`. Returns whether anything was removed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or written.
    pub fn clear(&self, issuer: &str) -> Result<bool> {
        let mut cache = self.read_cache()?;
        if cache.issuers.remove(issuer).is_none() {
            return Ok(false);
        }
        self.write_cache(&cache)?;
        Ok(true)
    }

    fn read_cache(&self) -> Result<CredentialCache> {
        if !self.path.exists() {
            return Ok(CredentialCache::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credentials from {}", self.path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials from {}", self.path.display()))
    }

    fn write_cache(&self, cache: &CredentialCache) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(cache).context("Failed to serialize credentials")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .with_context(|| format!("Failed to open {} for writing", self.path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.path, contents)
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        Ok(())
    }
}
