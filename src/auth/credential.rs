//! The cached OAuth credential.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::fs_utils::write_atomic;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// A bearer token and the instant it stops being valid.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Successful response from the token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl Credential {
    /// Build a credential from a token endpoint response received at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Auth`] if `expires_in` is negative or does not
    /// fit in a representable timestamp.
    pub fn from_token_response(response: TokenResponse, now: DateTime<Utc>) -> Result<Self> {
        let expires_in = response.expires_in.unwrap_or_else(|| {
            debug!("Token response has no expires_in, assuming one hour");
            DEFAULT_EXPIRES_IN_SECS
        });
        if expires_in < 0 {
            return Err(ArchiveError::Auth(format!("invalid expires_in: {expires_in}")));
        }
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| ArchiveError::Auth(format!("invalid expires_in: {expires_in}")))?;

        Ok(Self {
            access_token: response.access_token,
            expires_at,
            scope: response.scope.unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Read the credential cache.
///
/// Returns `None` when the file is missing. A cache that cannot be read or
/// parsed is logged and also treated as absent.
pub async fn load_credential(path: &Path) -> Option<Credential> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read token cache");
            return None;
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(credential) => Some(credential),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt token cache");
            None
        }
    }
}

/// Persist the credential cache atomically.
///
/// # Errors
///
/// Returns [`ArchiveError::Filesystem`] if the cache cannot be written.
pub async fn save_credential(path: &Path, credential: &Credential) -> Result<()> {
    let json = serde_json::to_vec_pretty(credential)
        .map_err(|e| ArchiveError::filesystem(path, std::io::Error::other(e)))?;
    write_atomic(path, &json).await
}
