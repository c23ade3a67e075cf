//! OAuth access token and its on-disk cache.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A token expiring within this many seconds is treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// OAuth2 bearer token with the refresh token that renews it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Bearer access token.
    pub access_token: String,
    /// Refresh token (used to obtain new access tokens).
    pub refresh_token: Option<String>,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Expiry time; `None` means the issuer gave no lifetime.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    pub scope: Option<String>,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_at: None,
            scope: None,
        }
    }
}

impl Token {
    /// Usable right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Usable at `now`: has an access token that does not expire within the skew.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expires_at {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }
}

/// Load the cached token, or `None` if the cache file does not exist yet.
pub fn load_token(path: &Path) -> Result<Option<Token>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };

    let token: Token = bincode::deserialize(&bytes).map_err(|e| Error::TokenCache {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    tracing::debug!(path = %path.display(), "Loaded cached token");
    Ok(Some(token))
}

/// Persist the token, replacing any previous cache file.
pub fn save_token(path: &Path, token: &Token) -> Result<()> {
    let bytes = bincode::serialize(token).map_err(|e| Error::TokenCache {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::write(path, bytes).map_err(|e| Error::io(path, e))?;
    tracing::info!(path = %path.display(), "Saved token");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_in_secs: Option<i64>) -> Token {
        Token {
            access_token: "ya29.test".into(),
            refresh_token: Some("1//refresh".into()),
            expires_at: expires_in_secs.map(|s| Utc::now() + Duration::seconds(s)),
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_token_is_valid() {
        assert!(token(Some(3600)).is_valid());
        assert!(token(None).is_valid());
    }

    #[test]
    fn test_expired_and_nearly_expired() {
        let now = Utc::now();
        assert!(!token(Some(-10)).is_valid_at(now));
        // inside the skew window
        assert!(!token(Some(30)).is_valid_at(now));
        assert!(token(None).is_valid_at(now + Duration::days(365)));
    }

    #[test]
    fn test_empty_access_token_is_invalid() {
        let t = Token::default();
        assert!(!t.is_valid());
        assert_eq!(t.token_type, "Bearer");
    }

    #[test]
    fn test_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.bin");
        assert!(load_token(&path).unwrap().is_none());

        let t = token(Some(3600));
        save_token(&path, &t).unwrap();
        assert_eq!(load_token(&path).unwrap(), Some(t));
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.bin");
        std::fs::write(&path, b"\x01").unwrap();
        assert!(matches!(load_token(&path), Err(Error::TokenCache { .. })));
    }
}
