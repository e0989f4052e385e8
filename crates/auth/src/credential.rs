// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access/refresh credential persistence.
//!
//! The access credential and its absolute expiry live in [`SessionStorage`];
//! the refresh credential lives in the [`CookieJar`]. Expiry checks fail
//! closed: no expiry, or one that does not parse, means expired.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::store::{CookieJar, SessionStorage, StorageError};

/// Session-storage key for the access credential.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Session-storage key for the access credential's expiry (epoch millis).
pub const ACCESS_TOKEN_EXPIRES_KEY: &str = "accessTokenExpires";
/// Cookie name of the refresh credential.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

pub struct CredentialStore {
    session: Arc<dyn SessionStorage>,
    cookies: Arc<dyn CookieJar>,
}

impl CredentialStore {
    pub fn new(session: Arc<dyn SessionStorage>, cookies: Arc<dyn CookieJar>) -> Self {
        Self { session, cookies }
    }

    /// Store the access credential with an absolute expiry of `now + ttl`.
    pub fn save(&self, credential: &str, ttl: Duration) -> Result<u64, StorageError> {
        let expires_at = epoch_ms().saturating_add(ttl.as_millis() as u64);
        self.session.set(ACCESS_TOKEN_KEY, credential)?;
        self.session.set(ACCESS_TOKEN_EXPIRES_KEY, &expires_at.to_string())?;
        debug!(expires_at, "access credential saved");
        Ok(expires_at)
    }

    pub fn read(&self) -> Result<Option<String>, StorageError> {
        self.session.get(ACCESS_TOKEN_KEY)
    }

    /// Stored expiry in epoch millis, `None` if missing or unparsable.
    pub fn expires_at(&self) -> Result<Option<u64>, StorageError> {
        let Some(raw) = self.session.get(ACCESS_TOKEN_EXPIRES_KEY)? else {
            return Ok(None);
        };
        match raw.trim().parse::<u64>() {
            Ok(ms) => Ok(Some(ms)),
            Err(e) => {
                warn!(value = %raw, "unparsable access credential expiry: {e}");
                Ok(None)
            }
        }
    }

    /// True when no usable expiry is stored or `expiry <= now`.
    pub fn is_expired(&self) -> Result<bool, StorageError> {
        Ok(match self.expires_at()? {
            Some(expires_at) => expires_at <= epoch_ms(),
            None => true,
        })
    }

    /// Remove both access keys and the refresh cookie.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.session.remove(ACCESS_TOKEN_KEY)?;
        self.session.remove(ACCESS_TOKEN_EXPIRES_KEY)?;
        self.cookies.delete(REFRESH_TOKEN_COOKIE)?;
        Ok(())
    }

    pub fn read_refresh_credential(&self) -> Result<Option<String>, StorageError> {
        Ok(self.cookies.get(REFRESH_TOKEN_COOKIE)?.filter(|v| !v.is_empty()))
    }

    pub fn save_refresh_credential(&self, value: &str) -> Result<(), StorageError> {
        self.cookies.set(REFRESH_TOKEN_COOKIE, value)
    }

    pub fn clear_refresh_credential(&self) -> Result<(), StorageError> {
        self.cookies.delete(REFRESH_TOKEN_COOKIE)
    }

    /// Expiry of the refresh credential in epoch millis.
    ///
    /// The cookie may carry a JSON payload `{"expires": <epoch seconds>}`.
    /// Anything else yields `None`.
    pub fn read_refresh_expiry(&self) -> Result<Option<u64>, StorageError> {
        let Some(raw) = self.read_refresh_credential()? else {
            return Ok(None);
        };
        let payload: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("refresh cookie is not a JSON payload: {e}");
                return Ok(None);
            }
        };
        match payload.get("expires").and_then(serde_json::Value::as_f64) {
            Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some((secs * 1000.0) as u64)),
            _ => {
                warn!("refresh cookie payload has no numeric expires");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
