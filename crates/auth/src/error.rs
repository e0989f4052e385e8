// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use reqwest::StatusCode;
use thiserror::Error;

use crate::store::StorageError;

/// Errors surfaced by the session manager and the request pipeline.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The login endpoint rejected the supplied credentials.
    #[error("authentication failed ({status}): {message}")]
    AuthenticationFailed { status: StatusCode, message: String },

    /// Another caller already owns the in-flight refresh. Callers should wait
    /// on [`crate::session::SessionManager::subscribe_refresh_outcome`] instead.
    #[error("token refresh already in progress")]
    RefreshAlreadyInProgress,

    /// No refresh credential is stored; the session has been logged out.
    #[error("no refresh credential available")]
    NoRefreshCredential,

    /// The refresh endpoint rejected the refresh credential; the session has
    /// been logged out.
    #[error("refresh rejected ({status}): {message}")]
    RefreshRejected { status: StatusCode, message: String },

    /// A request was waiting on someone else's refresh and that refresh failed.
    #[error("refresh failed while waiting: {reason}")]
    RefreshAborted { reason: String },

    /// The server answered 401 and the credential could not be refreshed.
    #[error("authorization denied for {url}: {message}")]
    AuthorizationDenied { url: String, message: String },

    /// Any other non-success status.
    #[error("request to {url} failed ({status}): {message}")]
    Status { status: StatusCode, url: String, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("credential storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            Self::RefreshAlreadyInProgress => "REFRESH_ALREADY_IN_PROGRESS",
            Self::NoRefreshCredential => "NO_REFRESH_CREDENTIAL",
            Self::RefreshRejected { .. } => "REFRESH_REJECTED",
            Self::RefreshAborted { .. } => "REFRESH_ABORTED",
            Self::AuthorizationDenied { .. } => "AUTHORIZATION_DENIED",
            Self::Status { .. } => "STATUS",
            Self::Transport(_) => "TRANSPORT",
            Self::Decode(_) => "DECODE",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::InvalidUrl { .. } => "INVALID_URL",
        }
    }

    /// HTTP status carried by the error, if the server produced one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::AuthenticationFailed { status, .. }
            | Self::RefreshRejected { status, .. }
            | Self::Status { status, .. } => Some(*status),
            Self::AuthorizationDenied { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Whether the caller should send the user back to the login screen.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationDenied { .. }
                | Self::NoRefreshCredential
                | Self::RefreshRejected { .. }
                | Self::RefreshAborted { .. }
        )
    }
}

/// Pull a human-readable message out of an error response body.
///
/// Prefers a JSON `message` or `error` field, then the raw text, then the
/// canonical reason phrase.
pub fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                return msg.to_owned();
            }
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_owned();
    if !text.is_empty() {
        return text;
    }
    status.canonical_reason().unwrap_or("unknown error").to_owned()
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
