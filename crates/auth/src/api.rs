// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth endpoint wire types.

use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// An access credential as issued by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    /// Lifetime in milliseconds.
    pub expires_in: u64,
    /// Rotated refresh credential, when the backend issues one in the body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Response of `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub id: String,
    pub name: String,
    pub token: AccessToken,
}

/// The authenticated user, as returned to callers of `login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
}

impl From<&LoginResponse> for Profile {
    fn from(resp: &LoginResponse) -> Self {
        Self { id: resp.id.clone(), name: resp.name.clone() }
    }
}

/// Absolute URLs of the auth endpoints.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    pub base: Url,
    pub login: Url,
    pub refresh: Url,
    pub logout: Url,
}
