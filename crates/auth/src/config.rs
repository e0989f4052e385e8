// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Url;

use crate::api::AuthEndpoints;
use crate::error::AuthError;

/// Configuration for the auth client.
#[derive(Debug, Clone, clap::Args)]
pub struct AuthConfig {
    /// Base URL of the backend API.
    #[arg(long, default_value = "http://127.0.0.1:3000", env = "SCMS_API_URL")]
    pub api_url: String,

    /// Login endpoint path.
    #[arg(long, default_value = "/api/v1/auth/login", env = "SCMS_LOGIN_PATH")]
    pub login_path: String,

    /// Refresh endpoint path.
    #[arg(long, default_value = "/api/v1/auth/refresh", env = "SCMS_REFRESH_PATH")]
    pub refresh_path: String,

    /// Logout endpoint path.
    #[arg(long, default_value = "/api/v1/auth/logout", env = "SCMS_LOGOUT_PATH")]
    pub logout_path: String,

    /// Per-request transport timeout in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "SCMS_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Directory for persisted session and cookie files.
    #[arg(long, env = "SCMS_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, env = "SCMS_LOG_JSON")]
    pub log_json: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000".to_owned(),
            login_path: "/api/v1/auth/login".to_owned(),
            refresh_path: "/api/v1/auth/refresh".to_owned(),
            logout_path: "/api/v1/auth/logout".to_owned(),
            timeout_ms: 30_000,
            state_dir: None,
            log_json: false,
        }
    }
}

impl AuthConfig {
    /// Config pointing every endpoint at `api_url`, otherwise defaults.
    pub fn for_api(api_url: impl Into<String>) -> Self {
        Self { api_url: api_url.into(), ..Self::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve the state directory.
    ///
    /// Uses `--state-dir`/`SCMS_STATE_DIR`, then `$XDG_STATE_HOME/scms`,
    /// then `$HOME/.local/state/scms`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("scms");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/scms");
        }
        PathBuf::from(".scms")
    }

    pub fn session_path(&self) -> PathBuf {
        self.state_dir().join("session.json")
    }

    pub fn cookie_path(&self) -> PathBuf {
        self.state_dir().join("cookies.json")
    }

    pub fn base_url(&self) -> Result<Url, AuthError> {
        Url::parse(&self.api_url)
            .map_err(|e| AuthError::InvalidUrl { url: self.api_url.clone(), reason: e.to_string() })
    }

    /// Resolve a path (or absolute URL) against the API base.
    pub fn resolve(&self, path: &str) -> Result<Url, AuthError> {
        self.base_url()?
            .join(path)
            .map_err(|e| AuthError::InvalidUrl { url: path.to_owned(), reason: e.to_string() })
    }

    pub fn endpoints(&self) -> Result<AuthEndpoints, AuthError> {
        Ok(AuthEndpoints {
            base: self.base_url()?,
            login: self.resolve(&self.login_path)?,
            refresh: self.resolve(&self.refresh_path)?,
            logout: self.resolve(&self.logout_path)?,
        })
    }
}

/// Command-line client for the SCMS backend.
#[derive(Debug, Parser)]
#[command(name = "scms-auth", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub config: AuthConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Log in and store the issued credentials.
    Login {
        #[arg(long, env = "SCMS_EMAIL")]
        email: String,
        #[arg(long, env = "SCMS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log out and clear stored credentials.
    Logout,
    /// Print session status as JSON.
    Status,
    /// Send an authenticated request and print the response body.
    Request {
        /// HTTP method (GET, POST, PATCH, ...).
        method: String,
        /// Path relative to the API URL.
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
    },
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
