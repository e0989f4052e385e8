// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! scms-auth: authenticated request pipeline for the SCMS backend.
//!
//! Bearer credential attachment, local expiry detection, single-flight
//! refresh shared by all in-flight requests, one replay after refresh, and
//! forced logout when refresh fails.

pub mod api;
pub mod config;
pub mod credential;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod transport;


use std::io::Write;
use std::sync::Arc;

use reqwest::Method;

use crate::api::LoginRequest;
use crate::config::{AuthConfig, Cli, Command};
use crate::credential::CredentialStore;
use crate::error::AuthError;
use crate::pipeline::AuthPipeline;
use crate::session::SessionManager;
use crate::store::FileStorage;
use crate::transport::{ReqwestTransport, Transport};

/// Build a pipeline over file-backed stores under the configured state dir.
pub fn connect(config: &AuthConfig) -> Result<AuthPipeline, AuthError> {
    let session_store = Arc::new(FileStorage::open(config.session_path())?);
    let cookie_jar = Arc::new(FileStorage::open(config.cookie_path())?);
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config.timeout())?);
    let session = SessionManager::new(
        config.endpoints()?,
        Arc::clone(&transport),
        CredentialStore::new(session_store, cookie_jar),
    )?;
    Ok(AuthPipeline::new(session, transport))
}

/// Run one CLI command to completion.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let pipeline = connect(&cli.config)?;
    let session = pipeline.session();

    match cli.command {
        Command::Login { email, password } => {
            let profile = session.login(&LoginRequest { email, password }).await?;
            print_json(&serde_json::to_value(&profile)?)?;
        }
        Command::Logout => {
            session.sign_out().await?;
        }
        Command::Status => {
            let status = serde_json::json!({
                "authenticated": session.is_authenticated(),
                "access_expired": session.is_access_credential_expired()?,
                "access_expires_at_ms": session.credentials().expires_at()?,
                "session_valid": session.is_session_valid()?,
                "refresh_expires_at_ms": session.credentials().read_refresh_expiry()?,
            });
            print_json(&status)?;
        }
        Command::Request { method, path, data } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|e| anyhow::anyhow!("invalid method {method:?}: {e}"))?;
            let body = match data {
                Some(ref raw) => Some(serde_json::from_str::<serde_json::Value>(raw)?),
                None => None,
            };
            let resp = pipeline.request(method, &path, body.as_ref()).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&resp.body)?;
            if !resp.body.ends_with(b"\n") {
                stdout.write_all(b"\n")?;
            }
        }
    }

    Ok(())
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    stdout.write_all(b"\n")?;
    Ok(())
}
