// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end pipeline tests over real HTTP with file-backed credential
//! storage.

use std::sync::atomic::Ordering;
use std::time::Duration;

use futures_util::future::join_all;

use scms_auth::api::LoginRequest;
use scms_auth::config::AuthConfig;
use scms_auth::error::AuthError;
use scms_auth::pipeline::AuthPipeline;
use scms_auth_specs::{MockBackend, EMAIL, PASSWORD, PROTECTED};

struct Client {
    pipeline: AuthPipeline,
    config: AuthConfig,
    _state: tempfile::TempDir,
}

fn client(backend: &MockBackend) -> anyhow::Result<Client> {
    let state = tempfile::tempdir()?;
    let mut config = AuthConfig::for_api(backend.base_url());
    config.state_dir = Some(state.path().to_path_buf());
    config.timeout_ms = 5_000;
    let pipeline = scms_auth::connect(&config)?;
    Ok(Client { pipeline, config, _state: state })
}

async fn login(client: &Client) -> anyhow::Result<()> {
    let request = LoginRequest { email: EMAIL.to_owned(), password: PASSWORD.to_owned() };
    client.pipeline.session().login(&request).await?;
    Ok(())
}

fn token_of(body: &serde_json::Value) -> Option<&str> {
    body["token"].as_str()
}

#[tokio::test]
async fn login_then_request_carries_credential() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let client = client(&backend)?;
    login(&client).await?;

    let resp = client.pipeline.get(PROTECTED).await?;
    let body: serde_json::Value = resp.json()?;

    assert_eq!(token_of(&body), Some("access-0"));
    assert!(resp.text().contains(r#""items":[]"#), "body: {}", resp.text());
    assert_eq!(backend.state().refreshes(), 0);
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_rejected_without_side_effects() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let client = client(&backend)?;

    let request = LoginRequest { email: EMAIL.to_owned(), password: "nope".to_owned() };
    let err = client.pipeline.session().login(&request).await.err();

    assert!(matches!(err, Some(AuthError::AuthenticationFailed { .. })));
    assert!(!client.config.session_path().exists());
    assert!(!client.pipeline.session().is_authenticated());
    Ok(())
}

#[tokio::test]
async fn expired_credential_is_refreshed_and_request_replayed() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    backend.state().access_ttl_ms.store(0, Ordering::SeqCst);
    let client = client(&backend)?;
    login(&client).await?;
    backend.state().revoke_access();

    let resp = client.pipeline.get(PROTECTED).await?;
    let body: serde_json::Value = resp.json()?;

    assert_eq!(token_of(&body), Some("access-1"));
    assert_eq!(backend.state().refreshes(), 1);
    assert_eq!(
        *backend.state().protected_bearers.lock(),
        vec![Some("access-0".to_owned()), Some("access-1".to_owned())]
    );
    // The rotated refresh cookie was captured.
    let session = client.pipeline.session();
    assert_eq!(session.credentials().read_refresh_credential()?.as_deref(), Some("refresh-1"));
    Ok(())
}

#[tokio::test]
async fn credentials_survive_a_new_client() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let first = client(&backend)?;
    login(&first).await?;

    let second = scms_auth::connect(&first.config)?;
    assert!(second.session().is_authenticated());

    let resp = second.get(PROTECTED).await?;
    let body: serde_json::Value = resp.json()?;
    assert_eq!(token_of(&body), Some("access-0"));
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_trigger_a_single_refresh() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    backend.state().access_ttl_ms.store(0, Ordering::SeqCst);
    backend.state().refresh_delay_ms.store(200, Ordering::SeqCst);
    let client = client(&backend)?;
    login(&client).await?;
    backend.state().revoke_access();
    backend.state().access_ttl_ms.store(60_000, Ordering::SeqCst);

    let requests = (0..6).map(|_| client.pipeline.get(PROTECTED));
    let results = join_all(requests).await;

    for result in results {
        let body: serde_json::Value = result?.json()?;
        assert_eq!(token_of(&body), Some("access-1"));
    }
    assert_eq!(backend.state().refreshes(), 1);
    assert_eq!(backend.state().protected_requests(), 12);
    Ok(())
}

#[tokio::test]
async fn rejected_refresh_logs_out() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    backend.state().access_ttl_ms.store(0, Ordering::SeqCst);
    *backend.state().refresh_status.lock() = reqwest::StatusCode::BAD_REQUEST;
    let client = client(&backend)?;
    login(&client).await?;
    backend.state().revoke_access();

    let err = client.pipeline.get(PROTECTED).await.err();

    match err {
        Some(AuthError::RefreshRejected { status, message }) => {
            assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
            assert_eq!(message, "refresh token expired");
        }
        other => anyhow::bail!("expected RefreshRejected, got {other:?}"),
    }
    let session = client.pipeline.session();
    assert!(!session.is_authenticated());
    assert_eq!(session.get_access_credential()?, None);
    assert_eq!(session.credentials().read_refresh_credential()?, None);
    assert_eq!(backend.state().protected_requests(), 1);

    // Reopening the persisted state confirms the logout reached disk.
    let reopened = scms_auth::connect(&client.config)?;
    assert!(!reopened.session().is_authenticated());
    Ok(())
}

#[tokio::test]
async fn sign_out_calls_backend_and_clears_state() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let client = client(&backend)?;
    login(&client).await?;

    client.pipeline.session().sign_out().await?;

    assert_eq!(backend.state().logout_calls.load(Ordering::SeqCst), 1);
    assert!(!client.pipeline.session().is_authenticated());
    let err = client.pipeline.get(PROTECTED).await.err();
    assert!(matches!(err, Some(AuthError::AuthorizationDenied { .. })));
    assert_eq!(backend.state().refreshes(), 0);
    Ok(())
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() -> anyhow::Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let state = tempfile::tempdir()?;
    let mut config = AuthConfig::for_api(format!("http://{addr}"));
    config.state_dir = Some(state.path().to_path_buf());
    config.timeout_ms = 1_000;
    let pipeline = scms_auth::connect(&config)?;

    let err = tokio::time::timeout(Duration::from_secs(5), pipeline.get(PROTECTED)).await?.err();
    assert!(matches!(err, Some(AuthError::Transport(_))));
    Ok(())
}
