// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end tests against a mock SCMS backend.
//!
//! [`MockBackend`] serves the auth endpoints and one protected resource over
//! real HTTP on an ephemeral port. Access credentials are numbered
//! (`access-0` from login, `access-N` from the N-th refresh) and every refresh
//! rotates the refresh cookie, so tests can tell exactly which credential a
//! request carried.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::{AUTHORIZATION, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio::net::TcpListener;

pub const EMAIL: &str = "ops@scms.test";
pub const PASSWORD: &str = "password";
pub const PROTECTED: &str = "/api/v1/contracts";

/// Mutable backend state shared with the tests.
pub struct BackendState {
    valid_access: Mutex<String>,
    valid_refresh: Mutex<String>,
    /// Lifetime of issued access credentials, in milliseconds.
    pub access_ttl_ms: AtomicU64,
    /// Artificial latency of the refresh endpoint, in milliseconds.
    pub refresh_delay_ms: AtomicU64,
    /// Status the refresh endpoint answers with.
    pub refresh_status: Mutex<StatusCode>,
    pub login_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub logout_calls: AtomicU32,
    pub protected_calls: AtomicU32,
    /// Bearer credentials seen on the protected resource, in arrival order.
    pub protected_bearers: Mutex<Vec<Option<String>>>,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            valid_access: Mutex::new(String::new()),
            valid_refresh: Mutex::new(String::new()),
            access_ttl_ms: AtomicU64::new(60_000),
            refresh_delay_ms: AtomicU64::new(0),
            refresh_status: Mutex::new(StatusCode::OK),
            login_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            logout_calls: AtomicU32::new(0),
            protected_calls: AtomicU32::new(0),
            protected_bearers: Mutex::new(Vec::new()),
        }
    }
}

impl BackendState {
    pub fn refreshes(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn protected_requests(&self) -> u32 {
        self.protected_calls.load(Ordering::SeqCst)
    }

    pub fn valid_access(&self) -> String {
        self.valid_access.lock().clone()
    }

    /// Revoke the current access credential server-side.
    pub fn revoke_access(&self) {
        *self.valid_access.lock() = "revoked".to_owned();
    }
}

/// A mock backend running on `127.0.0.1` until the test runtime shuts down.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
}

impl MockBackend {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(BackendState::default());
        let app = Router::new()
            .route("/api/v1/auth/login", post(login))
            .route("/api/v1/auth/refresh", post(refresh))
            .route("/api/v1/auth/logout", post(logout))
            .route(PROTECTED, get(protected).post(protected))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self { addr, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &Arc<BackendState> {
        &self.state
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(serde_json::json!({ "message": text }))).into_response()
}

fn refresh_cookie(value: &str) -> String {
    format!("refresh_token={value}; Path=/api/v1/auth; HttpOnly; SameSite=Strict")
}

async fn login(
    State(s): State<Arc<BackendState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    s.login_calls.fetch_add(1, Ordering::SeqCst);
    if body["email"] != EMAIL || body["password"] != PASSWORD {
        return message(StatusCode::UNAUTHORIZED, "Invalid email or password");
    }
    let access = "access-0".to_owned();
    let refresh = "refresh-0".to_owned();
    *s.valid_access.lock() = access.clone();
    *s.valid_refresh.lock() = refresh.clone();
    let ttl = s.access_ttl_ms.load(Ordering::SeqCst);
    (
        [(SET_COOKIE, refresh_cookie(&refresh))],
        Json(serde_json::json!({
            "id": "u-1",
            "name": "Ichikawa",
            "token": { "accessToken": access, "expiresIn": ttl },
        })),
    )
        .into_response()
}

async fn refresh(State(s): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    let n = s.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = s.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let status = *s.refresh_status.lock();
    if !status.is_success() {
        return message(status, "refresh token expired");
    }
    let expected = s.valid_refresh.lock().clone();
    if bearer(&headers).as_deref() != Some(expected.as_str()) {
        return message(StatusCode::UNAUTHORIZED, "unknown refresh token");
    }

    let access = format!("access-{n}");
    let refresh = format!("refresh-{n}");
    *s.valid_access.lock() = access.clone();
    *s.valid_refresh.lock() = refresh.clone();
    let ttl = s.access_ttl_ms.load(Ordering::SeqCst);
    (
        [(SET_COOKIE, refresh_cookie(&refresh))],
        Json(serde_json::json!({ "accessToken": access, "expiresIn": ttl })),
    )
        .into_response()
}

async fn logout(State(s): State<Arc<BackendState>>) -> StatusCode {
    s.logout_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn protected(State(s): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    s.protected_calls.fetch_add(1, Ordering::SeqCst);
    let presented = bearer(&headers);
    s.protected_bearers.lock().push(presented.clone());
    let valid = s.valid_access.lock().clone();
    match presented {
        Some(token) if !valid.is_empty() && token == valid => {
            Json(serde_json::json!({ "items": [], "token": token })).into_response()
        }
        _ => message(StatusCode::UNAUTHORIZED, "jwt expired"),
    }
}
