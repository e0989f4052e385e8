// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: login, single-flight refresh, logout.
//!
//! State machine over `{idle, refreshing}`. The flag and the outcome channel
//! reset happen together under one lock with no await in between, so at most
//! one refresh call is ever in flight. The refresh itself runs on a spawned
//! task: dropping the request that triggered it does not cancel it, and every
//! waiter still learns the outcome.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, SET_COOKIE};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{AccessToken, AuthEndpoints, LoginRequest, LoginResponse, Profile};
use crate::credential::{CredentialStore, REFRESH_TOKEN_COOKIE};
use crate::error::{error_message, AuthError};
use crate::transport::{OutboundRequest, Transport};

/// Latest refresh result, replayed to every new subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No result yet (initial state, or a refresh is in flight).
    Pending,
    Refreshed(String),
    Failed(String),
}

impl RefreshOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

pub struct SessionManager {
    endpoints: AuthEndpoints,
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    refreshing: Mutex<bool>,
    outcome_tx: watch::Sender<RefreshOutcome>,
    authenticated_tx: watch::Sender<bool>,
}

impl SessionManager {
    /// Create a session over existing storage. A stored access credential
    /// makes the session start authenticated.
    pub fn new(
        endpoints: AuthEndpoints,
        transport: Arc<dyn Transport>,
        store: CredentialStore,
    ) -> Result<Arc<Self>, AuthError> {
        let authenticated = store.read()?.is_some();
        let (outcome_tx, _) = watch::channel(RefreshOutcome::Pending);
        let (authenticated_tx, _) = watch::channel(authenticated);
        debug!(authenticated, "session initialized");
        Ok(Arc::new(Self {
            endpoints,
            transport,
            store,
            refreshing: Mutex::new(false),
            outcome_tx,
            authenticated_tx,
        }))
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.store
    }

    /// Log in. Errors propagate untouched: no retry, no logout.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<Profile, AuthError> {
        let request = OutboundRequest::post(self.endpoints.login.clone()).json(credentials)?;
        let resp = self.transport.execute(request).await?;
        if !resp.is_success() {
            let message = error_message(resp.status, &resp.body);
            warn!(status = %resp.status, "login rejected");
            return Err(AuthError::AuthenticationFailed { status: resp.status, message });
        }

        let login: LoginResponse = resp.json()?;
        self.store_token(&login.token, &resp.headers)?;
        self.authenticated_tx.send_replace(true);

        let profile = Profile::from(&login);
        info!(user = %profile.id, "logged in");
        Ok(profile)
    }

    pub fn get_access_credential(&self) -> Result<Option<String>, AuthError> {
        Ok(self.store.read()?)
    }

    pub fn is_access_credential_expired(&self) -> Result<bool, AuthError> {
        Ok(self.store.is_expired()?)
    }

    pub fn is_refreshing(&self) -> bool {
        *self.refreshing.lock()
    }

    pub fn subscribe_refresh_outcome(&self) -> watch::Receiver<RefreshOutcome> {
        self.outcome_tx.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        *self.authenticated_tx.borrow()
    }

    pub fn subscribe_authenticated(&self) -> watch::Receiver<bool> {
        self.authenticated_tx.subscribe()
    }

    /// Whether the user can still make authenticated calls without logging
    /// in again: the access credential is fresh, or the refresh credential's
    /// expiry lies in the future.
    pub fn is_session_valid(&self) -> Result<bool, AuthError> {
        if !self.store.is_expired()? {
            return Ok(true);
        }
        Ok(match self.store.read_refresh_expiry()? {
            Some(expires_at) => expires_at > crate::credential::epoch_ms(),
            None => false,
        })
    }

    /// Refresh the access credential.
    ///
    /// Fails fast with [`AuthError::RefreshAlreadyInProgress`] when another
    /// refresh is in flight; such callers should use [`Self::wait_for_refresh`].
    pub async fn refresh(self: &Arc<Self>) -> Result<String, AuthError> {
        self.begin_refresh(None)?;
        self.run_refresh().await
    }

    /// Refresh only when `sent_with` is still the stored credential and it is
    /// locally expired.
    ///
    /// The in-flight check, the credential and expiry checks, and the
    /// transition to `refreshing` are one atomic step. Returns `Ok(None)` when
    /// nothing was started: the credential is still fresh, or it was replaced
    /// or cleared since `sent_with` was read.
    pub async fn refresh_if_expired(
        self: &Arc<Self>,
        sent_with: &str,
    ) -> Result<Option<String>, AuthError> {
        if !self.begin_refresh(Some(sent_with))? {
            return Ok(None);
        }
        self.run_refresh().await.map(Some)
    }

    /// Wait for the in-flight (or most recent) refresh to settle.
    ///
    /// A failed refresh resolves waiters with [`AuthError::RefreshAborted`]
    /// instead of leaving them pending, and so does calling this when no
    /// refresh has ever started.
    pub async fn wait_for_refresh(&self) -> Result<String, AuthError> {
        let mut rx = self.outcome_tx.subscribe();
        // The flag is cleared only after an outcome is published, so idle
        // plus pending means nothing will ever be published.
        if !*self.refreshing.lock() && rx.borrow().is_pending() {
            return Err(AuthError::RefreshAborted { reason: "no refresh in flight".to_owned() });
        }
        let outcome = match rx.wait_for(|o| !o.is_pending()).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => {
                return Err(AuthError::RefreshAborted { reason: "session closed".to_owned() })
            }
        };
        match outcome {
            RefreshOutcome::Refreshed(token) => Ok(token),
            RefreshOutcome::Failed(reason) => Err(AuthError::RefreshAborted { reason }),
            RefreshOutcome::Pending => {
                Err(AuthError::RefreshAborted { reason: "no refresh outcome".to_owned() })
            }
        }
    }

    /// Clear all credentials. Idempotent.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.clear()?;
        self.authenticated_tx.send_replace(false);
        info!("logged out, credentials cleared");
        Ok(())
    }

    /// Best-effort server logout followed by [`Self::logout`].
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let mut request = OutboundRequest::post(self.endpoints.logout.clone());
        if let Some(token) = self.store.read()? {
            request = request.with_bearer(&token);
        }
        match self.transport.execute(request).await {
            Ok(resp) if resp.is_success() => debug!("server logout acknowledged"),
            Ok(resp) => warn!(status = %resp.status, "server logout failed"),
            Err(e) => warn!(err = %e, "server logout failed"),
        }
        self.logout()
    }

    /// Check-and-set `refreshing`. With `expected` set, returns `Ok(false)`
    /// unless that credential is still stored and expired.
    fn begin_refresh(&self, expected: Option<&str>) -> Result<bool, AuthError> {
        let mut refreshing = self.refreshing.lock();
        if *refreshing {
            return Err(AuthError::RefreshAlreadyInProgress);
        }
        if let Some(expected) = expected {
            if self.store.read()?.as_deref() != Some(expected) || !self.store.is_expired()? {
                return Ok(false);
            }
        }
        *refreshing = true;
        self.outcome_tx.send_replace(RefreshOutcome::Pending);
        debug!("refresh started");
        Ok(true)
    }

    /// Run the refresh call on its own task and await the result.
    async fn run_refresh(self: &Arc<Self>) -> Result<String, AuthError> {
        let session = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut guard = RefreshGuard { session: &session, settled: false };
            let result = session.do_refresh().await;
            guard.settle(&result);
            result
        });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                Err(AuthError::RefreshAborted { reason: format!("refresh task failed: {e}") })
            }
        }
    }

    async fn do_refresh(&self) -> Result<String, AuthError> {
        let Some(refresh_credential) = self.store.read_refresh_credential()? else {
            warn!("no refresh credential, forcing logout");
            return Err(AuthError::NoRefreshCredential);
        };

        let request =
            OutboundRequest::post(self.endpoints.refresh.clone()).with_bearer(&refresh_credential);
        let resp = self.transport.execute(request).await?;
        if !resp.is_success() {
            let message = error_message(resp.status, &resp.body);
            warn!(status = %resp.status, "refresh rejected");
            return Err(AuthError::RefreshRejected { status: resp.status, message });
        }

        let token: AccessToken = resp.json()?;
        self.store_token(&token, &resp.headers)?;
        Ok(token.access_token)
    }

    /// Persist an issued access credential and any rotated refresh credential.
    fn store_token(&self, token: &AccessToken, headers: &HeaderMap) -> Result<(), AuthError> {
        self.store.save(&token.access_token, Duration::from_millis(token.expires_in))?;
        let rotated = token
            .refresh_token
            .clone()
            .or_else(|| set_cookie_value(headers, REFRESH_TOKEN_COOKIE));
        match rotated {
            Some(value) if value.is_empty() => self.store.clear_refresh_credential()?,
            Some(value) => {
                self.store.save_refresh_credential(&value)?;
                debug!("refresh credential rotated");
            }
            None => {}
        }
        Ok(())
    }

    /// Publish the outcome, log out on failure, then leave `refreshing`.
    ///
    /// Runs entirely under the `refreshing` lock: a concurrent
    /// [`Self::begin_refresh`] either sees the refresh still in flight or
    /// sees the settled store, never the credentials of a failed refresh
    /// that are about to be cleared.
    fn finish_refresh(&self, result: Result<&str, String>) {
        let mut refreshing = self.refreshing.lock();
        match result {
            Ok(token) => {
                self.outcome_tx.send_replace(RefreshOutcome::Refreshed(token.to_owned()));
                self.authenticated_tx.send_replace(true);
                info!("access credential refreshed");
            }
            Err(reason) => {
                warn!(reason = %reason, "refresh failed, forcing logout");
                if let Err(e) = self.logout() {
                    error!(err = %e, "logout after failed refresh could not clear credentials");
                }
                self.outcome_tx.send_replace(RefreshOutcome::Failed(reason));
            }
        }
        *refreshing = false;
    }
}

/// Settles the refresh state exactly once, even if the refresh task panics.
struct RefreshGuard<'a> {
    session: &'a SessionManager,
    settled: bool,
}

impl RefreshGuard<'_> {
    fn settle(&mut self, result: &Result<String, AuthError>) {
        self.settled = true;
        match result {
            Ok(token) => self.session.finish_refresh(Ok(token.as_str())),
            Err(e) => self.session.finish_refresh(Err(e.to_string())),
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.session.finish_refresh(Err("refresh interrupted".to_owned()));
        }
    }
}

/// Value of the named cookie in any `Set-Cookie` header.
fn set_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok()).find_map(|raw| {
        let pair = raw.split(';').next()?.trim();
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"').to_owned())
    })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
