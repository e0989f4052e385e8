// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request pipeline.
//!
//! Every outbound call goes through [`AuthPipeline::send`]:
//!
//! 1. Attach `Authorization: Bearer <access credential>` when one is stored.
//! 2. Dispatch. 2xx responses pass through unchanged.
//! 3. On 401 with a credential still stored:
//!    - the stored credential changed since dispatch: replay with it;
//!    - no refresh in flight and the credential is locally expired: refresh,
//!      then replay with the new credential (the decision is atomic, see
//!      [`SessionManager::refresh_if_expired`]);
//!    - a refresh is in flight: wait for its outcome, then replay;
//!    - otherwise surface the 401.
//! 4. Anything else surfaces as an error.
//!
//! A replay is attempted at most once. A 401 on the replay is final.

use std::sync::Arc;

use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{error_message, AuthError};
use crate::session::SessionManager;
use crate::transport::{InboundResponse, OutboundRequest, Transport};

#[derive(Clone)]
pub struct AuthPipeline {
    session: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
}

impl AuthPipeline {
    pub fn new(session: Arc<SessionManager>, transport: Arc<dyn Transport>) -> Self {
        Self { session, transport }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Resolve a path against the API base URL.
    pub fn url(&self, path: &str) -> Result<Url, AuthError> {
        self.session
            .endpoints()
            .base
            .join(path)
            .map_err(|e| AuthError::InvalidUrl { url: path.to_owned(), reason: e.to_string() })
    }

    pub async fn get(&self, path: &str) -> Result<InboundResponse, AuthError> {
        self.send(OutboundRequest::get(self.url(path)?)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<InboundResponse, AuthError> {
        self.send(OutboundRequest::post(self.url(path)?).json(body)?).await
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<InboundResponse, AuthError> {
        let mut request = OutboundRequest::new(method, self.url(path)?);
        if let Some(body) = body {
            request = request.json(body)?;
        }
        self.send(request).await
    }

    /// Send `request` with credential handling. `request` is never mutated;
    /// every dispatch uses a derived copy.
    pub async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, AuthError> {
        let sent_with = self.session.get_access_credential()?;
        let first = match sent_with {
            Some(ref token) => request.with_bearer(token),
            None => request.clone(),
        };
        debug!(
            method = %request.method(),
            url = %request.url(),
            authenticated = sent_with.is_some(),
            "dispatch"
        );

        let resp = self.transport.execute(first).await?;
        if resp.is_success() {
            return Ok(resp);
        }
        if resp.status != StatusCode::UNAUTHORIZED {
            return Err(status_error(&request, &resp));
        }

        // Re-read: a failed refresh elsewhere may already have logged us out.
        let Some(current) = self.session.get_access_credential()? else {
            debug!(url = %request.url(), "401 without credential, passing through");
            return Err(status_error(&request, &resp));
        };

        if sent_with.as_deref().is_some_and(|sent| sent != current) {
            debug!(url = %request.url(), "credential changed since dispatch, replaying");
            return self.replay(&request, &current).await;
        }

        let token = match self.session.refresh_if_expired(&current).await {
            Ok(Some(token)) => {
                info!(url = %request.url(), "refreshed after 401, replaying");
                token
            }
            Ok(None) => match self.session.get_access_credential()? {
                Some(latest) if latest != current => {
                    debug!(url = %request.url(), "credential replaced, replaying");
                    latest
                }
                _ => {
                    debug!(url = %request.url(), "401 with unexpired credential, not refreshing");
                    return Err(status_error(&request, &resp));
                }
            },
            Err(AuthError::RefreshAlreadyInProgress) => {
                debug!(url = %request.url(), "refresh in flight, waiting");
                self.session.wait_for_refresh().await?
            }
            Err(e) => return Err(e),
        };
        self.replay(&request, &token).await
    }

    /// Single replay of the original request. Its outcome is final.
    async fn replay(
        &self,
        request: &OutboundRequest,
        token: &str,
    ) -> Result<InboundResponse, AuthError> {
        let resp = self.transport.execute(request.with_bearer(token)).await?;
        if resp.is_success() {
            Ok(resp)
        } else {
            Err(status_error(request, &resp))
        }
    }
}

fn status_error(request: &OutboundRequest, resp: &InboundResponse) -> AuthError {
    let url = request.url().to_string();
    let message = error_message(resp.status, &resp.body);
    if resp.status == StatusCode::UNAUTHORIZED {
        AuthError::AuthorizationDenied { url, message }
    } else {
        AuthError::Status { status: resp.status, url, message }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
