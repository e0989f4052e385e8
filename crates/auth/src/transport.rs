// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound HTTP seam.
//!
//! Requests are immutable values; a retry is a fresh [`OutboundRequest`]
//! derived with [`OutboundRequest::with_bearer`]. Non-2xx statuses are
//! ordinary responses here: deciding what a 401 means is the pipeline's job.

use std::future::Future;
use std::pin::Pin;
use std::sync::Once;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AuthError;

/// A request as handed to the transport.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: None }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Attach a JSON body and content type.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, AuthError> {
        let bytes = serde_json::to_vec(body)?;
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    /// Clone this request with `Authorization: Bearer <token>` set.
    ///
    /// Tokens that are not valid header values leave the header unset.
    pub fn with_bearer(&self, token: &str) -> Self {
        let mut next = self.clone();
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                next.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => {
                tracing::warn!(url = %self.url, "credential is not a valid header value");
            }
        }
        next
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// The bearer token currently attached, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct InboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into() }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Sends requests over the wire.
///
/// Object-safe for use as `Arc<dyn Transport>`.
pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        request: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<InboundResponse, AuthError>> + Send + '_>>;
}

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        ensure_crypto();
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn execute(
        &self,
        request: OutboundRequest,
    ) -> Pin<Box<dyn Future<Output = Result<InboundResponse, AuthError>> + Send + '_>> {
        Box::pin(async move {
            let OutboundRequest { method, url, headers, body } = request;
            let mut builder = self.client.request(method, url).headers(headers);
            if let Some(body) = body {
                builder = builder.body(body);
            }
            let resp = builder.send().await?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp.bytes().await?;
            Ok(InboundResponse { status, headers, body })
        })
    }
}
