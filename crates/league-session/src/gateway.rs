//! Request gateway with single-flight refresh coordination
//!
//! Every outbound API call goes through [`RequestGateway::execute`]:
//! credentials are attached fresh immediately before the send, a 401/403
//! response triggers at most one concurrent renewal no matter how many
//! requests fail at once, and each request is replayed at most once with the
//! renewed credentials.
//!
//! The refresh-in-flight flag and the queue of blocked requests live behind
//! one mutex. The lock is only ever held across plain field access, never
//! across an await, so observing "no refresh in flight" and claiming the
//! refresh happen as one atomic step relative to the scheduler.

use std::collections::VecDeque;
use std::sync::Arc;

use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::strategy::SessionStrategy;

/// An outbound API call, replayable because it owns its body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::PUT,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }
}

/// Response as the caller sees it. Non-authorization statuses pass through
/// here untouched; only 401/403 is intercepted.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Refresh coordination state: the in-flight flag plus the FIFO queue of
/// continuations for requests blocked behind the current refresh.
#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: VecDeque<oneshot::Sender<Result<()>>>,
}

/// The HTTP client wrapper for the league backend.
///
/// All state is instance-owned and constructor-injected; tests build
/// isolated gateways with their own strategy and base URL. The refresh
/// state is behind an `Arc` so the detached renewal task can reach it
/// after the request that started it is gone.
pub struct RequestGateway {
    http: reqwest::Client,
    base_url: String,
    strategy: Arc<dyn SessionStrategy>,
    refresh: Arc<Mutex<RefreshState>>,
}

impl RequestGateway {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        strategy: Arc<dyn SessionStrategy>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            strategy,
            refresh: Arc::new(Mutex::new(RefreshState::default())),
        }
    }

    /// Execute a request with the refresh-and-retry-once policy.
    ///
    /// 1. Send with fresh credentials.
    /// 2. On 401/403, coordinate a single-flight renewal and replay once.
    /// 3. A replay that still fails authorization is surfaced as
    ///    [`Error::SessionExpired`], never retried again.
    /// 4. Everything else passes through unmodified.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let response = self.dispatch(request).await?;
        if !is_auth_failure(response.status) {
            return Ok(response);
        }

        debug!(
            path = %request.path,
            status = response.status,
            strategy = self.strategy.id(),
            "authorization failure, coordinating session renewal"
        );
        self.renew_single_flight().await?;

        let replay = self.dispatch(request).await?;
        if is_auth_failure(replay.status) {
            warn!(path = %request.path, "replayed request still unauthorized");
            return Err(Error::SessionExpired);
        }
        Ok(replay)
    }

    /// Execute a GET and decode a 2xx JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(&ApiRequest::get(path)).await?;
        if !response.is_success() {
            return Err(Error::Status {
                status: response.status,
                body: response.body,
            });
        }
        response.json()
    }

    /// Execute a POST and decode a 2xx JSON body.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self.execute(&ApiRequest::post(path, body)).await?;
        if !response.is_success() {
            return Err(Error::Status {
                status: response.status,
                body: response.body,
            });
        }
        response.json()
    }

    /// One send: credentials attached fresh, transport errors surfaced as
    /// [`Error::Http`].
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut headers = HeaderMap::new();
        self.strategy.authorize(&mut headers).await?;

        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Http(format!("request to {url} failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading response from {url} failed: {e}")))?;

        Ok(ApiResponse { status, body })
    }

    /// Renew the session, collapsing concurrent callers into one renewal.
    ///
    /// The first caller to observe no renewal in flight spawns the renewal
    /// on a detached task; every caller, that one included, parks a oneshot
    /// continuation on the queue and waits. The detached task runs the
    /// strategy's renewal to completion, clears the flag, and drains the
    /// queue in FIFO order with the shared outcome, so a caller dropping its
    /// request future (timeout, abort) cannot strand the flag or the queue.
    /// Queued callers always resolve after the renewal and never replay with
    /// a stale token.
    async fn renew_single_flight(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.refresh.lock().await;
            state.waiters.push_back(tx);
            if !state.in_flight {
                state.in_flight = true;
                let strategy = Arc::clone(&self.strategy);
                let refresh = Arc::clone(&self.refresh);
                tokio::spawn(async move {
                    debug!(strategy = strategy.id(), "session renewal started");
                    let outcome = strategy.renew().await;

                    let drained = {
                        let mut state = refresh.lock().await;
                        state.in_flight = false;
                        std::mem::take(&mut state.waiters)
                    };
                    debug!(
                        waiters = drained.len(),
                        ok = outcome.is_ok(),
                        "session renewal finished, draining queue"
                    );
                    for tx in drained {
                        let _ = tx.send(outcome.clone());
                    }
                });
            }
        }

        match rx.await {
            Ok(outcome) => outcome,
            // Only reachable if the renewal task panics before draining.
            Err(_) => Err(Error::Refresh("renewal abandoned".into())),
        }
    }
}

fn is_auth_failure(status: u16) -> bool {
    status == 401 || status == 403
}
