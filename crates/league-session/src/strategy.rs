//! Session strategy abstraction
//!
//! The two platform token models behind one trait:
//! - `BearerTokenStrategy`: the client holds the tokens, injects a Bearer
//!   header per request, and performs the refresh-token exchange itself.
//! - `CookieSessionStrategy`: tokens are opaque to the client; an httpOnly
//!   cookie carries the session and the backend rotates it when the client
//!   posts to the refresh endpoint.
//!
//! Both run their renewal under the gateway's single-flight guard, so the
//! guarantee of at most one concurrent refresh holds for either model.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn SessionStrategy>`).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use league_auth::OAuthFlow;

use crate::error::{Error, Result};

/// Abstraction over how a platform attaches and renews credentials.
pub trait SessionStrategy: Send + Sync {
    /// Identifier for logging ("bearer", "cookie").
    fn id(&self) -> &str;

    /// Attach credentials to an outgoing request. Called immediately before
    /// each send, never cached on the request value.
    fn authorize<'a>(
        &'a self,
        headers: &'a mut HeaderMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Renew the session after an authorization failure. The gateway
    /// guarantees at most one renewal is in flight at a time.
    fn renew(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Client-held tokens: Bearer header injection, client-side refresh grant.
pub struct BearerTokenStrategy {
    flow: Arc<OAuthFlow>,
}

impl BearerTokenStrategy {
    pub fn new(flow: Arc<OAuthFlow>) -> Self {
        Self { flow }
    }
}

impl SessionStrategy for BearerTokenStrategy {
    fn id(&self) -> &str {
        "bearer"
    }

    fn authorize<'a>(
        &'a self,
        headers: &'a mut HeaderMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(token) = self.flow.store().access_token().await {
                let value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
                    .map_err(|e| Error::Http(format!("invalid token value: {e}")))?;
                headers.insert(AUTHORIZATION, value);
            }
            Ok(())
        })
    }

    fn renew(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            match self.flow.refresh().await {
                Ok(_) => Ok(()),
                Err(e @ league_auth::Error::InvalidGrant(_)) => Err(Error::Auth(e)),
                Err(e) => Err(Error::Refresh(e.to_string())),
            }
        })
    }
}

/// Server-held session: the cookie jar carries credentials, renewal asks the
/// backend to rotate the cookie.
///
/// Must be constructed with the same `reqwest::Client` the gateway sends
/// with, so both share one cookie jar.
pub struct CookieSessionStrategy {
    http: reqwest::Client,
    refresh_url: String,
}

impl CookieSessionStrategy {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            refresh_url: format!("{base_url}/auth/refresh"),
        }
    }
}

impl SessionStrategy for CookieSessionStrategy {
    fn id(&self) -> &str {
        "cookie"
    }

    fn authorize<'a>(
        &'a self,
        _headers: &'a mut HeaderMap,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        // The cookie jar attaches the session automatically.
        Box::pin(async move { Ok(()) })
    }

    fn renew(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .http
                .post(&self.refresh_url)
                .send()
                .await
                .map_err(|e| Error::Refresh(format!("refresh request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| String::from("<no body>"));
                return Err(Error::Refresh(format!(
                    "refresh endpoint returned {status}: {body}"
                )));
            }

            debug!("session cookie rotated");
            Ok(())
        })
    }
}
