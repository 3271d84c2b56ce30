//! OAuth login flow state machine
//!
//! Drives one Authorization-Code-with-PKCE round-trip at a time:
//! `begin_login` generates the PKCE pair and the authorization URL, the host
//! platform hands the URL to a browser, and the redirect eventually delivers
//! an [`AuthorizationResult`] back into `complete_login`. The verifier is
//! bound to the attempt that created it; a code from one attempt can never
//! be exchanged with another attempt's verifier.
//!
//! Logout is best-effort revoke, unconditional local clear: a transient
//! revocation failure must never leave the client looking authenticated.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use crate::pkce::{self, PkceChallenge};
use crate::store::TokenStore;
use crate::token::{self, TokenSet};

/// Outcome of the browser redirect, produced once per login attempt and
/// consumed exactly once.
#[derive(Debug, Clone)]
pub enum AuthorizationResult {
    Success { code: String },
    Error { description: String },
    Cancelled,
}

/// Handle for one login attempt, returned by [`OAuthFlow::begin_login`].
///
/// The id ties the eventual redirect back to the PKCE verifier generated for
/// this attempt.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub id: Uuid,
    pub authorization_url: String,
}

/// Verifier held for the attempt currently awaiting its redirect.
struct PendingAttempt {
    id: Uuid,
    verifier: String,
}

/// The login/logout flow driver.
///
/// At most one attempt is pending at a time; starting a new attempt discards
/// any stale one (its redirect, should it ever arrive, no longer matches).
pub struct OAuthFlow {
    config: OAuthConfig,
    http: reqwest::Client,
    store: Arc<TokenStore>,
    pending: Mutex<Option<PendingAttempt>>,
}

impl OAuthFlow {
    pub fn new(config: OAuthConfig, http: reqwest::Client, store: Arc<TokenStore>) -> Self {
        Self {
            config,
            http,
            store,
            pending: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Start a login attempt: generate the PKCE pair, record it, and build
    /// the authorization URL for the platform's browser hand-off.
    ///
    /// There is no timeout on the redirect: the wait mirrors an interactive
    /// browser session the user may abandon.
    pub async fn begin_login(&self) -> LoginAttempt {
        let pkce = PkceChallenge::generate();
        let state = pkce::generate_state();
        let id = Uuid::new_v4();
        let authorization_url = pkce::build_authorization_url(&self.config, &pkce.challenge, &state);

        let mut pending = self.pending.lock().await;
        if pending.is_some() {
            debug!("discarding stale login attempt");
        }
        *pending = Some(PendingAttempt {
            id,
            verifier: pkce.verifier,
        });

        info!(attempt_id = %id, "login attempt started");
        LoginAttempt {
            id,
            authorization_url,
        }
    }

    /// Complete a login attempt with the redirect outcome.
    ///
    /// - `Success`: exchanges the code using the verifier recorded for this
    ///   attempt and saves the resulting TokenSet. A code arriving with no
    ///   matching pending attempt (stale handle, or the attempt already
    ///   resolved) fails with [`Error::MissingVerifier`] rather than
    ///   exchanging with the wrong verifier.
    /// - `Error`: surfaced verbatim; no token mutation.
    /// - `Cancelled`: not an error; returns `Ok(None)` with no mutation.
    ///
    /// A redirect for an attempt that is no longer pending is ignored in the
    /// `Error` and `Cancelled` variants.
    pub async fn complete_login(
        &self,
        attempt: &LoginAttempt,
        result: AuthorizationResult,
    ) -> Result<Option<TokenSet>> {
        match result {
            AuthorizationResult::Cancelled => {
                if self.take_pending(attempt.id).await.is_some() {
                    info!(attempt_id = %attempt.id, "login cancelled by user");
                }
                Ok(None)
            }
            AuthorizationResult::Error { description } => {
                if self.take_pending(attempt.id).await.is_some() {
                    warn!(attempt_id = %attempt.id, error = %description, "authorization rejected by provider");
                    Err(Error::Authorization(description))
                } else {
                    debug!(attempt_id = %attempt.id, "redirect for resolved attempt ignored");
                    Ok(None)
                }
            }
            AuthorizationResult::Success { code } => {
                let verifier = self
                    .take_pending(attempt.id)
                    .await
                    .ok_or(Error::MissingVerifier)?;

                let grant =
                    token::exchange_code(&self.http, &self.config, &code, &verifier).await?;
                let tokens = grant.into_token_set(None)?;

                if let Err(e) = self.store.save(tokens.clone()).await {
                    warn!(error = %e, "token persistence failed, continuing with in-memory tokens");
                }

                info!(attempt_id = %attempt.id, "login completed");
                Ok(Some(tokens))
            }
        }
    }

    /// Exchange the stored refresh token for a new TokenSet and save it.
    ///
    /// Providers that do not rotate the refresh token keep the previous one.
    pub async fn refresh(&self) -> Result<TokenSet> {
        let current = self
            .store
            .current()
            .await
            .ok_or_else(|| Error::Exchange("no refresh token available".into()))?;

        let grant =
            token::refresh_grant(&self.http, &self.config, current.refresh_token.expose()).await?;
        let tokens = grant.into_token_set(Some(current.refresh_token))?;

        if let Err(e) = self.store.save(tokens.clone()).await {
            warn!(error = %e, "refreshed token persistence failed, continuing with in-memory tokens");
        }

        debug!("access token refreshed");
        Ok(tokens)
    }

    /// Log out: best-effort revocation of the refresh token, then
    /// unconditional clearing of local state.
    pub async fn logout(&self) {
        if let Some(tokens) = self.store.current().await {
            match token::revoke_token(&self.http, &self.config, tokens.refresh_token.expose())
                .await
            {
                Ok(()) => debug!("refresh token revoked"),
                Err(e) => warn!(error = %e, "token revocation failed, clearing local session anyway"),
            }
        }
        self.store.clear().await;
        info!("logged out");
    }

    /// Take the pending verifier if it belongs to `attempt_id`.
    ///
    /// A mismatched id leaves the pending attempt in place so a newer
    /// attempt's verifier is not clobbered by a stale redirect.
    async fn take_pending(&self, attempt_id: Uuid) -> Option<String> {
        let mut pending = self.pending.lock().await;
        match pending.as_ref() {
            Some(p) if p.id == attempt_id => pending.take().map(|p| p.verifier),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> OAuthConfig {
        OAuthConfig {
            client_id: "league-mobile".into(),
            authorize_endpoint: format!("{}/oauth/authorize", server.uri()),
            token_endpoint: format!("{}/oauth/token", server.uri()),
            revocation_endpoint: format!("{}/oauth/revoke", server.uri()),
            redirect_uri: "https://league.example.org/auth/callback".into(),
            scopes: "openid profile email".into(),
        }
    }

    async fn flow_for(server: &MockServer, dir: &tempfile::TempDir) -> OAuthFlow {
        let store = Arc::new(TokenStore::open(dir.path().join("session.json")).await);
        OAuthFlow::new(config_for(server), reqwest::Client::new(), store)
    }

    fn token_body() -> serde_json::Value {
        json!({
            "access_token": "at_new",
            "refresh_token": "rt_new",
            "id_token": "idt_new",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "openid profile email"
        })
    }

    #[tokio::test]
    async fn successful_login_saves_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("code=authcode-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;

        let attempt = flow.begin_login().await;
        assert!(attempt.authorization_url.contains("code_challenge="));
        assert!(attempt.authorization_url.contains("response_type=code"));

        let tokens = flow
            .complete_login(
                &attempt,
                AuthorizationResult::Success {
                    code: "authcode-1".into(),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(tokens.access_token.expose(), "at_new");
        let stored = flow.store().current().await.unwrap();
        assert_eq!(stored.access_token.expose(), "at_new");
    }

    #[tokio::test]
    async fn exchange_sends_verifier_from_this_attempt() {
        // The mock only answers when the posted verifier matches the
        // challenge embedded in the attempt's authorization URL.
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;

        let attempt = flow.begin_login().await;
        let challenge = attempt
            .authorization_url
            .split("code_challenge=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap()
            .to_string();

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("code_verifier="))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        flow.complete_login(
            &attempt,
            AuthorizationResult::Success {
                code: "authcode-1".into(),
            },
        )
        .await
        .unwrap();

        // The verifier actually sent must hash to the advertised challenge.
        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        let sent_verifier = body
            .split("code_verifier=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap();
        assert_eq!(crate::pkce::compute_challenge(sent_verifier), challenge);
    }

    #[tokio::test]
    async fn stale_attempt_fails_with_missing_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;

        let first = flow.begin_login().await;
        let _second = flow.begin_login().await;

        // The code "belongs" to the first attempt, whose verifier was
        // discarded when the second attempt started.
        let err = flow
            .complete_login(
                &first,
                AuthorizationResult::Success {
                    code: "authcode-1".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingVerifier), "got: {err:?}");
        assert!(flow.store().current().await.is_none());
    }

    #[tokio::test]
    async fn second_success_redirect_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;
        let attempt = flow.begin_login().await;
        let result = AuthorizationResult::Success {
            code: "authcode-1".into(),
        };

        flow.complete_login(&attempt, result.clone()).await.unwrap();
        let err = flow.complete_login(&attempt, result).await.unwrap_err();
        assert!(matches!(err, Error::MissingVerifier));
    }

    #[tokio::test]
    async fn cancelled_is_a_no_op() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;

        let attempt = flow.begin_login().await;
        let outcome = flow
            .complete_login(&attempt, AuthorizationResult::Cancelled)
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(flow.store().current().await.is_none());
    }

    #[tokio::test]
    async fn provider_error_is_surfaced_verbatim() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;

        let attempt = flow.begin_login().await;
        let err = flow
            .complete_login(
                &attempt,
                AuthorizationResult::Error {
                    description: "access_denied: user declined".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "authorization failed: access_denied: user declined"
        );
        assert!(flow.store().current().await.is_none());
    }

    #[tokio::test]
    async fn late_error_redirect_for_resolved_attempt_is_ignored() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;

        let attempt = flow.begin_login().await;
        flow.complete_login(&attempt, AuthorizationResult::Cancelled)
            .await
            .unwrap();

        // The browser delivers a second event after the attempt resolved.
        let outcome = flow
            .complete_login(
                &attempt,
                AuthorizationResult::Error {
                    description: "late".into(),
                },
            )
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn exchange_failure_leaves_store_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;

        let attempt = flow.begin_login().await;
        let err = flow
            .complete_login(
                &attempt,
                AuthorizationResult::Success {
                    code: "bad-code".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Exchange(_)));
        assert!(flow.store().current().await.is_none());
    }

    #[tokio::test]
    async fn refresh_rotates_and_saves() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt_old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at_fresh",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "openid profile email"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;
        flow.store()
            .save(TokenSet {
                access_token: common::Secret::new("at_old".into()),
                refresh_token: common::Secret::new("rt_old".into()),
                id_token: None,
                token_type: "Bearer".into(),
                expires_in: 3600,
                scope: "openid profile email".into(),
            })
            .await
            .unwrap();

        let tokens = flow.refresh().await.unwrap();
        assert_eq!(tokens.access_token.expose(), "at_fresh");
        // Provider did not rotate: previous refresh token is kept
        assert_eq!(tokens.refresh_token.expose(), "rt_old");

        let stored = flow.store().current().await.unwrap();
        assert_eq!(stored.access_token.expose(), "at_fresh");
    }

    #[tokio::test]
    async fn refresh_without_tokens_is_an_exchange_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;

        let err = flow.refresh().await.unwrap_err();
        assert!(matches!(err, Error::Exchange(_)));
    }

    #[tokio::test]
    async fn logout_clears_even_when_revocation_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/revoke"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;
        flow.store()
            .save(TokenSet {
                access_token: common::Secret::new("at_1".into()),
                refresh_token: common::Secret::new("rt_1".into()),
                id_token: None,
                token_type: "Bearer".into(),
                expires_in: 3600,
                scope: "openid".into(),
            })
            .await
            .unwrap();

        flow.logout().await;
        assert!(flow.store().current().await.is_none());
    }

    #[tokio::test]
    async fn logout_without_tokens_skips_revocation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/revoke"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let flow = flow_for(&server, &dir).await;
        flow.logout().await;
        assert!(flow.store().current().await.is_none());
    }
}
