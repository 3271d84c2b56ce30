//! Token endpoint interactions
//!
//! Three operations against the configured identity provider:
//! 1. Authorization code exchange (completes the PKCE flow)
//! 2. Token refresh (refresh_token grant)
//! 3. Revocation (logout)
//!
//! All three POST form-encoded bodies. Responses are JSON.

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::config::OAuthConfig;
use crate::error::{Error, Result};

/// A complete set of issued tokens.
///
/// Immutable value: a refresh replaces the whole set, nothing is mutated in
/// place. Either fully present or absent: the store's load path rejects
/// partial records rather than producing a set with missing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<Secret<String>>,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
}

/// Raw token endpoint response for both exchange and refresh.
///
/// `refresh_token` is optional because some providers do not rotate it on
/// the refresh grant; [`TokenGrant::into_token_set`] carries the previous
/// one forward in that case.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: Secret<String>,
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default)]
    pub id_token: Option<Secret<String>>,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: String,
}

impl TokenGrant {
    /// Build a full TokenSet, falling back to `previous_refresh` when the
    /// provider did not rotate the refresh token.
    ///
    /// The initial code exchange passes `None`: a provider that issues no
    /// refresh token there leaves the client unable to renew the session
    /// later, which violates the fully-present invariant, so it is an error.
    pub fn into_token_set(self, previous_refresh: Option<Secret<String>>) -> Result<TokenSet> {
        let refresh_token = self
            .refresh_token
            .or(previous_refresh)
            .ok_or_else(|| Error::Exchange("no refresh token in response".into()))?;

        Ok(TokenSet {
            access_token: self.access_token,
            refresh_token,
            id_token: self.id_token,
            token_type: self.token_type,
            expires_in: self.expires_in,
            scope: self.scope,
        })
    }
}

/// Exchange an authorization code for tokens.
///
/// Second step of the PKCE flow: the user authorized in the browser and the
/// redirect delivered the code. The verifier proves this client initiated
/// the matching attempt.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenGrant> {
    let response = client
        .post(&config.token_endpoint)
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Exchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenGrant>()
        .await
        .map_err(|e| Error::Exchange(format!("invalid token response: {e}")))
}

/// Refresh an access token using a refresh token.
pub async fn refresh_grant(
    client: &reqwest::Client,
    config: &OAuthConfig,
    refresh: &str,
) -> Result<TokenGrant> {
    let response = client
        .post(&config.token_endpoint)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", config.client_id.as_str()),
            ("refresh_token", refresh),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 401/403 means the refresh token is revoked or invalid
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidGrant(format!("{status}: {body}")));
        }

        return Err(Error::Exchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenGrant>()
        .await
        .map_err(|e| Error::Exchange(format!("invalid refresh response: {e}")))
}

/// Revoke a token at the revocation endpoint.
///
/// Used on logout with the refresh token. Callers treat failure as
/// best-effort: local state is cleared regardless.
pub async fn revoke_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    token: &str,
) -> Result<()> {
    let response = client
        .post(&config.revocation_endpoint)
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("token", token),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("revocation request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Exchange(format!(
            "revocation endpoint returned {status}: {body}"
        )));
    }

    Ok(())
}
