//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier and S256 challenge used during the OAuth
//! authorization flow. The verifier is held by the flow for the duration of
//! one login attempt and sent during token exchange; the challenge is
//! included in the authorization URL so the authorization server can verify
//! the exchange request came from the same party that initiated the flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::config::OAuthConfig;

/// Challenge method sent in the authorization URL. Always S256; the plain
/// method is not offered.
pub const CHALLENGE_METHOD: &str = "S256";

/// Verifier/challenge pair for a single login attempt.
///
/// Ephemeral: generated by `begin_login`, discarded when the attempt
/// resolves (exchange completed, errored, or cancelled).
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
    pub method: &'static str,
}

impl PkceChallenge {
    /// Generate a fresh verifier and its S256 challenge.
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            method: CHALLENGE_METHOD,
        }
    }
}

/// Generate a cryptographically random PKCE code verifier.
///
/// Produces a 64-byte random value encoded as URL-safe base64 (no padding),
/// 86 characters, within the 43-128 range RFC 7636 requires.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random `state` value for CSRF protection on the redirect.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the full authorization URL with all required OAuth parameters.
///
/// The authorization server returns `state` unchanged in the redirect so the
/// client can correlate the callback with this attempt.
pub fn build_authorization_url(config: &OAuthConfig, challenge: &str, state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method={}",
        config.authorize_endpoint,
        config.client_id,
        urlencoded(&config.redirect_uri),
        urlencoded(&config.scopes),
        state,
        challenge,
        CHALLENGE_METHOD,
    )
}

/// Minimal URL encoding for parameter values.
/// Only encodes characters that would break URL parameter parsing.
fn urlencoded(s: &str) -> String {
    s.replace(' ', "%20")
        .replace(':', "%3A")
        .replace('/', "%2F")
}
