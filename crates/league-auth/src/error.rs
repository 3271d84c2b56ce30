//! Error types for OAuth login, token exchange, and storage operations

/// Errors from the auth crate.
///
/// String payloads keep the enum `Clone`, which the session crate relies on
/// when fanning a refresh outcome out to queued requests.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The identity provider rejected the authorization request. The
    /// description is surfaced verbatim from the redirect.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Code-for-token or refresh-for-token exchange failed.
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// The token endpoint rejected the refresh token itself (401/403).
    #[error("refresh token rejected: {0}")]
    InvalidGrant(String),

    /// A code exchange was attempted without a PKCE verifier from the
    /// matching login attempt. Programming error, fails fast.
    #[error("no PKCE verifier recorded for this login attempt")]
    MissingVerifier,

    /// Token persistence failed. Non-fatal: callers keep the in-memory
    /// token for the remainder of the process.
    #[error("token storage unavailable: {0}")]
    Storage(String),

    #[error("HTTP request failed: {0}")]
    Http(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
