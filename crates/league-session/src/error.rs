//! Error types for session and gateway operations

/// Errors from the session layer.
///
/// `Clone` matters here: when a refresh fails, its error fans out to every
/// request queued behind it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A replayed request still failed authorization after a refresh, or
    /// the refresh itself was rejected. Terminal for the session.
    #[error("session expired: authorization failed after token refresh")]
    SessionExpired,

    /// The refresh exchange failed. Requests queued behind the refresh are
    /// rejected with this error; the session is considered expired.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    /// Non-2xx response surfaced by a typed helper. The gateway itself
    /// passes non-authorization statuses through untouched.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("response decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Auth(#[from] league_auth::Error),
}

impl Error {
    /// Whether this error must demote the session to logged-out.
    ///
    /// Only terminal authorization failures qualify; transient transport or
    /// backend errors leave the session standing.
    pub fn is_auth_fatal(&self) -> bool {
        match self {
            Error::SessionExpired | Error::Refresh(_) => true,
            Error::Auth(league_auth::Error::InvalidGrant(_)) => true,
            _ => false,
        }
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
