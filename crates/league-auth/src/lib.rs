//! OAuth authentication library for the league client
//!
//! Provides PKCE flow generation, token exchange/refresh/revocation, and the
//! persisted token store. This crate is a standalone library with no
//! dependency on the session layer; it can be tested and used
//! independently.
//!
//! Login flow:
//! 1. `OAuthFlow::begin_login()` generates a PKCE pair and authorization URL
//! 2. The host platform opens the URL in a browser
//! 3. The redirect delivers an `AuthorizationResult` into `complete_login()`
//! 4. On success the exchanged `TokenSet` is saved via `TokenStore`
//! 5. The session layer calls `OAuthFlow::refresh()` when a request is
//!    rejected with an expired token
//! 6. `OAuthFlow::logout()` revokes best-effort and clears the store

pub mod config;
pub mod error;
pub mod flow;
pub mod pkce;
pub mod store;
pub mod token;

pub use config::OAuthConfig;
pub use error::{Error, Result};
pub use flow::{AuthorizationResult, LoginAttempt, OAuthFlow};
pub use pkce::{PkceChallenge, build_authorization_url, compute_challenge, generate_verifier};
pub use store::TokenStore;
pub use token::{TokenGrant, TokenSet};
