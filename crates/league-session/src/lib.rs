//! Authenticated session layer for the league backend.
//!
//! This crate sits between the OAuth machinery in `league-auth` and the
//! application UI:
//!
//! - [`RequestGateway`] sends every API call with fresh credentials,
//!   coalesces concurrent renewals into a single flight, and replays a
//!   failed request exactly once.
//! - [`SessionStrategy`] abstracts over how credentials travel: a bearer
//!   token from the local store, or an httpOnly cookie the backend rotates.
//! - [`SessionContext`] exposes the logged-out / authenticating / logged-in
//!   state machine the UI renders from.

pub mod error;
pub mod gateway;
pub mod profile;
pub mod session;
pub mod strategy;

pub use error::{Error, Result};
pub use gateway::{ApiRequest, ApiResponse, RequestGateway};
pub use profile::{SessionUser, fetch_profile};
pub use session::{SessionContext, SessionState, spawn_profile_refresh};
pub use strategy::{BearerTokenStrategy, CookieSessionStrategy, SessionStrategy};
