//! Authenticated user profile as served by the league backend.

use serde::Deserialize;
use uuid::Uuid;

use crate::error::Result;
use crate::gateway::RequestGateway;

/// The signed-in player, as returned by `GET /users/me`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub team_name: Option<String>,
}

/// Fetch the current user's profile through the gateway, so a stale session
/// is renewed transparently before the profile request is surfaced.
pub async fn fetch_profile(gateway: &RequestGateway) -> Result<SessionUser> {
    gateway.get_json("/users/me").await
}
