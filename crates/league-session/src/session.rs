//! Application-level session lifecycle.
//!
//! [`SessionContext`] ties the OAuth flow, the token store, and the request
//! gateway together into one observable state machine: logged out,
//! authenticating, or logged in with a known user profile. UI layers watch
//! the state; everything that mutates it funnels through the methods here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use league_auth::{AuthorizationResult, LoginAttempt, OAuthFlow};

use crate::error::{Error, Result};
use crate::gateway::{ApiRequest, RequestGateway};
use crate::profile::{self, SessionUser};

/// Observable authentication state.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    LoggedOut,
    /// A restore or login is in progress; the UI should hold rather than
    /// prompt for credentials.
    Authenticating,
    LoggedIn(SessionUser),
}

pub struct SessionContext {
    flow: Arc<OAuthFlow>,
    gateway: Arc<RequestGateway>,
    state: RwLock<SessionState>,
    // Signalled every time `Authenticating` settles, so concurrent callers
    // of `restore` can join the in-flight attempt instead of racing it.
    settled: Notify,
}

impl SessionContext {
    pub fn new(flow: Arc<OAuthFlow>, gateway: Arc<RequestGateway>) -> Self {
        Self {
            flow,
            gateway,
            state: RwLock::new(SessionState::LoggedOut),
            settled: Notify::new(),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn current_user(&self) -> Option<SessionUser> {
        match &*self.state.read().await {
            SessionState::LoggedIn(user) => Some(user.clone()),
            _ => None,
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(&*self.state.read().await, SessionState::LoggedIn(_))
    }

    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    /// Restore a session from persisted tokens at startup.
    ///
    /// With no stored tokens this settles on `LoggedOut` immediately. With
    /// tokens present it claims `Authenticating` and validates them by
    /// fetching the profile through the gateway, which renews a stale access
    /// token transparently. Any failure to produce a profile, including a
    /// rejected refresh, clears stored tokens and settles on `LoggedOut`;
    /// the user signs in again rather than starting in a broken session.
    ///
    /// A call on an established session returns it as-is. A call while a
    /// restore or login is already in progress joins it: the caller waits
    /// for the in-flight attempt to settle and returns the settled state,
    /// without issuing a second profile fetch.
    pub async fn restore(&self) -> SessionState {
        loop {
            let mut notified = std::pin::pin!(self.settled.notified());
            {
                let mut state = self.state.write().await;
                match &*state {
                    SessionState::LoggedIn(user) => {
                        return SessionState::LoggedIn(user.clone());
                    }
                    SessionState::Authenticating => {
                        // Register for the settle signal before releasing
                        // the lock, so a settle in between is not missed.
                        notified.as_mut().enable();
                    }
                    SessionState::LoggedOut => {
                        if self.flow.store().current().await.is_none() {
                            debug!("no persisted tokens, starting logged out");
                            return SessionState::LoggedOut;
                        }
                        *state = SessionState::Authenticating;
                        break;
                    }
                }
            }
            notified.await;
        }

        match profile::fetch_profile(&self.gateway).await {
            Ok(user) => {
                info!(user_id = %user.id, "session restored");
                if let Err(e) = self.flow.store().set_user_uuid(user.id).await {
                    warn!(error = %e, "persisting user id failed");
                }
                let mut state = self.state.write().await;
                *state = SessionState::LoggedIn(user.clone());
                self.settled.notify_waiters();
                SessionState::LoggedIn(user)
            }
            Err(e) => {
                warn!(error = %e, "session restore failed, clearing stored tokens");
                self.flow.store().clear().await;
                let mut state = self.state.write().await;
                *state = SessionState::LoggedOut;
                self.settled.notify_waiters();
                SessionState::LoggedOut
            }
        }
    }

    /// Start an interactive login. The caller opens the returned
    /// authorization URL in a browser and later feeds the redirect outcome
    /// to [`SessionContext::complete_login`].
    ///
    /// An established session keeps its `LoggedIn` state while the new
    /// attempt is pending: a re-login that is cancelled or fails must leave
    /// the existing session untouched, so it is not demoted up front.
    pub async fn begin_login(&self) -> LoginAttempt {
        {
            let mut state = self.state.write().await;
            if *state == SessionState::LoggedOut {
                *state = SessionState::Authenticating;
            }
        }
        self.flow.begin_login().await
    }

    /// Finish an interactive login with the redirect outcome.
    ///
    /// On a successful exchange the profile is fetched and the session
    /// becomes `LoggedIn`. A cancelled or failed attempt settles back on the
    /// state the attempt started from: `LoggedOut` for a fresh login, the
    /// untouched existing session for a re-login. Exchange failure never
    /// touches tokens a previous session may still hold.
    pub async fn complete_login(
        &self,
        attempt: &LoginAttempt,
        result: AuthorizationResult,
    ) -> Result<SessionState> {
        let exchanged = match self.flow.complete_login(attempt, result).await {
            Ok(Some(tokens)) => Some(tokens),
            Ok(None) => None,
            Err(e) => {
                self.settle_failed_attempt().await;
                return Err(Error::Auth(e));
            }
        };

        if exchanged.is_none() {
            self.settle_failed_attempt().await;
            return Ok(self.state().await);
        }

        match profile::fetch_profile(&self.gateway).await {
            Ok(user) => {
                if let Err(e) = self.flow.store().set_user_uuid(user.id).await {
                    warn!(error = %e, "persisting user id failed");
                }
                info!(user_id = %user.id, "login established");
                let mut state = self.state.write().await;
                *state = SessionState::LoggedIn(user.clone());
                self.settled.notify_waiters();
                Ok(SessionState::LoggedIn(user))
            }
            Err(e) => {
                warn!(error = %e, "profile fetch after login failed");
                self.settle_failed_attempt().await;
                Err(e)
            }
        }
    }

    /// Settle a login attempt that did not produce a session: a fresh login
    /// returns to `LoggedOut`, a re-login keeps the existing session.
    async fn settle_failed_attempt(&self) {
        let mut state = self.state.write().await;
        if *state == SessionState::Authenticating {
            *state = SessionState::LoggedOut;
        }
        self.settled.notify_waiters();
    }

    /// Sign out. The backend logout call and token revocation are both
    /// best-effort; local state always resets.
    pub async fn logout(&self) {
        let request = ApiRequest {
            method: reqwest::Method::POST,
            path: "/auth/logout".into(),
            body: None,
        };
        if let Err(e) = self.gateway.execute(&request).await {
            debug!(error = %e, "backend logout call failed, continuing local teardown");
        }
        self.flow.logout().await;
        let mut state = self.state.write().await;
        *state = SessionState::LoggedOut;
        self.settled.notify_waiters();
        info!("logged out");
    }

    /// Re-fetch the profile of an established session.
    ///
    /// Transient failures keep the current state; only a dead session
    /// (an exhausted refresh, a revoked grant) demotes to `LoggedOut`.
    pub async fn refresh_profile(&self) -> Result<SessionState> {
        match profile::fetch_profile(&self.gateway).await {
            Ok(user) => {
                let mut state = self.state.write().await;
                *state = SessionState::LoggedIn(user.clone());
                Ok(SessionState::LoggedIn(user))
            }
            Err(e) if e.is_auth_fatal() => {
                warn!(error = %e, "session no longer valid, logging out");
                self.flow.store().clear().await;
                let mut state = self.state.write().await;
                *state = SessionState::LoggedOut;
                Err(e)
            }
            Err(e) => {
                debug!(error = %e, "profile refresh failed, keeping current session");
                Err(e)
            }
        }
    }
}

/// Spawn a background task that periodically re-validates the session by
/// refreshing the profile. The first tick fires after one full interval,
/// not immediately; startup validation is `restore`'s job.
pub fn spawn_profile_refresh(ctx: Arc<SessionContext>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !matches!(ctx.state().await, SessionState::LoggedIn(_)) {
                continue;
            }
            match ctx.refresh_profile().await {
                Ok(_) => debug!("periodic profile refresh ok"),
                Err(e) => warn!(error = %e, "periodic profile refresh failed"),
            }
        }
    })
}
