//! Persisted token storage
//!
//! Holds the current TokenSet in memory and mirrors it to a JSON file so the
//! session survives process restarts. All writes use atomic temp-file +
//! rename to prevent corruption on crash; the file carries mode 0600 since
//! it contains OAuth tokens. A tokio Mutex serializes concurrent writes from
//! login, refresh, and logout.
//!
//! The in-memory state is authoritative for the current process: a failed
//! disk write surfaces as `Error::Storage` but the new tokens stay usable
//! until the process exits (degraded persistence, not a hard failure).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use common::Secret;

use crate::error::{Error, Result};
use crate::token::TokenSet;

/// On-disk shape: the three secrets plus the user uuid marker.
///
/// TokenSet deserialization requires every mandatory field, so a persisted
/// record missing one (e.g. an access token with no refresh token) fails to
/// parse and the whole document is treated as absent. Partial sets never
/// reach callers.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct PersistedSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tokens: Option<TokenSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_uuid: Option<Uuid>,
}

/// Token store: in-memory cache plus restart-surviving JSON file.
pub struct TokenStore {
    path: PathBuf,
    state: Mutex<PersistedSession>,
}

impl TokenStore {
    /// Open a store backed by the given file path.
    ///
    /// Never fails: a missing, unreadable, or partially-populated file
    /// yields an absent token set (the caller starts logged out).
    pub async fn open(path: PathBuf) -> Self {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<PersistedSession>(&contents) {
                Ok(session) => {
                    debug!(path = %path.display(), present = session.tokens.is_some(), "loaded persisted session");
                    session
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "persisted session unreadable, treating as absent");
                    PersistedSession::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedSession::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read persisted session, treating as absent");
                PersistedSession::default()
            }
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Replace the stored TokenSet and persist.
    ///
    /// The in-memory set is updated before the disk write, so on
    /// `Error::Storage` the caller can log and continue with the new tokens
    /// for the rest of the process lifetime.
    pub async fn save(&self, tokens: TokenSet) -> Result<()> {
        let mut state = self.state.lock().await;
        state.tokens = Some(tokens);
        write_atomic(&self.path, &state).await
    }

    /// Record the authenticated user's id alongside the tokens.
    pub async fn set_user_uuid(&self, user_uuid: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        state.user_uuid = Some(user_uuid);
        write_atomic(&self.path, &state).await
    }

    /// The current TokenSet, if present.
    pub async fn current(&self) -> Option<TokenSet> {
        self.state.lock().await.tokens.clone()
    }

    /// The current access token, read fresh for each outgoing request.
    pub async fn access_token(&self) -> Option<Secret<String>> {
        let state = self.state.lock().await;
        state.tokens.as_ref().map(|t| t.access_token.clone())
    }

    /// The persisted user uuid marker, if any.
    pub async fn user_uuid(&self) -> Option<Uuid> {
        self.state.lock().await.user_uuid
    }

    /// Drop all tokens and the user marker, removing the file.
    ///
    /// Infallible: logout must never be blocked by storage. A failed file
    /// removal is logged and the in-memory state is cleared regardless.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        *state = PersistedSession::default();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "persisted session removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove persisted session")
            }
        }
    }
}

/// Write the session document atomically: temp file in the same directory,
/// then rename over the target. Mode 0600 on unix.
async fn write_atomic(path: &Path, data: &PersistedSession) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Storage(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage("session path has no parent directory".into()))?;

    if !dir.exists() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Storage(format!("creating session directory: {e}")))?;
    }

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}
