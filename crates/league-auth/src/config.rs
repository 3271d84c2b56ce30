//! OAuth endpoint configuration
//!
//! The authorization, token, and revocation endpoints belong to the league's
//! identity provider and differ per deployment, so they are configuration
//! rather than compiled-in constants. Loaded from TOML with an env-var
//! override for the file path.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// OAuth client configuration for the league identity provider.
///
/// The client id identifies the public client application; it is not a
/// secret. The actual secrets (access/refresh tokens) live in the
/// [`TokenStore`](crate::TokenStore).
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub revocation_endpoint: String,
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: String,
}

fn default_scopes() -> String {
    "openid profile email".to_string()
}

impl OAuthConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: OAuthConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate endpoint schemes and required fields.
    pub fn validate(&self) -> common::Result<()> {
        for (name, url) in [
            ("authorize_endpoint", &self.authorize_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("revocation_endpoint", &self.revocation_endpoint),
            ("redirect_uri", &self.redirect_uri),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        Ok(())
    }

    /// Resolve the config file path from a CLI arg or LEAGUE_AUTH_CONFIG
    /// env var, falling back to `league-auth.toml`.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("LEAGUE_AUTH_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("league-auth.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn valid_toml() -> &'static str {
        r#"
client_id = "league-mobile"
authorize_endpoint = "https://id.example.org/oauth/authorize"
token_endpoint = "https://id.example.org/oauth/token"
revocation_endpoint = "https://id.example.org/oauth/revoke"
redirect_uri = "https://league.example.org/auth/callback"
"#
    }

    #[test]
    fn load_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("league-auth.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        let config = OAuthConfig::load(&path).unwrap();
        assert_eq!(config.client_id, "league-mobile");
        assert_eq!(
            config.token_endpoint,
            "https://id.example.org/oauth/token"
        );
        // Default scopes apply when not set
        assert_eq!(config.scopes, "openid profile email");
    }

    #[test]
    fn load_missing_file() {
        let result = OAuthConfig::load(Path::new("/nonexistent/league-auth.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{{{ toml").unwrap();

        assert!(OAuthConfig::load(&path).is_err());
    }

    #[test]
    fn endpoint_without_scheme_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("league-auth.toml");
        std::fs::write(
            &path,
            r#"
client_id = "league-mobile"
authorize_endpoint = "id.example.org/oauth/authorize"
token_endpoint = "https://id.example.org/oauth/token"
revocation_endpoint = "https://id.example.org/oauth/revoke"
redirect_uri = "https://league.example.org/auth/callback"
"#,
        )
        .unwrap();

        let err = OAuthConfig::load(&path).unwrap_err();
        assert!(
            err.to_string().contains("authorize_endpoint"),
            "error should name the bad field, got: {err}"
        );
    }

    #[test]
    fn empty_client_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("league-auth.toml");
        std::fs::write(
            &path,
            r#"
client_id = "  "
authorize_endpoint = "https://id.example.org/oauth/authorize"
token_endpoint = "https://id.example.org/oauth/token"
revocation_endpoint = "https://id.example.org/oauth/revoke"
redirect_uri = "https://league.example.org/auth/callback"
"#,
        )
        .unwrap();

        let err = OAuthConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn custom_scopes_override_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("league-auth.toml");
        let toml = format!("{}scopes = \"openid league:play\"\n", valid_toml());
        std::fs::write(&path, toml).unwrap();

        let config = OAuthConfig::load(&path).unwrap();
        assert_eq!(config.scopes, "openid league:play");
    }

    #[test]
    fn resolve_path_cli_arg_wins() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("LEAGUE_AUTH_CONFIG", "/env/should-lose.toml") };
        let path = OAuthConfig::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
        unsafe { std::env::remove_var("LEAGUE_AUTH_CONFIG") };
    }

    #[test]
    fn resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("LEAGUE_AUTH_CONFIG", "/env/path.toml") };
        let path = OAuthConfig::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { std::env::remove_var("LEAGUE_AUTH_CONFIG") };
    }

    #[test]
    fn resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { std::env::remove_var("LEAGUE_AUTH_CONFIG") };
        let path = OAuthConfig::resolve_path(None);
        assert_eq!(path, PathBuf::from("league-auth.toml"));
    }
}
