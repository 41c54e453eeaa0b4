use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::SessionError;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    // =========================
    // Storage slot keys
    // =========================
    /// Key of the legacy slot holding the raw access token.
    ///
    /// Older builds only wrote this slot; it is still written so a
    /// downgrade keeps the user signed in.
    pub legacy_key: String,

    /// Key of the provider-native slot (`{currentSession, expiresAt}`),
    /// the shape the identity provider's own SDK persists.
    pub provider_key: String,

    /// Key of the application-native slot
    /// (`{token, refresh_token, expires_at, user_id}`).
    pub app_key: String,

    /// Backing file for `FileStorage`.
    pub storage_path: PathBuf,

    // =========================
    // Identity service
    // =========================
    /// Base URL of the identity service (no trailing slash).
    pub identity_url: String,

    /// Optional API key sent as `apikey` on every request.
    pub identity_api_key: Option<String>,

    /// Per-request timeout of the HTTP identity client.
    ///
    /// The session manager has no timeouts of its own; this is the
    /// only bound on how long a lifecycle operation can wait.
    pub identity_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            legacy_key: "auth_token".to_string(),
            provider_key: "sb-auth-token".to_string(),
            app_key: "app_session".to_string(),
            storage_path: PathBuf::from(".session/storage.json"),
            identity_url: "http://localhost:9999".to_string(),
            identity_api_key: None,
            identity_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            legacy_key: env_or("SESSION_LEGACY_KEY", defaults.legacy_key),
            provider_key: env_or("SESSION_PROVIDER_KEY", defaults.provider_key),
            app_key: env_or("SESSION_APP_KEY", defaults.app_key),
            storage_path: std::env::var("SESSION_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            identity_url: env_or("IDENTITY_URL", defaults.identity_url)
                .trim_end_matches('/')
                .to_string(),
            identity_api_key: std::env::var("IDENTITY_API_KEY").ok(),
            identity_timeout: Duration::from_secs(env_parse(
                "IDENTITY_TIMEOUT_SECS",
                defaults.identity_timeout.as_secs(),
            )),
        }
    }

    /// Slot keys must be distinct, otherwise one encoding overwrites another.
    pub fn validate(&self) -> Result<(), SessionError> {
        let keys = [&self.legacy_key, &self.provider_key, &self.app_key];

        if keys.iter().any(|k| k.is_empty()) {
            return Err(SessionError::Config("slot keys must not be empty".into()));
        }
        if keys[0] == keys[1] || keys[0] == keys[2] || keys[1] == keys[2] {
            return Err(SessionError::Config("slot keys must be distinct".into()));
        }

        Ok(())
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, default = %default, "invalid value; using default");
            default
        }),
        Err(_) => default,
    }
}
