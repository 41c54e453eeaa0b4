use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use session::{
    FileStorage, HttpIdentityService, InMemorySessionCache, Session, SessionConfig, SessionError,
    SessionManager,
};

#[derive(Debug, Parser)]
#[clap(name = "sessionctl", version, about = "Inspect and drive the local auth session")]
pub struct Cli {
    /// Identity service base URL (overrides IDENTITY_URL)
    #[clap(long)]
    pub identity_url: Option<String>,

    /// Storage file (overrides SESSION_STORAGE_PATH)
    #[clap(long)]
    pub storage: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[clap(long, default_value = "warn")]
    pub log: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in with credentials and persist the session
    Login {
        #[clap(long)]
        identifier: String,
        #[clap(long, env = "SESSIONCTL_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Sign out and clear local state
    Logout,
    /// Local-only check, no network
    Status,
    /// Validate the session against the identity service
    Init,
    /// Ask the identity service who we are
    Whoami,
}

/// Env config with command-line overrides applied
pub(crate) fn build_config(cli: &Cli) -> SessionConfig {
    let mut config = SessionConfig::from_env();

    if let Some(url) = &cli.identity_url {
        config.identity_url = url.trim_end_matches('/').to_string();
    }
    if let Some(path) = &cli.storage {
        config.storage_path = path.clone();
    }

    config
}

/// Wire the HTTP identity adapter and file storage into a manager
pub(crate) fn open_manager(
    config: &SessionConfig,
) -> Result<SessionManager<HttpIdentityService, FileStorage>, SessionError> {
    config.validate()?;

    let identity = Arc::new(HttpIdentityService::new(config)?);
    let storage = Arc::new(FileStorage::open(&config.storage_path)?);

    Ok(SessionManager::new(
        identity,
        storage,
        Arc::new(InMemorySessionCache::new()),
        config,
    ))
}

/// One-line summary that never prints token material
pub(crate) fn describe(session: &Session) -> String {
    let user = session.user_id.as_deref().unwrap_or("unknown user");
    let refresh = if session.refresh_token.is_some() {
        "refreshable"
    } else {
        "no refresh token"
    };

    match session.expires_at {
        Some(at) if session.is_expired(Utc::now()) => {
            format!("{user}, {refresh}, expired at {}", at.to_rfc3339())
        }
        Some(at) => format!("{user}, {refresh}, expires at {}", at.to_rfc3339()),
        None => format!("{user}, {refresh}, expiry unknown"),
    }
}
