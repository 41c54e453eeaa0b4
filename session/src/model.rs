use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, StorageError};
use crate::persister::PersistReport;

/// The authenticated session as the rest of the application sees it.
///
/// An empty `access_token` is never an authenticated state: every component
/// treats such a value as "no session".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Self::default()
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// The bearer credential, or `None` when the session is degenerate.
    pub fn access_token(&self) -> Option<&str> {
        if self.access_token.is_empty() {
            None
        } else {
            Some(&self.access_token)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.access_token().is_some()
    }

    /// Returns true if the session has an expiry set and we have passed it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => now >= expiry,
            None => false,
        }
    }

    /// Token pair handed to the identity service when adopting this session.
    pub fn token_pair(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone().unwrap_or_default(),
        }
    }
}

/// Access/refresh pair pushed into the identity service.
/// `refresh_token` is the empty string when the session has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Result of a credential sign-in against the identity service.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub session: Session,
    pub user: Option<User>,
}

/// Durable storage slots holding redundant encodings of one logical session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Legacy,
    ProviderNative,
    ApplicationNative,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Legacy, Slot::ProviderNative, Slot::ApplicationNative];
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Slot::Legacy => "legacy",
            Slot::ProviderNative => "provider-native",
            Slot::ApplicationNative => "application-native",
        };
        f.write_str(s)
    }
}

/// What `login` hands back to the caller. Never an error: failures are data.
#[derive(Debug)]
pub enum LoginOutcome {
    Success {
        session: Session,
        user: Option<User>,
        persisted: PersistReport,
    },
    Failure {
        error: IdentityError,
    },
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success { .. })
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            LoginOutcome::Success { session, .. } => Some(session),
            LoginOutcome::Failure { .. } => None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            LoginOutcome::Success { user, .. } => user.as_ref(),
            LoginOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&IdentityError> {
        match self {
            LoginOutcome::Success { .. } => None,
            LoginOutcome::Failure { error } => Some(error),
        }
    }
}

/// What `logout` hands back. The cache is cleared whatever `error` holds.
#[derive(Debug, Default)]
pub struct LogoutOutcome {
    pub error: Option<IdentityError>,
    /// Set when a storage slot could not be removed from disk.
    pub storage_error: Option<StorageError>,
}

impl LogoutOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.storage_error.is_none()
    }
}
