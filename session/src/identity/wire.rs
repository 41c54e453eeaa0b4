//! JSON shapes spoken by a GoTrue-style identity API.
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Session, SignIn, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds, relative to when the token was issued.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Absolute expiry, epoch seconds. Preferred over `expires_in`.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub user: Option<User>,
}

impl WireSession {
    /// Out-of-range or negative lifetimes leave the expiry unknown.
    pub fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                self.expires_in
                    .filter(|secs| *secs >= 0)
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
            });

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
            user_id: self.user.map(|u| u.id),
        }
    }
}

/// Token endpoints answer either with the session fields at top level or
/// wrapped as `{"session": {...}, "user": {...}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TokenResponse {
    Enveloped {
        session: WireSession,
        #[serde(default)]
        user: Option<User>,
    },
    Flat(WireSession),
}

impl TokenResponse {
    pub fn into_sign_in(self, now: DateTime<Utc>) -> SignIn {
        let (wire, user) = match self {
            TokenResponse::Enveloped { session, user } => {
                let user = user.or_else(|| session.user.clone());
                (session, user)
            }
            TokenResponse::Flat(session) => {
                let user = session.user.clone();
                (session, user)
            }
        };

        let mut session = wire.into_session(now);
        if session.user_id.is_none() {
            session.user_id = user.as_ref().map(|u| u.id.clone());
        }

        SignIn { session, user }
    }
}

#[derive(Debug, Serialize)]
pub struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
}
