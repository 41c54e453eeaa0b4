//! Redundant storage encodings of one logical session.
//!
//! Each slot has a codec; `SlotCodecs` keeps them in retrieval priority
//! order (most complete information first). Writers go the other way
//! round so the legacy slot is always the first one touched.
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::{DecodeError, StorageError};
use crate::model::{Session, Slot};

pub trait SlotCodec: Send + Sync {
    fn slot(&self) -> Slot;

    /// Storage key this codec reads and writes.
    fn key(&self) -> &str;

    fn encode(&self, session: &Session) -> Result<String, StorageError>;

    /// `Ok(None)` means the slot holds nothing usable; `Err` means it held
    /// something that could not be parsed. Callers treat both as empty.
    fn decode(&self, raw: &str) -> Result<Option<Session>, DecodeError>;
}

/* =========================
 * PROVIDER-NATIVE
 * ========================= */

#[derive(Debug, Serialize, Deserialize)]
struct ProviderSlot {
    #[serde(rename = "currentSession", default)]
    current_session: Option<ProviderSession>,
    #[serde(rename = "expiresAt", default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProviderSession {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<ProviderUser>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProviderUser {
    id: String,
}

/// `{"currentSession": {...}, "expiresAt": <epoch seconds>}`
pub struct ProviderNativeCodec {
    key: String,
}

impl ProviderNativeCodec {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl SlotCodec for ProviderNativeCodec {
    fn slot(&self) -> Slot {
        Slot::ProviderNative
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn encode(&self, session: &Session) -> Result<String, StorageError> {
        let expires_at = session.expires_at.map(|t| t.timestamp());
        let slot = ProviderSlot {
            current_session: Some(ProviderSession {
                access_token: session.access_token.clone(),
                refresh_token: session.refresh_token.clone(),
                expires_at,
                user: session.user_id.clone().map(|id| ProviderUser { id }),
            }),
            expires_at,
        };

        Ok(serde_json::to_string(&slot)?)
    }

    fn decode(&self, raw: &str) -> Result<Option<Session>, DecodeError> {
        let slot: ProviderSlot = serde_json::from_str(raw)?;

        let Some(current) = slot.current_session else {
            return Ok(None);
        };
        if current.access_token.is_empty() {
            return Err(DecodeError::MissingToken);
        }

        let expires_at = current
            .expires_at
            .or(slot.expires_at)
            .map(epoch_to_datetime)
            .transpose()?;

        Ok(Some(Session {
            access_token: current.access_token,
            refresh_token: current.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
            user_id: current.user.map(|u| u.id),
        }))
    }
}

/* =========================
 * APPLICATION-NATIVE
 * ========================= */

#[derive(Debug, Serialize, Deserialize)]
struct AppSlot {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// `{"token", "refresh_token", "expires_at": RFC 3339, "user_id"}`
pub struct ApplicationNativeCodec {
    key: String,
}

impl ApplicationNativeCodec {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl SlotCodec for ApplicationNativeCodec {
    fn slot(&self) -> Slot {
        Slot::ApplicationNative
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn encode(&self, session: &Session) -> Result<String, StorageError> {
        let slot = AppSlot {
            token: Some(session.access_token.clone()),
            refresh_token: session.refresh_token.clone(),
            expires_at: session.expires_at.map(|t| t.to_rfc3339()),
            user_id: session.user_id.clone(),
        };

        Ok(serde_json::to_string(&slot)?)
    }

    /// Yields a minimal session: token, refresh token and user id only.
    /// The stored expiry is not trusted.
    fn decode(&self, raw: &str) -> Result<Option<Session>, DecodeError> {
        let slot: AppSlot = serde_json::from_str(raw)?;

        let Some(token) = slot.token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        Ok(Some(Session {
            access_token: token,
            refresh_token: slot.refresh_token.filter(|t| !t.is_empty()),
            expires_at: None,
            user_id: slot.user_id,
        }))
    }
}

/* =========================
 * LEGACY
 * ========================= */

/// Raw access-token string. Carries no refresh capability.
pub struct LegacyTokenCodec {
    key: String,
}

impl LegacyTokenCodec {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl SlotCodec for LegacyTokenCodec {
    fn slot(&self) -> Slot {
        Slot::Legacy
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn encode(&self, session: &Session) -> Result<String, StorageError> {
        Ok(session.access_token.clone())
    }

    /// The stored string is the token, byte for byte.
    fn decode(&self, raw: &str) -> Result<Option<Session>, DecodeError> {
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(Session::new(raw)))
    }
}

/* =========================
 * ORDERED SET
 * ========================= */

/// Codecs in retrieval priority order.
pub struct SlotCodecs {
    codecs: Vec<Box<dyn SlotCodec>>,
}

impl SlotCodecs {
    pub fn new(codecs: Vec<Box<dyn SlotCodec>>) -> Self {
        Self { codecs }
    }

    /// provider-native > application-native > legacy
    pub fn standard(config: &SessionConfig) -> Self {
        Self::new(vec![
            Box::new(ProviderNativeCodec::new(&config.provider_key)),
            Box::new(ApplicationNativeCodec::new(&config.app_key)),
            Box::new(LegacyTokenCodec::new(&config.legacy_key)),
        ])
    }

    pub fn by_priority(&self) -> impl Iterator<Item = &dyn SlotCodec> {
        self.codecs.iter().map(|c| c.as_ref())
    }

    pub fn write_order(&self) -> impl Iterator<Item = &dyn SlotCodec> {
        self.codecs.iter().rev().map(|c| c.as_ref())
    }
}

fn epoch_to_datetime(secs: i64) -> Result<DateTime<Utc>, DecodeError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| DecodeError::Timestamp(secs.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_session() -> Session {
        Session::new("T1")
            .with_refresh_token("R1")
            .with_expires_at(Utc.timestamp_opt(1_900_000_000, 0).unwrap())
            .with_user_id("U1")
    }

    #[test]
    fn provider_native_shape_matches_sdk_layout() {
        let codec = ProviderNativeCodec::new("p");
        let raw = codec.encode(&full_session()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(v["currentSession"]["access_token"], "T1");
        assert_eq!(v["currentSession"]["refresh_token"], "R1");
        assert_eq!(v["currentSession"]["user"]["id"], "U1");
        assert_eq!(v["expiresAt"], 1_900_000_000);
    }

    #[test]
    fn provider_native_keeps_everything() {
        let codec = ProviderNativeCodec::new("p");
        let raw = codec.encode(&full_session()).unwrap();
        assert_eq!(codec.decode(&raw).unwrap(), Some(full_session()));
    }

    #[test]
    fn provider_native_falls_back_to_outer_expiry() {
        let codec = ProviderNativeCodec::new("p");
        let raw = r#"{"currentSession":{"access_token":"T1"},"expiresAt":1900000000}"#;
        let s = codec.decode(raw).unwrap().unwrap();
        assert_eq!(s.expires_at.map(|t| t.timestamp()), Some(1_900_000_000));
    }

    #[test]
    fn provider_native_without_nested_session_is_empty() {
        let codec = ProviderNativeCodec::new("p");
        assert_eq!(codec.decode(r#"{"expiresAt":1}"#).unwrap(), None);
    }

    #[test]
    fn provider_native_without_token_is_an_error() {
        let codec = ProviderNativeCodec::new("p");
        let err = codec
            .decode(r#"{"currentSession":{"refresh_token":"R1"}}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingToken));
    }

    #[test]
    fn application_native_shape_uses_iso_expiry() {
        let codec = ApplicationNativeCodec::new("a");
        let raw = codec.encode(&full_session()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(v["token"], "T1");
        assert_eq!(v["refresh_token"], "R1");
        assert_eq!(v["user_id"], "U1");
        assert!(v["expires_at"].as_str().unwrap().starts_with("2030-03-17T"));
    }

    #[test]
    fn application_native_decode_is_minimal() {
        let codec = ApplicationNativeCodec::new("a");
        let raw = codec.encode(&full_session()).unwrap();
        let s = codec.decode(&raw).unwrap().unwrap();

        assert_eq!(s.access_token, "T1");
        assert_eq!(s.refresh_token.as_deref(), Some("R1"));
        assert_eq!(s.user_id.as_deref(), Some("U1"));
        assert!(s.expires_at.is_none());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let codec = ApplicationNativeCodec::new("a");
        assert!(matches!(
            codec.decode("not json at all"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn legacy_is_the_raw_token() {
        let codec = LegacyTokenCodec::new("l");
        assert_eq!(codec.encode(&full_session()).unwrap(), "T1");
        assert_eq!(codec.decode("T1").unwrap(), Some(Session::new("T1")));
        assert_eq!(codec.decode(" T1 ").unwrap(), Some(Session::new(" T1 ")));
        assert_eq!(codec.decode("").unwrap(), None);
    }

    #[test]
    fn standard_order() {
        let codecs = SlotCodecs::standard(&SessionConfig::default());

        let read: Vec<Slot> = codecs.by_priority().map(|c| c.slot()).collect();
        let write: Vec<Slot> = codecs.write_order().map(|c| c.slot()).collect();

        assert_eq!(
            read,
            vec![Slot::ProviderNative, Slot::ApplicationNative, Slot::Legacy]
        );
        assert_eq!(write, Slot::ALL.to_vec());
    }
}
