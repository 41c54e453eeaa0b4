use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::SessionCache;
use crate::model::{Session, Slot};
use crate::persister::SlotLock;
use crate::slots::SlotCodecs;
use crate::store::KeyValueStorage;

/// Reads the session back from the cache or durable storage. No network.
pub struct Retriever<S: KeyValueStorage> {
    storage: Arc<S>,
    cache: Arc<dyn SessionCache>,
    codecs: Arc<SlotCodecs>,
    lock: SlotLock,
}

impl<S: KeyValueStorage> Retriever<S> {
    pub fn new(
        storage: Arc<S>,
        cache: Arc<dyn SessionCache>,
        codecs: Arc<SlotCodecs>,
        lock: SlotLock,
    ) -> Self {
        Self {
            storage,
            cache,
            codecs,
            lock,
        }
    }

    /// Cache value only.
    pub fn peek(&self) -> Option<Session> {
        self.cache.get().filter(Session::is_valid)
    }

    /// Cache first, then each slot in priority order.
    ///
    /// Unreadable slots are logged and skipped. Only the richer slots are
    /// cached; a legacy-only hit is returned without refresh capability and
    /// is decoded again next time.
    ///
    /// Holds the slot lock from the first read until the cache is filled,
    /// so a concurrent clear cannot be undone by a stale read.
    pub fn retrieve(&self) -> Option<Session> {
        if let Some(session) = self.peek() {
            return Some(session);
        }

        let _slots = self.lock.lock();
        if let Some(session) = self.peek() {
            return Some(session);
        }

        for codec in self.codecs.by_priority() {
            let Some(raw) = self.storage.get(codec.key()) else {
                continue;
            };

            match codec.decode(&raw) {
                Ok(Some(session)) if session.is_valid() => {
                    debug!(slot = %codec.slot(), "session restored from storage");
                    if codec.slot() != Slot::Legacy {
                        self.cache.set(session.clone());
                    }
                    return Some(session);
                }
                Ok(_) => {
                    debug!(slot = %codec.slot(), "slot holds no session");
                }
                Err(e) => {
                    warn!(slot = %codec.slot(), error = %e, "slot decode failed; trying next");
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemorySessionCache;
    use crate::config::SessionConfig;
    use crate::store::MemoryStorage;
    use tracing_test::traced_test;

    struct Fixture {
        retriever: Retriever<MemoryStorage>,
        storage: Arc<MemoryStorage>,
        cache: Arc<InMemorySessionCache>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let cache = Arc::new(InMemorySessionCache::new());
        let codecs = Arc::new(SlotCodecs::standard(&SessionConfig::default()));
        Fixture {
            retriever: Retriever::new(storage.clone(), cache.clone(), codecs, SlotLock::default()),
            storage,
            cache,
        }
    }

    #[test]
    fn empty_storage_yields_none() {
        let f = fixture();
        assert!(f.retriever.retrieve().is_none());
    }

    #[test]
    fn cache_wins_over_storage() {
        let f = fixture();
        f.storage.set("auth_token", "FROM_DISK").unwrap();
        f.cache.set(Session::new("FROM_CACHE"));

        assert_eq!(f.retriever.retrieve().unwrap().access_token, "FROM_CACHE");
    }

    #[test]
    fn provider_slot_beats_application_slot() {
        let f = fixture();
        f.storage
            .set("sb-auth-token", r#"{"currentSession":{"access_token":"P"}}"#)
            .unwrap();
        f.storage.set("app_session", r#"{"token":"A"}"#).unwrap();
        f.storage.set("auth_token", "L").unwrap();

        let s = f.retriever.retrieve().unwrap();
        assert_eq!(s.access_token, "P");
        assert_eq!(f.cache.get().unwrap().access_token, "P");
    }

    #[test]
    fn application_slot_beats_legacy() {
        let f = fixture();
        f.storage
            .set("app_session", r#"{"token":"A","refresh_token":"R","user_id":"U"}"#)
            .unwrap();
        f.storage.set("auth_token", "L").unwrap();

        let s = f.retriever.retrieve().unwrap();
        assert_eq!(s.access_token, "A");
        assert_eq!(s.refresh_token.as_deref(), Some("R"));
        assert_eq!(s.user_id.as_deref(), Some("U"));
    }

    #[test]
    fn legacy_only_has_no_refresh_and_is_not_cached() {
        let f = fixture();
        f.storage.set("auth_token", "L").unwrap();

        let s = f.retriever.retrieve().unwrap();
        assert_eq!(s, Session::new("L"));
        assert!(s.refresh_token.is_none());
        assert!(f.cache.get().is_none());
    }

    #[traced_test]
    #[test]
    fn corrupt_slots_fall_through_and_are_logged() {
        let f = fixture();
        f.storage.set("sb-auth-token", "{{{{").unwrap();
        f.storage.set("app_session", "garbage text").unwrap();
        f.storage.set("auth_token", "L").unwrap();

        assert_eq!(f.retriever.retrieve().unwrap().access_token, "L");
        assert!(logs_contain("slot decode failed"));
    }

    #[test]
    fn all_corrupt_yields_none() {
        let f = fixture();
        f.storage.set("sb-auth-token", "[1,2").unwrap();
        f.storage.set("app_session", "nope").unwrap();
        f.storage.set("auth_token", "").unwrap();

        assert!(f.retriever.retrieve().is_none());
    }
}
