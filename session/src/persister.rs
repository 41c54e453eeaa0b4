use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::cache::SessionCache;
use crate::error::StorageError;
use crate::model::{Session, Slot};
use crate::slots::SlotCodecs;
use crate::store::KeyValueStorage;

/// Which slots a `persist` call managed to write.
///
/// Writes stop at the first failure; slots written before it are left
/// in place (no rollback).
#[derive(Debug, Default)]
pub struct PersistReport {
    pub written: Vec<Slot>,
    pub failed: Option<(Slot, StorageError)>,
    /// Set when the session itself was unusable and nothing was attempted.
    pub rejected: bool,
}

impl PersistReport {
    fn rejected() -> Self {
        Self {
            rejected: true,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        !self.rejected && self.failed.is_none()
    }
}

/// Guards every slot-and-cache update; shared with the `Retriever`.
pub type SlotLock = Arc<Mutex<()>>;

/// Writes a session into every storage slot and into the cache.
pub struct Persister<S: KeyValueStorage> {
    storage: Arc<S>,
    cache: Arc<dyn SessionCache>,
    codecs: Arc<SlotCodecs>,
    lock: SlotLock,
}

impl<S: KeyValueStorage> Persister<S> {
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

    /// Persist `session` to all slots.
    ///
    /// A session without an access token is refused outright and the cache
    /// is left alone. Otherwise the cache always takes the session, even if
    /// a slot write fails: the process keeps the state it just accepted.
    #[instrument(skip_all, fields(user_id = session.user_id.as_deref().unwrap_or("-")))]
    pub fn persist(&self, session: &Session) -> PersistReport {
        if !session.is_valid() {
            warn!("refusing to persist a session without an access token");
            return PersistReport::rejected();
        }

        let _slots = self.lock.lock();
        let mut report = PersistReport::default();

        for codec in self.codecs.write_order() {
            let result = codec
                .encode(session)
                .and_then(|raw| self.storage.set(codec.key(), &raw));

            match result {
                Ok(()) => report.written.push(codec.slot()),
                Err(e) => {
                    warn!(slot = %codec.slot(), error = %e, "slot write failed; stopping");
                    report.failed = Some((codec.slot(), e));
                    break;
                }
            }
        }

        self.cache.set(session.clone());

        debug!(written = ?report.written, ok = report.is_success(), "session persisted");
        report
    }

    /// Remove every slot and empty the cache.
    ///
    /// Every slot is attempted and the cache is always emptied. The first
    /// storage failure is returned.
    #[instrument(skip_all)]
    pub fn clear_all(&self) -> Result<(), StorageError> {
        let _slots = self.lock.lock();
        let mut first_error = None;

        for codec in self.codecs.write_order() {
            if let Err(e) = self.storage.remove(codec.key()) {
                warn!(slot = %codec.slot(), error = %e, "slot removal failed");
                first_error.get_or_insert(e);
            }
        }
        self.cache.clear();

        match first_error {
            None => {
                debug!("session storage cleared");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemorySessionCache;
    use crate::config::SessionConfig;
    use crate::store::MemoryStorage;

    fn persister(storage: MemoryStorage) -> (Persister<MemoryStorage>, Arc<MemoryStorage>, Arc<InMemorySessionCache>) {
        let storage = Arc::new(storage);
        let cache = Arc::new(InMemorySessionCache::new());
        let codecs = Arc::new(SlotCodecs::standard(&SessionConfig::default()));
        (
            Persister::new(storage.clone(), cache.clone(), codecs, SlotLock::default()),
            storage,
            cache,
        )
    }

    #[test]
    fn writes_all_slots_and_cache() {
        let (p, storage, cache) = persister(MemoryStorage::new());

        let report = p.persist(&Session::new("T1").with_refresh_token("R1"));

        assert!(report.is_success());
        assert_eq!(report.written, Slot::ALL.to_vec());
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.get("auth_token").as_deref(), Some("T1"));
        assert_eq!(cache.get().unwrap().access_token, "T1");
    }

    #[test]
    fn rejects_session_without_token() {
        let (p, storage, cache) = persister(MemoryStorage::new());

        let report = p.persist(&Session::new("").with_refresh_token("R1"));

        assert!(!report.is_success());
        assert!(report.rejected);
        assert!(storage.is_empty());
        assert!(cache.get().is_none());
    }

    #[test]
    fn quota_failure_reports_partial_write_without_rollback() {
        // room for the legacy slot only
        let (p, storage, cache) = persister(MemoryStorage::with_quota(20));

        let report = p.persist(&Session::new("T1").with_refresh_token("R1"));

        assert!(!report.is_success());
        assert_eq!(report.written, vec![Slot::Legacy]);
        assert!(matches!(
            report.failed,
            Some((Slot::ProviderNative, StorageError::QuotaExceeded))
        ));
        assert_eq!(storage.get("auth_token").as_deref(), Some("T1"));
        assert!(cache.get().is_some());
    }

    #[test]
    fn clear_all_removes_slots_and_cache() {
        let (p, storage, cache) = persister(MemoryStorage::new());
        p.persist(&Session::new("T1"));

        p.clear_all().unwrap();

        assert!(storage.is_empty());
        assert!(cache.get().is_none());
    }
}
