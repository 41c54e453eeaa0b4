use parking_lot::Mutex;
use tracing::debug;

use crate::model::Session;

/// Process-lifetime cache of the current session.
///
/// Holds zero or one session; `set` is last-write-wins. No I/O.
pub trait SessionCache: Send + Sync {
    fn get(&self) -> Option<Session>;
    fn set(&self, session: Session);
    fn clear(&self);
}

#[derive(Default)]
pub struct InMemorySessionCache {
    current: Mutex<Option<Session>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionCache for InMemorySessionCache {
    fn get(&self) -> Option<Session> {
        self.current.lock().clone()
    }

    fn set(&self, session: Session) {
        let replaced = self.current.lock().replace(session).is_some();
        debug!(replaced, "session cache updated");
    }

    fn clear(&self) {
        let had = self.current.lock().take().is_some();
        debug!(had, "session cache cleared");
    }
}
