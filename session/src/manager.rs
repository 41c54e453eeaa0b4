use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::logger::{TraceId, child_span, root_span};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, warn};

use crate::cache::SessionCache;
use crate::config::SessionConfig;
use crate::error::{IdentityError, SessionError, StorageError};
use crate::identity::{IdentityService, SessionCheck};
use crate::model::{Credentials, LoginOutcome, LogoutOutcome, Session, User};
use crate::persister::{PersistReport, Persister, SlotLock};
use crate::retriever::Retriever;
use crate::slots::SlotCodecs;
use crate::store::KeyValueStorage;

/// Establishes, persists, validates and recovers the user's session.
///
/// Three sources of truth are reconciled here: the in-memory cache, the
/// durable storage slots, and the identity service. The identity service
/// always wins; local storage is only trusted after it has been pushed
/// back into the service and confirmed.
///
/// Multi-step operations (`initialize`, `revalidate`, `login`, `logout`)
/// are serialized by one async lock, so a startup check racing a login
/// click can never interleave. Slot and cache updates take a second,
/// synchronous lock shared with the local-only readers.
pub struct SessionManager<I: IdentityService, S: KeyValueStorage> {
    identity: Arc<I>,
    cache: Arc<dyn SessionCache>,
    persister: Persister<S>,
    retriever: Retriever<S>,
    lifecycle: Mutex<()>,
    /// Set while the cache holds a session confirmed by the identity
    /// service (or a fresh login) in this process.
    validated: AtomicBool,
}

impl<I: IdentityService, S: KeyValueStorage> SessionManager<I, S> {
    pub fn new(
        identity: Arc<I>,
        storage: Arc<S>,
        cache: Arc<dyn SessionCache>,
        config: &SessionConfig,
    ) -> Self {
        let codecs = Arc::new(SlotCodecs::standard(config));
        let slots = SlotLock::default();

        Self {
            identity,
            persister: Persister::new(
                storage.clone(),
                cache.clone(),
                codecs.clone(),
                slots.clone(),
            ),
            retriever: Retriever::new(storage, cache.clone(), codecs, slots),
            cache,
            lifecycle: Mutex::new(()),
            validated: AtomicBool::new(false),
        }
    }

    /// Startup entry point: work out whether the user is signed in.
    ///
    /// Once a session has been validated in this process, later calls
    /// (including ones that queued behind the first) return it from the
    /// cache without asking the identity service again.
    pub async fn initialize(&self) -> Option<Session> {
        let trace_id = TraceId::new();
        let span = root_span("initialize", &trace_id);

        async {
            let _guard = self.lifecycle.lock().await;

            if self.validated.load(Ordering::Acquire) {
                if let Some(session) = self.retriever.peek() {
                    debug!("session already validated; using cache");
                    return Some(session);
                }
            }

            self.validate().await
        }
        .instrument(span)
        .await
    }

    /// Like `initialize`, but always asks the identity service.
    pub async fn revalidate(&self) -> Option<Session> {
        let trace_id = TraceId::new();
        let span = root_span("revalidate", &trace_id);

        async {
            let _guard = self.lifecycle.lock().await;
            self.validate().await
        }
        .instrument(span)
        .await
    }

    /// Ask the identity service, then fall back to stored tokens it confirms.
    async fn validate(&self) -> Option<Session> {
        match self
            .identity
            .get_session()
            .instrument(child_span("remote_check"))
            .await
        {
            SessionCheck::Active(session) => {
                info!("identity service reports an active session");
                return Some(self.accept(session));
            }
            SessionCheck::Unauthorized => {
                info!("identity service says unauthorized; clearing local session");
                let _ = self.clear_local();
                return None;
            }
            SessionCheck::Absent => {
                debug!("identity service has no session; trying local storage");
            }
            SessionCheck::Transient(e) => {
                warn!(error = %e, "identity check failed; trying local storage");
            }
        }

        self.restore_from_storage()
            .instrument(child_span("restore"))
            .await
    }

    async fn restore_from_storage(&self) -> Option<Session> {
        let Some(local) = self.retriever.retrieve() else {
            debug!("no local session");
            return None;
        };

        if let Err(e) = self.identity.set_session(&local.token_pair()).await {
            // the re-query below decides
            warn!(error = %e, "identity service rejected local tokens");
        }

        match self.identity.get_session().await {
            SessionCheck::Active(fresh) => {
                info!("local session revalidated");
                Some(self.accept(fresh))
            }
            SessionCheck::Transient(e) => {
                warn!(error = %e, "revalidation failed; clearing local session");
                let _ = self.clear_local();
                None
            }
            SessionCheck::Unauthorized | SessionCheck::Absent => {
                info!("local session is stale; clearing");
                let _ = self.clear_local();
                None
            }
        }
    }

    /// Persist a session confirmed by the identity service and mark it validated.
    fn accept(&self, session: Session) -> Session {
        let report = self.persister.persist(&session);
        if !report.is_success() {
            warn!(written = ?report.written, "session accepted but not fully persisted");
        }
        self.validated.store(true, Ordering::Release);

        if let Some(user_id) = session.user_id.as_deref() {
            tracing::Span::current().record("user_id", user_id);
        }
        session
    }

    /// The cache is always emptied; a storage error means disk may lag.
    fn clear_local(&self) -> Result<(), StorageError> {
        self.validated.store(false, Ordering::Release);
        self.persister
            .clear_all()
            .inspect_err(|e| warn!(error = %e, "local session not fully removed from storage"))
    }

    /// Sign in with credentials. Failures come back as data, never as `Err`.
    pub async fn login(&self, credentials: &Credentials) -> LoginOutcome {
        let trace_id = TraceId::new();
        let span = root_span("login", &trace_id);

        async {
            let _guard = self.lifecycle.lock().await;

            // never mix the previous user's state with the new one
            let _ = self.clear_local();

            match self.identity.sign_in_with_credentials(credentials).await {
                Ok(sign_in) if sign_in.session.is_valid() => {
                    let persisted = self.persister.persist(&sign_in.session);
                    self.validated.store(true, Ordering::Release);

                    if let Some(user_id) = sign_in.session.user_id.as_deref() {
                        tracing::Span::current().record("user_id", user_id);
                    }
                    info!(persisted = persisted.is_success(), "login succeeded");

                    LoginOutcome::Success {
                        session: sign_in.session,
                        user: sign_in.user,
                        persisted,
                    }
                }
                Ok(_) => {
                    warn!("identity service returned a session without an access token");
                    LoginOutcome::Failure {
                        error: IdentityError::InvalidResponse("missing access token".into()),
                    }
                }
                Err(error) => {
                    info!(error = %error, "login failed");
                    LoginOutcome::Failure { error }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Sign out remotely, then clear local state whatever the remote said.
    pub async fn logout(&self) -> LogoutOutcome {
        let trace_id = TraceId::new();
        let span = root_span("logout", &trace_id);

        async {
            let _guard = self.lifecycle.lock().await;

            let error = self.identity.sign_out().await.err();
            if let Some(e) = &error {
                warn!(error = %e, "remote sign-out failed; clearing local session anyway");
            }

            let storage_error = self.clear_local().err();
            info!("logged out");

            LogoutOutcome {
                error,
                storage_error,
            }
        }
        .instrument(span)
        .await
    }

    /// Local-only check: cache or storage holds a session with an access token.
    ///
    /// Never talks to the identity service, so it can report `true` for a
    /// token the service has already revoked. Use `initialize` or
    /// `revalidate` when that matters.
    pub fn is_authenticated(&self) -> bool {
        self.retriever.retrieve().is_some_and(|s| s.is_valid())
    }

    /// The current session as known locally (no network).
    pub fn current_session(&self) -> Option<Session> {
        self.retriever.retrieve()
    }

    /// Fetch the user's profile from the identity service. Not cached.
    pub async fn get_current_user(&self) -> Result<Option<User>, IdentityError> {
        self.identity.get_user().await
    }

    /// Write `session` to every storage slot and the cache.
    pub fn persist(&self, session: &Session) -> PersistReport {
        self.persister.persist(session)
    }

    pub fn retrieve(&self) -> Option<Session> {
        self.retriever.retrieve()
    }

    /// Drop the session from the cache and every storage slot.
    pub fn clear(&self) -> Result<(), SessionError> {
        Ok(self.clear_local()?)
    }
}
