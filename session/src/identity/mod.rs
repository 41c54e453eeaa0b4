pub mod http;
pub mod wire;

pub use http::HttpIdentityService;

use crate::error::IdentityError;
use crate::model::{Credentials, Session, SignIn, TokenPair, User};

/// What the identity service says about its own current session.
///
/// `Unauthorized` is a confident negative; `Absent` and `Transient` mean
/// "unknown", and callers may fall back to local state.
#[derive(Debug)]
pub enum SessionCheck {
    Active(Session),
    Absent,
    Unauthorized,
    Transient(IdentityError),
}

impl From<Result<Option<Session>, IdentityError>> for SessionCheck {
    fn from(result: Result<Option<Session>, IdentityError>) -> Self {
        match result {
            Ok(Some(session)) if session.is_valid() => SessionCheck::Active(session),
            Ok(_) => SessionCheck::Absent,
            Err(e) if e.is_unauthorized() => SessionCheck::Unauthorized,
            Err(e) => SessionCheck::Transient(e),
        }
    }
}

/// Capability interface of the external identity provider.
#[async_trait::async_trait]
pub trait IdentityService: Send + Sync {
    async fn get_session(&self) -> SessionCheck;

    /// Adopt `tokens` as the service's current session.
    async fn set_session(&self, tokens: &TokenPair) -> Result<(), IdentityError>;

    async fn sign_in_with_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<SignIn, IdentityError>;

    async fn sign_out(&self) -> Result<(), IdentityError>;

    async fn get_user(&self) -> Result<Option<User>, IdentityError>;
}
