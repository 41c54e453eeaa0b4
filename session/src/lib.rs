//! Client-side authentication session manager.
//!
//! [`SessionManager`] is the entry point. It reconciles an in-memory
//! [`SessionCache`], redundant encodings in a [`KeyValueStorage`], and an
//! external [`IdentityService`] into one answer to "is the user signed in?".
pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod manager;
pub mod model;
pub mod persister;
pub mod retriever;
pub mod slots;
pub mod store;

pub use cache::{InMemorySessionCache, SessionCache};
pub use config::SessionConfig;
pub use error::{DecodeError, IdentityError, SessionError, StorageError};
pub use identity::{HttpIdentityService, IdentityService, SessionCheck};
pub use manager::SessionManager;
pub use model::{Credentials, LoginOutcome, LogoutOutcome, Session, SignIn, Slot, TokenPair, User};
pub use persister::PersistReport;
pub use store::{FileStorage, KeyValueStorage, MemoryStorage};
