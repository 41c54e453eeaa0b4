pub mod file_store;
pub mod memory_store;

pub use file_store::FileStorage;
pub use memory_store::MemoryStorage;

use crate::error::StorageError;

/// Durable string key-value storage (browser-local-storage semantics).
///
/// Reads never fail: an unreadable key is simply absent. Writes and
/// removals may fail (quota exceeded, storage disabled) and report why.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
