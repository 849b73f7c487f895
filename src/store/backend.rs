use async_trait::async_trait;

use crate::Error;

/// Durable text storage underneath the [`SecureKeyStore`](crate::SecureKeyStore).
///
/// Values are opaque to the backend. Each `write` and `remove` must be atomic
/// for its record: a reader sees either the old value or the new one, never a
/// torn write.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the value stored under `name`.
    async fn read(&self, name: &str) -> Result<Option<String>, Error>;

    /// Stores `value` under `name`, replacing any previous value.
    async fn write(&self, name: &str, value: &str) -> Result<(), Error>;

    /// Removes `name`. Returns whether a value was present.
    async fn remove(&self, name: &str) -> Result<bool, Error>;

    /// Names of every stored value, in no particular order.
    async fn names(&self) -> Result<Vec<String>, Error>;
}
