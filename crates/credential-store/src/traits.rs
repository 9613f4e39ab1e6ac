//! Storage capability definitions.

use crate::StorageResult;

/// Key/value capability that every credential backend implements.
///
/// Values are opaque strings. Implementations must be safe to share between
/// tasks; the credential store serializes multi-key updates on top of this.
pub trait KeyValueStorage: Send + Sync {
    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a value. Returns whether the key existed.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Short backend name used in log lines.
    fn backend_name(&self) -> &'static str {
        "custom"
    }
}
