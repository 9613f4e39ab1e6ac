//! Credential persistence for the MailGuard client.
//!
//! Storage is abstracted behind [`KeyValueStorage`] so the credential store
//! does not care where tokens end up:
//! - **file**: JSON document written atomically ([`FileStorage`])
//! - **memory**: process-local map for tests ([`MemoryStorage`])

mod credentials;
mod file;
mod keys;
mod memory;
mod traits;

pub use credentials::{CredentialStore, Credentials};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::KeyValueStorage;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a credential store persisted in the JSON file at `path`.
pub fn create_file_credential_store(path: &Path) -> StorageResult<CredentialStore> {
    let storage = FileStorage::new(path)?;
    Ok(CredentialStore::new(Box::new(storage)))
}

/// Create a credential store that lives only as long as the process.
pub fn create_memory_credential_store() -> CredentialStore {
    CredentialStore::new(Box::new(MemoryStorage::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_credential_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = create_file_credential_store(&path).unwrap();
        store
            .set(&Credentials::new("access", "refresh", "ana@example.com"))
            .unwrap();
        drop(store);

        let reopened = create_file_credential_store(&path).unwrap();
        let creds = reopened.get();
        assert_eq!(creds.access_token.as_deref(), Some("access"));
        assert_eq!(creds.identity.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_memory_credential_store_starts_empty() {
        let store = create_memory_credential_store();
        assert!(store.get().is_empty());
    }

    #[test]
    fn test_storage_keys_unique() {
        let unique: std::collections::HashSet<_> = StorageKeys::SESSION_SLOTS.iter().collect();
        assert_eq!(unique.len(), StorageKeys::SESSION_SLOTS.len());
    }
}
