//! High-level API for the persisted session credentials.

use crate::{KeyValueStorage, StorageKeys, StorageResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Persisted session credentials. Tokens are opaque strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Short-lived token attached to outbound requests
    #[serde(default)]
    pub access_token: Option<String>,
    /// Longer-lived token used only to mint new access tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Email the session was opened with
    #[serde(default)]
    pub identity: Option<String>,
}

impl Credentials {
    /// Credentials produced by a successful login.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            identity: Some(identity.into()),
        }
    }

    /// True when no slot holds a value.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.identity.is_none()
    }

    /// True when both tokens are present.
    pub fn has_session(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }
}

/// Owner of the persisted credentials.
///
/// Reads never fail: a broken backend degrades to empty credentials so the
/// rest of the client falls back to "unauthenticated". Multi-slot writes hold
/// the write half of a lock so readers never observe a partial update.
pub struct CredentialStore {
    storage: Box<dyn KeyValueStorage>,
    guard: RwLock<()>,
}

impl CredentialStore {
    /// Create a credential store over the given storage backend
    pub fn new(storage: Box<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            guard: RwLock::new(()),
        }
    }

    /// Read the current credentials, or empty credentials if storage fails.
    pub fn get(&self) -> Credentials {
        let _read = self.guard.read();
        match self.read_slots() {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(
                    backend = self.storage.backend_name(),
                    error = %e,
                    "Credential storage unavailable, treating session as empty"
                );
                Credentials::default()
            }
        }
    }

    fn read_slots(&self) -> StorageResult<Credentials> {
        let access_token = self.storage.get(StorageKeys::ACCESS_TOKEN)?;
        let refresh_token = self.storage.get(StorageKeys::REFRESH_TOKEN)?;
        // An identity hint without an access token is stale.
        let identity = match access_token {
            Some(_) => self.storage.get(StorageKeys::IDENTITY_HINT)?,
            None => None,
        };
        Ok(Credentials {
            access_token,
            refresh_token,
            identity,
        })
    }

    /// Overwrite all three slots. Absent fields clear their slot.
    pub fn set(&self, credentials: &Credentials) -> StorageResult<()> {
        let _write = self.guard.write();
        self.write_slot(StorageKeys::ACCESS_TOKEN, credentials.access_token.as_deref())?;
        self.write_slot(StorageKeys::REFRESH_TOKEN, credentials.refresh_token.as_deref())?;
        self.write_slot(StorageKeys::IDENTITY_HINT, credentials.identity.as_deref())?;
        debug!(backend = self.storage.backend_name(), "Credentials stored");
        Ok(())
    }

    /// Store a refreshed access token, and the refresh token if it was rotated.
    ///
    /// Only applies while the stored refresh token is still `used_refresh_token`;
    /// returns false when the session was cleared or replaced in the meantime.
    /// The identity hint is left untouched.
    pub fn store_refreshed(
        &self,
        used_refresh_token: &str,
        access_token: &str,
        rotated_refresh_token: Option<&str>,
    ) -> StorageResult<bool> {
        let _write = self.guard.write();
        let current = self.storage.get(StorageKeys::REFRESH_TOKEN)?;
        if current.as_deref() != Some(used_refresh_token) {
            debug!("Session changed during refresh, discarding refreshed token");
            return Ok(false);
        }
        self.storage.set(StorageKeys::ACCESS_TOKEN, access_token)?;
        if let Some(refresh_token) = rotated_refresh_token {
            self.storage.set(StorageKeys::REFRESH_TOKEN, refresh_token)?;
        }
        debug!(
            rotated = rotated_refresh_token.is_some(),
            "Refreshed access token stored"
        );
        Ok(true)
    }

    /// Remove every slot.
    pub fn clear(&self) -> StorageResult<()> {
        let _write = self.guard.write();
        self.clear_slots()
    }

    /// Clear only if the stored refresh token still equals `expected`.
    ///
    /// Returns whether the slots were cleared. A session opened after the
    /// failed refresh started carries a different refresh token and survives.
    pub fn clear_if_refresh_token(&self, expected: Option<&str>) -> StorageResult<bool> {
        let _write = self.guard.write();
        let current = self.storage.get(StorageKeys::REFRESH_TOKEN)?;
        if current.as_deref() != expected {
            debug!("Refresh token changed since refresh started, keeping credentials");
            return Ok(false);
        }
        self.clear_slots()?;
        Ok(true)
    }

    fn clear_slots(&self) -> StorageResult<()> {
        for key in StorageKeys::SESSION_SLOTS {
            self.storage.remove(key)?;
        }
        debug!(backend = self.storage.backend_name(), "Credentials cleared");
        Ok(())
    }

    fn write_slot(&self, key: &str, value: Option<&str>) -> StorageResult<()> {
        match value {
            Some(value) => self.storage.set(key, value),
            None => self.storage.remove(key).map(|_| ()),
        }
    }
}
