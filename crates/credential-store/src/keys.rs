//! Storage key constants.

/// Slots used to persist a session. Each is an independent string value.
pub struct StorageKeys;

impl StorageKeys {
    /// Access token attached to outbound requests
    pub const ACCESS_TOKEN: &'static str = "access_token";

    /// Refresh token used to mint new access tokens
    pub const REFRESH_TOKEN: &'static str = "refresh_token";

    /// Identity hint (the email the session was opened with)
    pub const IDENTITY_HINT: &'static str = "identity_hint";

    /// Every session slot, in the order they are written.
    pub const SESSION_SLOTS: [&'static str; 3] = [
        Self::ACCESS_TOKEN,
        Self::REFRESH_TOKEN,
        Self::IDENTITY_HINT,
    ];
}
