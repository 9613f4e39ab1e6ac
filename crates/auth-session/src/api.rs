//! Client for the backend authentication endpoints.
//!
//! These calls go straight to the transport. They never pass through the
//! request pipeline, so a 401 from the refresh endpoint cannot trigger another
//! refresh.

use crate::error::{SessionError, SessionResult};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

const LOGIN_PATH: &str = "/api/auth/login/";
const REGISTER_PATH: &str = "/api/auth/register/";
const REFRESH_PATH: &str = "/api/auth/login/refresh/";
const LOGOUT_PATH: &str = "/api/auth/logout/";

/// Fallback message for a rejected login without a readable error body.
pub const LOGIN_FAILED: &str = "Login failed";
/// Fallback message for a rejected registration without a readable error body.
pub const REGISTRATION_FAILED: &str = "Registration failed";
const REFRESH_REJECTED: &str = "Refresh token rejected";

/// Token pair minted by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Result of a refresh call. The backend may rotate the refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedToken {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Profile section of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileForm {
    pub role: String,
}

impl Default for ProfileForm {
    fn default() -> Self {
        Self {
            role: "staff".to_string(),
        }
    }
}

/// New-account request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub profile: ProfileForm,
}

impl RegistrationForm {
    /// A form whose username is the email and whose confirmation matches.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        let email = email.into();
        let password = password.into();
        Self {
            username: email.clone(),
            email,
            password2: password.clone(),
            password,
            first_name: String::new(),
            last_name: String::new(),
            profile: ProfileForm::default(),
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Backend authentication endpoints.
#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn HttpTransport>,
}

impl AuthApi {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Exchange email and password for a token pair.
    pub async fn login(&self, email: &str, password: &str) -> SessionResult<TokenPair> {
        let body = serde_json::to_value(LoginRequest {
            username: email,
            password,
        })?;
        let response = self.post(LOGIN_PATH, body, None).await?;
        let response = check_response(response, "Login", LOGIN_FAILED)?;
        let tokens: TokenPair = response.json()?;
        info!("Login accepted by backend");
        Ok(tokens)
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, form: &RegistrationForm) -> SessionResult<()> {
        let body = serde_json::to_value(form)?;
        let response = self.post(REGISTER_PATH, body, None).await?;
        check_response(response, "Registration", REGISTRATION_FAILED)?;
        info!("Registration accepted by backend");
        Ok(())
    }

    /// Mint a new access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> SessionResult<RefreshedToken> {
        let body = serde_json::to_value(RefreshRequest {
            refresh: refresh_token,
        })?;
        let response = self.post(REFRESH_PATH, body, None).await?;
        let response = check_response(response, "Token refresh", REFRESH_REJECTED)?;
        let refreshed: RefreshedToken = response.json()?;
        debug!(rotated = refreshed.refresh.is_some(), "Token refresh accepted");
        Ok(refreshed)
    }

    /// Tell the backend to invalidate the refresh token.
    pub async fn logout(&self, refresh_token: &str, access_token: Option<&str>) -> SessionResult<()> {
        let body = serde_json::to_value(RefreshRequest {
            refresh: refresh_token,
        })?;
        let response = self
            .post(LOGOUT_PATH, body, access_token.map(str::to_string))
            .await?;
        check_response(response, "Logout", "Logout failed")?;
        Ok(())
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
        bearer: Option<String>,
    ) -> SessionResult<HttpResponse> {
        let request = HttpRequest::new(Method::Post, path)
            .with_body(body)
            .with_bearer(bearer);
        Ok(self.transport.execute(&request).await?)
    }
}

/// Map a non-2xx auth response to an error. 4xx become `Validation` with the
/// best message the body offers; 5xx stay `Http`.
fn check_response(response: HttpResponse, action: &str, fallback: &str) -> SessionResult<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }

    error!(status = response.status, action, "Backend rejected auth request");
    if response.status >= 500 {
        return Err(SessionError::Http {
            status: response.status,
            body: response.body,
        });
    }

    let message = extract_error_message(&response.body).unwrap_or_else(|| fallback.to_string());
    Err(SessionError::Validation(message))
}

/// Pull a human readable message out of a backend error body.
///
/// Checks `detail`, then `error`, then the first field error in the order
/// the backend sent them (serde_json `preserve_order`), rendered as
/// `field: message`. Non-field errors carry no prefix.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    for key in ["detail", "error"] {
        if let Some(message) = object.get(key).and_then(first_message) {
            return Some(message);
        }
    }

    object.iter().find_map(|(field, value)| {
        let message = first_message(value)?;
        if field == "non_field_errors" {
            Some(message)
        } else {
            Some(format!("{}: {}", field, message))
        }
    })
}

fn first_message(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => items.iter().find_map(first_message),
        serde_json::Value::Object(map) => map.values().find_map(first_message),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_field_errors_in_body_order() {
        let body = r#"{"username": ["Taken."], "email": ["Enter a valid email address."]}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("username: Taken.")
        );
    }

    #[test]
    fn test_extract_detail_first() {
        let body = r#"{"detail": "No active account found", "error": "other"}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("No active account found")
        );
    }

    #[test]
    fn test_extract_error_key() {
        let body = r#"{"error": "Email already registered"}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("Email already registered")
        );
    }

    #[test]
    fn test_extract_field_error() {
        let body = r#"{"password": ["This password is too common."]}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("password: This password is too common.")
        );
    }

    #[test]
    fn test_extract_non_field_error_has_no_prefix() {
        let body = r#"{"non_field_errors": ["Passwords do not match"]}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("Passwords do not match")
        );
    }

    #[test]
    fn test_extract_nested_field_error() {
        let body = r#"{"profile": {"role": ["Invalid choice."]}}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("profile: Invalid choice.")
        );
    }

    #[test]
    fn test_extract_unreadable_body() {
        assert_eq!(extract_error_message("<html>502</html>"), None);
        assert_eq!(extract_error_message("[]"), None);
        assert_eq!(extract_error_message(r#"{"detail": ""}"#), None);
    }

    #[test]
    fn test_check_response_fallback() {
        let err = check_response(HttpResponse::new(400, ""), "Login", LOGIN_FAILED).unwrap_err();
        assert!(matches!(err, SessionError::Validation(m) if m == LOGIN_FAILED));
    }

    #[test]
    fn test_check_response_server_error_stays_http() {
        let err = check_response(HttpResponse::new(502, "bad gateway"), "Login", LOGIN_FAILED)
            .unwrap_err();
        assert!(matches!(err, SessionError::Http { status: 502, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_registration_form_serializes_profile() {
        let form = RegistrationForm::new("ana@example.com", "s3cret!");
        let value = serde_json::to_value(&form).unwrap();
        assert_eq!(value["username"], "ana@example.com");
        assert_eq!(value["password2"], "s3cret!");
        assert_eq!(value["profile"]["role"], "staff");
    }

    #[test]
    fn test_refreshed_token_without_rotation() {
        let token: RefreshedToken = serde_json::from_str(r#"{"access": "A2"}"#).unwrap();
        assert_eq!(token.access, "A2");
        assert!(token.refresh.is_none());
    }
}
