//! Authenticated request pipeline.
//!
//! Attaches the current access token to outbound requests and handles the
//! single refresh-and-retry path on 401.

use crate::error::{RefreshFailed, SessionError, SessionResult};
use crate::refresh::RefreshCoordinator;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use credential_store::CredentialStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// A request as issued by callers. `retried` flips at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    retried: bool,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        let mut request = Self::new(Method::Post, path);
        request.body = Some(body);
        request
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Whether this request has already been replayed after a refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Mark the request as replayed. Returns false if it already was.
    pub fn mark_retried(&mut self) -> bool {
        if self.retried {
            return false;
        }
        self.retried = true;
        true
    }

    fn to_http(&self, bearer: Option<String>) -> HttpRequest {
        HttpRequest {
            method: self.method,
            path: self.path.clone(),
            query: self.query.clone(),
            body: self.body.clone(),
            bearer,
        }
    }
}

/// Sends requests with the session's access token attached.
#[derive(Clone)]
pub struct RequestPipeline {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialStore>,
    refresh: RefreshCoordinator,
}

impl RequestPipeline {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialStore>,
        refresh: RefreshCoordinator,
    ) -> Self {
        Self {
            transport,
            credentials,
            refresh,
        }
    }

    /// Send a request.
    ///
    /// A 401 triggers one refresh (shared with concurrent callers) and one
    /// replay with the new token. A second 401, or a failed refresh, ends the
    /// session and yields `AuthExpired`. Other non-2xx responses are returned
    /// as `Http`.
    pub async fn send(&self, request: &mut OutboundRequest) -> SessionResult<HttpResponse> {
        loop {
            let bearer = self.credentials.get().access_token;
            let response = self
                .transport
                .execute(&request.to_http(bearer.clone()))
                .await?;

            if !response.is_unauthorized() {
                if response.is_success() {
                    return Ok(response);
                }
                debug!(
                    method = %request.method,
                    path = %request.path,
                    status = response.status,
                    "Request failed"
                );
                return Err(SessionError::Http {
                    status: response.status,
                    body: response.body,
                });
            }

            if !request.mark_retried() {
                warn!(path = %request.path, "Request rejected again after token refresh");
                self.refresh
                    .expire_session(RefreshFailed::new("Access token rejected after refresh"));
                return Err(SessionError::AuthExpired);
            }

            debug!(path = %request.path, "Access token rejected, refreshing");
            if let Err(failure) = self.refresh.ensure_fresh_token_after(bearer.as_deref()).await {
                debug!(path = %request.path, reason = %failure.reason, "Refresh failed, giving up");
                return Err(SessionError::AuthExpired);
            }
        }
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SessionResult<T> {
        let mut request = OutboundRequest::get(path);
        for (key, value) in query {
            request = request.with_query(*key, value.clone());
        }
        let response = self.send(&mut request).await?;
        Ok(response.json()?)
    }

    /// POST a JSON body to `path` and decode the JSON reply.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> SessionResult<T> {
        let mut request = OutboundRequest::post(path, serde_json::to_value(body)?);
        let response = self.send(&mut request).await?;
        Ok(response.json()?)
    }

    /// DELETE `path`, ignoring any body.
    pub async fn delete(&self, path: &str) -> SessionResult<()> {
        let mut request = OutboundRequest::delete(path);
        self.send(&mut request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_retried_only_once() {
        let mut request = OutboundRequest::get("/api/emails/");
        assert!(!request.is_retried());
        assert!(request.mark_retried());
        assert!(request.is_retried());
        assert!(!request.mark_retried());
    }

    #[test]
    fn test_to_http_attaches_bearer() {
        let request = OutboundRequest::get("/api/emails/").with_query("page", "2");
        let http = request.to_http(Some("a1".to_string()));
        assert_eq!(http.bearer.as_deref(), Some("a1"));
        assert_eq!(http.query, vec![("page".to_string(), "2".to_string())]);

        let http = request.to_http(None);
        assert!(http.bearer.is_none());
    }
}
