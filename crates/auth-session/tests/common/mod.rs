#![allow(dead_code)]

use async_trait::async_trait;
use auth_session::{
    HttpRequest, HttpResponse, HttpTransport, Method, SessionManager, SessionOptions,
    TransportError,
};
use credential_store::{create_memory_credential_store, CredentialStore, Credentials};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How the fake answers `POST /api/auth/logout/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutBehavior {
    Succeed,
    Fail,
    Hang,
}

struct BackendState {
    users: HashMap<String, String>,
    valid_access: HashSet<String>,
    valid_refresh: HashSet<String>,
    minted: usize,
    reject_refresh: bool,
    rotate_refresh: bool,
    refresh_delay: Duration,
    login_delay: Duration,
    logout: LogoutBehavior,
    always_unauthorized: HashSet<String>,
}

/// In-memory stand-in for the backend.
///
/// Access tokens are valid only once registered via login or refresh, so a
/// stored token the fake never minted behaves as expired.
pub struct FakeBackend {
    state: Mutex<BackendState>,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BackendState {
                users: HashMap::new(),
                valid_access: HashSet::new(),
                valid_refresh: HashSet::new(),
                minted: 0,
                reject_refresh: false,
                rotate_refresh: false,
                refresh_delay: Duration::from_millis(0),
                login_delay: Duration::from_millis(0),
                logout: LogoutBehavior::Succeed,
                always_unauthorized: HashSet::new(),
            }),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn add_user(&self, email: &str, password: &str) {
        self.state
            .lock()
            .users
            .insert(email.to_string(), password.to_string());
    }

    pub fn accept_refresh_token(&self, token: &str) {
        self.state.lock().valid_refresh.insert(token.to_string());
    }

    pub fn accept_access_token(&self, token: &str) {
        self.state.lock().valid_access.insert(token.to_string());
    }

    pub fn reject_refresh(&self) {
        self.state.lock().reject_refresh = true;
    }

    pub fn rotate_refresh_tokens(&self) {
        self.state.lock().rotate_refresh = true;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state.lock().refresh_delay = delay;
    }

    pub fn set_login_delay(&self, delay: Duration) {
        self.state.lock().login_delay = delay;
    }

    pub fn set_logout_behavior(&self, behavior: LogoutBehavior) {
        self.state.lock().logout = behavior;
    }

    /// Make `path` answer 401 no matter which token is presented.
    pub fn always_unauthorized(&self, path: &str) {
        self.state.lock().always_unauthorized.insert(path.to_string());
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests sent to `path`, in arrival order.
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    async fn login(&self, body: &serde_json::Value) -> HttpResponse {
        let delay = self.state.lock().login_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let username = body["username"].as_str().unwrap_or_default();
        let password = body["password"].as_str().unwrap_or_default();

        let mut state = self.state.lock();
        if state.users.get(username).map(String::as_str) != Some(password) {
            return HttpResponse::new(
                401,
                json!({"detail": "No active account found with the given credentials"}).to_string(),
            );
        }

        state.minted += 1;
        let access = format!("access-{}", state.minted);
        let refresh = format!("refresh-{}", state.minted);
        state.valid_access.insert(access.clone());
        state.valid_refresh.insert(refresh.clone());
        HttpResponse::new(200, json!({"access": access, "refresh": refresh}).to_string())
    }

    fn register(&self, body: &serde_json::Value) -> HttpResponse {
        let email = body["email"].as_str().unwrap_or_default().to_string();
        let password = body["password"].as_str().unwrap_or_default().to_string();

        let mut state = self.state.lock();
        if state.users.contains_key(&email) {
            return HttpResponse::new(
                400,
                json!({"username": ["A user with that username already exists."]}).to_string(),
            );
        }
        state.users.insert(email, password);
        HttpResponse::new(201, json!({"id": 1}).to_string())
    }

    async fn refresh(&self, body: &serde_json::Value) -> HttpResponse {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().refresh_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let token = body["refresh"].as_str().unwrap_or_default().to_string();
        let mut state = self.state.lock();
        if state.reject_refresh || !state.valid_refresh.contains(&token) {
            return HttpResponse::new(
                401,
                json!({"detail": "Token is invalid or expired", "code": "token_not_valid"})
                    .to_string(),
            );
        }

        state.minted += 1;
        let access = format!("access-{}", state.minted);
        state.valid_access.insert(access.clone());
        if state.rotate_refresh {
            let rotated = format!("refresh-{}", state.minted);
            state.valid_refresh.remove(&token);
            state.valid_refresh.insert(rotated.clone());
            HttpResponse::new(200, json!({"access": access, "refresh": rotated}).to_string())
        } else {
            HttpResponse::new(200, json!({"access": access}).to_string())
        }
    }

    async fn logout(&self) -> Result<HttpResponse, TransportError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.state.lock().logout;
        match behavior {
            LogoutBehavior::Succeed => Ok(HttpResponse::new(205, "")),
            LogoutBehavior::Fail => Err(TransportError::Connect("connection reset".to_string())),
            LogoutBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(HttpResponse::new(205, ""))
            }
        }
    }

    fn resource(&self, request: &HttpRequest) -> HttpResponse {
        let state = self.state.lock();
        let authorized = request
            .bearer
            .as_ref()
            .is_some_and(|token| state.valid_access.contains(token));
        if !authorized || state.always_unauthorized.contains(&request.path) {
            return HttpResponse::new(
                401,
                json!({"detail": "Given token not valid for any token type"}).to_string(),
            );
        }

        match (request.method, request.path.as_str()) {
            (Method::Get, "/api/emails/") => HttpResponse::new(
                200,
                json!({
                    "count": 1,
                    "next": null,
                    "previous": null,
                    "results": [{
                        "id": 1,
                        "sender": "billing@example.com",
                        "sender_name": "Billing",
                        "subject": "Overdue invoice",
                        "status": "suspicious",
                        "confidence_score": 0.61,
                        "is_quarantined": false,
                        "has_attachments": true
                    }]
                })
                .to_string(),
            ),
            (Method::Delete, _) => HttpResponse::new(204, ""),
            (Method::Get, path) => HttpResponse::new(200, json!({ "path": path }).to_string()),
            _ => HttpResponse::new(404, json!({"detail": "Not found."}).to_string()),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        // Let concurrent callers interleave.
        tokio::task::yield_now().await;

        let body = request.body.clone().unwrap_or(serde_json::Value::Null);
        let response = match request.path.as_str() {
            "/api/auth/login/" => self.login(&body).await,
            "/api/auth/register/" => self.register(&body),
            "/api/auth/login/refresh/" => self.refresh(&body).await,
            "/api/auth/logout/" => return self.logout().await,
            _ => self.resource(request),
        };
        Ok(response)
    }
}

pub fn store_with(credentials: Option<Credentials>) -> Arc<CredentialStore> {
    let store = Arc::new(create_memory_credential_store());
    if let Some(credentials) = credentials {
        store.set(&credentials).expect("failed to seed credentials");
    }
    store
}

pub fn manager(backend: &Arc<FakeBackend>, store: &Arc<CredentialStore>) -> SessionManager {
    SessionManager::new(store.clone(), backend.clone(), SessionOptions::default())
}
