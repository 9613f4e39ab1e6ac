//! Session management with FSM-based state tracking.
//!
//! `SessionManager` owns the credential store, the auth endpoints, the refresh
//! coordinator and the request pipeline. Session state is only changed through
//! [`transition`](crate::session_fsm::transition) and is published on a watch
//! channel plus an optional callback.

use crate::api::{extract_error_message, AuthApi, RegistrationForm, LOGIN_FAILED, REGISTRATION_FAILED};
use crate::emails::EmailApi;
use crate::error::{RefreshFailed, SessionError, SessionResult};
use crate::pipeline::RequestPipeline;
use crate::refresh::{RefreshCoordinator, RefreshListener};
use crate::session_fsm::{transition, Identity, SessionEvent, SessionPhase, SessionState};
use crate::transport::{HttpTransport, ReqwestTransport};
use credential_store::{create_file_credential_store, CredentialStore, Credentials};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use session_config::{Config, Paths, DEFAULT_LOGOUT_TIMEOUT_SECS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const UNREACHABLE: &str = "Unable to reach the server";

/// Outcome of a login or registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionOutcome {
    Success { identity: Identity },
    Failure { message: String },
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success { .. })
    }
}

/// Payload for session state change notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    pub state: SessionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&SessionState> for AuthStateChangedPayload {
    fn from(state: &SessionState) -> Self {
        Self {
            state: state.phase,
            email: state.identity.as_ref().map(|i| i.email.clone()),
            error_message: state.error_message.clone(),
        }
    }
}

/// Callback type for session state change notifications.
pub type SessionStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

/// Tunables for [`SessionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Upper bound on the best-effort backend logout call.
    pub logout_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            logout_timeout: Duration::from_secs(DEFAULT_LOGOUT_TIMEOUT_SECS),
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            logout_timeout: config.logout_timeout(),
        }
    }
}

/// State shared with the refresh coordinator's listener hook.
struct SessionShared {
    credentials: Arc<CredentialStore>,
    state: Mutex<SessionState>,
    state_tx: watch::Sender<SessionState>,
    callback: Mutex<Option<SessionStateCallback>>,
}

impl SessionShared {
    fn new(credentials: Arc<CredentialStore>, initial: SessionState) -> Self {
        let (state_tx, _) = watch::channel(initial.clone());
        Self {
            credentials,
            state: Mutex::new(initial),
            state_tx,
            callback: Mutex::new(None),
        }
    }

    /// Apply an event and publish the new state if it changed.
    fn apply(&self, event: &SessionEvent) -> SessionResult<SessionState> {
        self.commit(self.state.lock(), event)
    }

    /// Apply an event to an already locked state.
    fn commit(
        &self,
        mut state: MutexGuard<'_, SessionState>,
        event: &SessionEvent,
    ) -> SessionResult<SessionState> {
        let next = transition(&state, event)?;
        let old_phase = state.phase;
        let changed = *state != next;
        *state = next.clone();
        if changed {
            self.state_tx.send_replace(next.clone());
        }
        drop(state);

        if changed {
            debug!(
                old_state = ?old_phase,
                new_state = ?next.phase,
                "Session state transition"
            );
            if let Some(callback) = self.callback.lock().as_ref() {
                callback(AuthStateChangedPayload::from(&next));
            }
        }

        Ok(next)
    }

    /// Apply an event that may legitimately lose a race; log and keep the
    /// current state when it is not allowed.
    fn apply_or_keep(&self, event: &SessionEvent) -> SessionState {
        match self.apply(event) {
            Ok(state) => state,
            Err(e) => {
                debug!(error = %e, "Ignoring session event");
                self.state.lock().clone()
            }
        }
    }
}

impl RefreshListener for SessionShared {
    fn on_refreshed(&self) {
        self.apply_or_keep(&SessionEvent::RefreshSucceeded);
    }

    fn on_session_expired(&self, reason: &RefreshFailed) {
        // Held across the credential check so a login cannot land in between.
        let state = self.state.lock();
        if state.phase == SessionPhase::Authenticating {
            debug!(reason = %reason.reason, "Login in flight, leaving the outcome to it");
            return;
        }
        if self.credentials.get().has_session() {
            debug!(reason = %reason.reason, "Newer session stored, ignoring stale refresh failure");
            return;
        }

        info!(reason = %reason.reason, "Session torn down after refresh failure");
        if let Err(e) = self.commit(state, &SessionEvent::RefreshFailed) {
            debug!(error = %e, "Ignoring session event");
        }
    }
}

/// Session manager for authentication state.
pub struct SessionManager {
    credentials: Arc<CredentialStore>,
    api: AuthApi,
    refresh: RefreshCoordinator,
    pipeline: RequestPipeline,
    shared: Arc<SessionShared>,
    options: SessionOptions,
}

impl SessionManager {
    /// Create a session manager.
    ///
    /// The initial state is derived from the stored credentials without a
    /// network call: both tokens present means authenticated. An incomplete
    /// stored session is cleared.
    pub fn new(
        credentials: Arc<CredentialStore>,
        transport: Arc<dyn HttpTransport>,
        options: SessionOptions,
    ) -> Self {
        let api = AuthApi::new(transport.clone());
        let refresh = RefreshCoordinator::new(credentials.clone(), api.clone());
        let pipeline = RequestPipeline::new(transport, credentials.clone(), refresh.clone());

        let stored = credentials.get();
        let initial = if stored.has_session() {
            SessionState::authenticated(stored.identity.map(Identity::from_email))
        } else {
            discard_incomplete(&credentials, &stored);
            SessionState::unauthenticated()
        };
        let shared = Arc::new(SessionShared::new(credentials.clone(), initial));
        refresh.set_listener(shared.clone());

        Self {
            credentials,
            api,
            refresh,
            pipeline,
            shared,
            options,
        }
    }

    /// Build a manager from configuration: file-backed credentials and a
    /// reqwest transport against the configured backend.
    pub fn from_config(config: &Config, paths: &Paths) -> SessionResult<Self> {
        let credentials = create_file_credential_store(&config.credentials_path(paths))?;
        let transport = ReqwestTransport::new(config.api_url()?, config.request_timeout())
            .map_err(|e| SessionError::Config(e.to_string()))?;
        Ok(Self::new(
            Arc::new(credentials),
            Arc::new(transport),
            SessionOptions::from(config),
        ))
    }

    /// Set a callback to be notified of session state changes.
    pub fn set_state_callback(&self, callback: SessionStateCallback) {
        *self.shared.callback.lock() = Some(callback);
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.shared.state.lock().clone()
    }

    /// Receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Pipeline for authenticated backend calls.
    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// Typed email endpoints over the pipeline.
    pub fn emails(&self) -> EmailApi {
        EmailApi::new(self.pipeline.clone())
    }

    /// Refresh coordinator shared by the pipeline.
    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// Re-derive the state from stored credentials. No network call.
    ///
    /// Both tokens present restores the session with the stored identity
    /// hint. Anything less is treated as no session and leftovers are
    /// cleared.
    pub fn check_status(&self) -> SessionState {
        let stored = self.credentials.get();
        if stored.has_session() {
            let identity = stored.identity.map(Identity::from_email);
            return self
                .shared
                .apply_or_keep(&SessionEvent::SessionRestored { identity });
        }

        discard_incomplete(&self.credentials, &stored);
        self.shared.apply_or_keep(&SessionEvent::NoSession)
    }

    /// Log in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> ActionOutcome {
        self.shared.apply_or_keep(&SessionEvent::AuthAttempt);
        self.complete_login(email, password).await
    }

    /// Create an account, then log in with it.
    pub async fn register(&self, form: &RegistrationForm) -> ActionOutcome {
        self.shared.apply_or_keep(&SessionEvent::AuthAttempt);

        if let Err(e) = self.api.register(form).await {
            let message = failure_message(&e, REGISTRATION_FAILED);
            warn!(error = %e, "Registration failed");
            return self.reject(message);
        }

        info!("Account created, logging in");
        self.complete_login(&form.email, &form.password).await
    }

    /// End the session.
    ///
    /// Local credentials are cleared and the state moves to unauthenticated
    /// before the backend is told; the backend call is best effort and
    /// bounded by the logout timeout.
    pub async fn logout(&self) {
        let snapshot = self.credentials.get();
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to clear stored credentials on logout");
        }
        self.shared.apply_or_keep(&SessionEvent::LoggedOut);
        info!("Logged out");

        let Some(refresh_token) = snapshot.refresh_token else {
            return;
        };

        let backend = self
            .api
            .logout(&refresh_token, snapshot.access_token.as_deref());
        match tokio::time::timeout(self.options.logout_timeout, backend).await {
            Ok(Ok(())) => debug!("Backend session invalidated"),
            Ok(Err(e)) => warn!(error = %e, "Backend logout failed"),
            Err(_) => warn!(
                timeout_secs = self.options.logout_timeout.as_secs(),
                "Backend logout timed out"
            ),
        }
    }

    /// Leave the error phase.
    pub fn acknowledge_error(&self) -> SessionState {
        self.shared.apply_or_keep(&SessionEvent::ErrorAcknowledged)
    }

    async fn complete_login(&self, email: &str, password: &str) -> ActionOutcome {
        let tokens = match self.api.login(email, password).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Login failed");
                return self.reject(failure_message(&e, LOGIN_FAILED));
            }
        };

        let credentials = Credentials::new(&tokens.access, &tokens.refresh, email);
        if let Err(e) = self.credentials.set(&credentials) {
            warn!(error = %e, "Failed to store credentials after login");
            return self.reject("Could not save session".to_string());
        }

        let identity = Identity::from_email(email);
        match self.shared.apply(&SessionEvent::AuthSucceeded {
            identity: identity.clone(),
        }) {
            Ok(_) => {
                info!(display_name = %identity.display_name, "Logged in");
                ActionOutcome::Success { identity }
            }
            Err(e) => {
                // Logged out while the login was in flight.
                debug!(error = %e, "Login superseded, discarding tokens");
                if let Err(e) = self.credentials.clear_if_refresh_token(Some(&tokens.refresh)) {
                    warn!(error = %e, "Failed to discard superseded login");
                }
                ActionOutcome::Failure {
                    message: "Login cancelled".to_string(),
                }
            }
        }
    }

    fn reject(&self, message: String) -> ActionOutcome {
        self.shared.apply_or_keep(&SessionEvent::AuthRejected {
            message: message.clone(),
        });
        ActionOutcome::Failure { message }
    }
}

fn discard_incomplete(credentials: &CredentialStore, stored: &Credentials) {
    if stored.is_empty() {
        return;
    }
    info!("Incomplete stored session, clearing it");
    if let Err(e) = credentials.clear() {
        warn!(error = %e, "Failed to clear incomplete session");
    }
}

/// User-facing message for a failed login or registration.
fn failure_message(err: &SessionError, fallback: &str) -> String {
    match err {
        SessionError::Validation(message) => message.clone(),
        SessionError::Network(_) => UNREACHABLE.to_string(),
        SessionError::Http { body, .. } => {
            extract_error_message(body).unwrap_or_else(|| fallback.to_string())
        }
        _ => fallback.to_string(),
    }
}
