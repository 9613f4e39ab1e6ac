//! Authenticated session client for the MailGuard backend.
//!
//! This crate provides:
//! - Session state machine and session actions (login, register, logout)
//! - Request pipeline that attaches access tokens and retries once on 401
//! - Single-flight token refresh shared by concurrent requests
//! - Typed email review endpoints

mod api;
mod emails;
mod error;
mod pipeline;
mod refresh;
mod session;
mod session_fsm;
mod transport;

pub use api::{
    extract_error_message, AuthApi, ProfileForm, RefreshedToken, RegistrationForm, TokenPair,
    LOGIN_FAILED, REGISTRATION_FAILED,
};
pub use emails::{
    AnalysisResult, EmailApi, EmailPage, EmailQuery, EmailRecord, EmailStats, EmailStatus,
    StatusMessage,
};
pub use error::{RefreshFailed, SessionError, SessionResult};
pub use pipeline::{OutboundRequest, RequestPipeline};
pub use refresh::{RefreshCoordinator, RefreshListener};
pub use session::{
    ActionOutcome, AuthStateChangedPayload, SessionManager, SessionOptions, SessionStateCallback,
};
pub use session_fsm::session_machine;
pub use session_fsm::{
    transition, Identity, SessionEvent, SessionMachine, SessionMachineInput, SessionMachineState,
    SessionPhase, SessionState,
};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError,
};
