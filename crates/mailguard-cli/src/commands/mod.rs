//! CLI command implementations.

mod auth;
mod emails;

pub use auth::{login, logout, register, status};
pub use emails::{
    emails_analyze, emails_delete, emails_list, emails_quarantine, emails_release, emails_show,
    emails_stats, emails_summary,
};

use crate::output::{self, OutputFormat};
use anyhow::Result;
use auth_session::{SessionError, SessionManager};
use session_config::{Config, Paths};
use std::io::{self, Write};

/// Open the session described by the configuration.
pub fn open_session(config: &Config, paths: &Paths) -> Result<SessionManager> {
    Ok(SessionManager::from_config(config, paths)?)
}

/// Make sure a session exists before calling authenticated endpoints.
fn require_session(session: &SessionManager, format: &OutputFormat) -> bool {
    if session.check_status().is_authenticated() {
        return true;
    }
    output::print_error("Not logged in. Run 'mailguard login' first", format);
    false
}

/// Report a failed backend call. Session expiry gets a hint instead of the
/// raw error.
fn report_error(err: &SessionError, format: &OutputFormat) {
    let message = match err {
        SessionError::AuthExpired | SessionError::RefreshFailed(_) => {
            "Session expired. Run 'mailguard login' again".to_string()
        }
        SessionError::Http { status: 403, .. } => {
            "You do not have permission to do that".to_string()
        }
        SessionError::Http { status: 404, .. } => "Not found".to_string(),
        SessionError::Http { status, body } => {
            match auth_session::extract_error_message(body) {
                Some(detail) => format!("Request failed ({}): {}", status, detail),
                None => format!("Request failed with status {}", status),
            }
        }
        other => other.to_string(),
    };
    output::print_error(&message, format);
}

/// Read a line from stdin after printing `label`.
fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Ask user for confirmation.
fn confirm(question: &str) -> bool {
    match prompt(&format!("{} [y/N] ", question)) {
        Ok(answer) => matches!(answer.to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}
