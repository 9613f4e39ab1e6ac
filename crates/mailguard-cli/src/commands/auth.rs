//! Authentication commands.

use super::prompt;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use auth_session::{ActionOutcome, RegistrationForm, SessionManager};

/// Ask for an email (unless given) and a hidden password.
fn read_credentials(email: Option<String>, format: &OutputFormat) -> Result<Option<(String, String)>> {
    let email = match email {
        Some(email) => email.trim().to_string(),
        None => prompt("Email: ")?,
    };
    if email.is_empty() {
        output::print_error("Email is required", format);
        return Ok(None);
    }

    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        output::print_error("Password is required", format);
        return Ok(None);
    }

    Ok(Some((email, password)))
}

fn report_outcome(outcome: &ActionOutcome, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => output::print_json(outcome)?,
        OutputFormat::Text => match outcome {
            ActionOutcome::Success { identity } => {
                println!("Logged in as {} ({})", identity.display_name, identity.email);
            }
            ActionOutcome::Failure { message } => output::print_error(message, format),
        },
    }
    Ok(())
}

/// Login with email and password.
pub async fn login(session: &SessionManager, email: Option<String>, format: &OutputFormat) -> Result<()> {
    let current = session.check_status();
    if let Some(identity) = current.identity.filter(|_| current.phase.is_authenticated()) {
        output::print_success(&format!("Already logged in as {}", identity.email), format);
        return Ok(());
    }

    let Some((email, password)) = read_credentials(email, format)? else {
        return Ok(());
    };

    if *format == OutputFormat::Text {
        println!("Logging in...");
    }
    let outcome = session.login(&email, &password).await;
    report_outcome(&outcome, format)
}

/// Create an account and log in with it.
pub async fn register(
    session: &SessionManager,
    email: Option<String>,
    name: Option<String>,
    format: &OutputFormat,
) -> Result<()> {
    let Some((email, password)) = read_credentials(email, format)? else {
        return Ok(());
    };
    let confirmation = rpassword::prompt_password("Confirm password: ")?;

    let mut form = RegistrationForm::new(email, password);
    // The backend checks the confirmation and reports the mismatch.
    form.password2 = confirmation;
    form.first_name = name.unwrap_or_default();

    if *format == OutputFormat::Text {
        println!("Creating account...");
    }
    let outcome = session.register(&form).await;
    report_outcome(&outcome, format)
}

/// Logout and clear the stored session.
pub async fn logout(session: &SessionManager, format: &OutputFormat) -> Result<()> {
    session.logout().await;
    output::print_success("Logged out successfully", format);
    Ok(())
}

/// Show the stored session state. No network call.
pub async fn status(session: &SessionManager, format: &OutputFormat) -> Result<()> {
    let state = session.check_status();

    match format {
        OutputFormat::Json => output::print_json(&state)?,
        OutputFormat::Text => match &state.identity {
            Some(identity) if state.is_authenticated() => {
                println!("Auth:     logged in");
                println!("Email:    {}", identity.email);
                println!("Name:     {}", identity.display_name);
            }
            _ if state.is_authenticated() => println!("Auth:     logged in"),
            _ => println!("Auth:     not logged in"),
        },
    }

    Ok(())
}
