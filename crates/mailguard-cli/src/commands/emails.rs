//! Email review commands.

use super::{confirm, report_error, require_session};
use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use auth_session::{EmailQuery, EmailRecord, EmailStats, EmailStatus, SessionManager};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// List emails, optionally filtered.
pub async fn emails_list(
    session: &SessionManager,
    status: Option<EmailStatus>,
    search: Option<String>,
    page: Option<u32>,
    format: &OutputFormat,
) -> Result<()> {
    if !require_session(session, format) {
        return Ok(());
    }

    let query = EmailQuery {
        status,
        search,
        page,
    };
    let page = match session.emails().list_emails(&query).await {
        Ok(page) => page,
        Err(e) => {
            report_error(&e, format);
            return Ok(());
        }
    };

    match format {
        OutputFormat::Json => output::print_json(&page)?,
        OutputFormat::Text => {
            if page.results.is_empty() {
                println!("No emails found");
                return Ok(());
            }
            println!(
                "{:<8} {:<11} {:<6} {:<30} {}",
                "ID", "Status", "Score", "Sender", "Subject"
            );
            println!("{}", "-".repeat(100));
            for email in &page.results {
                let flag = if email.is_quarantined { " [Q]" } else { "" };
                println!(
                    "{:<8} {:<11} {:<6.2} {:<30} {}{}",
                    email.id,
                    email.status,
                    email.confidence_score,
                    output::truncate(&email.sender, 30),
                    output::truncate(&email.subject, 40),
                    flag
                );
            }
            println!();
            println!("{} email(s) total", page.count);
            if page.next.is_some() {
                let next = query.page.unwrap_or(1) + 1;
                println!("More results: --page {}", next);
            }
        }
    }

    Ok(())
}

fn print_email(email: &EmailRecord) {
    output::print_heading(&email.subject);
    let sender = if email.sender_name.is_empty() {
        email.sender.clone()
    } else {
        format!("{} <{}>", email.sender_name, email.sender)
    };
    output::print_row("ID", &email.id.to_string());
    output::print_row("From", &sender);
    output::print_row(
        "Received",
        email.received_date.as_deref().unwrap_or("-"),
    );
    output::print_row("Status", email.status.as_str());
    output::print_row("Confidence", &format!("{:.2}", email.confidence_score));
    output::print_row("Quarantined", if email.is_quarantined { "yes" } else { "no" });
    output::print_row("Attachments", if email.has_attachments { "yes" } else { "no" });
    if let Some(content) = &email.content {
        println!();
        println!("{}", content);
    }
}

/// Show one email.
pub async fn emails_show(session: &SessionManager, id: u64, format: &OutputFormat) -> Result<()> {
    if !require_session(session, format) {
        return Ok(());
    }

    match session.emails().get_email(id).await {
        Ok(email) => match format {
            OutputFormat::Json => output::print_json(&email)?,
            OutputFormat::Text => print_email(&email),
        },
        Err(e) => report_error(&e, format),
    }
    Ok(())
}

/// Submit email content for analysis. Reads `file`, or stdin when absent.
pub async fn emails_analyze(
    session: &SessionManager,
    file: Option<&Path>,
    format: &OutputFormat,
) -> Result<()> {
    if !require_session(session, format) {
        return Ok(());
    }

    let content = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read email content from stdin")?;
            buffer
        }
    };
    if content.trim().is_empty() {
        output::print_error("Email content is empty", format);
        return Ok(());
    }
    debug!(bytes = content.len(), "Submitting email for analysis");

    match session.emails().analyze_email(&content).await {
        Ok(result) => match format {
            OutputFormat::Json => output::print_json(&result)?,
            OutputFormat::Text => {
                output::print_heading("Analysis");
                output::print_row("Email ID", &result.email_id.to_string());
                output::print_row("Status", result.status.as_str());
                output::print_row("Risk score", &format!("{:.2}", result.risk_score));
                output::print_row("ML confidence", &format!("{:.2}", result.ml_confidence));
                if !result.suspicious_keywords.is_empty() {
                    output::print_row("Keywords", &result.suspicious_keywords.join(", "));
                }
            }
        },
        Err(e) => report_error(&e, format),
    }
    Ok(())
}

/// Quarantine an email.
pub async fn emails_quarantine(session: &SessionManager, id: u64, format: &OutputFormat) -> Result<()> {
    if !require_session(session, format) {
        return Ok(());
    }

    match session.emails().quarantine_email(id).await {
        Ok(_) => output::print_success(&format!("Email {} quarantined", id), format),
        Err(e) => report_error(&e, format),
    }
    Ok(())
}

/// Release a quarantined email.
pub async fn emails_release(session: &SessionManager, id: u64, format: &OutputFormat) -> Result<()> {
    if !require_session(session, format) {
        return Ok(());
    }

    match session.emails().release_email(id).await {
        Ok(_) => output::print_success(&format!("Email {} released", id), format),
        Err(e) => report_error(&e, format),
    }
    Ok(())
}

/// Delete an email after confirmation.
pub async fn emails_delete(
    session: &SessionManager,
    id: u64,
    yes: bool,
    format: &OutputFormat,
) -> Result<()> {
    if !require_session(session, format) {
        return Ok(());
    }
    if !yes && !confirm(&format!("Delete email {}?", id)) {
        println!("Cancelled");
        return Ok(());
    }

    match session.emails().delete_email(id).await {
        Ok(()) => output::print_success(&format!("Email {} deleted", id), format),
        Err(e) => report_error(&e, format),
    }
    Ok(())
}

fn print_stats(title: &str, stats: &EmailStats) {
    output::print_heading(title);
    output::print_row("Total", &stats.total_emails.to_string());
    output::print_row("Suspicious", &stats.suspicious_emails.to_string());
    output::print_row("High risk", &stats.high_risk_emails.to_string());
    output::print_row(
        "Detection rate",
        &format!("{:.1}%", stats.detection_rate * 100.0),
    );
}

/// Summary of the current user's emails.
pub async fn emails_summary(session: &SessionManager, format: &OutputFormat) -> Result<()> {
    if !require_session(session, format) {
        return Ok(());
    }

    match session.emails().suspicious_summary().await {
        Ok(stats) => match format {
            OutputFormat::Json => output::print_json(&stats)?,
            OutputFormat::Text => print_stats("Your emails", &stats),
        },
        Err(e) => report_error(&e, format),
    }
    Ok(())
}

/// System-wide statistics. Works without logging in.
pub async fn emails_stats(session: &SessionManager, format: &OutputFormat) -> Result<()> {
    match session.emails().public_stats().await {
        Ok(stats) => match format {
            OutputFormat::Json => output::print_json(&stats)?,
            OutputFormat::Text => print_stats("System statistics", &stats),
        },
        Err(e) => report_error(&e, format),
    }
    Ok(())
}
