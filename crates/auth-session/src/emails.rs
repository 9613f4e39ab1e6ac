//! Typed email review endpoints.

use crate::error::SessionResult;
use crate::pipeline::RequestPipeline;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const EMAILS_PATH: &str = "/api/emails/";

/// Risk classification assigned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Safe,
    Suspicious,
    Dangerous,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Safe => "safe",
            EmailStatus::Suspicious => "suspicious",
            EmailStatus::Dangerous => "dangerous",
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EmailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Ok(EmailStatus::Safe),
            "suspicious" => Ok(EmailStatus::Suspicious),
            "dangerous" => Ok(EmailStatus::Dangerous),
            other => Err(format!("unknown email status: {}", other)),
        }
    }
}

/// An email as listed by the backend. Fields the client does not model are
/// kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: u64,
    pub sender: String,
    #[serde(default)]
    pub sender_name: String,
    pub subject: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub received_date: Option<String>,
    pub status: EmailStatus,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub is_quarantined: bool,
    #[serde(default)]
    pub has_attachments: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One page of the email list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailPage {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<EmailRecord>,
}

/// Filters for listing emails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailQuery {
    pub status: Option<EmailStatus>,
    pub search: Option<String>,
    pub page: Option<u32>,
}

impl EmailQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(status) = self.status {
            params.push(("status", status.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            params.push(("search", search.to_string()));
        }
        if let Some(page) = self.page {
            params.push(("page", page.to_string()));
        }
        params
    }
}

/// Result of submitting raw content for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub email_id: u64,
    pub risk_score: f64,
    pub ml_confidence: f64,
    #[serde(default)]
    pub suspicious_keywords: Vec<String>,
    pub status: EmailStatus,
}

/// Aggregate counts for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailStats {
    pub total_emails: u64,
    pub suspicious_emails: u64,
    pub high_risk_emails: u64,
    pub detection_rate: f64,
}

/// Acknowledgement returned by quarantine and release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: String,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    content: &'a str,
}

/// Email endpoints. Every call goes through the authenticated pipeline.
#[derive(Clone)]
pub struct EmailApi {
    pipeline: RequestPipeline,
}

impl EmailApi {
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn list_emails(&self, query: &EmailQuery) -> SessionResult<EmailPage> {
        self.pipeline.get_json(EMAILS_PATH, &query.params()).await
    }

    pub async fn get_email(&self, id: u64) -> SessionResult<EmailRecord> {
        self.pipeline.get_json(&email_path(id, ""), &[]).await
    }

    /// Submit raw email content for scoring. The backend stores it as a new
    /// email.
    pub async fn analyze_email(&self, content: &str) -> SessionResult<AnalysisResult> {
        let path = format!("{}analyze_email/", EMAILS_PATH);
        self.pipeline
            .post_json(&path, &AnalyzeRequest { content })
            .await
    }

    pub async fn quarantine_email(&self, id: u64) -> SessionResult<StatusMessage> {
        self.pipeline
            .post_json(&email_path(id, "quarantine/"), &serde_json::json!({}))
            .await
    }

    /// Release a quarantined email. Admin only on the backend.
    pub async fn release_email(&self, id: u64) -> SessionResult<StatusMessage> {
        self.pipeline
            .post_json(&email_path(id, "release/"), &serde_json::json!({}))
            .await
    }

    /// Counts for the current user's emails.
    pub async fn suspicious_summary(&self) -> SessionResult<EmailStats> {
        let path = format!("{}suspicious_summary/", EMAILS_PATH);
        self.pipeline.get_json(&path, &[]).await
    }

    /// System-wide counts.
    pub async fn public_stats(&self) -> SessionResult<EmailStats> {
        let path = format!("{}public_stats/", EMAILS_PATH);
        self.pipeline.get_json(&path, &[]).await
    }

    pub async fn delete_email(&self, id: u64) -> SessionResult<()> {
        self.pipeline.delete(&email_path(id, "")).await
    }
}

fn email_path(id: u64, action: &str) -> String {
    format!("{}{}/{}", EMAILS_PATH, id, action)
}
