//! MailGuard CLI - Command-line client for the MailGuard email review backend.

mod commands;
mod output;

use anyhow::Result;
use auth_session::EmailStatus;
use clap::{Parser, Subcommand};
use session_config::{init_logging, Config, LogFormat, Paths};
use std::path::PathBuf;
use tracing::debug;

/// MailGuard CLI - Review suspicious email from the terminal.
#[derive(Parser)]
#[command(name = "mailguard")]
#[command(about = "MailGuard CLI for authentication and email review")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Backend base URL; overrides the config file
    #[arg(long, env = "MAILGUARD_API_URL", global = true)]
    api_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Create an account and log in
    Register {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
        /// First name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Logout and clear session
    Logout,

    /// Check authentication status
    Status,

    /// Review emails
    Emails {
        #[command(subcommand)]
        command: EmailCommands,
    },
}

#[derive(Subcommand)]
enum EmailCommands {
    /// List emails
    List {
        /// Filter by status (safe, suspicious, dangerous)
        #[arg(short, long)]
        status: Option<EmailStatus>,
        /// Search sender, subject and content
        #[arg(long)]
        search: Option<String>,
        /// Page number
        #[arg(short, long)]
        page: Option<u32>,
    },
    /// Show email details
    Show {
        /// Email ID
        id: u64,
    },
    /// Analyze raw email content
    Analyze {
        /// File holding the content; stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Quarantine an email
    Quarantine {
        /// Email ID
        id: u64,
    },
    /// Release a quarantined email
    Release {
        /// Email ID
        id: u64,
    },
    /// Delete an email
    Delete {
        /// Email ID
        id: u64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Summary of your emails
    Summary,
    /// System-wide statistics
    Stats,
}

fn load_config(cli: &Cli, paths: &Paths) -> Result<Config> {
    let mut config = Config::load(paths)?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.clone();
        config.validate()?;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let paths = Paths::new()?;
    let config = load_config(&cli, &paths)?;

    let log_format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(&config.log_level, log_format);
    debug!(api_url = %config.api_url, "Configuration loaded");

    let session = commands::open_session(&config, &paths)?;
    let format = &cli.format;

    match cli.command {
        Commands::Login { email } => commands::login(&session, email, format).await,
        Commands::Register { email, name } => {
            commands::register(&session, email, name, format).await
        }
        Commands::Logout => commands::logout(&session, format).await,
        Commands::Status => commands::status(&session, format).await,
        Commands::Emails { command } => match command {
            EmailCommands::List {
                status,
                search,
                page,
            } => commands::emails_list(&session, status, search, page, format).await,
            EmailCommands::Show { id } => commands::emails_show(&session, id, format).await,
            EmailCommands::Analyze { file } => {
                commands::emails_analyze(&session, file.as_deref(), format).await
            }
            EmailCommands::Quarantine { id } => {
                commands::emails_quarantine(&session, id, format).await
            }
            EmailCommands::Release { id } => commands::emails_release(&session, id, format).await,
            EmailCommands::Delete { id, yes } => {
                commands::emails_delete(&session, id, yes, format).await
            }
            EmailCommands::Summary => commands::emails_summary(&session, format).await,
            EmailCommands::Stats => commands::emails_stats(&session, format).await,
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}
