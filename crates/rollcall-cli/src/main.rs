use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_engine::EngineConfig;
use rollcall_session::{
    AttendanceLedger, MarkResult, SessionController, SessionMethod, TemplateStore,
};
use rollcall_store::SqliteStore;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance session CLI")]
struct Cli {
    /// Database path (defaults to ROLLCALL_DB_PATH or the XDG data dir)
    #[arg(long)]
    db: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an attendance session for a group
    OpenSession {
        /// Group the session belongs to
        group_id: i64,
        /// Check-in method: "qr" or "face"
        #[arg(short, long, default_value = "qr")]
        method: String,
    },
    /// Rotate a session's QR token
    RefreshQr {
        /// Session ID
        id: String,
    },
    /// Print the session's shareable link token, creating it if needed
    ShareToken {
        /// Session ID
        id: String,
    },
    /// End a session
    EndSession {
        /// Session ID
        id: String,
    },
    /// Show the group's currently active session, if any
    Active {
        /// Group ID
        group_id: i64,
    },
    /// Mark attendance with a scanned QR token
    MarkQr {
        /// The scanned token
        token: String,
        /// Identity checking in
        identity_id: i64,
    },
    /// Mark attendance with a shareable link token
    MarkShare {
        /// The link token
        token: String,
        /// Identity checking in
        identity_id: i64,
    },
    /// List attendance records for a session
    Attendance {
        /// Session ID
        id: String,
    },
    /// Remove an identity's enrolled template
    RemoveTemplate {
        /// Identity ID
        identity_id: i64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    let db_path = cli.db.unwrap_or(config.db_path.clone());
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating data directory {}", dir.display()))?;
    }
    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?,
    );
    let sessions = SessionController::new(store.clone(), config.qr_ttl());
    let ledger = AttendanceLedger::new(sessions.clone(), store.clone());

    match cli.command {
        Commands::OpenSession { group_id, method } => {
            let method: SessionMethod = method.parse()?;
            let session = sessions.create_session(group_id, method)?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Commands::RefreshQr { id } => {
            let session = sessions.refresh_qr(parse_id(&id)?)?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Commands::ShareToken { id } => {
            let token = sessions.get_or_create_share_token(parse_id(&id)?)?;
            println!("{token}");
        }
        Commands::EndSession { id } => {
            let session = sessions.end_session(parse_id(&id)?)?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Commands::Active { group_id } => match sessions.get_active_session(group_id)? {
            Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
            None => println!("no active session"),
        },
        Commands::MarkQr { token, identity_id } => {
            let result = match sessions.find_by_qr_token(&token)? {
                Some(session) if sessions.validate_qr(session.session_id, &token)? => {
                    ledger.mark(session.session_id, identity_id, SessionMethod::Qr)?
                }
                _ => MarkResult::SessionInvalid,
            };
            report_mark(&result)?;
        }
        Commands::MarkShare { token, identity_id } => {
            let result = match sessions.find_by_share_token(&token)? {
                Some(session) => ledger.mark(session.session_id, identity_id, SessionMethod::Qr)?,
                None => MarkResult::SessionInvalid,
            };
            report_mark(&result)?;
        }
        Commands::Attendance { id } => {
            let records = ledger.list_for_session(parse_id(&id)?)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::RemoveTemplate { identity_id } => {
            if store.delete_template(identity_id)? {
                println!("template removed");
            } else {
                println!("no template for identity {identity_id}");
            }
        }
    }

    Ok(())
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("invalid session id '{id}'"))
}

fn report_mark(result: &MarkResult) -> Result<()> {
    match result {
        MarkResult::Marked(record) => {
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        MarkResult::AlreadyMarked => println!("already marked"),
        MarkResult::SessionInvalid => println!("session invalid or token expired"),
    }
    Ok(())
}
