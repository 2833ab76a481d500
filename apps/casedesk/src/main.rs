use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    BinaryStore, CaseDirectory, DocumentService, EntityStore, Notification, NotificationLevel,
    Notifier, RemoteBackend, StatusSelection,
};
use shared::{
    domain::{CaseId, CaseStatus, DocumentType},
    protocol::NewCase,
};
use storage::Storage;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_database_url, BackendKind, Settings};

#[derive(Parser, Debug)]
#[command(name = "casedesk", about = "Foreclosure case tracking from the command line")]
struct Cli {
    #[arg(long, default_value = "casedesk.toml")]
    config: PathBuf,
    /// Overrides the backend chosen in the config file.
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists every case status in lifecycle order.
    Statuses,
    Cases,
    /// Shows one case and its documents.
    Show {
        case_id: String,
    },
    NewCase {
        #[arg(long)]
        case_number: String,
        #[arg(long)]
        borrower: String,
        #[arg(long)]
        address: String,
    },
    SetStatus {
        case_id: String,
        status: CaseStatus,
    },
    Upload {
        case_id: String,
        file: PathBuf,
        #[arg(long = "type")]
        doc_type: DocumentType,
        /// Stored name; defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },
    Download {
        case_id: String,
        name: String,
        #[arg(long)]
        out: PathBuf,
    },
}

/// Prints notifications the way a toast area would show them.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => println!("[ok] {}", notification.message),
            NotificationLevel::Info => println!("[info] {}", notification.message),
            NotificationLevel::Error => eprintln!("[error] {}", notification.message),
        }
    }
}

struct Backends {
    entities: Arc<dyn EntityStore>,
    objects: Arc<dyn BinaryStore>,
}

async fn connect(settings: &Settings) -> Result<Backends> {
    match settings.backend {
        BackendKind::Remote => {
            let remote = Arc::new(RemoteBackend::new(settings.remote_config()?)?);
            info!(bucket = remote.bucket(), "using remote backend");
            Ok(Backends {
                entities: remote.clone(),
                objects: remote,
            })
        }
        BackendKind::Local => {
            let database_url = normalize_database_url(&settings.database_url);
            let local = Arc::new(
                Storage::new(&database_url)
                    .await
                    .with_context(|| format!("failed to open local store '{database_url}'"))?,
            );
            let cases = local
                .case_count()
                .await
                .context("local store is not usable")?;
            info!(%database_url, cases, "using local backend");
            Ok(Backends {
                entities: local.clone(),
                objects: local,
            })
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(backend) = cli.backend {
        settings.backend = backend;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .with_writer(std::io::stderr)
        .init();
    debug!(backend = ?settings.backend, config = %cli.config.display(), "settings loaded");

    if let Command::Statuses = cli.command {
        for status in CaseStatus::ALL {
            println!("{status}");
        }
        return Ok(());
    }

    let backends = connect(&settings).await?;
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    let directory = CaseDirectory::new(backends.entities.clone(), notifier.clone());
    let documents = DocumentService::new(backends.entities, backends.objects, notifier)
        .with_cache_control(settings.cache_control_seconds);

    match cli.command {
        Command::Statuses => {}
        Command::Cases => {
            for case in directory.list_cases().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    case.id, case.case_number, case.status, case.borrower_name
                );
            }
        }
        Command::Show { case_id } => {
            let case_id = CaseId::new(case_id);
            let case = directory
                .get_case(&case_id)
                .await?
                .ok_or_else(|| anyhow!("case {case_id} not found"))?;
            println!("case      {}", case.id);
            println!("number    {}", case.case_number);
            println!("borrower  {}", case.borrower_name);
            println!("property  {}", case.property_address);
            println!("status    {}", case.status);
            println!("opened    {}", case.created_at.to_rfc3339());
            for document in documents.list_documents(&case_id).await? {
                println!(
                    "  {}\t{}\t{}\t{}",
                    document.title, document.doc_type, document.status, document.url
                );
            }
        }
        Command::NewCase {
            case_number,
            borrower,
            address,
        } => {
            let created = directory
                .create_case(&NewCase {
                    case_number,
                    borrower_name: borrower,
                    property_address: address,
                    status: CaseStatus::New,
                })
                .await?;
            println!("created case {}", created.id);
        }
        Command::SetStatus { case_id, status } => {
            let control = directory.open_case(&CaseId::new(case_id)).await?;
            let case_id = control.case_id().clone();
            let outcome = control
                .select(status, |confirmed| {
                    debug!(%case_id, %confirmed, "status reconciled");
                })
                .await?;
            if outcome == StatusSelection::Unchanged {
                println!("case {} is already {status}", control.case_id());
            }
        }
        Command::Upload {
            case_id,
            file,
            doc_type,
            name,
        } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("cannot derive a name from '{}'", file.display()))?,
            };
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read '{}'", file.display()))?;
            let stored = documents
                .upload_document(&CaseId::new(case_id), bytes, &name, doc_type)
                .await?;
            println!("stored at {}", stored.path);
        }
        Command::Download { case_id, name, out } => {
            let case_id = CaseId::new(case_id);
            let document = documents
                .list_documents(&case_id)
                .await?
                .into_iter()
                .find(|d| d.title == name)
                .ok_or_else(|| anyhow!("case {case_id} has no document named '{name}'"))?;
            let bytes = documents.download_document(&document).await?;
            tokio::fs::write(&out, &bytes)
                .await
                .with_context(|| format!("failed to write '{}'", out.display()))?;
            println!("wrote {} bytes to {}", bytes.len(), out.display());
        }
    }

    Ok(())
}
