use crate::commands::Commands;
use crate::error::CliError;
use crate::shutdown::ShutdownCoordinator;
use clap::Parser;
use connectors::csv::{CsvDirectorySink, CsvDirectoryStorage};
use coordinator::{Coordinator, InMemoryCoordinator, SledCoordinator};
use engine_core::connectors::source::SnapshotStorage;
use engine_core::metrics::MemoryRegistry;
use engine_runtime::snapshot::SnapshotLoader;
use model::core::identifiers::OperationId;
use model::endpoint::Source;
use model::transfer::Transfer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};

mod commands;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "ferry", version = "0.1.0", about = "Table replication and bulk copy tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Snapshot {
            config,
            target_dir,
            state_dir,
            operation,
        } => run_snapshot(&config, &target_dir, state_dir, operation).await?,
        Commands::Validate { config } => {
            let transfer = load_transfer(&config).await?;
            let storage = csv_storage(&transfer)?;
            let tables = storage.table_list().await?;
            let loader = SnapshotLoader::new(
                Arc::new(InMemoryCoordinator::new()),
                OperationId::from("validate"),
                transfer,
                Arc::new(MemoryRegistry::new()),
            );
            loader.check_include_directives(&tables)?;
            println!("include directives match {} discovered tables", tables.len());
        }
        Commands::State {
            state_dir,
            operation,
        } => {
            let coordinator = SledCoordinator::open(&state_dir)?;
            let operation = OperationId::from(operation);
            let state = coordinator
                .get_operation_state(&operation)
                .await
                .unwrap_or_else(|_| "unknown".into());
            let parts = coordinator.get_operation_tables_parts(&operation).await?;
            output::print_parts(&state, &parts);
        }
    }

    Ok(())
}

async fn run_snapshot(
    config: &Path,
    target_dir: &Path,
    state_dir: Option<PathBuf>,
    operation: Option<String>,
) -> Result<(), CliError> {
    let transfer = load_transfer(config).await?;
    if !transfer.kind.includes_snapshot() {
        println!("transfer kind has no snapshot phase, nothing to do");
        return Ok(());
    }
    let storage = Arc::new(csv_storage(&transfer)?);
    let sink = Arc::new(CsvDirectorySink::new(target_dir));

    let coordinator: Arc<dyn Coordinator> = match state_dir {
        Some(path) => Arc::new(SledCoordinator::open(path)?),
        None => Arc::new(InMemoryCoordinator::new()),
    };

    let operation_id = OperationId::from(
        operation.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
    );
    info!(transfer_id = %transfer.id, operation_id = %operation_id, "starting snapshot");

    let cancel = CancellationToken::new();
    let shutdown = ShutdownCoordinator::new(cancel.clone());
    shutdown.register_handlers();

    let loader = SnapshotLoader::new(
        coordinator.clone(),
        operation_id.clone(),
        transfer,
        Arc::new(MemoryRegistry::new()),
    );
    loader.load_snapshot(&cancel, storage, sink).await?;

    if shutdown.is_shutdown_requested() {
        println!("snapshot canceled, progress persisted for resume");
    }

    let state = coordinator
        .get_operation_state(&operation_id)
        .await
        .unwrap_or_else(|_| "unknown".into());
    let parts = coordinator.get_operation_tables_parts(&operation_id).await?;
    output::print_parts(&state, &parts);
    Ok(())
}

async fn load_transfer(path: &Path) -> Result<Transfer, CliError> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

fn csv_storage(transfer: &Transfer) -> Result<CsvDirectoryStorage, CliError> {
    match &transfer.src {
        Source::Csv(src) => Ok(CsvDirectoryStorage::from_source(src)),
        Source::Postgres(_) => Err(CliError::UnsupportedSource("postgres".into())),
    }
}
