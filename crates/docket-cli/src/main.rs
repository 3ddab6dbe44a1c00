//! Docket - legal document indexing and passage retrieval from the command line
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Test allows"
    )
)]

use anyhow::Result;
use clap::Parser as _;
use serde::Serialize;
use std::io::{self, Write as _};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use docket_core::DocketConfig;

mod cli;
mod handlers;

use cli::{Cli, Commands};
use handlers::Docket;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => DocketConfig::config_path()?,
    };
    let mut config = DocketConfig::load_or_default(&config_path)?;
    config.apply_env_overrides();
    if let Some(index_dir) = &cli.index_dir {
        config.index.storage_dir.clone_from(index_dir);
    }

    init_logging(&config.logging.level);

    let docket = Docket::from_config(&config)?;

    match cli.command {
        Commands::Ingest {
            document,
            path,
            collection,
        } => write_json(
            &docket
                .ingest(&document, &path, collection.as_deref())
                .await?,
        )?,
        Commands::IngestDir {
            directory,
            collection,
        } => write_json(&docket.ingest_dir(&directory, collection.as_deref()).await?)?,
        Commands::Query {
            query,
            limit,
            collection,
        } => write_json(&docket.query(&query, limit, collection.as_deref()).await?)?,
        Commands::Delete {
            document,
            collection,
        } => write_json(
            &docket
                .delete(document.as_deref(), collection.as_deref())
                .await?,
        )?,
        Commands::Stats => write_json(&docket.stats().await?)?,
        Commands::Check => write_json(&docket.check().await?)?,
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("docket_core={level},docket_index={level},docket={level}"))
    });

    if let Err(error) = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .try_init()
    {
        tracing::debug!("Logging already initialised: {error}");
    }
}

/// Print `value` as pretty JSON on stdout
fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
