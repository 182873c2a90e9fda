//! partition-export
//!
//! Exports a large MongoDB-backed search index in count-bounded partitions.
//!
//! # Usage
//!
//! ```bash
//! # Print the value range of the ordering field
//! partition-export bounds --index articles --field published
//!
//! # Write the partition manifest, then export it
//! partition-export partition --index articles --field published --max-partition-size 50000
//! partition-export export --index articles --concurrency 4 --progress
//!
//! # Replay selected partitions of an existing manifest
//! partition-export export --index articles --include-partitions 3,7
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use partition_export::cli::{CliInterface, Commands};
use partition_export::client::{IndexClient, IndexSchema, MongoIndexClient, RetryingClient};
use partition_export::config::Config;
use partition_export::connection::ConnectionManager;
use partition_export::domain::{OrderingDomain, domain_for};
use partition_export::error::Result;
use partition_export::export::{ExportOptions, FilePartitionWriter, PartitionExporter};
use partition_export::partition::{PartitionManifest, find_bounds, plan_partitions};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle local subcommands or run a remote one
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_local_subcommand()? {
        return Ok(());
    }

    let config = cli.config();
    config.validate()?;
    if config.partitions_exceed_window() {
        warn!(
            "max_partition_size {} exceeds max_result_window {}; partitions of that size cannot be fetched in full",
            config.partition.max_partition_size, config.source.max_result_window
        );
    }

    let mut manager = ConnectionManager::new(config.source.clone());
    manager.connect().await?;

    let result = run_remote(&cli, &manager).await;

    manager.disconnect().await?;
    result
}

/// Run a subcommand against the connected index
async fn run_remote(cli: &CliInterface, manager: &ConnectionManager) -> Result<()> {
    let config = cli.config();
    let client = create_client(config, manager)?;
    let domain = domain_for(
        config.partition.field_kind,
        config.partition.string_max_length,
    )?;

    match &cli.args().command {
        Commands::Bounds => show_bounds(config, client.as_ref(), domain.as_ref()).await,
        Commands::Partition(_) => {
            partition(config, client.as_ref(), domain.as_ref()).await?;
            Ok(())
        }
        Commands::Export(_) => {
            let manifest = PartitionManifest::load(&cli.manifest_path()).await?;
            manifest.ensure_matches(&config.source.index_name, &config.partition.field_name)?;
            export(config, client, &manifest).await
        }
        Commands::Run { .. } => {
            let manifest = partition(config, client.as_ref(), domain.as_ref()).await?;
            export(config, client, &manifest).await
        }
        _ => Ok(()),
    }
}

/// Build the index client behind the configured retry policy
fn create_client(config: &Config, manager: &ConnectionManager) -> Result<Arc<dyn IndexClient>> {
    let mongo = MongoIndexClient::new(
        manager.index_collection()?,
        manager.redacted_endpoint(),
        config.source.max_result_window,
    );
    Ok(Arc::new(RetryingClient::new(mongo, config.retry_policy())))
}

async fn show_bounds(
    config: &Config,
    client: &dyn IndexClient,
    domain: &dyn OrderingDomain,
) -> Result<()> {
    let field = &config.partition.field_name;
    match find_bounds(client, field, domain).await? {
        Some(bounds) => {
            println!("lower: {}", bounds.lower);
            println!("upper: {}", bounds.upper);
        }
        None => println!("Index '{}' has no documents", client.index_name()),
    }
    Ok(())
}

/// Plan the partitions and save the manifest
async fn partition(
    config: &Config,
    client: &dyn IndexClient,
    domain: &dyn OrderingDomain,
) -> Result<PartitionManifest> {
    let manifest = plan_partitions(
        client,
        &config.partition.field_name,
        domain,
        config.partition.max_partition_size,
    )
    .await?;

    let path = config.manifest_path();
    manifest.save(&path).await?;
    println!(
        "Wrote {} partitions ({} documents) to {}",
        manifest.partitions.len(),
        manifest.total_document_count,
        path.display()
    );
    Ok(manifest)
}

/// Export a manifest into the export directory, stopping on Ctrl+C
async fn export(
    config: &Config,
    client: Arc<dyn IndexClient>,
    manifest: &PartitionManifest,
) -> Result<()> {
    let writer = Arc::new(FilePartitionWriter::new(
        config.export.directory.clone(),
        manifest.index_name.clone(),
    ));
    let schema = IndexSchema::new(
        manifest.index_name.clone(),
        config.export.schema_fields.clone(),
    );

    let cancel_token = CancellationToken::new();
    let cancel_token_clone = cancel_token.clone();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("Interrupted, stopping export...");
                cancel_token_clone.cancel();
            }
            Err(err) => {
                eprintln!("Failed to listen for Ctrl+C: {}", err);
            }
        }
    });

    let options = ExportOptions {
        concurrency: config.export.concurrency,
        page_size: config.export.page_size,
        include_ids: config.export.include_partitions.clone(),
        exclude_ids: config.export.exclude_partitions.clone(),
        include_fields: config.export.include_fields.clone(),
        exclude_fields: config.export.exclude_fields.clone(),
        show_progress: config.export.show_progress,
    };

    let result = PartitionExporter::new(client, writer, schema)
        .with_cancellation(cancel_token)
        .export(manifest, &options)
        .await;
    ctrl_c_handle.abort();

    let summary = result?;
    println!(
        "Exported {} partitions ({} documents) in {} ms",
        summary.partitions_exported, summary.documents_exported, summary.elapsed_ms
    );
    Ok(())
}

/// Initialize logging system based on verbosity level
///
/// # Arguments
/// * `cli` - CLI interface with verbosity settings
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
