//! Dropgate -- two-phase upload relay server.
//!
//! Startup wires the configured object and metadata backends into the
//! upload pipeline, then serves the HTTP API until SIGTERM/SIGINT.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

/// Command-line arguments for the Dropgate server.
#[derive(Parser, Debug)]
#[command(name = "dropgate", version, about = "Two-phase upload relay server")]
struct Cli {
    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Configuration comes entirely from the environment; a missing
    // required variable aborts startup here with the full list.
    let config = dropgate::config::load_from_env()?;

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder and register metric descriptions.
    dropgate::metrics::init_metrics();
    dropgate::metrics::describe_metrics();
    info!("Prometheus metrics initialized");

    // Initialize the object storage backend.
    let objects: Arc<dyn dropgate::object_store::store::ObjectStore> =
        match config.storage.backend.as_str() {
            "memory" => {
                let store =
                    dropgate::object_store::memory::MemoryObjectStore::new(&config.storage.bucket);
                info!(
                    "In-memory object store initialized: bucket={}",
                    config.storage.bucket
                );
                Arc::new(store)
            }
            "s3" | _ => {
                let store = dropgate::object_store::s3::S3ObjectStore::new(&config.storage).await?;
                info!(
                    "S3 object store initialized: bucket={} region={}",
                    config.storage.bucket, config.storage.region
                );
                Arc::new(store)
            }
        };

    // Initialize the metadata store.
    let metadata: Arc<dyn dropgate::metadata::store::MetadataStore> =
        match config.metadata.engine.as_str() {
            "memory" => {
                info!("In-memory metadata store initialized");
                Arc::new(dropgate::metadata::memory::MemoryMetadataStore::new())
            }
            "dynamodb" | _ => {
                let store =
                    dropgate::metadata::dynamodb::DynamoDbMetadataStore::new(&config.metadata)
                        .await?;
                info!(
                    "DynamoDB metadata store initialized: table={} region={}",
                    config.metadata.table_name, config.metadata.region
                );
                Arc::new(store)
            }
        };

    // Build the pipeline and shared state.
    let pipeline = dropgate::pipeline::UploadPipeline::new(
        objects.clone(),
        metadata.clone(),
        dropgate::pipeline::RetryPolicy::from(&config.retry),
    );
    let state = Arc::new(dropgate::AppState {
        config,
        objects,
        metadata,
        pipeline,
    });

    let app = dropgate::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Dropgate listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new connections
    // and wait for in-flight requests to complete.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Dropgate shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
