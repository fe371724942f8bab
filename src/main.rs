//! tilecache-cassandra - Inspect and invalidate a Cassandra tile cache.
//!
//! ```text
//! tilecache-cassandra <hostname> counts [layer]
//! tilecache-cassandra <hostname> invalidate <layer>
//! tilecache-cassandra <hostname> schema
//! ```

use clap::Parser;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilecache_cassandra::{
    config::{AdminCli, AdminCommand},
    lock::NoopLock,
    store::{CassandraStore, StoreOptions},
    tile::{LayerCount, TileStore},
    StoreError,
};

/// Failures after the command line has been accepted.
#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Could not encode counts: {0}")]
    Encode(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = AdminCli::parse();

    init_logging(cli.verbose);

    let command = match cli.admin_command() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let node = cli.node_address();
    debug!(node = %node, keyspace = %cli.keyspace, ?command, "Running admin command");

    match run(&cli, &node, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Admin command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &AdminCli, node: &str, command: AdminCommand) -> Result<(), RunError> {
    let keyspace = &cli.keyspace;
    let options = StoreOptions {
        credentials: cli.credentials(),
        ..StoreOptions::default()
    };
    let store = CassandraStore::connect_with_options(vec![node.to_string()], keyspace, options).await?;

    match command {
        AdminCommand::Schema => {
            store.ensure_schema(1).await?;
            println!("Schema ready in keyspace {}", keyspace);
        }
        AdminCommand::Counts(layer) => {
            let counts = admin_tiles(store).layer_counts(layer.as_deref()).await?;
            print_counts(&counts, cli.json)?;
        }
        AdminCommand::Invalidate(layer) => {
            admin_tiles(store).invalidate_layer(&layer).await?;
            println!("Invalidated {}", layer);
        }
    }
    Ok(())
}

/// Admin commands never take render locks.
fn admin_tiles(store: CassandraStore) -> TileStore<CassandraStore, NoopLock> {
    TileStore::new(store, NoopLock)
}

fn print_counts(counts: &[LayerCount], json: bool) -> Result<(), RunError> {
    if json {
        println!("{}", serde_json::to_string_pretty(counts)?);
    } else {
        for count in counts {
            println!("{}: {}", count.layer, count.tiles);
        }
    }
    Ok(())
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so command output on stdout stays parseable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilecache_cassandra=debug"
    } else {
        "tilecache_cassandra=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
