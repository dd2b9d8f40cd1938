//! ledgerd - app-tier HTTP service for the transactions ledger.
//!
//! Startup is strictly ordered: database credentials are resolved from
//! AWS Secrets Manager, the connection pool is brought to Ready, and only
//! then does the HTTP listener bind. A failure at either step is fatal -
//! serving without a valid database is worse than not serving.

use std::net::SocketAddr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ledgerd_core::secrets::{DEFAULT_DATABASE, DEFAULT_SECRET_NAME};
use ledgerd_core::{AwsSecretSource, Database, PoolConfig, SecretProvider};
use ledgerd_server::{run_server, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ledgerd",
    author,
    version,
    about = "App-tier HTTP service for the transactions ledger"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(ServeArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to bind to
    #[arg(long, short = 'b', default_value = "0.0.0.0:4000")]
    bind: SocketAddr,

    /// Logical name of the secret holding the database credentials
    #[arg(long, env = "LEDGERD_SECRET_NAME", default_value = DEFAULT_SECRET_NAME)]
    secret_name: String,

    /// Database name (fixed by the service, not by the secret)
    #[arg(long, env = "LEDGERD_DATABASE", default_value = DEFAULT_DATABASE)]
    database: String,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    cors_permissive: bool,
}

/// Run the HTTP server
async fn run_serve(args: ServeArgs) -> Result<()> {
    let provider = SecretProvider::new(
        AwsSecretSource::from_env().await,
        args.secret_name,
        args.database,
    );
    let credentials = provider
        .resolve()
        .await
        .context("failed to load database credentials from Secrets Manager")?;

    let db = Database::connect(credentials, PoolConfig::default())
        .await
        .context("failed to initialize database connection pool")?;

    tracing::info!("starting ledgerd on {}", args.bind);

    let config = ServerConfig {
        bind_addr: args.bind,
        cors_permissive: args.cors_permissive,
    };
    run_server(db, config).await.context("server error")?;

    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
    }
}
