use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use orderpay::application::Services;
use orderpay::config::{DEFAULT_GATEWAY_BASE_URL, GatewayConfig};
use orderpay::domain::ports::{GatewayRef, OrderStoreRef};
use orderpay::infrastructure::in_memory::InMemoryOrderStore;
use orderpay::infrastructure::noop::NoopGateway;
use orderpay::infrastructure::notify::LogNotifier;
use orderpay::infrastructure::razorpay::RazorpayGateway;
#[cfg(feature = "storage-rocksdb")]
use orderpay::infrastructure::rocksdb::RocksDBStore;
use orderpay::infrastructure::signature;
use orderpay::interfaces::http;
use orderpay::interfaces::seed::Seed;
use std::fs::{self, File};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the payment HTTP service
    Serve(ServeArgs),
    /// Print the hex HMAC-SHA256 the gateway would send for a webhook payload
    SignWebhook {
        /// Webhook secret shared with the gateway
        #[arg(long, env = "GATEWAY_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
        /// File holding the raw webhook body
        payload: PathBuf,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "ORDERPAY_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "ORDERPAY_DB_PATH")]
    db_path: Option<PathBuf>,

    /// JSON file with orders and stock to load at start-up
    #[arg(long)]
    seed: Option<PathBuf>,

    #[arg(long, env = "GATEWAY_KEY_ID")]
    gateway_key_id: Option<String>,

    #[arg(long, env = "GATEWAY_KEY_SECRET", hide_env_values = true)]
    gateway_key_secret: Option<String>,

    #[arg(long, env = "GATEWAY_WEBHOOK_SECRET", hide_env_values = true)]
    gateway_webhook_secret: Option<String>,

    #[arg(long, env = "GATEWAY_BASE_URL", default_value = DEFAULT_GATEWAY_BASE_URL)]
    gateway_base_url: String,

    #[arg(long, env = "GATEWAY_TIMEOUT_SECS", default_value_t = 30)]
    gateway_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::SignWebhook { secret, payload } => {
            let body = fs::read(payload).into_diagnostic()?;
            println!("{}", signature::sign(&secret, &body));
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let store = open_store(args.db_path)?;
    if let Some(path) = args.seed {
        let seed = Seed::from_reader(File::open(path).into_diagnostic()?).into_diagnostic()?;
        seed.load_into(store.as_ref()).await.into_diagnostic()?;
    }

    let gateway: GatewayRef = match (args.gateway_key_id, args.gateway_key_secret) {
        (Some(key_id), Some(key_secret)) => {
            let config = GatewayConfig::new(key_id, key_secret)
                .with_webhook_secret(args.gateway_webhook_secret)
                .with_base_url(args.gateway_base_url)
                .with_timeout(Duration::from_secs(args.gateway_timeout_secs));
            info!(?config, "using razorpay gateway");
            Arc::new(RazorpayGateway::new(config).into_diagnostic()?)
        }
        (_, key_secret) => {
            warn!("gateway credentials not configured; payments run against the no-op gateway");
            Arc::new(NoopGateway::with_secrets(
                key_secret.unwrap_or_default(),
                args.gateway_webhook_secret.filter(|s| !s.is_empty()),
            ))
        }
    };

    let services = Services::new(store, gateway, Arc::new(LogNotifier));
    let app = http::router(services.clone());

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .into_diagnostic()?;
    info!(addr = %args.bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    services.notifications.drain().await;
    info!("shut down");
    Ok(())
}

fn open_store(db_path: Option<PathBuf>) -> Result<OrderStoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            info!(path = %path.display(), "using rocksdb storage");
            Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(path) => {
            eprintln!(
                "WARNING: --db-path {} ignored; built without the storage-rocksdb feature, using in-memory storage",
                path.display()
            );
            Ok(Arc::new(InMemoryOrderStore::new()))
        }
        None => Ok(Arc::new(InMemoryOrderStore::new())),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not install ctrl-c handler");
    }
}
