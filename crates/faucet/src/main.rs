//! Faucet service binary

use airdrop_faucet::api::router;
use airdrop_faucet::{spawn_sweeper, FaucetConfig, QuotaPolicy, QuotaStore, RequestGate, SolanaRpcClient};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Faucet service CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Server address
    #[arg(long)]
    server_addr: Option<String>,

    /// RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Max requests per wallet per window
    #[arg(long)]
    max_requests: Option<u32>,

    /// Rate limit window (seconds)
    #[arg(long)]
    rate_limit_window: Option<u64>,

    /// Max wallets tracked by the quota store
    #[arg(long)]
    quota_capacity: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let env_filter = if args.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    match args.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    info!("Starting Airdrop Faucet v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &args.config {
        Some(path) => FaucetConfig::from_file(path)?,
        None => FaucetConfig::from_env(),
    };

    // Override with CLI arguments
    if let Some(addr) = args.server_addr {
        config.server_addr = addr;
    }

    if let Some(rpc_url) = args.rpc_url {
        config.rpc_url = rpc_url;
    }

    if let Some(max) = args.max_requests {
        config.max_requests_per_window = max;
    }

    if let Some(window) = args.rate_limit_window {
        config.rate_limit_window_secs = window;
    }

    if let Some(capacity) = args.quota_capacity {
        config.quota_capacity = capacity;
    }

    config.validate()?;

    info!("Configuration:");
    info!("  Server address: {}", config.server_addr);
    info!("  RPC URL: {}", config.rpc_url);
    info!(
        "  Rate limit: {} requests / {}s per wallet",
        config.max_requests_per_window, config.rate_limit_window_secs
    );
    info!(
        "  Quota store: {} wallets, ttl {}s",
        config.quota_capacity, config.quota_ttl_secs
    );

    let store = Arc::new(QuotaStore::new(config.quota_capacity, config.quota_ttl()));
    let rpc_client = SolanaRpcClient::new(
        config.rpc_url.clone(),
        config.commitment.clone(),
        config.rpc_timeout(),
    )?;
    let gate = Arc::new(RequestGate::new(
        Arc::clone(&store),
        QuotaPolicy::from(&config),
        Arc::new(rpc_client),
    ));

    let sweeper = spawn_sweeper(store, config.sweep_interval());

    let app = router(gate, &config);

    // Start server
    let addr: SocketAddr = config.server_addr.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Shutting down gracefully");
    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
