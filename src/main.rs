//! Authorization Header Signing Proxy
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────────┐
//!                        │                 AUTH HEADER PROXY                      │
//!                        │                                                        │
//!   Client Request       │  ┌─────────┐   ┌────────────┐   ┌───────────────────┐  │
//!   Authorization: ...   │  │ trace + │   │  timeout   │   │    auth_header    │  │
//!  ──────────────────────┼─▶│ req id  │──▶│            │──▶│ strip + HMAC sign │──┼──▶ Upstream
//!                        │  └─────────┘   └────────────┘   └───────────────────┘  │    X-Auth-Claims
//!                        │                                                        │    X-Auth-Ts
//!                        │  ┌──────────────────────────────────────────────────┐  │    X-Auth-Sig
//!                        │  │ config │ observability │ lifecycle (shutdown)     │  │
//!                        │  └──────────────────────────────────────────────────┘  │
//!                        └───────────────────────────────────────────────────────┘
//! ```

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use auth_header_proxy::auth_header::{EnvSecrets, Signer};
use auth_header_proxy::config::{load_config, ProxyConfig};
use auth_header_proxy::lifecycle::{signals::wait_for_signal, Shutdown};
use auth_header_proxy::observability::{
    logging::{init_logging, logging_config},
    metrics::init_metrics,
};
use auth_header_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "auth-header-proxy")]
#[command(about = "Reverse proxy that replaces Authorization with a signed X-Auth-* envelope", long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults apply when omitted).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy (default)
    Serve,
    /// Validate the config and resolve the signing secret
    Check,
    /// Print the headers the proxy would produce for a credential
    Sign {
        /// Full Authorization header value, e.g. "Bearer abc123"
        authorization: String,

        /// Sign at this Unix timestamp instead of now
        #[arg(long)]
        timestamp: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => load_config(path),
        None => Ok(ProxyConfig::default()),
    };

    init_logging(&logging_config(&loaded));

    let result = match loaded {
        Ok(config) => run(cli.command.unwrap_or(Commands::Serve), config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "auth-header-proxy failed");
    }
    result
}

async fn run(command: Commands, config: ProxyConfig) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Serve => serve(config).await,
        Commands::Check => check(&config),
        Commands::Sign {
            authorization,
            timestamp,
        } => sign(&config, &authorization, timestamp),
    }
}

async fn serve(config: ProxyConfig) -> Result<(), Box<dyn Error>> {
    tracing::info!("auth-header-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    let bind_address = config.listener.bind_address.clone();
    let observability = config.observability.clone();

    // Fails closed before anything binds when the secret is missing.
    let server = HttpServer::new(config)?;

    tracing::info!(
        bind_address = %bind_address,
        upstream = %server.config().upstream.address,
        request_timeout_secs = server.config().timeouts.request_secs,
        "Configuration loaded"
    );

    if observability.metrics_enabled {
        let addr: SocketAddr = observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn check(config: &ProxyConfig) -> Result<(), Box<dyn Error>> {
    let signer = signer(config)?;
    println!(
        "ok: middleware {:?} signs with ${} (prefix {:?}), upstream {}",
        signer.name(),
        config.auth_header.options.resolved_env_var(),
        signer.prefix(),
        config.upstream.address
    );
    Ok(())
}

fn sign(config: &ProxyConfig, authorization: &str, timestamp: Option<u64>) -> Result<(), Box<dyn Error>> {
    let signer = signer(config)?;

    if authorization.is_empty() {
        eprintln!("empty credential: the request would be forwarded without X-Auth-* headers");
        return Ok(());
    }

    let envelope = match timestamp {
        Some(ts) => signer.sign_at(authorization.as_bytes(), ts),
        None => signer.sign(authorization.as_bytes()),
    };

    println!("X-Auth-Claims: {}", envelope.claims);
    println!("X-Auth-Ts: {}", envelope.timestamp);
    println!("X-Auth-Sig: {}", envelope.signature);
    Ok(())
}

fn signer(config: &ProxyConfig) -> Result<Signer, Box<dyn Error>> {
    Ok(Signer::from_config(
        &config.auth_header.options,
        config.auth_header.name.clone(),
        &EnvSecrets,
    )?)
}
