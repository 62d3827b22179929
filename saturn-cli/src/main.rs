//! Saturn L2 CLI
//!
//! Runs the node's control plane and retrieves content from the upstream
//! gateway. Every setting can come from a flag or its environment variable.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

use saturn_core::config::resolve_gateway_url;
use saturn_core::{ConfigError, NodeConfig};
use saturn_ipfs::{CancellationToken, ContentAddress, GatewayFetchClient};
use saturn_web::{AppState, AssetStore, DirAssets, EmbeddedAssets};

/// Generic failure (also used for an invalid PORT, see `ConfigError::exit_code`)
const EXIT_FAILURE: u8 = 1;
/// The control plane listener could not be bound
const EXIT_BIND: u8 = 4;
/// The upstream gateway URL is unusable
const EXIT_GATEWAY_URL: u8 = 5;

#[derive(Parser)]
#[command(name = "saturn-l2")]
#[command(about = "Saturn L2 node - local control plane and gateway content retrieval")]
#[command(version)]
struct Cli {
    /// Control plane port
    #[arg(long, env = "PORT", global = true)]
    port: Option<String>,

    /// Filecoin wallet address of this node
    #[arg(long, env = "FIL_WALLET_ADDRESS", global = true)]
    wallet: Option<String>,

    /// Base URL of the upstream gateway
    #[arg(long, env = "GATEWAY_BASE_URL", global = true)]
    gateway: Option<String>,

    /// Serve the dashboard from this directory instead of the bundled copy
    #[arg(long, env = "WEBUI_DIR", global = true)]
    webui_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane (default)
    Serve,

    /// Retrieve one CID from the upstream gateway
    Fetch {
        /// Content identifier
        cid: String,

        /// Write the content to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Give up after this many seconds
        #[arg(long, default_value = "60")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let mut cli = Cli::parse();

    match cli.command.take().unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(&cli).await,
        Commands::Fetch {
            cid,
            output,
            timeout,
        } => match cmd_fetch(&cli, &cid, output.as_deref(), timeout).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::from(fetch_exit_code(&e))
            }
        },
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            token.cancel();
        }
    });
}

// ============================================================================
// SERVE
// ============================================================================

fn config_failure(err: &ConfigError) -> ExitCode {
    eprintln!("{}", err);
    ExitCode::from(err.exit_code())
}

async fn cmd_serve(cli: &Cli) -> ExitCode {
    let config = match NodeConfig::from_raw(
        cli.port.as_deref(),
        cli.wallet.as_deref(),
        cli.gateway.as_deref(),
        cli.webui_dir.clone(),
    ) {
        Ok(config) => Arc::new(config),
        Err(e) => return config_failure(&e),
    };

    // The control plane never fetches, but a bad upstream is still a startup error
    if let Err(e) = GatewayFetchClient::new(config.gateway_url.as_str()) {
        eprintln!("{}", e);
        return ExitCode::from(EXIT_GATEWAY_URL);
    }

    let assets: Arc<dyn AssetStore> = match &config.webui_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "Serving dashboard from directory");
            Arc::new(DirAssets::new(dir))
        }
        None => Arc::new(EmbeddedAssets),
    };

    let state = match AppState::new(config.clone(), assets) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let listener = match saturn_web::bind(config.port).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Cannot start the webserver: {}", e);
            return ExitCode::from(EXIT_BIND);
        }
    };

    // Port 0 means the OS picked one
    if let Ok(addr) = listener.local_addr() {
        println!("Server listening on {}", addr);
        println!("WebUI: http://localhost:{}/webui", addr.port());
    }

    tracing::info!(
        wallet = %config.wallet,
        gateway = %config.gateway_url,
        "Node configured"
    );

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    match saturn_web::serve(state, listener, shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Control plane failed");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

// ============================================================================
// FETCH
// ============================================================================

fn fetch_exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<saturn_ipfs::Error>() {
        Some(saturn_ipfs::Error::InvalidGatewayUrl(_)) => EXIT_GATEWAY_URL,
        _ => EXIT_FAILURE,
    }
}

async fn cmd_fetch(cli: &Cli, cid: &str, output: Option<&Path>, timeout: u64) -> Result<()> {
    let address = ContentAddress::parse(cid)?;
    let client = GatewayFetchClient::new(resolve_gateway_url(cli.gateway.as_deref()))?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout)).await;
        timer.cancel();
    });

    let stream = client
        .fetch(&cancel, &address)
        .await
        .with_context(|| format!("Failed to fetch {} from {}", address, client.base_url()))?;
    let mut reader = stream.into_reader();

    let written = match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Cannot create {}", path.display()))?;

            match copy_all(&mut reader, &mut file).await {
                Ok(n) => n,
                Err(e) => {
                    // Never leave a truncated file behind
                    drop(file);
                    let _ = tokio::fs::remove_file(path).await;
                    return Err(e.context(format!("Failed to read {}", address)));
                }
            }
        }
        None => copy_all(&mut reader, &mut tokio::io::stdout())
            .await
            .with_context(|| format!("Failed to read {}", address))?,
    };

    tracing::info!(cid = %address, bytes = written, "Content retrieved");
    Ok(())
}

async fn copy_all<R, W>(reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let n = tokio::io::copy(reader, writer).await?;
    writer.flush().await?;
    Ok(n)
}
