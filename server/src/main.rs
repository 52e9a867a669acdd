use anyhow::Result;
use clap::Parser;
use server::{build_app, build_state};
use sift_core::{Config, SledStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Store directory written by the indexer
    #[arg(long, env = "SIFT_STORE", default_value = "data/store")]
    store: PathBuf,
    /// JSON config file; missing keys use defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Token required in X-ADMIN-TOKEN for /index/* endpoints
    #[arg(long, env = "ADMIN_TOKEN")]
    admin_token: Option<String>,
    /// Comma-separated allowed origins; any origin when unset
    #[arg(long, env = "CORS_ALLOW_ORIGIN")]
    cors_allow_origin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };

    let store = Arc::new(SledStore::open(&args.store)?);
    let state = build_state(store, &config, args.admin_token.clone())?;
    let index = Arc::clone(&state.index);
    let app = build_app(state, args.cors_allow_origin.as_deref());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, store = %args.store.display(), "server listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("draining index before exit");
    tokio::task::spawn_blocking(move || index.close()).await??;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
