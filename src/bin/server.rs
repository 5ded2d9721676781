use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pagewise::api::{self, AppState};
use pagewise::config::{self, ServeCli};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    config::init_logging();
    let cli = ServeCli::parse();
    let backends = cli.model.connect().await?;
    let router = cli.router(&backends)?;
    let pipeline = cli.model.pipeline(&backends);
    tokio::fs::create_dir_all(&cli.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", cli.upload_dir.display()))?;

    let state = AppState {
        router: Arc::new(router),
        pipeline: Arc::new(pipeline),
        store: Arc::clone(&backends.store),
        upload_dir: cli.upload_dir.clone(),
    };
    let app = api::app(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, collection = %backends.collection, "pagewise-server listening");
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}
