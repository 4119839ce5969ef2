//! metergridd — the metergrid daemon.
//!
//! Serves the Prometheus exposition under `/metrics` and runs an
//! instrumented TCP echo listener as a live event source, so a fresh
//! checkout has something real to scrape:
//!
//! ```text
//! metergridd --listen 127.0.0.1:9090 --echo-listen 127.0.0.1:7777
//! metergridd --config metergrid.toml --trim-prefix acme_
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use metergrid_http::{router, Exporter, ExporterConfig};
use metergrid_net::MeteredStream;

#[derive(Parser)]
#[command(name = "metergridd", about = "metergrid daemon")]
struct Cli {
    /// Address for the scrape endpoint.
    #[arg(long, default_value = "127.0.0.1:9090")]
    listen: String,

    /// Address for the instrumented TCP echo listener.
    #[arg(long, default_value = "127.0.0.1:7777")]
    echo_listen: String,

    /// Optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Eviction retention window, e.g. "2m" or "90s" (overrides the
    /// config file).
    #[arg(long)]
    metric_timeout: Option<String>,

    /// Namespace prefix trimmed at emission (overrides the config
    /// file).
    #[arg(long)]
    trim_prefix: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,metergridd=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ExporterConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ExporterConfig::default(),
    };
    if let Some(raw) = &cli.metric_timeout {
        config = metergrid_http::config::RawConfig {
            metric_timeout: Some(raw.clone()),
            ..Default::default()
        }
        .overlay(config);
    }
    if let Some(prefix) = cli.trim_prefix {
        config.trim_prefix = prefix;
    }

    let exporter = Arc::new(Exporter::new(config));

    let echo = TcpListener::bind(&cli.echo_listen)
        .await
        .with_context(|| format!("binding echo listener on {}", cli.echo_listen))?;
    info!(addr = %cli.echo_listen, "echo listener ready");
    tokio::spawn(run_echo(echo, exporter.clone()));

    let listener = TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("binding scrape endpoint on {}", cli.listen))?;
    info!(addr = %cli.listen, "serving /metrics");

    axum::serve(listener, router(exporter))
        .await
        .context("scrape endpoint failed")
}

/// Accept loop for the echo listener. Every connection is wrapped in
/// a metered stream, so reads, writes, opens, closes, and errors all
/// land in the store.
async fn run_echo(listener: TcpListener, exporter: Arc<Exporter>) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!(%error, "echo accept failed");
                continue;
            }
        };
        debug!(%peer, "echo connection opened");

        let exporter = exporter.clone();
        tokio::spawn(async move {
            let mut stream = MeteredStream::new(socket, exporter, "tcp");
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if stream.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = stream.shutdown().await;
            debug!(%peer, "echo connection closed");
        });
    }
}
