use anyhow::{Context, Result};
use bookfeed::artifact::ArtifactStore;
use bookfeed::config::{Config, PORT_ENV};
use bookfeed::feed::{FeedMeta, FeedRenderer};
use bookfeed::refresh::RefreshLoop;
use bookfeed::server::FeedServer;
use bookfeed::source::SourceClient;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bookfeed",
    about = "Republish the newest e-books from the catalog API as an Atom feed"
)]
struct Args {
    /// Configuration file (optional; defaults apply when missing)
    #[arg(long, value_name = "FILE", default_value = "bookfeed.toml")]
    config: PathBuf,

    /// Listening port (overrides the config file and PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Run a single refresh cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Feed creation time: fixed for the life of the process
    let created_at = Utc::now();
    let args = Args::parse();

    // Live before the config is read so its warnings are not lost
    let logging = bookfeed::logging::init()?;

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    config.apply_port_override(std::env::var(PORT_ENV).ok().as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;

    logging.attach_file(&config.log_file)?;
    tracing::info!(
        config = %args.config.display(),
        upstream = %config.upstream_url,
        artifact = %config.artifact_path.display(),
        "Starting bookfeed"
    );

    let source = SourceClient::new(
        config.upstream_url.clone(),
        config.page_size,
        config.request_timeout(),
    )
    .context("Failed to create HTTP client")?;
    let renderer = FeedRenderer::new(FeedMeta::from_config(&config));
    let store = ArtifactStore::new(config.artifact_path.clone());
    let refresh = RefreshLoop::new(
        source,
        renderer,
        store.clone(),
        config.refresh_interval(),
        created_at,
    );

    if args.once {
        let report = refresh.run_cycle().await.context("Refresh failed")?;
        println!(
            "Published {} entries ({} skipped) to {}",
            report.entries,
            report.skipped,
            store.path().display()
        );
        return Ok(());
    }

    let server = FeedServer::bind(
        config.listen_addr()?,
        config.feed_route(),
        store,
        config.shutdown_grace(),
    )?;
    let shutdown = server.shutdown_handle();

    let refresh_task = tokio::spawn(refresh.run());
    let server_task = tokio::task::spawn_blocking(move || server.run());

    shutdown_signal().await;
    shutdown.shutdown();
    server_task.await.context("Feed server thread panicked")?;

    // The refresh loop does not get to finish its cycle
    refresh_task.abort();
    tracing::info!("Server exiting");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
