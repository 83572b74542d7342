use anyhow::{Context, Result};
use clap::Parser;
use facekitd::config::Config;
use facekitd::engine::{spawn_engine, Capabilities};
use facekitd::staging::Staging;
use facekitd::AppState;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    tracing::info!(?config, "facekitd starting");

    let staging = Staging::create(&config.upload_dir, &config.result_dir)
        .await
        .context("failed to prepare upload/result directories")?;

    let capabilities = Capabilities::load(&config).context("failed to load models")?;
    let engine = spawn_engine(capabilities)?;

    let app = facekitd::router(AppState { staging, engine }, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "facekitd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facekitd stopped");
    Ok(())
}
