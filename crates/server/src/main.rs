//! chunkyard server binary.

use anyhow::{Context, Result};
use chunkyard_core::config::AppConfig;
use chunkyard_server::reaper::{Reaper, spawn_reaper_task};
use chunkyard_server::{AppState, create_router};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// chunkyard - resumable chunked file upload server
#[derive(Parser, Debug)]
#[command(name = "chunkyardd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CHUNKYARD_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from the optional file, overridden by `CHUNKYARD_*`
/// environment variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CHUNKYARD_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("chunkyard v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    if config.server.metrics_enabled {
        chunkyard_server::metrics::register_metrics();
        tracing::info!("Prometheus metrics registered");
    }

    let store = chunkyard_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    store
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(
        chunk_dir = %config.storage.chunk_dir.display(),
        output_dir = %config.storage.output_dir.display(),
        "Storage areas ready"
    );

    let state = AppState::new(config.clone(), store);

    if config.reaper.enabled {
        let reaper = Reaper::new(
            state.registry.clone(),
            state.store.clone(),
            config.reaper.session_ttl(),
        );
        spawn_reaper_task(reaper, config.reaper.interval());
        tracing::info!(
            session_ttl_secs = config.reaper.session_ttl_secs,
            interval_secs = config.reaper.interval_secs,
            "Reaper task spawned"
        );
    } else {
        tracing::info!("Reaper disabled, abandoned uploads are kept until completed");
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_without_file() {
        figment::Jail::expect_with(|_jail| {
            let config = load_config("does-not-exist.toml").expect("defaults load");
            assert_eq!(config.server.bind, "127.0.0.1:8080");
            assert!(!config.reaper.enabled);
            Ok(())
        });
    }

    #[test]
    fn load_config_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "server.toml",
                r#"
                [server]
                bind = "0.0.0.0:9000"

                [reaper]
                enabled = true
                "#,
            )?;
            jail.set_env("CHUNKYARD_REAPER__SESSION_TTL_SECS", "60");

            let config = load_config("server.toml").expect("config loads");
            assert_eq!(config.server.bind, "0.0.0.0:9000");
            assert!(config.reaper.enabled);
            assert_eq!(config.reaper.session_ttl_secs, 60);
            Ok(())
        });
    }

    #[test]
    fn load_config_rejects_overlapping_storage() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CHUNKYARD_STORAGE__CHUNK_DIR", "data/uploads/chunks");
            jail.set_env("CHUNKYARD_STORAGE__OUTPUT_DIR", "data/uploads");

            assert!(load_config("missing.toml").is_err());
            Ok(())
        });
    }
}
