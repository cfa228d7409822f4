//! # Kasa API Server
//!
//! ```text
//! kasa-api [--config <path>]
//! ```
//!
//! Configuration comes from the file (explicit, `$KASA_CONFIG`, or the
//! platform config dir) and is then overridden by environment variables.
//! Logging honours `RUST_LOG`.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use kasa_api_server::auth::JwtManager;
use kasa_api_server::config::{LogFormat, ServerConfig};
use kasa_api_server::{open_store, router, AppState};
use kasa_engine::Engine;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load(config_path_arg()).context("Failed to load configuration")?;
    init_tracing(config.logging.format);

    info!(
        backend = %config.store.backend,
        port = config.server.port,
        "Starting Kasa API server..."
    );

    let store = open_store(&config.store).await?;
    let engine = Engine::new(store);

    let seeded = engine
        .auth
        .ensure_default_users()
        .await
        .context("Failed to seed default users")?;
    if seeded > 0 {
        info!(count = seeded, "Seeded default users");
    }

    let jwt = JwtManager::new(config.auth.jwt_secret.clone(), config.auth.token_lifetime_secs);
    let app = router(AppState::new(engine, jwt));

    let bind_addr = config.server.bind_address();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!(addr = %bind_addr, "Listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn config_path_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
