//! AI Security Analyst Assistant server
//! JWT-protected analysis API backed by a text-generation model

use anyhow::{Context, Result};
use clap::{Arg, Command};
use security_analyst::config::Config;
use security_analyst::database::DatabaseManager;
use security_analyst::handlers::{create_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let matches = Command::new("analyst-server")
        .version(env!("CARGO_PKG_VERSION"))
        .author("SIEM Team")
        .about("AI security analyst assistant API")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Optional TOML configuration file; environment variables override it"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Server host"),
        )
        .arg(
            Arg::new("validate-config")
                .long("validate-config")
                .help("Validate configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("init-db")
                .long("init-db")
                .help("Create the SQLite schema and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            Config::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path))?
        }
        None => Config::from_env().context("Failed to load configuration from environment")?,
    };

    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }

    if let Some(host) = matches.get_one::<String>("host") {
        config.server.host = host.clone();
    }

    config.validate().context("Configuration validation failed")?;

    if matches.get_flag("validate-config") {
        info!("Configuration is valid");
        return Ok(());
    }

    let config = Arc::new(config);

    let db = DatabaseManager::connect(&config.database)
        .await
        .context("Failed to open SQLite database")?;

    if matches.get_flag("init-db") {
        db.init_schema().await.context("Failed to create schema")?;
        info!("Schema initialized at {}", config.database.path.display());
        return Ok(());
    }

    if let Err(e) = db.init_schema().await {
        warn!("Database bootstrap failed, continuing: {}", e);
    }

    let state = AppState::from_config(config.clone(), db);
    let app = create_router(state);

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid server host")?,
        config.server.port,
    );

    print_config_summary(&config);
    info!("Starting AI Security Analyst Assistant on {}", addr);
    info!("Health Check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "security_analyst=info,analyst_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn print_config_summary(config: &Config) {
    info!("=== Configuration Summary ===");
    info!("Server: {}:{}", config.server.host, config.server.port);
    info!("Environment: {:?}", config.server.environment);
    info!("Database: {}", config.database.path.display());
    info!("Prompt: {}", config.prompt.path.display());
    info!("Model: {}", config.generation.model);
    info!("Backend: {}", config.generation.base_url);
    info!("API key present: {}", config.generation.has_api_key());
    info!(
        "Token lifetimes: access {}m, refresh {}m",
        config.security.access_token_minutes, config.security.refresh_token_minutes
    );
    info!(
        "Default JWT secret in use: {}",
        config.security.uses_default_secret()
    );
    info!("================================");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
