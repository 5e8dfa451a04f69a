//! Captain's log server binary.
//!
//! Loads configuration, sets up structured logging, opens and migrates the
//! database, then serves MCP over HTTP (with graceful shutdown on
//! SIGTERM/SIGINT) or over stdio.

use captains_log::Journal;
use captains_server::config::{self, Config, Transport};
use captains_server::{app, stdio, AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("CAPTAINS_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

/// Installs the global subscriber. Under the stdio transport stdout carries
/// protocol frames, so logs go to stderr.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match (config.logging.json, config.server.transport) {
        (true, _) => builder.json().init(),
        (false, Transport::Stdio) => builder.with_ansi(false).init(),
        (false, Transport::Http) => builder.init(),
    }
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the server cannot start without valid config");

    init_tracing(&config);

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let pool = captains_db::open_database(&config.database.path, config.database.runtime_settings())
        .expect("failed to open database; check database.path in config");

    let journal = Journal::new(pool);
    let state = AppState::new(journal);

    match config.server.transport {
        Transport::Stdio => {
            stdio::run_stdio(state.mcp)
                .await
                .expect("stdio transport failed");
        }
        Transport::Http => serve_http(&config, state).await,
    }
}

async fn serve_http(config: &Config, state: AppState) {
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting captain's log server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("captain's log server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
