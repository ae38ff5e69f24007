//! relaycored: binary entry point. Bootstraps config, storage, and the
//! combined HTTP/WebSocket listener from the `relaycore` library.

use std::path::Path;
use std::time::Duration;

use tracing::{error, info};

use relaycore::cache::Cache;
use relaycore::config::Config;
use relaycore::db::Database;
use relaycore::engine::run_presence_sweep;
use relaycore::handlers;
use relaycore::http;
use relaycore::metrics;
use relaycore::presence::PresenceService;
use relaycore::pubsub::PubSub;
use relaycore::security::{RateLimiter, TokenVerifier};
use relaycore::state::AppState;

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {flag}");
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: failed to load config from {config_path}: {e}");
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.server.log_format {
        relaycore::config::LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).json().init();
        }
        relaycore::config::LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true).init();
        }
    }

    if let Err(errors) = relaycore::config::validate(&config) {
        for err in &errors {
            error!(error = %err, "configuration validation failed");
        }
        return Err(anyhow::anyhow!("configuration validation failed with {} error(s)", errors.len()));
    }

    info!(bind = %config.server.bind_address, "starting relaycore");

    let db = Database::connect(&config.store.url).await?;
    let cache = Cache::connect(&config.cache.url).await?;
    let pubsub = PubSub::connect(&config.pubsub.url).await?;

    let presence_client = redis::Client::open(config.cache.url.as_str())?;
    let presence_conn = presence_client.get_connection_manager().await?;
    let presence = PresenceService::new(presence_conn, config.presence.ttl_secs);

    let rate_limit_client = redis::Client::open(config.cache.url.as_str())?;
    let rate_limit_conn = rate_limit_client.get_connection_manager().await?;
    let rate_limiter = RateLimiter::new(rate_limit_conn, config.rate_limit.clone());

    let tokens = TokenVerifier::new(
        &config.tokens.access_secret,
        &config.tokens.refresh_secret,
        config.tokens.access_ttl_secs,
        config.tokens.refresh_ttl_secs,
    );

    let state = AppState::new(db, cache, pubsub, presence, rate_limiter, tokens, config.clone());

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => info!("received SIGINT, initiating graceful shutdown"),
                _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
            }
            let _ = shutdown_tx.send(());
        });
    }

    {
        let presence_engine = state.engines.presence.clone();
        let online_users = state.online_users.clone();
        let interval = Duration::from_secs(config.presence.heartbeat_interval_secs.max(1));
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(run_presence_sweep(presence_engine, online_users, interval, shutdown_rx));
    }
    info!("presence sweep task started");

    if config.server.metrics_port == 0 {
        info!("metrics disabled");
    } else {
        metrics::init();
        let metrics_port = config.server.metrics_port;
        tokio::spawn(async move { http::run_metrics_server(metrics_port).await });
        info!(port = metrics_port, "prometheus http server started");
    }

    let app = handlers::rest::router().merge(handlers::ws::router()).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!(addr = %config.server.bind_address, "gateway listening");

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("gateway shutting down");
        })
        .await?;

    tokio::time::sleep(Duration::from_secs(config.limits.shutdown_grace_secs)).await;

    info!("gateway stopped");
    Ok(())
}
