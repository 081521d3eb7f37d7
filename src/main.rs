//! corvusd - Corvus IRC daemon.
//!
//! A TS6-style IRC server with IRCv3 capabilities, SASL, server linking
//! and in-process services.

mod admin;
mod broker;
mod config;
mod db;
mod error;
mod handlers;
mod network;
mod s2s;
mod security;
mod services;
mod state;

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use crate::config::Config;
use crate::db::Database;
use crate::handlers::{Extensions, Registry};
use crate::network::Gateway;
use crate::state::{Network, network::NetworkParams};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path; falls back
/// to `config.toml`.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    // Canonicalize to avoid relying on the working directory at REHASH.
    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();
    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: Failed to load config from {}: {}", config_path, e);
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.server.log_format {
        config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    if let Err(errors) = config::validate(&config) {
        for err in &errors {
            error!(error = %err, "Configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    info!(
        server = %config.server.name,
        network = %config.server.network,
        sid = %config.server.sid,
        "Starting corvusd"
    );

    // Database and the persisted state we warm caches from.
    let db_path = config
        .database
        .as_ref()
        .map(|d| d.path.clone())
        .unwrap_or_else(|| "corvusd.db".to_string());
    let db = Database::new(&db_path).await?;

    let registered_channels: Vec<String> = db
        .channels()
        .all()
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load registered channels");
            Vec::new()
        })
        .into_iter()
        .map(|r| r.name)
        .collect();
    info!(count = registered_channels.len(), "Loaded registered channels");

    let initial_bans = db.bans().get_active().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load server bans");
        Vec::new()
    });
    info!(count = initial_bans.len(), "Loaded active server bans");

    // Disconnect worker: fan-out paths request disconnects without
    // blocking; this queue performs them.
    let (disconnect_tx, mut disconnect_rx) =
        tokio::sync::mpsc::channel::<(state::Uid, String)>(1024);

    let network = Arc::new(Network::new(NetworkParams {
        config: config.clone(),
        config_path,
        db: db.clone(),
        registered_channels,
        initial_bans,
        disconnect_tx,
        extensions: Extensions::default(),
    }));
    info!("Network state initialized");

    // Signal handler for graceful shutdown.
    {
        let shutdown_tx = network.shutdown.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT - shutting down"),
                _ = sigterm.recv() => info!("Received SIGTERM - shutting down"),
            }
            let _ = shutdown_tx.send(());
        });
    }

    // Disconnect worker task.
    {
        let network = Arc::clone(&network);
        tokio::spawn(async move {
            while let Some((uid, reason)) = disconnect_rx.recv().await {
                network.disconnect_user(&uid, &reason).await;
            }
        });
    }

    // Ban cache GC: expired entries are ignored at match time and
    // collected here.
    {
        let network = Arc::clone(&network);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            let mut shutdown_rx = network.shutdown.subscribe();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = network.bans.prune_expired();
                        if removed > 0 {
                            info!(removed = removed, "Expired bans pruned");
                        }
                        if let Err(e) = network.db.bans().prune_expired().await {
                            tracing::warn!(error = %e, "Ban repository prune failed");
                        }
                        network.throttle.cleanup();
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    // WHOWAS pruning (weekly retention).
    {
        let network = Arc::clone(&network);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
            let mut shutdown_rx = network.shutdown.subscribe();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        network.whowas.prune(7 * 86400);
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    // Message history retention (30 days).
    {
        let network = Arc::clone(&network);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(86400));
            let mut shutdown_rx = network.shutdown.subscribe();
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let cutoff = chrono::Utc::now().timestamp() - 30 * 86400;
                        match network.db.messages().prune_before(cutoff).await {
                            Ok(removed) if removed > 0 => {
                                info!(removed = removed, "Old messages pruned from history");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!(error = %e, "History prune failed");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    let registry = Arc::new(Registry::new());

    // S2S: inbound listener and autoconnect links.
    if let Some(s2s_addr) = config.listen.s2s_addr {
        s2s::link::start_inbound_listener(Arc::clone(&network), s2s_addr);
    }
    for block in &config.link {
        if block.autoconnect {
            s2s::link::connect_to_peer(Arc::clone(&network), block.clone());
        }
    }

    let gateway = Gateway::bind(
        config.listen,
        config.tls.clone(),
        Arc::clone(&network),
        registry,
    )
    .await?;
    gateway.run().await?;

    info!("Gateway stopped, waiting for tasks to finish...");
    tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
    Ok(())
}
