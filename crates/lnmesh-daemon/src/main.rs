//! lnmesh daemon — headless cluster rebalancing node.
//!
//! Usage:
//!
//!   lnmesh-daemon [OPTIONS]
//!
//! Options:
//!
//!   --config <PATH>       Load settings from a JSON config file
//!   --secret <SECRET>     Cluster secret (or LNMESH_CLUSTER_SECRET)
//!   --listen <MULTIADDR>  Mesh listen address
//!   --dial <MULTIADDR>    Dial a cluster member on startup (repeatable)
//!   --no-mdns             Disable mDNS local discovery
//!   --dev-backend         Use the in-memory dev Lightning backend
//!
//! The daemon runs until interrupted with Ctrl+C.

use std::sync::Arc;

use lnmesh_ln::mock::MockLnClient;
use lnmesh_ln::LnClient;
use lnmesh_node::node::{query_status, Node};
use lnmesh_types::{LnMeshError, LnPublicKey};

mod config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = match config::CliArgs::parse(std::env::args()) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let file = match &cli.config_path {
        Some(path) => match config::DaemonConfigFile::load(path) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => config::DaemonConfigFile::default(),
    };

    let daemon_config = match config::DaemonConfig::resolve(file, &cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_daemon(daemon_config).await {
        tracing::error!("daemon error: {e}");
        std::process::exit(1);
    }
}

async fn run_daemon(cfg: config::DaemonConfig) -> Result<(), LnMeshError> {
    // -----------------------------------------------------------------------
    // 1. Lightning backend
    // -----------------------------------------------------------------------

    let ln: Arc<dyn LnClient> = if cfg.dev_backend {
        tracing::warn!("using the in-memory dev backend: no real payments will be made");
        // Deterministic throwaway identity derived from the alias so
        // two dev nodes get distinct keys.
        let mut key_byte = 0x02u8;
        for b in cfg.alias.bytes() {
            key_byte = key_byte.wrapping_add(b);
        }
        let public_key = LnPublicKey::new(format!("{key_byte:02x}").repeat(33));
        Arc::new(MockLnClient::new(public_key, cfg.alias.clone()))
    } else {
        return Err(LnMeshError::Config {
            reason: "no Lightning backend configured; \
                     run with --dev-backend or wire an LnClient implementation"
                .into(),
        });
    };

    // -----------------------------------------------------------------------
    // 2. Node
    // -----------------------------------------------------------------------

    let mut node = Node::new(ln, cfg.secret, cfg.mesh, cfg.settings).await?;
    let command_tx = node.command_sender();
    let mut node_handle = node.start()?;

    tracing::info!("node started");

    let status = query_status(&command_tx).await?;
    println!();
    println!("============================================================");
    println!("  lnmesh daemon running");
    println!("============================================================");
    println!("  Alias:      {}", status.alias);
    println!("  LN key:     {}", status.ln_public_key);
    println!("  Mesh id:    {}", status.mesh_peer_id);
    println!("============================================================");
    println!("  Press Ctrl+C to stop");
    println!("============================================================");
    println!();

    // -----------------------------------------------------------------------
    // 3. Wait for shutdown
    // -----------------------------------------------------------------------

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C, shutting down...");
                break;
            }
            result = &mut node_handle => {
                match result {
                    Ok(()) => tracing::error!("node event loop exited unexpectedly"),
                    Err(e) => tracing::error!(%e, "node event loop panicked"),
                }
                return Err(LnMeshError::Transport {
                    reason: "node event loop stopped unexpectedly".into(),
                });
            }
        }
    }

    node.shutdown()?;
    node_handle.await.map_err(|e| LnMeshError::Transport {
        reason: format!("event loop join failed: {e}"),
    })?;

    tracing::info!("daemon stopped");
    Ok(())
}
