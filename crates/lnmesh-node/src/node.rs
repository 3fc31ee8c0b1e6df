//! Node lifecycle and public entry point.
//!
//! The [`Node`] owns all subsystems and exposes a channel-based API:
//!
//! ```text
//! Initializing ──start()──▶ Running ──shutdown()──▶ ShuttingDown
//! ```
//!
//! - `Initializing` — components created, event loop not started.
//! - `Running` — event loop active.
//! - `ShuttingDown` — exit signalled; await the `JoinHandle` from
//!   [`Node::start`] for completion.
//!
//! Double-start and shutdown-from-initializing are rejected with
//! [`LnMeshError::Config`].

use std::sync::Arc;

use libp2p::{Multiaddr, PeerId};
use lnmesh_ln::LnClient;
use lnmesh_network::config::MeshConfig;
use lnmesh_network::events::MeshEvent;
use lnmesh_network::swarm::MeshSwarm;
use lnmesh_types::settings::SettingsMap;
use lnmesh_types::{ClusterSecret, LnMeshError, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::command::{NodeCommand, NodeStatus};
use crate::event_loop;
use crate::state::ClusterState;

/// Bounded command channel capacity. Small — callers await
/// backpressure if the event loop is overloaded.
const COMMAND_CHANNEL_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// Lifecycle state of the node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Components created, event loop not started.
    Initializing,
    /// Event loop is active.
    Running,
    /// Graceful shutdown in progress.
    ShuttingDown,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeRuntime (internal)
// ---------------------------------------------------------------------------

/// Owned runtime moved into the event loop task.
pub(crate) struct NodeRuntime {
    pub swarm: MeshSwarm,
    pub mesh_rx: mpsc::UnboundedReceiver<MeshEvent>,
    pub ln: Arc<dyn LnClient>,
    pub state: ClusterState,
    pub command_rx: mpsc::Receiver<NodeCommand>,
    pub shutdown_rx: watch::Receiver<bool>,
    pub listen_addr: Multiaddr,
    pub dial_peers: Vec<Multiaddr>,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// lnmesh node — owns all subsystems and drives the event loop.
pub struct Node {
    state: NodeState,
    /// Components to be moved into the event loop. `None` after
    /// `start()`.
    runtime: Option<NodeRuntime>,
    command_tx: mpsc::Sender<NodeCommand>,
    shutdown_tx: watch::Sender<bool>,
}

impl Node {
    /// Creates a new node.
    ///
    /// Fetches the LN identity from the backend and joins the mesh
    /// rendezvous topic derived from `secret`. The event loop is not
    /// started until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// - [`LnMeshError::Config`] on invalid settings or mesh config.
    /// - [`LnMeshError::Collaborator`] if the LN backend is
    ///   unreachable.
    /// - [`LnMeshError::Transport`] if the swarm cannot be built.
    pub async fn new(
        ln: Arc<dyn LnClient>,
        secret: ClusterSecret,
        mesh_config: MeshConfig,
        settings: SettingsMap,
    ) -> Result<Self> {
        settings.validate()?;
        mesh_config.validate()?;

        let identity = ln.get_wallet_info().await?;
        tracing::info!(
            alias = %identity.alias,
            public_key = %identity.public_key,
            "LN identity obtained"
        );

        let (swarm, mesh_rx) = MeshSwarm::new(&mesh_config, secret)?;
        let local_peer: PeerId = *swarm.local_peer_id();
        tracing::info!(%local_peer, "mesh identity generated");

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runtime = NodeRuntime {
            swarm,
            mesh_rx,
            ln,
            state: ClusterState::new(settings, identity, local_peer),
            command_rx,
            shutdown_rx,
            listen_addr: mesh_config.listen_addr.clone(),
            dial_peers: mesh_config.dial_peers.clone(),
        };

        Ok(Self {
            state: NodeState::Initializing,
            runtime: Some(runtime),
            command_tx,
            shutdown_tx,
        })
    }

    /// Starts the event loop in a new tokio task.
    ///
    /// Transitions `Initializing → Running`. The returned handle
    /// resolves when the event loop exits.
    ///
    /// # Errors
    ///
    /// Returns [`LnMeshError::Config`] if the node is not in
    /// `Initializing` state.
    pub fn start(&mut self) -> Result<JoinHandle<()>> {
        if self.state != NodeState::Initializing {
            return Err(LnMeshError::Config {
                reason: format!(
                    "cannot start node in state '{}'; expected 'initializing'",
                    self.state
                ),
            });
        }

        let runtime = self.runtime.take().ok_or_else(|| LnMeshError::Config {
            reason: "runtime already consumed (double start?)".into(),
        })?;

        let handle = tokio::spawn(event_loop::run_event_loop(runtime));
        self.state = NodeState::Running;
        Ok(handle)
    }

    /// Initiates graceful shutdown. Idempotent once running.
    ///
    /// # Errors
    ///
    /// Returns [`LnMeshError::Config`] if the node was never started.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.state {
            NodeState::Initializing => Err(LnMeshError::Config {
                reason: "cannot shutdown a node that has not been started".into(),
            }),
            NodeState::ShuttingDown => Ok(()),
            NodeState::Running => {
                self.state = NodeState::ShuttingDown;
                let _ = self.shutdown_tx.send(true);
                Ok(())
            }
        }
    }

    /// Returns a cloneable sender for submitting commands.
    pub fn command_sender(&self) -> mpsc::Sender<NodeCommand> {
        self.command_tx.clone()
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }
}

// ---------------------------------------------------------------------------
// Status helper
// ---------------------------------------------------------------------------

/// Fetches a status snapshot from a running node.
///
/// # Errors
///
/// Returns [`LnMeshError::Transport`] if the event loop is gone.
pub async fn query_status(command_tx: &mpsc::Sender<NodeCommand>) -> Result<NodeStatus> {
    let (reply, response) = oneshot::channel();
    command_tx
        .send(NodeCommand::GetStatus { reply })
        .await
        .map_err(|_| LnMeshError::Transport {
            reason: "node event loop is not running".into(),
        })?;
    response.await.map_err(|_| LnMeshError::Transport {
        reason: "node event loop dropped the status request".into(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
