//! Commands into the node event loop.

use lnmesh_types::ChannelId;
use tokio::sync::oneshot;

/// Commands accepted by the running node.
#[derive(Debug)]
pub enum NodeCommand {
    /// Request a status snapshot.
    GetStatus {
        /// Reply channel; dropped receivers are ignored.
        reply: oneshot::Sender<NodeStatus>,
    },
    /// Stop the event loop gracefully.
    Shutdown,
}

/// Point-in-time snapshot of the node, for operators and tests.
#[derive(Clone, Debug)]
pub struct NodeStatus {
    /// Local LN alias.
    pub alias: String,
    /// Local LN public key (hex).
    pub ln_public_key: String,
    /// Local mesh peer id.
    pub mesh_peer_id: String,
    /// Active mesh sessions.
    pub peer_count: usize,
    /// Sessions that completed a greeting.
    pub greeted_count: usize,
    /// Channels currently watched.
    pub watched_channels: Vec<ChannelId>,
    /// Channels with a cooldown block entry.
    pub active_blocks: usize,
    /// Total audit entries recorded.
    pub audit_entries: usize,
}
