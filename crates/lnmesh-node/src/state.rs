//! Mutable cluster state owned by the event loop.
//!
//! Everything lives in one struct moved onto the event-loop task;
//! handlers get `&mut ClusterState` and run to completion, so no
//! field needs a lock. Outbound messages are staged in the outbox and
//! flushed to the swarm by the loop after each handler — handlers
//! never touch the transport directly, which is also what makes them
//! testable without sockets.

use libp2p::PeerId;
use lnmesh_ln::WalletInfo;
use lnmesh_protocol::message::PeerMessage;
use lnmesh_types::settings::SettingsMap;

use crate::audit::AuditLog;
use crate::bindings::OwnershipTable;
use crate::limiter::RebalanceBlocks;
use crate::peers::PeerDirectory;
use crate::registry::ChannelRegistry;

/// All mutable node state plus the staged outbound messages.
pub struct ClusterState {
    /// Per-alias / per-channel tuning.
    pub settings: SettingsMap,
    /// Local LN identity (pubkey, alias) from the backend.
    pub identity: WalletInfo,
    /// Local mesh identity.
    pub local_peer: PeerId,
    /// Active mesh sessions.
    pub peers: PeerDirectory,
    /// Cached channel view.
    pub registry: ChannelRegistry,
    /// Channel ownership records + watch list.
    pub bindings: OwnershipTable,
    /// Per-channel cooldown blocks.
    pub blocks: RebalanceBlocks,
    /// Append-only transaction log.
    pub audit: AuditLog,

    outbox: Vec<(PeerId, PeerMessage)>,
}

impl ClusterState {
    /// Creates fresh state for a node with the given identities.
    pub fn new(settings: SettingsMap, identity: WalletInfo, local_peer: PeerId) -> Self {
        Self {
            settings,
            identity,
            local_peer,
            peers: PeerDirectory::new(),
            registry: ChannelRegistry::new(),
            bindings: OwnershipTable::new(),
            blocks: RebalanceBlocks::new(),
            audit: AuditLog::new(),
            outbox: Vec::new(),
        }
    }

    /// Stages a message for delivery to a peer.
    pub fn push_outbound(&mut self, peer: PeerId, message: PeerMessage) {
        self.outbox.push((peer, message));
    }

    /// Drains the staged messages, oldest first.
    pub fn take_outbox(&mut self) -> Vec<(PeerId, PeerMessage)> {
        std::mem::take(&mut self.outbox)
    }

    /// Number of staged messages (tests).
    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }
}
