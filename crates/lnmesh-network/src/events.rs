//! Mesh events emitted to the node core.
//!
//! All libp2p-specific events are mapped into [`MeshEvent`] before
//! delivery, so the node core never couples to swarm internals.
//! `MessageReceived` is only emitted for envelopes that passed
//! signature and freshness verification.

use libp2p::PeerId;
use lnmesh_protocol::message::PeerMessage;

/// Events emitted by the mesh layer.
#[derive(Clone, Debug)]
pub enum MeshEvent {
    /// A peer subscribed to the rendezvous topic: it holds the
    /// cluster secret (or at least knows the topic) and a session now
    /// exists for it.
    PeerJoined(PeerId),

    /// The session to a peer is gone — socket closed, or the peer
    /// left the topic.
    PeerLeft(PeerId),

    /// A verified message arrived from a session peer.
    MessageReceived {
        /// Stable mesh identity of the sender.
        peer: PeerId,
        /// The authenticated payload.
        message: PeerMessage,
    },

    /// An outbound envelope could not be delivered.
    SendFailed {
        /// The peer the envelope was addressed to.
        peer: PeerId,
    },
}
