//! Channel-to-peer ownership records and the watch list.
//!
//! An ownership record says "the far side of channel C is operated by
//! mesh peer P". Records are created when a greeting reveals a shared
//! channel and destroyed when the peer disconnects or the channel
//! disappears from the view. At most one record exists per channel;
//! a later greeting claiming the same channel replaces the earlier
//! binding (last-writer-wins).
//!
//! The watch list is the set of channels the monitor polls. It is
//! maintained here because its membership follows the ownership
//! records exactly: watch on bind, unwatch on unbind.

use std::collections::HashMap;

use libp2p::PeerId;
use lnmesh_types::{ChannelId, LnPublicKey};

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// The owner of the far side of one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// Mesh identity of the owning peer.
    pub peer: PeerId,
    /// LN public key the peer advertised in its greeting.
    pub ln_public_key: LnPublicKey,
}

// ---------------------------------------------------------------------------
// OwnershipTable
// ---------------------------------------------------------------------------

/// Ownership records plus the derived watch list.
#[derive(Debug, Default)]
pub struct OwnershipTable {
    bindings: HashMap<ChannelId, Binding>,
}

impl OwnershipTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a channel to a peer, watching it. Returns the replaced
    /// binding if the channel was already bound elsewhere.
    pub fn bind(
        &mut self,
        channel: ChannelId,
        peer: PeerId,
        ln_public_key: LnPublicKey,
    ) -> Option<Binding> {
        let new = Binding {
            peer,
            ln_public_key,
        };
        let old = self.bindings.insert(channel.clone(), new);
        if let Some(ref previous) = old {
            if previous.peer != peer {
                tracing::warn!(
                    %channel,
                    old_peer = %previous.peer,
                    new_peer = %peer,
                    "channel rebound to a different mesh peer (last writer wins)"
                );
            }
        }
        old
    }

    /// Removes the binding for one channel (e.g. it vanished from the
    /// channel view), unwatching it.
    pub fn unbind(&mut self, channel: &ChannelId) -> Option<Binding> {
        self.bindings.remove(channel)
    }

    /// Removes every binding owned by `peer`, returning the channels
    /// that were unwatched.
    pub fn remove_peer(&mut self, peer: &PeerId) -> Vec<ChannelId> {
        let removed: Vec<ChannelId> = self
            .bindings
            .iter()
            .filter(|(_, binding)| &binding.peer == peer)
            .map(|(channel, _)| channel.clone())
            .collect();
        for channel in &removed {
            self.bindings.remove(channel);
        }
        removed
    }

    /// The owner of a channel, if bound.
    pub fn owner(&self, channel: &ChannelId) -> Option<&Binding> {
        self.bindings.get(channel)
    }

    /// Whether the channel is on the watch list.
    pub fn is_watched(&self, channel: &ChannelId) -> bool {
        self.bindings.contains_key(channel)
    }

    /// The watch list: every currently bound channel.
    pub fn watched(&self) -> Vec<ChannelId> {
        self.bindings.keys().cloned().collect()
    }

    /// Number of watched channels.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether nothing is watched.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
