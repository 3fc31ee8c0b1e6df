//! Cached view of the local node's channels.
//!
//! The registry is a cache, not a store: every refresh replaces the
//! snapshot whole, and no entity survives a refresh by identity.
//! Because every `LnClient` call is a suspension point, callers must
//! re-query after their own `await` instead of holding a `Channel`
//! across it.

use std::collections::HashMap;

use lnmesh_ln::{Channel, LnClient};
use lnmesh_types::{ChannelId, LnPublicKey, Result};

/// Snapshot of the channel list, indexed for the two lookups the node
/// performs: by channel id, and by partner LN pubkey.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    by_id: HashMap<ChannelId, usize>,
}

impl ChannelRegistry {
    /// Creates an empty registry; call [`refresh`](Self::refresh)
    /// before first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cached view with a fresh snapshot from the
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns [`lnmesh_types::LnMeshError::Collaborator`] if the
    /// backend call fails; the previous snapshot is kept in that case.
    pub async fn refresh(&mut self, ln: &dyn LnClient) -> Result<()> {
        let channels = ln.get_channels().await?;
        self.replace(channels);
        Ok(())
    }

    /// Replaces the snapshot directly (test seam; `refresh` is the
    /// production path).
    pub fn replace(&mut self, channels: Vec<Channel>) {
        let mut by_id = HashMap::with_capacity(channels.len());
        for (index, channel) in channels.iter().enumerate() {
            let previous = by_id.insert(channel.id.clone(), index);
            if previous.is_some() {
                tracing::warn!(channel = %channel.id, "backend reported duplicate channel id");
            }
        }
        self.channels = channels;
        self.by_id = by_id;
    }

    /// Looks up a channel by id in the current snapshot.
    pub fn channel(&self, id: &ChannelId) -> Option<&Channel> {
        self.by_id.get(id).map(|&index| &self.channels[index])
    }

    /// All channels whose far end is `partner`.
    pub fn channels_with_partner(&self, partner: &LnPublicKey) -> Vec<&Channel> {
        self.channels
            .iter()
            .filter(|c| &c.partner_public_key == partner)
            .collect()
    }

    /// Number of channels in the current snapshot.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
