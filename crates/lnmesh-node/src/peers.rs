//! Per-session peer directory.
//!
//! One entry per active mesh session, keyed by the remote `PeerId`.
//! A session starts bare (mesh join observed) and becomes *greeted*
//! once a valid `hello` supplies the peer's LN identity. Re-joining
//! with the same `PeerId` replaces the old entry — last-writer-wins
//! avoids duplicate sessions after reconnects.

use libp2p::PeerId;
use lnmesh_types::{LnPublicKey, Timestamp};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// PeerSession
// ---------------------------------------------------------------------------

/// State of one mesh session.
#[derive(Clone, Debug)]
pub struct PeerSession {
    /// LN public key from the peer's `hello`; `None` until greeted.
    pub ln_public_key: Option<LnPublicKey>,
    /// Node alias from the peer's `hello`.
    pub alias: Option<String>,
    /// When the last verified message arrived.
    pub last_seen: Timestamp,
}

impl PeerSession {
    /// Whether a valid `hello` has been processed for this session.
    pub fn is_greeted(&self) -> bool {
        self.ln_public_key.is_some()
    }
}

// ---------------------------------------------------------------------------
// PeerDirectory
// ---------------------------------------------------------------------------

/// All active mesh sessions.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    sessions: HashMap<PeerId, PeerSession>,
}

impl PeerDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session for a freshly joined peer. An existing
    /// session under the same id is replaced.
    pub fn insert(&mut self, peer: PeerId, now: Timestamp) {
        let replaced = self
            .sessions
            .insert(
                peer,
                PeerSession {
                    ln_public_key: None,
                    alias: None,
                    last_seen: now,
                },
            )
            .is_some();
        if replaced {
            tracing::debug!(%peer, "replaced existing session (reconnect)");
        }
    }

    /// Marks a session greeted with the identity from its `hello`.
    ///
    /// A `hello` from a peer with no session (possible if join and
    /// greeting race across the event channel) creates the session.
    pub fn greet(&mut self, peer: PeerId, ln_public_key: LnPublicKey, alias: String, now: Timestamp) {
        let session = self.sessions.entry(peer).or_insert(PeerSession {
            ln_public_key: None,
            alias: None,
            last_seen: now,
        });
        session.ln_public_key = Some(ln_public_key);
        session.alias = Some(alias);
        session.last_seen = now;
    }

    /// Records message arrival time for a session.
    pub fn touch(&mut self, peer: &PeerId, now: Timestamp) {
        if let Some(session) = self.sessions.get_mut(peer) {
            session.last_seen = now;
        }
    }

    /// Removes a session. Returns the removed entry, if any.
    pub fn remove(&mut self, peer: &PeerId) -> Option<PeerSession> {
        self.sessions.remove(peer)
    }

    /// Looks up a session.
    pub fn get(&self, peer: &PeerId) -> Option<&PeerSession> {
        self.sessions.get(peer)
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of greeted sessions.
    pub fn greeted_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_greeted()).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
