//! Rendezvous topic derivation.
//!
//! The topic is `SHA-256(secret)`, hex encoded. Every cluster member
//! derives the same topic independently; nobody without the secret
//! can even name it.

use libp2p::gossipsub::IdentTopic;
use lnmesh_types::ClusterSecret;
use sha2::{Digest, Sha256};

/// Derives the 32-byte rendezvous topic hash from the cluster secret.
pub fn topic_hash(secret: &ClusterSecret) -> [u8; 32] {
    let digest = Sha256::digest(secret.as_bytes());
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

/// The gossipsub topic for a cluster: lowercase hex of the topic hash.
pub fn rendezvous_topic(secret: &ClusterSecret) -> IdentTopic {
    IdentTopic::new(hex::encode(topic_hash(secret)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
