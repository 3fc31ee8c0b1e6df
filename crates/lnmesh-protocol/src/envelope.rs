//! Signed envelope: signing, verification, freshness.
//!
//! Every byte that crosses the mesh is a [`SignedEnvelope`]:
//!
//! ```json
//! { "message": { ... }, "timestamp": 1700000000000, "signature": "<hex>" }
//! ```
//!
//! The signature is HMAC-SHA256 keyed by the cluster secret, over
//! `timestamp_be || sender_mesh_id || canonical(message)`. The sender
//! identity is taken from the transport session, never from the
//! payload, so a valid tag proves both secret possession and origin.
//!
//! Verification is silent on the wire: a failed envelope is logged
//! locally and dropped, the sender learns nothing.

use hmac::{Hmac, Mac};
use lnmesh_types::{ClusterSecret, LnMeshError, Result, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::canonical::to_canonical_json;
use crate::message::PeerMessage;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum accepted distance between the envelope timestamp and the
/// local clock, in either direction. Clocks in a cluster may drift
/// both ways, so the window is symmetric.
pub const FRESHNESS_WINDOW_MS: u64 = 5_000;

// ---------------------------------------------------------------------------
// SignedEnvelope
// ---------------------------------------------------------------------------

/// The outer wire record.
///
/// `message` is kept as a raw JSON value: verification must compute
/// the canonical bytes of exactly what was received, not of a
/// re-serialized struct.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// The application payload.
    pub message: Value,
    /// Sender clock, milliseconds since epoch.
    pub timestamp: Timestamp,
    /// Hex HMAC-SHA256 tag.
    pub signature: String,
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Signs a [`PeerMessage`] into a [`SignedEnvelope`].
///
/// `sender` is the byte form of the local mesh identity (the peer id
/// the remote side observes on the transport session).
///
/// # Errors
///
/// Returns [`LnMeshError::Protocol`] if serialization fails.
pub fn sign_envelope(
    secret: &ClusterSecret,
    sender: &[u8],
    message: &PeerMessage,
    timestamp: Timestamp,
) -> Result<SignedEnvelope> {
    let value = serde_json::to_value(message).map_err(|e| LnMeshError::Protocol {
        reason: format!("failed to serialize peer message: {e}"),
    })?;
    let canonical = to_canonical_json(&value)?;
    let tag = compute_tag(secret, sender, timestamp, &canonical)?;

    Ok(SignedEnvelope {
        message: value,
        timestamp,
        signature: hex::encode(tag),
    })
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verifies a [`SignedEnvelope`] and returns the decoded payload.
///
/// # Checks, in order
///
/// 1. Recompute the tag with the *sender's* mesh identity and the
///    received timestamp; constant-time compare.
/// 2. Reject if `|now − timestamp| > 5 s`.
/// 3. Decode the payload; unknown message types fail here.
///
/// # Errors
///
/// Returns [`LnMeshError::Protocol`] on any failed check. The caller
/// logs and drops — nothing goes back on the wire.
pub fn verify_envelope(
    secret: &ClusterSecret,
    sender: &[u8],
    envelope: &SignedEnvelope,
    now: Timestamp,
) -> Result<PeerMessage> {
    let canonical = to_canonical_json(&envelope.message)?;

    let expected = hex::decode(&envelope.signature).map_err(|_| LnMeshError::Protocol {
        reason: "signature is not valid hex".into(),
    })?;

    let mut mac = keyed_mac(secret, sender, envelope.timestamp)?;
    mac.update(&canonical);
    mac.verify_slice(&expected)
        .map_err(|_| LnMeshError::Protocol {
            reason: "signature mismatch".into(),
        })?;

    let age = now.abs_diff_millis(envelope.timestamp);
    if age > FRESHNESS_WINDOW_MS {
        return Err(LnMeshError::Protocol {
            reason: format!("stale envelope: {age} ms outside the {FRESHNESS_WINDOW_MS} ms window"),
        });
    }

    serde_json::from_value(envelope.message.clone()).map_err(|e| LnMeshError::Protocol {
        reason: format!("unrecognized peer message: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tag computation
// ---------------------------------------------------------------------------

fn keyed_mac(secret: &ClusterSecret, sender: &[u8], timestamp: Timestamp) -> Result<HmacSha256> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| LnMeshError::Protocol {
            reason: format!("HMAC key init failed: {e}"),
        })?;
    mac.update(&timestamp.as_millis().to_be_bytes());
    mac.update(sender);
    Ok(mac)
}

fn compute_tag(
    secret: &ClusterSecret,
    sender: &[u8],
    timestamp: Timestamp,
    canonical: &[u8],
) -> Result<[u8; 32]> {
    let mut mac = keyed_mac(secret, sender, timestamp)?;
    mac.update(canonical);
    let bytes = mac.finalize().into_bytes();

    let mut tag = [0u8; 32];
    tag.copy_from_slice(&bytes);
    Ok(tag)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
