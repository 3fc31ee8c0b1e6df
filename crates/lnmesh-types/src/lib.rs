//! Core shared types for the lnmesh channel rebalancing cluster.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod settings;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ChannelId
// ---------------------------------------------------------------------------

/// Identifier of a Lightning payment channel.
///
/// Opaque to lnmesh: whatever the LN backend reports (e.g. the
/// `761432x1193x0` short-channel-id form) is carried through verbatim
/// and compared as an exact string.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Creates a new `ChannelId` from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// LnPublicKey
// ---------------------------------------------------------------------------

/// Hex-encoded secp256k1 public key identifying a Lightning node.
///
/// 33 bytes compressed, 66 hex characters. Construction via [`new`]
/// does not validate (backend-supplied values are trusted); parsing
/// from operator input goes through [`FromStr`] which does.
///
/// [`new`]: LnPublicKey::new
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LnPublicKey(String);

impl LnPublicKey {
    /// Expected length in hex characters (33 bytes compressed).
    pub const HEX_LEN: usize = 66;

    /// Creates a new `LnPublicKey` from a backend-supplied hex string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LnPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LnPublicKey {
    type Err = LnMeshError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN {
            return Err(LnMeshError::Config {
                reason: format!(
                    "LN public key must be {} hex chars, got {}",
                    Self::HEX_LEN,
                    s.len()
                ),
            });
        }
        if hex::decode(s).is_err() {
            return Err(LnMeshError::Config {
                reason: "LN public key is not valid hex".into(),
            });
        }
        Ok(Self(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// A token (satoshi) amount.
///
/// Balance arithmetic never goes through floating point: ratio
/// comparisons widen to `u128` (see the monitor math), and additions on
/// the policy path are checked so a hostile peer cannot overflow a
/// rolling-window sum.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tokens(u64);

impl Tokens {
    /// Zero tokens.
    pub const ZERO: Tokens = Tokens(0);

    /// Creates a new amount.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw token count.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Checked addition; `None` on overflow.
    pub fn checked_add(self, other: Tokens) -> Option<Tokens> {
        self.0.checked_add(other.0).map(Tokens)
    }

    /// Saturating subtraction.
    pub fn saturating_sub(self, other: Tokens) -> Tokens {
        Tokens(self.0.saturating_sub(other.0))
    }

    /// Returns the smaller of two amounts.
    pub fn min(self, other: Tokens) -> Tokens {
        Tokens(self.0.min(other.0))
    }

    /// Whether the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Tokens {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Milliseconds since the Unix epoch, UTC.
///
/// This is the wire representation of time in the signed envelope and
/// the unit of every freshness / cooldown comparison. Signed so that
/// differences (`now − then`) can go negative for future-dated values.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a `Timestamp` for the current UTC time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Creates a `Timestamp` from epoch milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns epoch milliseconds.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// This timestamp shifted forward by `duration`.
    pub fn plus(&self, duration: std::time::Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(duration.as_millis() as i64))
    }

    /// This timestamp shifted backward by `duration`.
    pub fn minus(&self, duration: std::time::Duration) -> Timestamp {
        Timestamp(self.0.saturating_sub(duration.as_millis() as i64))
    }

    /// Absolute distance to another timestamp, in milliseconds.
    pub fn abs_diff_millis(&self, other: Timestamp) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// Converts to a `chrono` datetime, clamping out-of-range values.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_datetime().to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// ClusterSecret
// ---------------------------------------------------------------------------

/// The shared cluster authenticator.
///
/// Possession of the secret constitutes cluster membership: the mesh
/// rendezvous topic is derived from it and every envelope signature is
/// keyed by it. The `Debug` impl redacts the value so it cannot leak
/// through logs.
#[derive(Clone)]
pub struct ClusterSecret(String);

impl ClusterSecret {
    /// Creates a secret from operator-supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LnMeshError::Config`] if the secret is empty.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(LnMeshError::Config {
                reason: "cluster secret must not be empty".into(),
            });
        }
        Ok(Self(secret))
    }

    /// Returns the secret bytes for key derivation and signing.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ClusterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClusterSecret(***)")
    }
}

// ---------------------------------------------------------------------------
// LnMeshError
// ---------------------------------------------------------------------------

/// Central error type for the lnmesh system.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
/// The variants mirror the containment rules: `Transport` closes a
/// session, `Protocol` drops a message, `Policy` is answered on the
/// wire, `Collaborator` aborts the current operation, `Config` is
/// fatal at startup.
#[derive(Debug, Error)]
pub enum LnMeshError {
    /// A mesh socket or swarm operation failed; the session is dead.
    #[error("transport error: {reason}")]
    Transport {
        /// Human-readable description of the transport failure.
        reason: String,
    },

    /// A message failed signature, freshness, or schema validation.
    /// The message is dropped; the session survives.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Human-readable description of the protocol failure.
        reason: String,
    },

    /// The invoice acceptance policy or a rate limit said no.
    /// Answered on the wire with `confirmed: false`.
    #[error("policy rejection: {reason}")]
    Policy {
        /// Reason echoed back to the requesting peer.
        reason: String,
        /// When the requester may try again, if the rejection is
        /// window-based.
        retry_at: Option<Timestamp>,
    },

    /// A call into the LN backend failed.
    #[error("ln backend error: {reason}")]
    Collaborator {
        /// Human-readable description of the backend failure.
        reason: String,
    },

    /// A configuration value is invalid or missing. Fatal at startup.
    #[error("config error: {reason}")]
    Config {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

/// Convenience result type using [`LnMeshError`].
pub type Result<T> = std::result::Result<T, LnMeshError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_display_roundtrip() {
        let id = ChannelId::new("761432x1193x0");
        assert_eq!(id.to_string(), "761432x1193x0");
        assert_eq!(ChannelId::from("761432x1193x0"), id);
    }

    #[test]
    fn ln_public_key_parse_valid() {
        let hex_key = "02".repeat(33);
        let parsed: LnPublicKey = hex_key.parse().expect("valid key");
        assert_eq!(parsed.as_str(), hex_key);
    }

    #[test]
    fn ln_public_key_parse_wrong_length() {
        let result: std::result::Result<LnPublicKey, _> = "02abcd".parse();
        assert!(result.is_err());
    }

    #[test]
    fn ln_public_key_parse_non_hex() {
        let bad = "zz".repeat(33);
        let result: std::result::Result<LnPublicKey, _> = bad.parse();
        assert!(result.is_err());
    }

    #[test]
    fn tokens_checked_add_overflow() {
        let max = Tokens::new(u64::MAX);
        assert!(max.checked_add(Tokens::new(1)).is_none());
        assert_eq!(
            Tokens::new(1).checked_add(Tokens::new(2)),
            Some(Tokens::new(3))
        );
    }

    #[test]
    fn tokens_saturating_sub_floors_at_zero() {
        assert_eq!(
            Tokens::new(5).saturating_sub(Tokens::new(9)),
            Tokens::ZERO
        );
    }

    #[test]
    fn timestamp_plus_minus() {
        let t = Timestamp::from_millis(10_000);
        let d = std::time::Duration::from_secs(3);
        assert_eq!(t.plus(d).as_millis(), 13_000);
        assert_eq!(t.minus(d).as_millis(), 7_000);
    }

    #[test]
    fn timestamp_abs_diff_is_symmetric() {
        let a = Timestamp::from_millis(1_000);
        let b = Timestamp::from_millis(6_000);
        assert_eq!(a.abs_diff_millis(b), 5_000);
        assert_eq!(b.abs_diff_millis(a), 5_000);
    }

    #[test]
    fn timestamp_serde_is_plain_integer() {
        let t = Timestamp::from_millis(1_700_000_000_000);
        let json = serde_json::to_string(&t).expect("serialize");
        assert_eq!(json, "1700000000000");
    }

    #[test]
    fn cluster_secret_rejects_empty() {
        assert!(ClusterSecret::new("").is_err());
        assert!(ClusterSecret::new("s").is_ok());
    }

    #[test]
    fn cluster_secret_debug_is_redacted() {
        let secret = ClusterSecret::new("hunter2").expect("secret");
        let debug = format!("{secret:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn error_display_includes_reason() {
        let err = LnMeshError::Policy {
            reason: "too many transactions".into(),
            retry_at: None,
        };
        assert!(err.to_string().contains("too many transactions"));
    }
}
