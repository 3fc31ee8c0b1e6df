//! Network configuration for the lnmesh libp2p layer.
//!
//! This config lives here rather than in `lnmesh-types` to avoid
//! pulling `libp2p::Multiaddr` into the shared types crate.

use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;
use lnmesh_types::{LnMeshError, Result};
use serde::{Deserialize, Serialize};

/// Network-layer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Multiaddr on which this node listens for incoming connections.
    #[serde(with = "multiaddr_serde")]
    pub listen_addr: Multiaddr,

    /// Cluster members to dial on startup. mDNS covers the LAN case;
    /// WAN clusters list each other here.
    #[serde(with = "multiaddr_vec_serde")]
    pub dial_peers: Vec<Multiaddr>,

    /// Enable mDNS for automatic member discovery on the local
    /// network.
    pub enable_mdns: bool,

    /// Gossip heartbeat interval, seconds. Doubles as the session
    /// keepalive: a live heartbeat keeps the connection from idling
    /// out.
    pub keepalive_secs: u64,

    /// Seconds before an outstanding envelope send is abandoned and
    /// reported as failed.
    pub request_timeout_secs: u64,

    /// Seconds before an idle connection is closed by the swarm.
    pub idle_timeout_secs: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        let mut listen_addr = Multiaddr::empty();
        listen_addr.push(Protocol::Ip4(std::net::Ipv4Addr::UNSPECIFIED));
        listen_addr.push(Protocol::Tcp(0));

        Self {
            listen_addr,
            dial_peers: Vec::new(),
            enable_mdns: true,
            keepalive_secs: 5,
            request_timeout_secs: 7,
            idle_timeout_secs: 60,
        }
    }
}

impl MeshConfig {
    /// Validates all configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`LnMeshError::Config`] if any value is outside its
    /// acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.keepalive_secs == 0 {
            return Err(LnMeshError::Config {
                reason: "keepalive_secs must be greater than 0".into(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(LnMeshError::Config {
                reason: "request_timeout_secs must be greater than 0".into(),
            });
        }
        if self.idle_timeout_secs < self.keepalive_secs {
            return Err(LnMeshError::Config {
                reason: "idle_timeout_secs must be at least keepalive_secs".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serde helpers — Multiaddr does not implement Serialize/Deserialize
// ---------------------------------------------------------------------------

mod multiaddr_serde {
    use libp2p::Multiaddr;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addr: &Multiaddr, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Multiaddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

mod multiaddr_vec_serde {
    use libp2p::Multiaddr;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(addrs: &[Multiaddr], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(addrs.len()))?;
        for addr in addrs {
            seq.serialize_element(&addr.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> std::result::Result<Vec<Multiaddr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings: Vec<String> = Vec::deserialize(deserializer)?;
        strings
            .into_iter()
            .map(|s| s.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
