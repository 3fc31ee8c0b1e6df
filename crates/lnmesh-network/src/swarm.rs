//! High-level swarm wrapper for the lnmesh cluster.
//!
//! [`MeshSwarm`] encapsulates the libp2p `Swarm` with the combined
//! [`MeshBehaviour`] and provides the async API the node event loop
//! drives: listen, dial, publish presence, send signed envelopes, and
//! a single-event [`poll_next`](MeshSwarm::poll_next) for
//! `tokio::select!` integration.
//!
//! # Membership
//!
//! A remote peer becomes a session peer when gossipsub reports it
//! subscribed to our rendezvous topic. Inbound and outbound
//! connections produce equivalent sessions. A second subscription from
//! the same `PeerId` replaces the first (last-writer-wins — the set
//! semantics make the replacement free). Teardown happens on the last
//! connection closing or an explicit unsubscribe.
//!
//! # Codec placement
//!
//! Envelope signing and verification live here, at the session level:
//! the sender identity an envelope is verified against is the
//! transport-observed `PeerId`, never anything the payload claims.
//! Verification failures are logged and dropped; the ack sent back is
//! the same either way, so a sender learns nothing from a rejection.

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use libp2p::request_response::{self, ProtocolSupport};
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::{NetworkBehaviour, SwarmEvent};
use libp2p::{gossipsub, identify, mdns, noise, tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm};
use lnmesh_protocol::envelope::{sign_envelope, verify_envelope, SignedEnvelope};
use lnmesh_protocol::message::PeerMessage;
use lnmesh_types::{ClusterSecret, LnMeshError, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::MeshConfig;
use crate::events::MeshEvent;
use crate::topic::rendezvous_topic;

/// Convenience alias to avoid shadowing `std::result::Result`,
/// which the `#[derive(NetworkBehaviour)]` macro requires.
type MResult<T> = std::result::Result<T, LnMeshError>;

// ---------------------------------------------------------------------------
// Wire protocol constants
// ---------------------------------------------------------------------------

/// Request/response protocol name for signed envelopes.
pub const ENVELOPE_PROTOCOL: &str = "/lnmesh/envelope/1.0.0";

/// Identify protocol version string.
const IDENTIFY_PROTOCOL: &str = "/lnmesh/id/1.0.0";

/// Transport-level delivery ack. Deliberately empty: protocol
/// rejections must be indistinguishable from acceptance on the wire.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Ack {}

/// Presence beacon published on the rendezvous topic at join, so
/// operators can see cluster membership in the logs. Carries no
/// authority — authorization flows only from envelope signatures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresenceBeacon {
    /// Node alias of the joiner.
    pub alias: String,
}

// ---------------------------------------------------------------------------
// Combined behaviour
// ---------------------------------------------------------------------------

/// Combined libp2p behaviour for the lnmesh cluster.
///
/// - `gossipsub` — rendezvous topic membership and presence beacons.
/// - `request_response::json` — directed signed envelopes with ack.
/// - `identify` — peer metadata exchange.
/// - `Toggle<mdns>` — optional LAN discovery.
#[derive(NetworkBehaviour)]
pub struct MeshBehaviour {
    /// Rendezvous topic pub/sub.
    pub gossip: gossipsub::Behaviour,
    /// Signed envelope send/receive (JSON codec).
    pub messaging: request_response::json::Behaviour<SignedEnvelope, Ack>,
    /// Peer metadata exchange.
    pub identify: identify::Behaviour,
    /// Optional mDNS LAN discovery.
    pub mdns: Toggle<mdns::tokio::Behaviour>,
}

// ---------------------------------------------------------------------------
// MeshSwarm
// ---------------------------------------------------------------------------

/// High-level wrapper around `Swarm<MeshBehaviour>`.
pub struct MeshSwarm {
    swarm: Swarm<MeshBehaviour>,
    secret: ClusterSecret,
    topic: gossipsub::IdentTopic,
    /// Peers currently subscribed to the rendezvous topic.
    session_peers: HashSet<PeerId>,
    event_tx: mpsc::UnboundedSender<MeshEvent>,
}

impl MeshSwarm {
    /// Creates a new mesh swarm joined to the cluster's rendezvous
    /// topic.
    ///
    /// Returns `(swarm, event_receiver)`; the receiver delivers all
    /// [`MeshEvent`]s to the node core.
    ///
    /// # Errors
    ///
    /// Returns [`LnMeshError::Transport`] if transport or behaviour
    /// construction fails, [`LnMeshError::Config`] on invalid config.
    pub fn new(
        config: &MeshConfig,
        secret: ClusterSecret,
    ) -> MResult<(Self, mpsc::UnboundedReceiver<MeshEvent>)> {
        config.validate()?;

        let topic = rendezvous_topic(&secret);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let keepalive = Duration::from_secs(config.keepalive_secs);
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let idle_timeout = Duration::from_secs(config.idle_timeout_secs);
        let enable_mdns = config.enable_mdns;

        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| LnMeshError::Transport {
                reason: format!("failed to configure TCP transport: {e}"),
            })?
            .with_behaviour(|key| {
                build_behaviour(key, keepalive, request_timeout, enable_mdns)
                    .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
            })
            .map_err(|e| LnMeshError::Transport {
                reason: format!("failed to build mesh behaviour: {e}"),
            })?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        // Join the rendezvous topic. Remote members see the
        // subscription and create a session for us; we do the same
        // for them.
        swarm
            .behaviour_mut()
            .gossip
            .subscribe(&topic)
            .map_err(|e| LnMeshError::Transport {
                reason: format!("failed to subscribe to rendezvous topic: {e}"),
            })?;

        Ok((
            Self {
                swarm,
                secret,
                topic,
                session_peers: HashSet::new(),
                event_tx,
            },
            event_rx,
        ))
    }

    /// Returns the local mesh identity.
    pub fn local_peer_id(&self) -> &PeerId {
        self.swarm.local_peer_id()
    }

    /// Returns the peers with an active session.
    pub fn session_peers(&self) -> impl Iterator<Item = &PeerId> {
        self.session_peers.iter()
    }

    // -----------------------------------------------------------------------
    // Listening / dialing
    // -----------------------------------------------------------------------

    /// Starts listening on the configured multiaddr.
    ///
    /// # Errors
    ///
    /// Returns [`LnMeshError::Transport`] if the address cannot be
    /// bound.
    pub fn start_listening(&mut self, addr: Multiaddr) -> MResult<()> {
        self.swarm
            .listen_on(addr)
            .map(|_| ())
            .map_err(|e| LnMeshError::Transport {
                reason: format!("failed to start listening: {e}"),
            })
    }

    /// Dials the statically configured cluster members. Dial failures
    /// are logged, not fatal — mDNS and inbound connections are the
    /// other paths into the mesh.
    pub fn dial_configured_peers(&mut self, peers: &[Multiaddr]) {
        for addr in peers {
            if let Err(e) = self.swarm.dial(addr.clone()) {
                tracing::warn!(%addr, %e, "failed to dial configured peer");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    /// Publishes the presence beacon on the rendezvous topic.
    ///
    /// Best-effort: publishing fails until gossipsub has at least one
    /// topic peer, which is fine — the beacon is operator visibility,
    /// not protocol state.
    pub fn publish_presence(&mut self, alias: &str) {
        let beacon = PresenceBeacon {
            alias: alias.to_string(),
        };
        let data = match serde_json::to_vec(&beacon) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(%e, "failed to serialize presence beacon");
                return;
            }
        };
        if let Err(e) = self
            .swarm
            .behaviour_mut()
            .gossip
            .publish(self.topic.clone(), data)
        {
            tracing::debug!(%e, "presence beacon not published");
        }
    }

    // -----------------------------------------------------------------------
    // Outbound envelopes
    // -----------------------------------------------------------------------

    /// Signs `message` and sends it to `peer`.
    ///
    /// If the peer has no active session the message is logged and
    /// dropped — there is no queuing. Delivery failures surface later
    /// as [`MeshEvent::SendFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`LnMeshError::Protocol`] only if signing itself fails.
    pub fn send_message(&mut self, peer: &PeerId, message: &PeerMessage) -> MResult<()> {
        if !self.session_peers.contains(peer) {
            tracing::warn!(
                %peer,
                kind = message.kind(),
                "no active session for peer; dropping outbound message"
            );
            return Ok(());
        }

        let sender = self.swarm.local_peer_id().to_bytes();
        let envelope = sign_envelope(&self.secret, &sender, message, Timestamp::now())?;

        self.swarm
            .behaviour_mut()
            .messaging
            .send_request(peer, envelope);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Leaves the rendezvous topic. Dropping the swarm afterwards
    /// closes all sessions.
    pub fn leave(&mut self) {
        if let Err(e) = self.swarm.behaviour_mut().gossip.unsubscribe(&self.topic) {
            tracing::debug!(%e, "failed to unsubscribe from rendezvous topic");
        }
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Processes exactly one swarm event.
    ///
    /// Designed for `tokio::select!` in the node event loop.
    ///
    /// # Cancel safety
    ///
    /// Cancel-safe: a dropped future loses no events — they remain in
    /// the swarm's internal queue for the next poll.
    pub async fn poll_next(&mut self) {
        let event = self.swarm.select_next_some().await;
        self.dispatch_swarm_event(event);
    }

    fn dispatch_swarm_event(&mut self, event: SwarmEvent<MeshBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                tracing::info!(%address, "mesh listening");
            }

            SwarmEvent::ConnectionEstablished {
                peer_id,
                num_established,
                ..
            } => {
                tracing::debug!(%peer_id, num_established, "connection established");
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                cause,
                num_established,
                ..
            } => {
                tracing::debug!(%peer_id, ?cause, num_established, "connection closed");
                if num_established == 0 {
                    self.drop_session(&peer_id);
                }
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                tracing::warn!(?peer_id, %error, "outgoing connection error");
            }

            SwarmEvent::Behaviour(event) => self.handle_behaviour_event(event),

            other => {
                tracing::trace!(?other, "unhandled swarm event");
            }
        }
    }

    fn handle_behaviour_event(&mut self, event: MeshBehaviourEvent) {
        match event {
            MeshBehaviourEvent::Gossip(event) => self.handle_gossip_event(event),
            MeshBehaviourEvent::Messaging(event) => self.handle_messaging_event(event),
            MeshBehaviourEvent::Identify(event) => {
                if let identify::Event::Received { peer_id, info, .. } = event {
                    tracing::debug!(
                        %peer_id,
                        agent = %info.agent_version,
                        "identify: received peer info"
                    );
                }
            }
            MeshBehaviourEvent::Mdns(event) => self.handle_mdns_event(event),
        }
    }

    // -----------------------------------------------------------------------
    // Gossip: membership + presence
    // -----------------------------------------------------------------------

    fn handle_gossip_event(&mut self, event: gossipsub::Event) {
        match event {
            gossipsub::Event::Subscribed { peer_id, topic } => {
                if topic == self.topic.hash() {
                    // Insert is idempotent; a reconnecting peer simply
                    // refreshes its session (last-writer-wins).
                    let newly = self.session_peers.insert(peer_id);
                    if newly {
                        tracing::info!(%peer_id, "peer joined the cluster mesh");
                        let _ = self.event_tx.send(MeshEvent::PeerJoined(peer_id));
                    }
                }
            }

            gossipsub::Event::Unsubscribed { peer_id, topic } => {
                if topic == self.topic.hash() {
                    self.drop_session(&peer_id);
                }
            }

            gossipsub::Event::Message { message, .. } => {
                // Presence beacons only; informational.
                match serde_json::from_slice::<PresenceBeacon>(&message.data) {
                    Ok(beacon) => {
                        tracing::info!(alias = %beacon.alias, "presence beacon received");
                    }
                    Err(_) => {
                        tracing::debug!(bytes = message.data.len(), "unrecognized gossip payload");
                    }
                }
            }

            other => {
                tracing::trace!(?other, "other gossipsub event");
            }
        }
    }

    fn drop_session(&mut self, peer_id: &PeerId) {
        if self.session_peers.remove(peer_id) {
            tracing::info!(%peer_id, "peer left the cluster mesh");
            let _ = self.event_tx.send(MeshEvent::PeerLeft(*peer_id));
        }
    }

    // -----------------------------------------------------------------------
    // Messaging: signed envelopes
    // -----------------------------------------------------------------------

    fn handle_messaging_event(&mut self, event: request_response::Event<SignedEnvelope, Ack>) {
        match event {
            // Inbound envelope: verify, emit, ack.
            request_response::Event::Message {
                peer,
                message:
                    request_response::Message::Request {
                        request, channel, ..
                    },
                ..
            } => {
                self.handle_inbound_envelope(peer, request);

                // The ack is identical for accepted and rejected
                // envelopes: silence on the wire.
                if self
                    .swarm
                    .behaviour_mut()
                    .messaging
                    .send_response(channel, Ack {})
                    .is_err()
                {
                    tracing::debug!(%peer, "ack channel closed before response");
                }
            }

            // Ack for an envelope we sent: nothing to do.
            request_response::Event::Message {
                peer,
                message: request_response::Message::Response { .. },
                ..
            } => {
                tracing::trace!(%peer, "envelope acked");
            }

            request_response::Event::OutboundFailure { peer, error, .. } => {
                tracing::warn!(%peer, %error, "envelope delivery failed");
                let _ = self.event_tx.send(MeshEvent::SendFailed { peer });
            }

            request_response::Event::InboundFailure { peer, error, .. } => {
                tracing::warn!(%peer, %error, "inbound envelope handling failed");
            }

            request_response::Event::ResponseSent { peer, .. } => {
                tracing::trace!(%peer, "ack sent");
            }
        }
    }

    /// Runs an inbound envelope through verification and emits the
    /// payload on success. Failures are logged and dropped.
    fn handle_inbound_envelope(&mut self, peer: PeerId, envelope: SignedEnvelope) {
        if !self.session_peers.contains(&peer) {
            tracing::warn!(%peer, "envelope from peer without a session; dropping");
            return;
        }

        let sender = peer.to_bytes();
        match verify_envelope(&self.secret, &sender, &envelope, Timestamp::now()) {
            Ok(message) => {
                tracing::debug!(%peer, kind = message.kind(), "verified inbound message");
                let _ = self
                    .event_tx
                    .send(MeshEvent::MessageReceived { peer, message });
            }
            Err(e) => {
                tracing::warn!(%peer, %e, "rejected inbound envelope");
            }
        }
    }

    // -----------------------------------------------------------------------
    // mDNS: LAN discovery
    // -----------------------------------------------------------------------

    fn handle_mdns_event(&mut self, event: mdns::Event) {
        match event {
            mdns::Event::Discovered(peers) => {
                for (peer_id, addr) in peers {
                    tracing::debug!(%peer_id, %addr, "mDNS discovered peer, dialing");
                    if let Err(e) = self.swarm.dial(addr) {
                        tracing::debug!(%peer_id, %e, "mDNS dial failed");
                    }
                }
            }
            mdns::Event::Expired(peers) => {
                for (peer_id, _) in peers {
                    tracing::trace!(%peer_id, "mDNS record expired");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Behaviour construction
// ---------------------------------------------------------------------------

fn build_behaviour(
    key: &libp2p::identity::Keypair,
    keepalive: Duration,
    request_timeout: Duration,
    enable_mdns: bool,
) -> MResult<MeshBehaviour> {
    let gossip_config = gossipsub::ConfigBuilder::default()
        .heartbeat_interval(keepalive)
        .build()
        .map_err(|e| LnMeshError::Transport {
            reason: format!("failed to build gossipsub config: {e}"),
        })?;

    let gossip = gossipsub::Behaviour::new(
        gossipsub::MessageAuthenticity::Signed(key.clone()),
        gossip_config,
    )
    .map_err(|e| LnMeshError::Transport {
        reason: format!("failed to create gossipsub behaviour: {e}"),
    })?;

    let messaging = request_response::json::Behaviour::<SignedEnvelope, Ack>::new(
        [(
            StreamProtocol::new(ENVELOPE_PROTOCOL),
            ProtocolSupport::Full,
        )],
        request_response::Config::default().with_request_timeout(request_timeout),
    );

    let identify = identify::Behaviour::new(
        identify::Config::new(IDENTIFY_PROTOCOL.into(), key.public())
            .with_agent_version(format!("lnmesh/{}", env!("CARGO_PKG_VERSION"))),
    );

    let mdns = if enable_mdns {
        let behaviour = mdns::tokio::Behaviour::new(
            mdns::Config::default(),
            key.public().to_peer_id(),
        )
        .map_err(|e| LnMeshError::Transport {
            reason: format!("failed to create mDNS behaviour: {e}"),
        })?;
        Toggle::from(Some(behaviour))
    } else {
        Toggle::from(None)
    };

    Ok(MeshBehaviour {
        gossip,
        messaging,
        identify,
        mdns,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> ClusterSecret {
        ClusterSecret::new("s").expect("secret")
    }

    /// mDNS needs multicast sockets, which CI sandboxes may forbid;
    /// these tests exercise everything else.
    fn test_config() -> MeshConfig {
        MeshConfig {
            enable_mdns: false,
            ..MeshConfig::default()
        }
    }

    #[tokio::test]
    async fn swarm_construction_succeeds() {
        let result = MeshSwarm::new(&test_config(), secret());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn send_to_unknown_peer_is_dropped_not_error() {
        let (mut swarm, _rx) = MeshSwarm::new(&test_config(), secret()).expect("swarm");
        let stranger = PeerId::random();
        let message = PeerMessage::Hello {
            public_key: lnmesh_types::LnPublicKey::new("02".repeat(33)),
            alias: "a".into(),
        };
        // No session: logged and dropped, not an error.
        assert!(swarm.send_message(&stranger, &message).is_ok());
    }

    #[tokio::test]
    async fn listening_on_default_addr_succeeds() {
        let (mut swarm, _rx) = MeshSwarm::new(&test_config(), secret()).expect("swarm");
        let addr = test_config().listen_addr;
        assert!(swarm.start_listening(addr).is_ok());
    }
}
