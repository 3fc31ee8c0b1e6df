//! Mesh transport for the lnmesh cluster.
//!
//! Cluster members find each other on a gossipsub rendezvous topic
//! derived from the shared secret ([`topic`]); only secret-holders can
//! compute the topic name, which is the first membership gate. Signed
//! envelopes travel over a request/response protocol with a JSON
//! codec; the codec layer ([`swarm`]) signs outbound and verifies
//! inbound envelopes so the node core above only ever sees
//! authenticated [`lnmesh_protocol::message::PeerMessage`]s.

pub mod config;
pub mod events;
pub mod swarm;
pub mod topic;
