//! Main event loop driving all node subsystems.
//!
//! [`run_event_loop`] is spawned as a tokio task by
//! [`Node::start`](crate::node::Node::start). It multiplexes with
//! `tokio::select!`:
//!
//! 1. **Mesh swarm** — `poll_next()` drives libp2p event processing.
//! 2. **Mesh events** — joins, leaves, verified messages.
//! 3. **Commands** — status and shutdown from the daemon.
//! 4. **Monitor tick** — the periodic rebalance pass.
//! 5. **Shutdown signal** — graceful exit via `watch` channel.
//!
//! All mutable state lives in the [`ClusterState`] owned here, so no
//! handler needs a lock. After every handler the staged outbox is
//! flushed to the swarm.

use tokio::time::MissedTickBehavior;

use lnmesh_network::events::MeshEvent;
use lnmesh_protocol::message::PeerMessage;
use lnmesh_types::Timestamp;

use crate::command::{NodeCommand, NodeStatus};
use crate::incoming;
use crate::monitor;
use crate::node::NodeRuntime;
use crate::state::ClusterState;

/// Runs the node event loop until shutdown is signalled.
pub(crate) async fn run_event_loop(mut rt: NodeRuntime) {
    tracing::info!("node event loop starting");

    if let Err(e) = rt.swarm.start_listening(rt.listen_addr.clone()) {
        tracing::error!(%e, "failed to start listening; continuing without listener");
    }
    rt.swarm.dial_configured_peers(&rt.dial_peers);

    let mut tick = tokio::time::interval(rt.state.settings.defaults().refresh_rate);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // 1. Drive the swarm; resulting mesh events arrive on
            //    mesh_rx.
            _ = rt.swarm.poll_next() => {}

            // 2. Mesh events.
            Some(event) = rt.mesh_rx.recv() => {
                handle_mesh_event(&mut rt, event).await;
                flush_outbox(&mut rt);
            }

            // 3. Commands.
            Some(cmd) = rt.command_rx.recv() => {
                if handle_command(cmd, &rt.state) {
                    tracing::info!("shutdown command received; exiting event loop");
                    break;
                }
            }

            // 4. Monitor tick.
            _ = tick.tick() => {
                monitor::run_tick(&mut rt.state, rt.ln.as_ref()).await;
                flush_outbox(&mut rt);
            }

            // 5. Shutdown signal.
            _ = rt.shutdown_rx.changed() => {
                if *rt.shutdown_rx.borrow() {
                    tracing::info!("shutdown signal received; exiting event loop");
                    break;
                }
            }
        }
    }

    // Leave the rendezvous topic; dropping the runtime closes the
    // sessions. In-flight LN payments are not cancelled — they settle
    // or fail on their own, and any late result is discarded with the
    // session.
    rt.swarm.leave();
    tracing::info!("node event loop exited");
}

// ---------------------------------------------------------------------------
// Mesh event handling
// ---------------------------------------------------------------------------

async fn handle_mesh_event(rt: &mut NodeRuntime, event: MeshEvent) {
    match event {
        MeshEvent::PeerJoined(peer) => {
            rt.state.peers.insert(peer, Timestamp::now());

            // Greet immediately with our LN identity, and refresh the
            // presence beacon now that the topic has a listener.
            rt.state.push_outbound(
                peer,
                PeerMessage::Hello {
                    public_key: rt.state.identity.public_key.clone(),
                    alias: rt.state.identity.alias.clone(),
                },
            );
            let alias = rt.state.identity.alias.clone();
            rt.swarm.publish_presence(&alias);
        }

        MeshEvent::PeerLeft(peer) => {
            rt.state.peers.remove(&peer);
            let unwatched = rt.state.bindings.remove_peer(&peer);
            for channel in &unwatched {
                tracing::info!(%peer, %channel, "unwatching channel of departed peer");
            }
        }

        MeshEvent::MessageReceived { peer, message } => {
            incoming::handle_message(&mut rt.state, rt.ln.as_ref(), peer, message).await;
        }

        MeshEvent::SendFailed { peer } => {
            // Delivery failure; session teardown, if any, arrives as
            // its own PeerLeft.
            tracing::warn!(%peer, "outbound message delivery failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Processes a single command. Returns `true` if the loop should
/// exit.
fn handle_command(cmd: NodeCommand, state: &ClusterState) -> bool {
    match cmd {
        NodeCommand::GetStatus { reply } => {
            let _ = reply.send(build_status(state));
            false
        }
        NodeCommand::Shutdown => true,
    }
}

fn build_status(state: &ClusterState) -> NodeStatus {
    NodeStatus {
        alias: state.identity.alias.clone(),
        ln_public_key: state.identity.public_key.to_string(),
        mesh_peer_id: state.local_peer.to_string(),
        peer_count: state.peers.len(),
        greeted_count: state.peers.greeted_count(),
        watched_channels: state.bindings.watched(),
        active_blocks: state.blocks.len(),
        audit_entries: state.audit.len(),
    }
}

// ---------------------------------------------------------------------------
// Outbox flush
// ---------------------------------------------------------------------------

fn flush_outbox(rt: &mut NodeRuntime) {
    for (peer, message) in rt.state.take_outbox() {
        if let Err(e) = rt.swarm.send_message(&peer, &message) {
            tracing::warn!(%peer, %e, "failed to send staged message");
        }
    }
}
