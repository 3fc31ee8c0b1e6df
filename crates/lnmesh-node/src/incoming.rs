//! Inbound message handlers.
//!
//! Called by the event loop for every verified message. Each handler
//! runs to completion on the loop task; replies and follow-ups are
//! staged on the state outbox, never written directly.

use libp2p::PeerId;
use lnmesh_ln::LnClient;
use lnmesh_protocol::message::PeerMessage;
use lnmesh_types::{ChannelId, LnPublicKey, Timestamp, Tokens};

use crate::audit::{AuditEntry, AuditState};
use crate::policy::{self, PayInvoiceRequest};
use crate::state::ClusterState;

/// Dispatches one verified message to its handler.
pub async fn handle_message(
    state: &mut ClusterState,
    ln: &dyn LnClient,
    peer: PeerId,
    message: PeerMessage,
) {
    state.peers.touch(&peer, Timestamp::now());

    match message {
        PeerMessage::Hello { public_key, alias } => {
            handle_hello(state, ln, peer, public_key, alias).await;
        }
        PeerMessage::PayInvoice {
            invoice,
            tokens,
            channel_id,
            paid_to,
            paid_by,
        } => {
            let request = PayInvoiceRequest {
                invoice,
                tokens,
                channel_id,
                paid_to,
                paid_by,
            };
            let result = policy::vet_and_pay(state, ln, request).await;
            state.push_outbound(peer, result);
        }
        PeerMessage::PaymentResult {
            invoice,
            tokens,
            channel_id,
            paid_to,
            paid_by,
            confirmed,
            confirmed_at,
            reason,
            retry_at,
            ..
        } => {
            handle_payment_result(
                state,
                peer,
                PaymentOutcome {
                    invoice,
                    tokens,
                    channel_id,
                    paid_to,
                    paid_by,
                    confirmed,
                    confirmed_at,
                    reason,
                    retry_at,
                },
            );
        }
    }
}

// ---------------------------------------------------------------------------
// hello
// ---------------------------------------------------------------------------

/// Processes a greeting: record the LN identity, refresh the view,
/// bind every shared channel to the greeter, and watch them.
pub async fn handle_hello(
    state: &mut ClusterState,
    ln: &dyn LnClient,
    peer: PeerId,
    public_key: LnPublicKey,
    alias: String,
) {
    tracing::info!(%peer, %public_key, %alias, "greeting received");
    state
        .peers
        .greet(peer, public_key.clone(), alias, Timestamp::now());

    if let Err(e) = state.registry.refresh(ln).await {
        tracing::warn!(%e, "channel refresh failed during greeting; shared channels not bound");
        return;
    }

    let shared: Vec<_> = state
        .registry
        .channels_with_partner(&public_key)
        .iter()
        .map(|c| c.id.clone())
        .collect();

    if shared.is_empty() {
        tracing::debug!(%peer, "greeter shares no channels with us");
        return;
    }

    for channel_id in shared {
        tracing::info!(%peer, channel = %channel_id, "watching shared channel");
        state.bindings.bind(channel_id, peer, public_key.clone());
    }
}

// ---------------------------------------------------------------------------
// paymentResult
// ---------------------------------------------------------------------------

/// The fields of an inbound `paymentResult`, destructured.
pub struct PaymentOutcome {
    pub invoice: String,
    pub tokens: Tokens,
    pub channel_id: ChannelId,
    pub paid_to: LnPublicKey,
    pub paid_by: LnPublicKey,
    pub confirmed: bool,
    pub confirmed_at: Option<Timestamp>,
    pub reason: Option<String>,
    pub retry_at: Option<Timestamp>,
}

/// Requester-side result handling: audit the outcome, then clear or
/// extend the cooldown. A result for a channel with no live block is
/// still audited — the responder's pay attempt happened either way.
/// There is no automatic retry; the next tick re-evaluates.
pub fn handle_payment_result(state: &mut ClusterState, peer: PeerId, outcome: PaymentOutcome) {
    let now = Timestamp::now();

    tracing::info!(
        %peer,
        channel = %outcome.channel_id,
        confirmed = outcome.confirmed,
        reason = outcome.reason.as_deref().unwrap_or(""),
        "payment result received"
    );

    state.audit.add(AuditEntry {
        paid_by: outcome.paid_by,
        paid_to: outcome.paid_to,
        channel_id: outcome.channel_id.clone(),
        tokens: outcome.tokens,
        invoice: outcome.invoice,
        state: if outcome.confirmed {
            AuditState::Complete
        } else {
            AuditState::Failed
        },
        created_at: now,
        resolved_at: outcome.confirmed_at.or(Some(now)),
    });

    if outcome.confirmed {
        state.blocks.clear(&outcome.channel_id);
    } else if let Some(retry_at) = outcome.retry_at {
        state.blocks.extend(outcome.channel_id, retry_at);
    }
    // Unconfirmed without retry_at: the original cooldown stands.
}
