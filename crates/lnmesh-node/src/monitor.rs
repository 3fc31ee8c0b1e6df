//! Rebalance monitor: imbalance math and the periodic tick.
//!
//! The decision math is pure integer arithmetic. Fractional settings
//! arrive as parts-per-million, balances stay `u64`, and every product
//! is widened to `u128`, so the out-of-balance comparison is exact —
//! no float ever touches a balance or an amount.

use std::time::Duration;

use lnmesh_ln::{Channel, CreateInvoice, LnClient};
use lnmesh_protocol::message::PeerMessage;
use lnmesh_types::settings::{RebalanceSettings, PPM_SCALE};
use lnmesh_types::{Timestamp, Tokens};

use crate::audit::{AuditEntry, AuditState};
use crate::state::ClusterState;

/// Invoices expire this long after creation. A rebalance is decided
/// against a live view; an invoice that sat around longer than this
/// no longer reflects it.
pub const INVOICE_EXPIRY: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Decision math
// ---------------------------------------------------------------------------

/// Whether the local share of the channel is below the rebalance
/// threshold (`balance_point − deadzone`).
///
/// Exact rational comparison:
/// `local / capacity < threshold_ppm / PPM_SCALE`
/// ⇔ `local × PPM_SCALE < threshold_ppm × capacity` in `u128`.
pub fn is_out_of_balance(channel: &Channel, settings: &RebalanceSettings) -> bool {
    let capacity = u128::from(channel.capacity.value());
    if capacity == 0 {
        return false;
    }
    let local = u128::from(channel.local_balance.value());
    let threshold = u128::from(settings.rebalance_threshold_ppm());

    local * u128::from(PPM_SCALE) < threshold * capacity
}

/// The invoice amount to request for an out-of-balance channel, or
/// `None` if the channel is in balance or the computed amount is not
/// strictly positive.
///
/// Target local balance is `(local + remote) × balance_point`,
/// floor-divided; the request is the shortfall, capped at
/// `max_transaction_size`.
pub fn rebalance_amount(channel: &Channel, settings: &RebalanceSettings) -> Option<Tokens> {
    if !is_out_of_balance(channel, settings) {
        return None;
    }

    let local = u128::from(channel.local_balance.value());
    let remote = u128::from(channel.remote_balance.value());
    let point = u128::from(settings.balance_point_ppm);

    let target = (local + remote) * point / u128::from(PPM_SCALE);
    let desired = target.saturating_sub(local);
    let capped = desired.min(u128::from(settings.max_transaction_size.value()));

    if capped == 0 {
        return None;
    }
    // Capped at a u64 setting, so the narrowing cannot lose bits.
    Some(Tokens::new(capped as u64))
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// One monitor pass: refresh the view, walk the watch list, dispatch
/// rebalance requests where due.
///
/// Failures are contained per the error model: a failed refresh or
/// invoice creation aborts this tick only; the next tick starts
/// clean.
pub async fn run_tick(state: &mut ClusterState, ln: &dyn LnClient) {
    if let Err(e) = state.registry.refresh(ln).await {
        tracing::warn!(%e, "channel refresh failed; aborting tick");
        return;
    }

    let now = Timestamp::now();

    for channel_id in state.bindings.watched() {
        let Some(channel) = state.registry.channel(&channel_id) else {
            tracing::info!(channel = %channel_id, "watched channel missing from view; unwatching");
            state.bindings.unbind(&channel_id);
            continue;
        };

        if !channel.is_active {
            tracing::debug!(channel = %channel_id, "channel inactive; skipping this tick");
            continue;
        }

        let settings = state.settings.for_channel(&channel_id).clone();
        let Some(amount) = rebalance_amount(channel, &settings) else {
            continue;
        };

        if state.blocks.is_blocked(&channel_id, now) {
            tracing::debug!(channel = %channel_id, "rebalance blocked by cooldown");
            continue;
        }

        let Some(binding) = state.bindings.owner(&channel_id).cloned() else {
            tracing::warn!(channel = %channel_id, "watched channel has no owner binding");
            continue;
        };

        let invoice = match ln
            .create_invoice(CreateInvoice {
                description: format!("rebalance {channel_id}"),
                expires_at: now.plus(INVOICE_EXPIRY),
                tokens: amount,
            })
            .await
        {
            Ok(invoice) => invoice,
            Err(e) => {
                tracing::warn!(%e, channel = %channel_id, "invoice creation failed; aborting tick");
                return;
            }
        };

        state.audit.add(AuditEntry {
            paid_by: binding.ln_public_key.clone(),
            paid_to: state.identity.public_key.clone(),
            channel_id: channel_id.clone(),
            tokens: amount,
            invoice: invoice.request.clone(),
            state: AuditState::Pending,
            created_at: now,
            resolved_at: None,
        });

        // The block goes in before the message goes out: two
        // back-to-back ticks must never both dispatch.
        state
            .blocks
            .insert(channel_id.clone(), now.plus(settings.min_time_between_payments));

        tracing::info!(
            channel = %channel_id,
            tokens = %amount,
            peer = %binding.peer,
            "requesting rebalance"
        );

        state.push_outbound(
            binding.peer,
            PeerMessage::PayInvoice {
                invoice: invoice.request,
                tokens: amount,
                channel_id,
                paid_to: state.identity.public_key.clone(),
                paid_by: binding.ln_public_key,
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
