//! Invoice acceptance policy (the payer side of an exchange).
//!
//! A `payInvoice` from a peer is a request to move our money. The
//! policy trusts nothing in the message: the invoice is decoded
//! independently, the amounts and destination are cross-checked, the
//! channel is looked up in a *fresh* view, the direction is verified,
//! and the window limits are applied — only then is a payment
//! attempted, pinned to the requested channel.
//!
//! Every path out of here produces a `paymentResult`. Backend errors
//! during decode or pay are caught and answered with a generic
//! `payment failed`; the requester learns no more than it needs to.

use lnmesh_ln::{LnClient, PayRequest};
use lnmesh_protocol::message::PeerMessage;
use lnmesh_types::{ChannelId, LnMeshError, LnPublicKey, Timestamp, Tokens};

use crate::audit::{AuditEntry, AuditState};
use crate::limiter::check_window_limits;
use crate::state::ClusterState;

/// Rejection reason for requests that fail validation (mismatched
/// amount, destination, or channel). Deliberately uniform.
const INVALID_REQUEST: &str = "invalid request";

/// Failure reason for backend errors and unsettled payments.
const PAYMENT_FAILED: &str = "payment failed";

// ---------------------------------------------------------------------------
// PayInvoiceRequest
// ---------------------------------------------------------------------------

/// The fields of an inbound `payInvoice`, destructured.
#[derive(Clone, Debug)]
pub struct PayInvoiceRequest {
    /// BOLT-11 payment request to pay.
    pub invoice: String,
    /// Amount the requester claims is invoiced.
    pub tokens: Tokens,
    /// Channel the payment must traverse.
    pub channel_id: ChannelId,
    /// Claimed destination (the requester's LN key).
    pub paid_to: LnPublicKey,
    /// The node being asked to pay (us, if the request is honest).
    pub paid_by: LnPublicKey,
}

impl PayInvoiceRequest {
    /// Builds the `paymentResult` echo for this request.
    fn result(
        &self,
        confirmed: bool,
        payment_id: Option<String>,
        confirmed_at: Option<Timestamp>,
        reason: Option<String>,
        retry_at: Option<Timestamp>,
    ) -> PeerMessage {
        PeerMessage::PaymentResult {
            invoice: self.invoice.clone(),
            tokens: self.tokens,
            channel_id: self.channel_id.clone(),
            paid_to: self.paid_to.clone(),
            paid_by: self.paid_by.clone(),
            confirmed,
            payment_id,
            confirmed_at,
            reason,
            retry_at,
        }
    }

    fn reject(&self, reason: &str, retry_at: Option<Timestamp>) -> PeerMessage {
        self.result(false, None, None, Some(reason.to_string()), retry_at)
    }
}

// ---------------------------------------------------------------------------
// vet_and_pay
// ---------------------------------------------------------------------------

/// Runs the full acceptance pipeline and returns the `paymentResult`
/// to send back.
///
/// The audit log records an entry only when a pay attempt was made
/// (settled or failed); requests rejected before that leave no
/// entry and therefore do not consume window budget.
pub async fn vet_and_pay(
    state: &mut ClusterState,
    ln: &dyn LnClient,
    request: PayInvoiceRequest,
) -> PeerMessage {
    // 1. Decode the invoice ourselves; the message's claims are not
    //    evidence.
    let decoded = match ln.decode_payment_request(&request.invoice).await {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!(%e, "failed to decode payment request");
            return request.reject(PAYMENT_FAILED, None);
        }
    };

    // 2. The invoiced amount must be exactly what was claimed.
    if decoded.tokens != request.tokens {
        tracing::warn!(
            claimed = %request.tokens,
            invoiced = %decoded.tokens,
            "payInvoice amount does not match invoice"
        );
        return request.reject(INVALID_REQUEST, None);
    }

    // 3. The invoice must pay out to the claimed destination.
    if decoded.destination != request.paid_to {
        tracing::warn!(
            claimed = %request.paid_to,
            invoiced = %decoded.destination,
            "payInvoice destination does not match invoice"
        );
        return request.reject(INVALID_REQUEST, None);
    }

    // 4. The channel must exist in a fresh view. The refresh is a
    //    suspension point; everything below re-reads from the new
    //    snapshot.
    if let Err(e) = state.registry.refresh(ln).await {
        tracing::warn!(%e, "channel refresh failed during invoice vetting");
        return request.reject(PAYMENT_FAILED, None);
    }
    let Some(channel) = state.registry.channel(&request.channel_id) else {
        tracing::warn!(channel = %request.channel_id, "payInvoice names an unknown channel");
        return request.reject(INVALID_REQUEST, None);
    };

    // 5. Direction check: paying this invoice over this channel must
    //    move funds toward the requester, i.e. the channel's far end
    //    is the payment destination.
    if channel.partner_public_key != request.paid_to {
        tracing::warn!(
            channel = %request.channel_id,
            partner = %channel.partner_public_key,
            paid_to = %request.paid_to,
            "payInvoice direction mismatch"
        );
        return request.reject(INVALID_REQUEST, None);
    }

    // 6. Window limits, as the payer.
    let now = Timestamp::now();
    let settings = state.settings.for_channel(&request.channel_id);
    if let Err(LnMeshError::Policy { reason, retry_at }) = check_window_limits(
        &state.audit,
        &state.identity.public_key,
        request.tokens,
        settings,
        now,
    ) {
        tracing::info!(%reason, "payInvoice rejected by window limits");
        return request.reject(&reason, retry_at);
    }

    // 7. Pay, pinned to the requested channel.
    let outcome = ln
        .pay(PayRequest {
            request: request.invoice.clone(),
            outgoing_channel: request.channel_id.clone(),
        })
        .await;

    // 8–9. Audit the attempt and reply.
    match outcome {
        Ok(payment) => {
            let audit_state = if payment.is_confirmed {
                AuditState::Complete
            } else {
                AuditState::Failed
            };
            state.audit.add(AuditEntry {
                paid_by: state.identity.public_key.clone(),
                paid_to: request.paid_to.clone(),
                channel_id: request.channel_id.clone(),
                tokens: request.tokens,
                invoice: request.invoice.clone(),
                state: audit_state,
                created_at: now,
                resolved_at: payment.confirmed_at.or(Some(now)),
            });

            if payment.is_confirmed {
                tracing::info!(
                    channel = %request.channel_id,
                    tokens = %request.tokens,
                    "rebalance invoice paid"
                );
                request.result(true, Some(payment.id), payment.confirmed_at, None, None)
            } else {
                request.result(
                    false,
                    Some(payment.id),
                    None,
                    Some(PAYMENT_FAILED.to_string()),
                    None,
                )
            }
        }
        Err(e) => {
            tracing::warn!(%e, channel = %request.channel_id, "payment attempt failed");
            state.audit.add(AuditEntry {
                paid_by: state.identity.public_key.clone(),
                paid_to: request.paid_to.clone(),
                channel_id: request.channel_id.clone(),
                tokens: request.tokens,
                invoice: request.invoice.clone(),
                state: AuditState::Failed,
                created_at: now,
                resolved_at: Some(now),
            });
            request.reject(PAYMENT_FAILED, None)
        }
    }
}
