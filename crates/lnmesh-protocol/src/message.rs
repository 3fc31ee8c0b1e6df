//! Peer message types for the lnmesh protocol.
//!
//! A [`PeerMessage`] is the inner payload of a signed envelope. The
//! wire form is a JSON object tagged by a `"type"` field with
//! camelCase names, matching the envelope layout shared by all cluster
//! implementations. Unknown `"type"` values fail deserialization and
//! are dropped by the receiver.

use lnmesh_types::{ChannelId, LnPublicKey, Timestamp, Tokens};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PeerMessage
// ---------------------------------------------------------------------------

/// Application payload of a signed envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PeerMessage {
    /// Advertise the sender's LN identity. Sent once per session,
    /// immediately after the mesh connection comes up.
    Hello {
        /// LN public key of the greeting node.
        public_key: LnPublicKey,
        /// Human-readable node alias.
        alias: String,
    },

    /// "Please pay this BOLT-11 invoice of `tokens` across
    /// `channel_id`." The recipient of this message is `paid_by`; the
    /// payment destination must be `paid_to`.
    PayInvoice {
        /// BOLT-11 payment request.
        invoice: String,
        /// Invoiced amount.
        tokens: Tokens,
        /// Channel the payment must traverse.
        channel_id: ChannelId,
        /// LN public key the payment must terminate at (the requester).
        paid_to: LnPublicKey,
        /// LN public key of the node expected to pay (the recipient of
        /// this message).
        paid_by: LnPublicKey,
    },

    /// Outcome of a pay attempt, echoing the original request fields.
    PaymentResult {
        /// BOLT-11 payment request from the original `payInvoice`.
        invoice: String,
        /// Invoiced amount from the original `payInvoice`.
        tokens: Tokens,
        /// Channel from the original `payInvoice`.
        channel_id: ChannelId,
        /// Destination from the original `payInvoice`.
        paid_to: LnPublicKey,
        /// Payer from the original `payInvoice`.
        paid_by: LnPublicKey,
        /// Whether the payment settled.
        confirmed: bool,
        /// Backend payment identifier, when an attempt was made.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payment_id: Option<String>,
        /// Settlement time, when confirmed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confirmed_at: Option<Timestamp>,
        /// Rejection or failure reason, when not confirmed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        /// When the requester may try again, for window-based
        /// rejections.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_at: Option<Timestamp>,
    },
}

impl PeerMessage {
    /// Short name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::PayInvoice { .. } => "payInvoice",
            Self::PaymentResult { .. } => "paymentResult",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
