//! The [`LnClient`] trait and its data types.
//!
//! Token amounts are integer satoshis throughout ([`Tokens`]); the
//! backend is responsible for any msat conversion. All calls are
//! suspension points — callers must not cache channel state across an
//! `await` (see the registry).

use async_trait::async_trait;
use lnmesh_types::{ChannelId, LnPublicKey, Result, Timestamp, Tokens};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Identity of the local Lightning node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletInfo {
    /// LN public key of the local node.
    pub public_key: LnPublicKey,
    /// Human-readable node alias.
    pub alias: String,
    /// Backend version string.
    pub version: String,
}

/// One payment channel as reported by the backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Channel {
    /// Channel identifier.
    pub id: ChannelId,
    /// LN public key of the far end.
    pub partner_public_key: LnPublicKey,
    /// Tokens on our side.
    pub local_balance: Tokens,
    /// Tokens on the partner's side.
    pub remote_balance: Tokens,
    /// Total channel capacity. `local + remote <= capacity` (the
    /// difference is the commitment reserve and in-flight HTLCs).
    pub capacity: Tokens,
    /// Channel is open and usable.
    pub is_active: bool,
    /// Funding not yet confirmed.
    pub is_opening: bool,
    /// Cooperative or forced close in progress.
    pub is_closing: bool,
    /// Unannounced channel.
    pub is_private: bool,
}

/// Parameters for invoice creation.
#[derive(Clone, Debug)]
pub struct CreateInvoice {
    /// Invoice description (memo).
    pub description: String,
    /// Absolute expiry time.
    pub expires_at: Timestamp,
    /// Invoiced amount.
    pub tokens: Tokens,
}

/// A freshly created invoice.
#[derive(Clone, Debug)]
pub struct Invoice {
    /// BOLT-11 payment request.
    pub request: String,
}

/// Decoded fields of a BOLT-11 payment request.
#[derive(Clone, Debug)]
pub struct DecodedPaymentRequest {
    /// Invoiced amount.
    pub tokens: Tokens,
    /// Destination node.
    pub destination: LnPublicKey,
    /// Invoice description, when present.
    pub description: Option<String>,
    /// Invoice expiry, when present.
    pub expires_at: Option<Timestamp>,
}

/// Parameters for paying an invoice.
#[derive(Clone, Debug)]
pub struct PayRequest {
    /// BOLT-11 payment request to pay.
    pub request: String,
    /// The payment must leave through this channel.
    pub outgoing_channel: ChannelId,
}

/// Outcome of a pay attempt.
#[derive(Clone, Debug)]
pub struct Payment {
    /// Backend payment identifier.
    pub id: String,
    /// Whether the payment settled.
    pub is_confirmed: bool,
    /// Settlement time, when confirmed.
    pub confirmed_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// LnClient
// ---------------------------------------------------------------------------

/// Contract between the node core and the Lightning backend.
///
/// Implementations must be shareable across the event loop and any
/// helper tasks (`Send + Sync`); lnmesh holds them behind an
/// `Arc<dyn LnClient>`.
#[async_trait]
pub trait LnClient: Send + Sync {
    /// Returns the local node identity.
    async fn get_wallet_info(&self) -> Result<WalletInfo>;

    /// Returns the current channel list. Each call is a fresh
    /// snapshot; no entity identity is preserved between calls.
    async fn get_channels(&self) -> Result<Vec<Channel>>;

    /// Creates a BOLT-11 invoice.
    async fn create_invoice(&self, params: CreateInvoice) -> Result<Invoice>;

    /// Decodes a BOLT-11 payment request without paying it.
    async fn decode_payment_request(&self, request: &str) -> Result<DecodedPaymentRequest>;

    /// Pays an invoice, pinned to the given outgoing channel.
    async fn pay(&self, params: PayRequest) -> Result<Payment>;
}
