//! Scripted in-memory [`LnClient`] for tests.
//!
//! The mock holds a mutable channel list, an invoice registry, and a
//! configurable pay outcome, and records every pay call so tests can
//! assert on the money path without a Lightning node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use lnmesh_types::{LnMeshError, LnPublicKey, Result, Timestamp, Tokens};

use crate::client::{
    Channel, CreateInvoice, DecodedPaymentRequest, Invoice, LnClient, PayRequest, Payment,
    WalletInfo,
};

// ---------------------------------------------------------------------------
// PayOutcome
// ---------------------------------------------------------------------------

/// What the next `pay` calls should do.
#[derive(Clone, Debug)]
pub enum PayOutcome {
    /// Settle the payment.
    Confirm,
    /// Fail with the given backend error.
    Fail(String),
}

// ---------------------------------------------------------------------------
// MockLnClient
// ---------------------------------------------------------------------------

struct MockState {
    wallet: WalletInfo,
    channels: Vec<Channel>,
    invoices: Vec<(String, DecodedPaymentRequest)>,
    pay_outcome: PayOutcome,
    pay_calls: Vec<PayRequest>,
    fail_get_channels: bool,
}

/// Scripted Lightning backend.
pub struct MockLnClient {
    state: Mutex<MockState>,
    invoice_seq: AtomicU64,
}

impl MockLnClient {
    /// Creates a mock whose wallet reports the given identity.
    pub fn new(public_key: LnPublicKey, alias: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MockState {
                wallet: WalletInfo {
                    public_key,
                    alias: alias.into(),
                    version: "mock-0.1".into(),
                },
                channels: Vec::new(),
                invoices: Vec::new(),
                pay_outcome: PayOutcome::Confirm,
                pay_calls: Vec::new(),
                fail_get_channels: false,
            }),
            invoice_seq: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // Mutex poisoning cannot happen here: no closure panics while
        // holding the guard in this mock.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replaces the channel snapshot returned by `get_channels`.
    pub fn set_channels(&self, channels: Vec<Channel>) {
        self.lock().channels = channels;
    }

    /// Registers a foreign invoice so `decode_payment_request` can
    /// resolve it (e.g. an invoice created on another node's mock).
    pub fn register_invoice(&self, request: impl Into<String>, decoded: DecodedPaymentRequest) {
        self.lock().invoices.push((request.into(), decoded));
    }

    /// Configures the outcome of subsequent `pay` calls.
    pub fn set_pay_outcome(&self, outcome: PayOutcome) {
        self.lock().pay_outcome = outcome;
    }

    /// Makes the next `get_channels` calls fail, for tick-abort tests.
    pub fn set_fail_get_channels(&self, fail: bool) {
        self.lock().fail_get_channels = fail;
    }

    /// Every `PayRequest` seen so far, in call order.
    pub fn pay_calls(&self) -> Vec<PayRequest> {
        self.lock().pay_calls.clone()
    }
}

#[async_trait]
impl LnClient for MockLnClient {
    async fn get_wallet_info(&self) -> Result<WalletInfo> {
        Ok(self.lock().wallet.clone())
    }

    async fn get_channels(&self) -> Result<Vec<Channel>> {
        let state = self.lock();
        if state.fail_get_channels {
            return Err(LnMeshError::Collaborator {
                reason: "mock: get_channels failure injected".into(),
            });
        }
        Ok(state.channels.clone())
    }

    async fn create_invoice(&self, params: CreateInvoice) -> Result<Invoice> {
        let seq = self.invoice_seq.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        let request = format!("lnmock1{}x{seq}", state.wallet.alias);
        let destination = state.wallet.public_key.clone();
        state.invoices.push((
            request.clone(),
            DecodedPaymentRequest {
                tokens: params.tokens,
                destination,
                description: Some(params.description),
                expires_at: Some(params.expires_at),
            },
        ));
        Ok(Invoice { request })
    }

    async fn decode_payment_request(&self, request: &str) -> Result<DecodedPaymentRequest> {
        self.lock()
            .invoices
            .iter()
            .find(|(known, _)| known == request)
            .map(|(_, decoded)| decoded.clone())
            .ok_or_else(|| LnMeshError::Collaborator {
                reason: format!("mock: cannot decode unknown payment request '{request}'"),
            })
    }

    async fn pay(&self, params: PayRequest) -> Result<Payment> {
        let mut state = self.lock();
        state.pay_calls.push(params.clone());
        match state.pay_outcome.clone() {
            PayOutcome::Confirm => Ok(Payment {
                id: format!("payment-{}", state.pay_calls.len()),
                is_confirmed: true,
                confirmed_at: Some(Timestamp::now()),
            }),
            PayOutcome::Fail(reason) => Err(LnMeshError::Collaborator { reason }),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel builder
// ---------------------------------------------------------------------------

/// Builds a plain active public channel for tests.
pub fn test_channel(
    id: &str,
    partner: &LnPublicKey,
    local: u64,
    remote: u64,
    capacity: u64,
) -> Channel {
    Channel {
        id: id.into(),
        partner_public_key: partner.clone(),
        local_balance: Tokens::new(local),
        remote_balance: Tokens::new(remote),
        capacity: Tokens::new(capacity),
        is_active: true,
        is_opening: false,
        is_closing: false,
        is_private: false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
