//! Responder-side acceptance policy, driven request by request.
//!
//! Each test hands a crafted `payInvoice` to the policy pipeline and
//! asserts on the `paymentResult`, the backend calls, and the audit
//! log. No mesh involved — the policy is deterministic given the
//! state and the backend.

use libp2p::PeerId;
use lnmesh_ln::mock::{test_channel, MockLnClient};
use lnmesh_ln::{DecodedPaymentRequest, WalletInfo};
use lnmesh_node::audit::AuditState;
use lnmesh_node::policy::{vet_and_pay, PayInvoiceRequest};
use lnmesh_node::state::ClusterState;
use lnmesh_protocol::message::PeerMessage;
use lnmesh_types::settings::{RebalanceSettings, SettingsMap};
use lnmesh_types::{ChannelId, LnPublicKey, Timestamp, Tokens};

fn pubkey(byte: u8) -> LnPublicKey {
    LnPublicKey::new(format!("{byte:02x}").repeat(33))
}

/// A responder ("bob") with one channel shared with "alice".
fn responder(settings: SettingsMap) -> (ClusterState, MockLnClient) {
    let me = pubkey(0x0b);
    let alice = pubkey(0x0a);
    let ln = MockLnClient::new(me.clone(), "bob");
    ln.set_channels(vec![test_channel("c1", &alice, 900_000, 100_000, 1_000_000)]);

    let state = ClusterState::new(
        settings,
        WalletInfo {
            public_key: me,
            alias: "bob".into(),
            version: "mock-0.1".into(),
        },
        PeerId::random(),
    );
    (state, ln)
}

fn alice() -> LnPublicKey {
    pubkey(0x0a)
}

fn register(ln: &MockLnClient, request: &str, tokens: u64, destination: LnPublicKey) {
    ln.register_invoice(
        request,
        DecodedPaymentRequest {
            tokens: Tokens::new(tokens),
            destination,
            description: None,
            expires_at: Some(Timestamp::now().plus(std::time::Duration::from_secs(30))),
        },
    );
}

fn request(invoice: &str, tokens: u64, channel: &str, paid_to: LnPublicKey) -> PayInvoiceRequest {
    PayInvoiceRequest {
        invoice: invoice.into(),
        tokens: Tokens::new(tokens),
        channel_id: ChannelId::new(channel),
        paid_to,
        paid_by: pubkey(0x0b),
    }
}

fn expect_rejection(result: &PeerMessage, expected_reason: &str) {
    match result {
        PeerMessage::PaymentResult {
            confirmed: false,
            reason: Some(reason),
            payment_id: None,
            ..
        } => assert_eq!(reason, expected_reason),
        other => panic!("expected rejection '{expected_reason}', got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Invoice destination does not match the claim
// ---------------------------------------------------------------------------

#[tokio::test]
async fn destination_mismatch_rejected_without_payment() {
    let (mut state, ln) = responder(SettingsMap::default());

    // The invoice actually pays out to a third party.
    register(&ln, "lnbc1sneaky", 400_000, pubkey(0x0c));
    let result = vet_and_pay(
        &mut state,
        &ln,
        request("lnbc1sneaky", 400_000, "c1", alice()),
    )
    .await;

    expect_rejection(&result, "invalid request");
    assert!(ln.pay_calls().is_empty());
    assert!(state.audit.is_empty());
}

// ---------------------------------------------------------------------------
// Remaining validation steps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn amount_mismatch_rejected() {
    let (mut state, ln) = responder(SettingsMap::default());

    // Invoice says 300k, message claims 400k.
    register(&ln, "lnbc1short", 300_000, alice());
    let result = vet_and_pay(
        &mut state,
        &ln,
        request("lnbc1short", 400_000, "c1", alice()),
    )
    .await;

    expect_rejection(&result, "invalid request");
    assert!(ln.pay_calls().is_empty());
}

#[tokio::test]
async fn unknown_channel_rejected() {
    let (mut state, ln) = responder(SettingsMap::default());

    register(&ln, "lnbc1ghost", 400_000, alice());
    let result = vet_and_pay(
        &mut state,
        &ln,
        request("lnbc1ghost", 400_000, "no-such-channel", alice()),
    )
    .await;

    expect_rejection(&result, "invalid request");
    assert!(ln.pay_calls().is_empty());
}

#[tokio::test]
async fn direction_mismatch_rejected() {
    let (mut state, ln) = responder(SettingsMap::default());

    // Invoice and claim agree on a destination that is NOT the far
    // end of c1: paying it would not cross the named channel.
    let carol = pubkey(0x0c);
    register(&ln, "lnbc1sideways", 400_000, carol.clone());
    let result = vet_and_pay(
        &mut state,
        &ln,
        request("lnbc1sideways", 400_000, "c1", carol),
    )
    .await;

    expect_rejection(&result, "invalid request");
    assert!(ln.pay_calls().is_empty());
}

#[tokio::test]
async fn undecodable_invoice_fails_generically() {
    let (mut state, ln) = responder(SettingsMap::default());

    // Never registered: the backend cannot decode it.
    let result = vet_and_pay(
        &mut state,
        &ln,
        request("lnbc1garbage", 400_000, "c1", alice()),
    )
    .await;

    expect_rejection(&result, "payment failed");
    assert!(ln.pay_calls().is_empty());
    assert!(state.audit.is_empty());
}

// ---------------------------------------------------------------------------
// Window limits at the policy boundary
// ---------------------------------------------------------------------------

#[tokio::test]
async fn limit_rejection_names_limit_and_retry_at() {
    let settings = SettingsMap::new(RebalanceSettings {
        use_rolling_limits_period: false,
        max_transactions_per_period: 1,
        ..RebalanceSettings::default()
    });
    let (mut state, ln) = responder(settings);

    // One settled payment already in the window.
    register(&ln, "lnbc1first", 10_000, alice());
    let first = vet_and_pay(&mut state, &ln, request("lnbc1first", 10_000, "c1", alice())).await;
    assert!(matches!(
        first,
        PeerMessage::PaymentResult { confirmed: true, .. }
    ));

    // The second hits the transaction count limit.
    register(&ln, "lnbc1second", 10_000, alice());
    let second =
        vet_and_pay(&mut state, &ln, request("lnbc1second", 10_000, "c1", alice())).await;

    match second {
        PeerMessage::PaymentResult {
            confirmed: false,
            reason: Some(reason),
            retry_at: Some(retry_at),
            ..
        } => {
            assert!(reason.contains("Limit is 1"), "reason: {reason}");
            assert!(retry_at > Timestamp::now());
        }
        other => panic!("expected limited rejection, got {other:?}"),
    }

    // Only the first attempt reached the backend or the audit log.
    assert_eq!(ln.pay_calls().len(), 1);
    assert_eq!(state.audit.entries().len(), 1);
}

#[tokio::test]
async fn amount_limit_counts_the_candidate() {
    let settings = SettingsMap::new(RebalanceSettings {
        use_rolling_limits_period: false,
        max_amount_per_period: Tokens::new(500_000),
        ..RebalanceSettings::default()
    });
    let (mut state, ln) = responder(settings);

    // 400k settles; 101k more would exceed the 500k window budget.
    register(&ln, "lnbc1big", 400_000, alice());
    let first = vet_and_pay(&mut state, &ln, request("lnbc1big", 400_000, "c1", alice())).await;
    assert!(matches!(
        first,
        PeerMessage::PaymentResult { confirmed: true, .. }
    ));

    register(&ln, "lnbc1more", 101_000, alice());
    let second = vet_and_pay(&mut state, &ln, request("lnbc1more", 101_000, "c1", alice())).await;
    match second {
        PeerMessage::PaymentResult {
            confirmed: false,
            reason: Some(reason),
            ..
        } => assert!(reason.contains("Limit is 500000"), "reason: {reason}"),
        other => panic!("expected limited rejection, got {other:?}"),
    }

    // Exactly at the budget is allowed.
    register(&ln, "lnbc1fits", 100_000, alice());
    let third = vet_and_pay(&mut state, &ln, request("lnbc1fits", 100_000, "c1", alice())).await;
    assert!(matches!(
        third,
        PeerMessage::PaymentResult { confirmed: true, .. }
    ));
}

// ---------------------------------------------------------------------------
// Failed pay attempts still consume window budget
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_attempts_count_against_the_window() {
    let settings = SettingsMap::new(RebalanceSettings {
        use_rolling_limits_period: false,
        max_transactions_per_period: 2,
        ..RebalanceSettings::default()
    });
    let (mut state, ln) = responder(settings);

    ln.set_pay_outcome(lnmesh_ln::mock::PayOutcome::Fail("no route".into()));

    for i in 0..2 {
        let invoice = format!("lnbc1try{i}");
        register(&ln, &invoice, 10_000, alice());
        let result = vet_and_pay(&mut state, &ln, request(&invoice, 10_000, "c1", alice())).await;
        expect_rejection(&result, "payment failed");
    }
    assert_eq!(state.audit.entries().len(), 2);
    assert!(state
        .audit
        .entries()
        .iter()
        .all(|e| e.state == AuditState::Failed));

    // Third attempt is refused by the window, before the backend.
    register(&ln, "lnbc1try2", 10_000, alice());
    let result = vet_and_pay(&mut state, &ln, request("lnbc1try2", 10_000, "c1", alice())).await;
    match result {
        PeerMessage::PaymentResult {
            confirmed: false,
            reason: Some(reason),
            ..
        } => assert!(reason.contains("Limit is 2"), "reason: {reason}"),
        other => panic!("expected limited rejection, got {other:?}"),
    }
    assert_eq!(ln.pay_calls().len(), 2);
}
