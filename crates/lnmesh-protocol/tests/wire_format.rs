//! Wire-format stability across independently built envelopes.
//!
//! A cluster can mix binaries from different builds; these tests pin
//! the observable wire contract: the envelope field names, the
//! canonical byte form signatures are computed over, and the
//! verification outcomes for cross-secret and stale traffic.

use lnmesh_protocol::canonical::to_canonical_json;
use lnmesh_protocol::envelope::{sign_envelope, verify_envelope, SignedEnvelope};
use lnmesh_protocol::message::PeerMessage;
use lnmesh_types::{ChannelId, ClusterSecret, LnMeshError, LnPublicKey, Timestamp, Tokens};

fn secret(s: &str) -> ClusterSecret {
    ClusterSecret::new(s).expect("secret")
}

fn pubkey(byte: u8) -> LnPublicKey {
    LnPublicKey::new(format!("{byte:02x}").repeat(33))
}

fn pay_invoice() -> PeerMessage {
    PeerMessage::PayInvoice {
        invoice: "lnbc4m1invoice".into(),
        tokens: Tokens::new(400_000),
        channel_id: ChannelId::new("761432x1193x0"),
        paid_to: pubkey(0x02),
        paid_by: pubkey(0x03),
    }
}

const SENDER: &[u8] = b"12D3KooWExampleSenderPeerId";

// ---------------------------------------------------------------------------
// Canonical form is pinned
// ---------------------------------------------------------------------------

#[test]
fn canonical_form_of_pay_invoice_is_stable() {
    let value = serde_json::to_value(pay_invoice()).expect("serialize");
    let canonical = to_canonical_json(&value).expect("canonical");

    // Keys sorted bytewise, no whitespace. Any change here breaks
    // signatures against peers on other builds.
    let expected = format!(
        concat!(
            r#"{{"channelId":"761432x1193x0","invoice":"lnbc4m1invoice","#,
            r#""paidBy":"{}","paidTo":"{}","tokens":400000,"type":"payInvoice"}}"#
        ),
        "03".repeat(33),
        "02".repeat(33),
    );
    assert_eq!(String::from_utf8_lossy(&canonical), expected);
}

// ---------------------------------------------------------------------------
// Envelope survives a JSON print/parse cycle
// ---------------------------------------------------------------------------

#[test]
fn envelope_verifies_after_text_roundtrip() {
    let s = secret("s");
    let now = Timestamp::from_millis(1_700_000_000_000);
    let envelope = sign_envelope(&s, SENDER, &pay_invoice(), now).expect("sign");

    // Over the wire it is text; the far side parses it fresh.
    let text = serde_json::to_string(&envelope).expect("to text");
    let parsed: SignedEnvelope = serde_json::from_str(&text).expect("from text");

    let verified = verify_envelope(&s, SENDER, &parsed, now).expect("verify");
    assert_eq!(verified, pay_invoice());
}

#[test]
fn hand_written_envelope_text_parses() {
    // The envelope layout itself, as another implementation would
    // emit it.
    let text = r#"{
        "message": {"type": "hello", "publicKey": "02", "alias": "x"},
        "timestamp": 1700000000000,
        "signature": "00ff"
    }"#;
    let parsed: SignedEnvelope = serde_json::from_str(text).expect("parse");
    assert_eq!(parsed.timestamp, Timestamp::from_millis(1_700_000_000_000));
    assert_eq!(parsed.signature, "00ff");
}

// ---------------------------------------------------------------------------
// Signature mismatch between secrets
// ---------------------------------------------------------------------------

#[test]
fn cross_secret_traffic_is_rejected() {
    let now = Timestamp::from_millis(1_700_000_000_000);
    let envelope = sign_envelope(&secret("s'"), SENDER, &pay_invoice(), now).expect("sign");

    let result = verify_envelope(&secret("s"), SENDER, &envelope, now);
    match result {
        Err(LnMeshError::Protocol { reason }) => {
            assert!(reason.contains("signature"), "reason: {reason}");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Stale envelope
// ---------------------------------------------------------------------------

#[test]
fn ten_second_old_envelope_is_rejected() {
    let s = secret("s");
    let sent = Timestamp::from_millis(1_700_000_000_000);
    let envelope = sign_envelope(&s, SENDER, &pay_invoice(), sent).expect("sign");

    let now = sent.plus(std::time::Duration::from_secs(10));
    let result = verify_envelope(&s, SENDER, &envelope, now);
    match result {
        Err(LnMeshError::Protocol { reason }) => {
            assert!(reason.contains("stale"), "reason: {reason}");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Replayed envelope with a rewritten timestamp fails the tag
// ---------------------------------------------------------------------------

#[test]
fn timestamp_rewrite_invalidates_signature() {
    let s = secret("s");
    let sent = Timestamp::from_millis(1_700_000_000_000);
    let mut envelope = sign_envelope(&s, SENDER, &pay_invoice(), sent).expect("sign");

    // An attacker refreshing the timestamp to dodge the freshness
    // window changes the signed bytes.
    envelope.timestamp = sent.plus(std::time::Duration::from_secs(3600));
    let now = envelope.timestamp;
    assert!(verify_envelope(&s, SENDER, &envelope, now).is_err());
}
