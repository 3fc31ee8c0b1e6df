//! Append-only transaction audit log.
//!
//! Every rebalance leaves entries here: `Pending` on the requester at
//! dispatch, `Complete`/`Failed` on the payer after the pay attempt
//! and on the requester when the result arrives. Entries are never
//! mutated — an outcome is a new entry, not an update — which is what
//! makes the rolling-window queries trustworthy.

use lnmesh_types::{ChannelId, LnPublicKey, Timestamp, Tokens};

// ---------------------------------------------------------------------------
// AuditState
// ---------------------------------------------------------------------------

/// Lifecycle state recorded in an audit entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuditState {
    /// Requester side: dispatched, outcome unknown.
    Pending,
    /// Payment settled.
    Complete,
    /// Payment was attempted (or requested) and did not settle.
    Failed,
}

impl std::fmt::Display for AuditState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// One recorded transaction.
#[derive(Clone, Debug)]
pub struct AuditEntry {
    /// LN node that pays (the responder of the exchange).
    pub paid_by: LnPublicKey,
    /// LN node being paid (the requester of the exchange).
    pub paid_to: LnPublicKey,
    /// Channel the rebalance crosses.
    pub channel_id: ChannelId,
    /// Invoiced amount.
    pub tokens: Tokens,
    /// BOLT-11 payment request.
    pub invoice: String,
    /// Entry state.
    pub state: AuditState,
    /// When the entry was appended.
    pub created_at: Timestamp,
    /// Settlement or failure time, where known.
    pub resolved_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

/// In-memory append-only log.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn add(&mut self, entry: AuditEntry) {
        tracing::debug!(
            paid_by = %entry.paid_by,
            channel = %entry.channel_id,
            tokens = %entry.tokens,
            state = %entry.state,
            "audit entry"
        );
        self.entries.push(entry);
    }

    /// Entries with the given payer created at or after `since`.
    /// This is the query the rolling limits run.
    pub fn filter(&self, paid_by: &LnPublicKey, since: Timestamp) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| &e.paid_by == paid_by && e.created_at >= since)
            .collect()
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn pubkey(byte: u8) -> LnPublicKey {
        LnPublicKey::new(format!("{byte:02x}").repeat(33))
    }

    fn entry(paid_by: &LnPublicKey, created_ms: i64, tokens: u64) -> AuditEntry {
        AuditEntry {
            paid_by: paid_by.clone(),
            paid_to: pubkey(0x09),
            channel_id: ChannelId::new("c1"),
            tokens: Tokens::new(tokens),
            invoice: "lnbc1...".into(),
            state: AuditState::Complete,
            created_at: Timestamp::from_millis(created_ms),
            resolved_at: Some(Timestamp::from_millis(created_ms)),
        }
    }

    #[test]
    fn filter_by_payer_and_window() {
        let mut log = AuditLog::new();
        let alice = pubkey(0x02);
        let bob = pubkey(0x03);

        log.add(entry(&alice, 1_000, 10));
        log.add(entry(&alice, 5_000, 20));
        log.add(entry(&bob, 6_000, 30));

        let recent = log.filter(&alice, Timestamp::from_millis(2_000));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].tokens, Tokens::new(20));
    }

    #[test]
    fn filter_window_is_inclusive() {
        let mut log = AuditLog::new();
        let alice = pubkey(0x02);
        log.add(entry(&alice, 5_000, 10));

        assert_eq!(log.filter(&alice, Timestamp::from_millis(5_000)).len(), 1);
        assert_eq!(log.filter(&alice, Timestamp::from_millis(5_001)).len(), 0);
    }

    #[test]
    fn entries_are_append_only_in_order() {
        let mut log = AuditLog::new();
        let alice = pubkey(0x02);
        log.add(entry(&alice, 1, 1));
        log.add(entry(&alice, 2, 2));

        let all = log.entries();
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at < all[1].created_at);
    }
}
