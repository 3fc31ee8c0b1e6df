//! Rate limiting: per-channel cooldowns and per-node window limits.
//!
//! Two independent gates protect the money path:
//!
//! - **Cooldown blocks** (requester side): once a rebalance is
//!   dispatched on a channel, no further dispatch happens on it until
//!   the block expires, is cleared by a confirmed result, or is pushed
//!   out to the `retry_at` a rejection carried. The block is inserted
//!   *before* the outbound write, so two back-to-back ticks can never
//!   both fire.
//! - **Window limits** (payer side): a transaction-count and amount
//!   ceiling over the audit log in a rolling or fixed window.

use std::collections::HashMap;

use lnmesh_types::settings::RebalanceSettings;
use lnmesh_types::{ChannelId, LnMeshError, LnPublicKey, Result, Timestamp, Tokens};

use crate::audit::AuditLog;

// ---------------------------------------------------------------------------
// RebalanceBlocks
// ---------------------------------------------------------------------------

/// Active cooldown entries, one per channel at most.
#[derive(Debug, Default)]
pub struct RebalanceBlocks {
    blocks: HashMap<ChannelId, Timestamp>,
}

impl RebalanceBlocks {
    /// Creates an empty block table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a non-expired block exists for the channel. Expired
    /// entries are dropped on the way through.
    pub fn is_blocked(&mut self, channel: &ChannelId, now: Timestamp) -> bool {
        match self.blocks.get(channel) {
            Some(&until) if until > now => true,
            Some(_) => {
                self.blocks.remove(channel);
                false
            }
            None => false,
        }
    }

    /// Inserts (or overwrites) a block lasting until `until`.
    pub fn insert(&mut self, channel: ChannelId, until: Timestamp) {
        self.blocks.insert(channel, until);
    }

    /// Clears the block for a channel (confirmed result).
    pub fn clear(&mut self, channel: &ChannelId) {
        self.blocks.remove(channel);
    }

    /// Pushes the block out to `retry_at` (window rejection from the
    /// payer). Inserts if no block is live — the remote's window is
    /// authoritative either way.
    pub fn extend(&mut self, channel: ChannelId, retry_at: Timestamp) {
        self.blocks.insert(channel, retry_at);
    }

    /// The `until` of the block on a channel, if one exists
    /// (expired or not).
    pub fn until(&self, channel: &ChannelId) -> Option<Timestamp> {
        self.blocks.get(channel).copied()
    }

    /// Number of block entries (including not-yet-purged expired
    /// ones).
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no blocks exist.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Window limits
// ---------------------------------------------------------------------------

/// Start of the current limits window.
///
/// Rolling: the window slides with `now`. Fixed: windows are aligned
/// to multiples of the period since the epoch, so every node with the
/// same settings agrees on the boundaries.
pub fn window_start(settings: &RebalanceSettings, now: Timestamp) -> Timestamp {
    let period_ms = settings.limits_period.as_millis() as i64;
    if settings.use_rolling_limits_period {
        now.minus(settings.limits_period)
    } else {
        Timestamp::from_millis((now.as_millis() / period_ms) * period_ms)
    }
}

/// Applies the payer-side window limits to a candidate payment.
///
/// Equivalent to:
/// `count(audit, paid_by=self, t ≥ since) < max_transactions ∧
///  sum(amount) + candidate ≤ max_amount`.
///
/// # Errors
///
/// Returns [`LnMeshError::Policy`] naming the violated limit, with
/// `retry_at` set to one past the end of the current window.
pub fn check_window_limits(
    audit: &AuditLog,
    self_key: &LnPublicKey,
    candidate: Tokens,
    settings: &RebalanceSettings,
    now: Timestamp,
) -> Result<()> {
    let since = window_start(settings, now);
    let recent = audit.filter(self_key, since);

    let retry_at = since
        .plus(settings.limits_period)
        .plus(std::time::Duration::from_millis(1));

    if recent.len() >= settings.max_transactions_per_period as usize {
        return Err(LnMeshError::Policy {
            reason: format!(
                "too many payments in the current window. Limit is {}",
                settings.max_transactions_per_period
            ),
            retry_at: Some(retry_at),
        });
    }

    let paid: u128 = recent.iter().map(|e| u128::from(e.tokens.value())).sum();
    let total = paid + u128::from(candidate.value());
    if total > u128::from(settings.max_amount_per_period.value()) {
        return Err(LnMeshError::Policy {
            reason: format!(
                "payment volume limit for the current window exceeded. Limit is {}",
                settings.max_amount_per_period
            ),
            retry_at: Some(retry_at),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEntry, AuditState};
    use std::time::Duration;

    fn pubkey(byte: u8) -> LnPublicKey {
        LnPublicKey::new(format!("{byte:02x}").repeat(33))
    }

    fn paid_entry(paid_by: &LnPublicKey, created_ms: i64, tokens: u64) -> AuditEntry {
        AuditEntry {
            paid_by: paid_by.clone(),
            paid_to: pubkey(0x09),
            channel_id: ChannelId::new("c1"),
            tokens: Tokens::new(tokens),
            invoice: "lnbc1...".into(),
            state: AuditState::Complete,
            created_at: Timestamp::from_millis(created_ms),
            resolved_at: None,
        }
    }

    fn settings(period_secs: u64, rolling: bool, max_tx: u32, max_amount: u64) -> RebalanceSettings {
        RebalanceSettings {
            limits_period: Duration::from_secs(period_secs),
            use_rolling_limits_period: rolling,
            max_transactions_per_period: max_tx,
            max_amount_per_period: Tokens::new(max_amount),
            ..RebalanceSettings::default()
        }
    }

    // --- blocks ------------------------------------------------------------

    #[test]
    fn block_denies_until_expiry() {
        let mut blocks = RebalanceBlocks::new();
        let channel = ChannelId::new("c1");
        blocks.insert(channel.clone(), Timestamp::from_millis(10_000));

        assert!(blocks.is_blocked(&channel, Timestamp::from_millis(9_999)));
        // `until` itself is not blocked (strictly greater required).
        assert!(!blocks.is_blocked(&channel, Timestamp::from_millis(10_000)));
        // The expired entry was purged.
        assert!(blocks.is_empty());
    }

    #[test]
    fn clear_lifts_block_immediately() {
        let mut blocks = RebalanceBlocks::new();
        let channel = ChannelId::new("c1");
        blocks.insert(channel.clone(), Timestamp::from_millis(10_000));
        blocks.clear(&channel);
        assert!(!blocks.is_blocked(&channel, Timestamp::from_millis(1)));
    }

    #[test]
    fn extend_moves_block_to_retry_at() {
        let mut blocks = RebalanceBlocks::new();
        let channel = ChannelId::new("c1");
        blocks.insert(channel.clone(), Timestamp::from_millis(10_000));
        blocks.extend(channel.clone(), Timestamp::from_millis(60_000));

        assert!(blocks.is_blocked(&channel, Timestamp::from_millis(50_000)));
        assert_eq!(blocks.until(&channel), Some(Timestamp::from_millis(60_000)));
    }

    #[test]
    fn extend_without_live_block_inserts() {
        let mut blocks = RebalanceBlocks::new();
        let channel = ChannelId::new("c1");
        blocks.extend(channel.clone(), Timestamp::from_millis(60_000));
        assert!(blocks.is_blocked(&channel, Timestamp::from_millis(1)));
    }

    // --- window start ------------------------------------------------------

    #[test]
    fn rolling_window_slides_with_now() {
        let s = settings(60, true, 4, 1_000);
        let now = Timestamp::from_millis(1_000_000);
        assert_eq!(window_start(&s, now), Timestamp::from_millis(940_000));
    }

    #[test]
    fn fixed_window_aligns_to_period_multiples() {
        let s = settings(60, false, 4, 1_000);
        // 1_000_000 ms into the epoch, 60_000 ms periods → floor is
        // 960_000.
        let now = Timestamp::from_millis(1_000_000);
        assert_eq!(window_start(&s, now), Timestamp::from_millis(960_000));
        // Anywhere inside the same window agrees.
        let later = Timestamp::from_millis(1_019_999);
        assert_eq!(window_start(&s, later), Timestamp::from_millis(960_000));
    }

    // --- limits ------------------------------------------------------------

    #[test]
    fn under_both_limits_accepted() {
        let mut audit = AuditLog::new();
        let me = pubkey(0x02);
        audit.add(paid_entry(&me, 950_000, 100));

        let s = settings(60, true, 4, 1_000);
        let now = Timestamp::from_millis(1_000_000);
        assert!(check_window_limits(&audit, &me, Tokens::new(100), &s, now).is_ok());
    }

    #[test]
    fn transaction_count_limit_rejects_with_retry_at() {
        let mut audit = AuditLog::new();
        let me = pubkey(0x02);
        for i in 0..4 {
            audit.add(paid_entry(&me, 950_000 + i, 10));
        }

        let s = settings(60, true, 4, 1_000_000);
        let now = Timestamp::from_millis(1_000_000);
        let result = check_window_limits(&audit, &me, Tokens::new(10), &s, now);

        match result {
            Err(LnMeshError::Policy { reason, retry_at }) => {
                assert!(reason.contains("Limit is 4"), "reason: {reason}");
                // since (940_000) + period (60_000) + 1.
                assert_eq!(retry_at, Some(Timestamp::from_millis(1_000_001)));
            }
            other => panic!("expected policy rejection, got {other:?}"),
        }
    }

    #[test]
    fn amount_limit_counts_candidate() {
        let mut audit = AuditLog::new();
        let me = pubkey(0x02);
        audit.add(paid_entry(&me, 950_000, 900));

        let s = settings(60, true, 4, 1_000);
        let now = Timestamp::from_millis(1_000_000);

        // 900 + 100 == limit: allowed (sum + candidate ≤ max).
        assert!(check_window_limits(&audit, &me, Tokens::new(100), &s, now).is_ok());
        // 900 + 101 > limit: rejected.
        let result = check_window_limits(&audit, &me, Tokens::new(101), &s, now);
        assert!(matches!(result, Err(LnMeshError::Policy { .. })));
    }

    #[test]
    fn entries_outside_window_do_not_count() {
        let mut audit = AuditLog::new();
        let me = pubkey(0x02);
        // Old entries, before the window.
        for i in 0..10 {
            audit.add(paid_entry(&me, 1_000 + i, 500));
        }

        let s = settings(60, true, 4, 1_000);
        let now = Timestamp::from_millis(1_000_000);
        assert!(check_window_limits(&audit, &me, Tokens::new(1_000), &s, now).is_ok());
    }

    #[test]
    fn other_payers_do_not_count() {
        let mut audit = AuditLog::new();
        let me = pubkey(0x02);
        let other = pubkey(0x03);
        for i in 0..4 {
            audit.add(paid_entry(&other, 950_000 + i, 10));
        }

        let s = settings(60, true, 4, 1_000);
        let now = Timestamp::from_millis(1_000_000);
        assert!(check_window_limits(&audit, &me, Tokens::new(10), &s, now).is_ok());
    }

    #[test]
    fn fixed_window_resets_at_boundary() {
        let mut audit = AuditLog::new();
        let me = pubkey(0x02);
        // Four payments late in the 940_000..960_000 window... which
        // is the 900_000..960_000 fixed window for 60 s periods.
        for i in 0..4 {
            audit.add(paid_entry(&me, 955_000 + i, 10));
        }

        let s = settings(60, false, 4, 1_000_000);

        // Still inside the same fixed window: rejected.
        let inside = Timestamp::from_millis(959_000);
        assert!(check_window_limits(&audit, &me, Tokens::new(10), &s, inside).is_err());

        // Next fixed window: the old payments no longer count.
        let next = Timestamp::from_millis(960_001);
        assert!(check_window_limits(&audit, &me, Tokens::new(10), &s, next).is_ok());
    }
}
