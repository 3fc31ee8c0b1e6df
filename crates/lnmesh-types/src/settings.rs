//! Rebalance tuning settings with sensible defaults.
//!
//! All operational parameters for the watcher and the limits machinery
//! are centralized here. Fractional settings (`balance_point`,
//! `deadzone`) are resolved to parts-per-million at load time so that
//! every balance comparison downstream stays in integer arithmetic.

use std::collections::HashMap;
use std::time::Duration;

use crate::{ChannelId, LnMeshError, Result, Tokens};

/// One million — the denominator of all ppm-resolved fractions.
pub const PPM_SCALE: u32 = 1_000_000;

// ---------------------------------------------------------------------------
// Duration strings
// ---------------------------------------------------------------------------

/// Parses a duration string of the form `<n><unit>` where unit is one
/// of `ms`, `s`, `m`, `h`, `d` (e.g. `"30m"`, `"1d"`, `"45s"`).
///
/// # Errors
///
/// Returns [`LnMeshError::Config`] on an unknown unit, a non-numeric
/// count, or a zero duration.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();

    let unit_start = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| LnMeshError::Config {
            reason: format!("duration '{trimmed}' is missing a unit (ms, s, m, h, d)"),
        })?;

    let (count_str, unit) = trimmed.split_at(unit_start);
    let count: u64 = count_str.parse().map_err(|_| LnMeshError::Config {
        reason: format!("duration '{trimmed}' has a non-numeric count"),
    })?;

    let millis = match unit {
        "ms" => count,
        "s" => count.saturating_mul(1_000),
        "m" => count.saturating_mul(60_000),
        "h" => count.saturating_mul(3_600_000),
        "d" => count.saturating_mul(86_400_000),
        other => {
            return Err(LnMeshError::Config {
                reason: format!("duration '{trimmed}' has unknown unit '{other}'"),
            });
        }
    };

    if millis == 0 {
        return Err(LnMeshError::Config {
            reason: format!("duration '{trimmed}' must be greater than zero"),
        });
    }

    Ok(Duration::from_millis(millis))
}

/// Converts a fraction in `0.0..=1.0` to parts-per-million.
///
/// This is the only place a float touches balance configuration; after
/// this call everything is integer.
///
/// # Errors
///
/// Returns [`LnMeshError::Config`] if the value is not a finite number
/// in `0.0..=1.0`.
pub fn ppm_from_fraction(fraction: f64) -> Result<u32> {
    if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
        return Err(LnMeshError::Config {
            reason: format!("fraction {fraction} must be within 0.0..=1.0"),
        });
    }
    Ok((fraction * f64::from(PPM_SCALE)).round() as u32)
}

// ---------------------------------------------------------------------------
// RebalanceSettings
// ---------------------------------------------------------------------------

/// Fully resolved tuning for one channel (or the alias-wide default).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RebalanceSettings {
    /// Seconds between watcher ticks.
    pub refresh_rate: Duration,

    /// Target local share of channel capacity, in ppm.
    pub balance_point_ppm: u32,

    /// Hysteresis band below the balance point, in ppm. A channel is
    /// only considered out of balance once the local share falls below
    /// `balance_point − deadzone`.
    pub deadzone_ppm: u32,

    /// Hard cap on a single rebalance invoice.
    pub max_transaction_size: Tokens,

    /// Cooldown between rebalance dispatches on the same channel.
    pub min_time_between_payments: Duration,

    /// Length of the payer-side limits window.
    pub limits_period: Duration,

    /// `true`: the window slides (`now − period`). `false`: fixed
    /// windows aligned to multiples of the period since the epoch.
    pub use_rolling_limits_period: bool,

    /// Maximum invoices paid per window.
    pub max_transactions_per_period: u32,

    /// Maximum total tokens paid per window.
    pub max_amount_per_period: Tokens,
}

impl Default for RebalanceSettings {
    fn default() -> Self {
        Self {
            refresh_rate: Duration::from_secs(60),
            balance_point_ppm: 500_000,
            deadzone_ppm: 50_000,
            max_transaction_size: Tokens::new(500_000),
            min_time_between_payments: Duration::from_secs(30 * 60),
            limits_period: Duration::from_secs(24 * 60 * 60),
            use_rolling_limits_period: true,
            max_transactions_per_period: 4,
            max_amount_per_period: Tokens::new(1_000_000),
        }
    }
}

impl RebalanceSettings {
    /// The effective threshold below which a channel is out of
    /// balance: `balance_point − deadzone`, clamped to `0..=PPM_SCALE`.
    pub fn rebalance_threshold_ppm(&self) -> u32 {
        self.balance_point_ppm
            .saturating_sub(self.deadzone_ppm)
            .min(PPM_SCALE)
    }

    /// Validates all settings values.
    ///
    /// # Errors
    ///
    /// Returns [`LnMeshError::Config`] if any value is outside its
    /// acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_rate.is_zero() {
            return Err(LnMeshError::Config {
                reason: "refresh_rate must be greater than zero".into(),
            });
        }
        if self.balance_point_ppm > PPM_SCALE {
            return Err(LnMeshError::Config {
                reason: "balance_point must be within 0.0..=1.0".into(),
            });
        }
        if self.deadzone_ppm > PPM_SCALE {
            return Err(LnMeshError::Config {
                reason: "deadzone must be within 0.0..=1.0".into(),
            });
        }
        if self.max_transaction_size.is_zero() {
            return Err(LnMeshError::Config {
                reason: "max_transaction_size must be greater than zero".into(),
            });
        }
        if self.min_time_between_payments.is_zero() {
            return Err(LnMeshError::Config {
                reason: "min_time_between_payments must be greater than zero".into(),
            });
        }
        if self.limits_period.is_zero() {
            return Err(LnMeshError::Config {
                reason: "limits_period must be greater than zero".into(),
            });
        }
        if self.max_transactions_per_period == 0 {
            return Err(LnMeshError::Config {
                reason: "max_transactions_per_period must be greater than zero".into(),
            });
        }
        if self.max_amount_per_period.is_zero() {
            return Err(LnMeshError::Config {
                reason: "max_amount_per_period must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SettingsMap
// ---------------------------------------------------------------------------

/// Alias-wide defaults plus per-channel overrides.
///
/// The watcher resolves settings per channel: an override wins whole
/// (no field-level merging); otherwise the alias default applies.
#[derive(Clone, Debug, Default)]
pub struct SettingsMap {
    defaults: RebalanceSettings,
    per_channel: HashMap<ChannelId, RebalanceSettings>,
}

impl SettingsMap {
    /// Creates a map with the given alias-wide defaults.
    pub fn new(defaults: RebalanceSettings) -> Self {
        Self {
            defaults,
            per_channel: HashMap::new(),
        }
    }

    /// Installs an override for a single channel.
    pub fn set_channel_override(&mut self, channel: ChannelId, settings: RebalanceSettings) {
        self.per_channel.insert(channel, settings);
    }

    /// Resolves the settings for a channel.
    pub fn for_channel(&self, channel: &ChannelId) -> &RebalanceSettings {
        self.per_channel.get(channel).unwrap_or(&self.defaults)
    }

    /// The alias-wide defaults.
    pub fn defaults(&self) -> &RebalanceSettings {
        &self.defaults
    }

    /// Validates the defaults and every override.
    ///
    /// # Errors
    ///
    /// Returns the first [`LnMeshError::Config`] encountered.
    pub fn validate(&self) -> Result<()> {
        self.defaults.validate()?;
        for (channel, settings) in &self.per_channel {
            settings.validate().map_err(|e| LnMeshError::Config {
                reason: format!("channel {channel}: {e}"),
            })?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("45s")?, Duration::from_secs(45));
        assert_eq!(parse_duration("30m")?, Duration::from_secs(1_800));
        assert_eq!(parse_duration("2h")?, Duration::from_secs(7_200));
        assert_eq!(parse_duration("1d")?, Duration::from_secs(86_400));
        Ok(())
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("m30").is_err());
        assert!(parse_duration("30w").is_err());
        assert!(parse_duration("0s").is_err());
    }

    #[test]
    fn ppm_from_fraction_bounds() -> Result<()> {
        assert_eq!(ppm_from_fraction(0.0)?, 0);
        assert_eq!(ppm_from_fraction(0.5)?, 500_000);
        assert_eq!(ppm_from_fraction(1.0)?, 1_000_000);
        assert!(ppm_from_fraction(-0.1).is_err());
        assert!(ppm_from_fraction(1.1).is_err());
        assert!(ppm_from_fraction(f64::NAN).is_err());
        Ok(())
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = RebalanceSettings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn threshold_subtracts_deadzone() {
        let settings = RebalanceSettings::default();
        assert_eq!(settings.rebalance_threshold_ppm(), 450_000);
    }

    #[test]
    fn threshold_clamps_at_zero() {
        let settings = RebalanceSettings {
            balance_point_ppm: 40_000,
            deadzone_ppm: 90_000,
            ..RebalanceSettings::default()
        };
        assert_eq!(settings.rebalance_threshold_ppm(), 0);
    }

    #[test]
    fn zero_refresh_rate_rejected() {
        let settings = RebalanceSettings {
            refresh_rate: Duration::ZERO,
            ..RebalanceSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn balance_point_above_one_rejected() {
        let settings = RebalanceSettings {
            balance_point_ppm: PPM_SCALE + 1,
            ..RebalanceSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_max_transactions_rejected() {
        let settings = RebalanceSettings {
            max_transactions_per_period: 0,
            ..RebalanceSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn channel_override_wins_whole() {
        let mut map = SettingsMap::new(RebalanceSettings::default());
        let tuned = RebalanceSettings {
            balance_point_ppm: 700_000,
            ..RebalanceSettings::default()
        };
        let channel = ChannelId::new("123x1x0");
        map.set_channel_override(channel.clone(), tuned.clone());

        assert_eq!(map.for_channel(&channel), &tuned);
        assert_eq!(
            map.for_channel(&ChannelId::new("other")),
            map.defaults()
        );
    }

    #[test]
    fn settings_map_validates_overrides() {
        let mut map = SettingsMap::new(RebalanceSettings::default());
        map.set_channel_override(
            ChannelId::new("bad"),
            RebalanceSettings {
                max_transactions_per_period: 0,
                ..RebalanceSettings::default()
            },
        );
        assert!(map.validate().is_err());
    }
}
