//! CLI argument parsing and config file support.
//!
//! The daemon can be configured via CLI flags, a JSON config file, or
//! a combination of both (CLI overrides config file). The cluster
//! secret may also come from `LNMESH_CLUSTER_SECRET`; a missing
//! secret is fatal at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lnmesh_network::config::MeshConfig;
use lnmesh_types::settings::{
    parse_duration, ppm_from_fraction, RebalanceSettings, SettingsMap,
};
use lnmesh_types::{ChannelId, ClusterSecret, LnMeshError, Result, Tokens};

/// Environment variable consulted when no secret is configured.
pub const SECRET_ENV: &str = "LNMESH_CLUSTER_SECRET";

// ---------------------------------------------------------------------------
// CLI arguments (manual parsing, no clap dependency)
// ---------------------------------------------------------------------------

/// Parsed command-line arguments.
#[derive(Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub secret: Option<String>,
    pub listen_addr: Option<String>,
    pub dial_peers: Vec<String>,
    pub no_mdns: bool,
    pub dev_backend: bool,
    pub alias: Option<String>,
}

impl CliArgs {
    /// Parses CLI arguments from an iterator (first element skipped,
    /// matching `std::env::args`).
    pub fn parse(args: impl IntoIterator<Item = String>) -> std::result::Result<Self, String> {
        let args: Vec<String> = args.into_iter().collect();
        let mut cli = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    i += 1;
                    cli.config_path = args.get(i).map(PathBuf::from);
                }
                "--secret" => {
                    i += 1;
                    cli.secret = args.get(i).cloned();
                }
                "--listen" => {
                    i += 1;
                    cli.listen_addr = args.get(i).cloned();
                }
                "--dial" => {
                    i += 1;
                    if let Some(addr) = args.get(i) {
                        cli.dial_peers.push(addr.clone());
                    }
                }
                "--no-mdns" => {
                    cli.no_mdns = true;
                }
                "--dev-backend" => {
                    cli.dev_backend = true;
                }
                "--alias" => {
                    i += 1;
                    cli.alias = args.get(i).cloned();
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                other => {
                    return Err(format!(
                        "unknown argument: {other}\nuse --help for usage information"
                    ));
                }
            }
            i += 1;
        }

        Ok(cli)
    }
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// Per-channel (or alias-wide) tuning as written in the config file.
/// Absent fields inherit from the level above.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RebalanceSettingsFile {
    pub refresh_rate: Option<String>,
    pub balance_point: Option<f64>,
    pub deadzone: Option<f64>,
    pub max_transaction_size: Option<u64>,
    pub min_time_between_payments: Option<String>,
    pub limits_period: Option<String>,
    pub use_rolling_limits_period: Option<bool>,
    pub max_transactions_per_period: Option<u32>,
    pub max_amount_per_period: Option<u64>,
}

impl RebalanceSettingsFile {
    /// Resolves against a base: present fields override, absent
    /// fields inherit.
    pub fn resolve(&self, base: &RebalanceSettings) -> Result<RebalanceSettings> {
        let mut settings = base.clone();

        if let Some(ref raw) = self.refresh_rate {
            settings.refresh_rate = parse_duration(raw)?;
        }
        if let Some(fraction) = self.balance_point {
            settings.balance_point_ppm = ppm_from_fraction(fraction)?;
        }
        if let Some(fraction) = self.deadzone {
            settings.deadzone_ppm = ppm_from_fraction(fraction)?;
        }
        if let Some(size) = self.max_transaction_size {
            settings.max_transaction_size = Tokens::new(size);
        }
        if let Some(ref raw) = self.min_time_between_payments {
            settings.min_time_between_payments = parse_duration(raw)?;
        }
        if let Some(ref raw) = self.limits_period {
            settings.limits_period = parse_duration(raw)?;
        }
        if let Some(rolling) = self.use_rolling_limits_period {
            settings.use_rolling_limits_period = rolling;
        }
        if let Some(max) = self.max_transactions_per_period {
            settings.max_transactions_per_period = max;
        }
        if let Some(max) = self.max_amount_per_period {
            settings.max_amount_per_period = Tokens::new(max);
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// JSON config file format.
///
/// Example `lnmesh.json`:
/// ```json
/// {
///   "cluster_secret": "shared-secret",
///   "listen_addr": "/ip4/0.0.0.0/tcp/9801",
///   "dial_peers": ["/ip4/10.0.0.2/tcp/9801"],
///   "enable_mdns": true,
///   "rebalance": { "balance_point": 0.5, "deadzone": 0.05 },
///   "channels": {
///     "761432x1193x0": { "balance_point": 0.7 }
///   }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DaemonConfigFile {
    pub cluster_secret: Option<String>,
    pub listen_addr: Option<String>,
    pub dial_peers: Option<Vec<String>>,
    pub enable_mdns: Option<bool>,
    pub rebalance: Option<RebalanceSettingsFile>,
    pub channels: Option<HashMap<String, RebalanceSettingsFile>>,
    pub dev_backend: Option<bool>,
    pub alias: Option<String>,
}

impl DaemonConfigFile {
    /// Loads and parses the file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| LnMeshError::Config {
            reason: format!("failed to read config file {}: {e}", path.display()),
        })?;
        serde_json::from_str(&text).map_err(|e| LnMeshError::Config {
            reason: format!("invalid config JSON: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// Fully resolved daemon configuration.
pub struct DaemonConfig {
    pub secret: ClusterSecret,
    pub mesh: MeshConfig,
    pub settings: SettingsMap,
    pub dev_backend: bool,
    pub alias: String,
}

impl DaemonConfig {
    /// Resolves file + CLI + environment into a validated config.
    ///
    /// Precedence, highest first: CLI, config file, environment (for
    /// the secret), defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LnMeshError::Config`] if the secret is missing, an
    /// address does not parse, or any tuning value is out of range.
    pub fn resolve(file: DaemonConfigFile, cli: &CliArgs) -> Result<Self> {
        // Secret: CLI > file > environment. Missing is fatal.
        let raw_secret = cli
            .secret
            .clone()
            .or(file.cluster_secret)
            .or_else(|| std::env::var(SECRET_ENV).ok())
            .ok_or_else(|| LnMeshError::Config {
                reason: format!(
                    "no cluster secret configured (use --secret, the config file, or {SECRET_ENV})"
                ),
            })?;
        let secret = ClusterSecret::new(raw_secret)?;

        // Mesh config.
        let mut mesh = MeshConfig::default();
        if let Some(raw) = cli.listen_addr.clone().or(file.listen_addr) {
            mesh.listen_addr = raw.parse().map_err(|e| LnMeshError::Config {
                reason: format!("invalid listen address '{raw}': {e}"),
            })?;
        }
        let mut dial_raw = file.dial_peers.unwrap_or_default();
        dial_raw.extend(cli.dial_peers.iter().cloned());
        for raw in dial_raw {
            let addr = raw.parse().map_err(|e| LnMeshError::Config {
                reason: format!("invalid dial address '{raw}': {e}"),
            })?;
            mesh.dial_peers.push(addr);
        }
        if cli.no_mdns {
            mesh.enable_mdns = false;
        } else if let Some(enable) = file.enable_mdns {
            mesh.enable_mdns = enable;
        }
        mesh.validate()?;

        // Rebalance settings: alias-wide defaults, then per-channel
        // overrides resolved against them.
        let defaults = file
            .rebalance
            .unwrap_or_default()
            .resolve(&RebalanceSettings::default())?;
        let mut settings = SettingsMap::new(defaults.clone());
        for (channel, overrides) in file.channels.unwrap_or_default() {
            settings.set_channel_override(ChannelId::new(channel), overrides.resolve(&defaults)?);
        }
        settings.validate()?;

        Ok(Self {
            secret,
            mesh,
            settings,
            dev_backend: cli.dev_backend || file.dev_backend.unwrap_or(false),
            alias: cli
                .alias
                .clone()
                .or(file.alias)
                .unwrap_or_else(|| "lnmesh".into()),
        })
    }
}

// ---------------------------------------------------------------------------
// Help text
// ---------------------------------------------------------------------------

fn print_help() {
    println!(
        r#"lnmesh-daemon - cluster channel rebalancing node

USAGE:
    lnmesh-daemon [OPTIONS]

OPTIONS:
    --config <PATH>      Load settings from JSON config file
    --secret <SECRET>    Cluster secret (or set {SECRET_ENV})
    --listen <MULTIADDR> Mesh listen address (default: /ip4/0.0.0.0/tcp/0)
    --dial <MULTIADDR>   Dial a cluster member on startup (repeatable)
    --no-mdns            Disable mDNS local discovery
    --dev-backend        Use the in-memory dev Lightning backend
    --alias <NAME>       Node alias for the dev backend
    -h, --help           Show this help

ENVIRONMENT:
    {SECRET_ENV}    Cluster secret
    RUST_LOG                 Log level filter (default: info)
"#
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("lnmesh-daemon")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn cli_parses_flags() {
        let cli = CliArgs::parse(args(&[
            "--secret",
            "s",
            "--listen",
            "/ip4/0.0.0.0/tcp/9801",
            "--dial",
            "/ip4/10.0.0.2/tcp/9801",
            "--no-mdns",
        ]))
        .expect("parse");

        assert_eq!(cli.secret.as_deref(), Some("s"));
        assert_eq!(cli.dial_peers.len(), 1);
        assert!(cli.no_mdns);
    }

    #[test]
    fn cli_rejects_unknown_flag() {
        assert!(CliArgs::parse(args(&["--frobnicate"])).is_err());
    }

    #[test]
    fn missing_secret_is_fatal() {
        // No CLI secret, no file secret; the env var may leak in from
        // the test environment, so only assert when it is unset.
        if std::env::var(SECRET_ENV).is_ok() {
            return;
        }
        let result = DaemonConfig::resolve(DaemonConfigFile::default(), &CliArgs::default());
        assert!(matches!(result, Err(LnMeshError::Config { .. })));
    }

    #[test]
    fn cli_secret_wins_over_file() -> Result<()> {
        let file = DaemonConfigFile {
            cluster_secret: Some("from-file".into()),
            ..DaemonConfigFile::default()
        };
        let cli = CliArgs {
            secret: Some("from-cli".into()),
            ..CliArgs::default()
        };
        let config = DaemonConfig::resolve(file, &cli)?;
        assert_eq!(config.secret.as_bytes(), b"from-cli");
        Ok(())
    }

    #[test]
    fn settings_overrides_resolve_per_channel() -> Result<()> {
        let mut channels = HashMap::new();
        channels.insert(
            "761432x1193x0".to_string(),
            RebalanceSettingsFile {
                balance_point: Some(0.7),
                ..RebalanceSettingsFile::default()
            },
        );
        let file = DaemonConfigFile {
            cluster_secret: Some("s".into()),
            rebalance: Some(RebalanceSettingsFile {
                deadzone: Some(0.1),
                ..RebalanceSettingsFile::default()
            }),
            channels: Some(channels),
            ..DaemonConfigFile::default()
        };

        let config = DaemonConfig::resolve(file, &CliArgs::default())?;
        let tuned = config
            .settings
            .for_channel(&ChannelId::new("761432x1193x0"));
        // Channel override on balance_point, inherited deadzone.
        assert_eq!(tuned.balance_point_ppm, 700_000);
        assert_eq!(tuned.deadzone_ppm, 100_000);
        assert_eq!(config.settings.defaults().balance_point_ppm, 500_000);
        Ok(())
    }

    #[test]
    fn invalid_fraction_in_file_rejected() {
        let file = DaemonConfigFile {
            cluster_secret: Some("s".into()),
            rebalance: Some(RebalanceSettingsFile {
                balance_point: Some(1.5),
                ..RebalanceSettingsFile::default()
            }),
            ..DaemonConfigFile::default()
        };
        assert!(DaemonConfig::resolve(file, &CliArgs::default()).is_err());
    }

    #[test]
    fn config_file_json_parses() -> Result<()> {
        let json = r#"{
            "cluster_secret": "s",
            "listen_addr": "/ip4/0.0.0.0/tcp/9801",
            "rebalance": { "balance_point": 0.5, "min_time_between_payments": "30m" },
            "channels": { "761432x1193x0": { "max_transaction_size": 250000 } }
        }"#;
        let file: DaemonConfigFile =
            serde_json::from_str(json).map_err(|e| LnMeshError::Config {
                reason: e.to_string(),
            })?;
        let config = DaemonConfig::resolve(file, &CliArgs::default())?;
        assert_eq!(
            config
                .settings
                .for_channel(&ChannelId::new("761432x1193x0"))
                .max_transaction_size,
            Tokens::new(250_000)
        );
        Ok(())
    }
}
