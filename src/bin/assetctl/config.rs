use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use serde::Deserialize;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Registry contract location.
#[derive(Debug, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub registry_address: Address,
    /// Signing key. When absent the client is read-only.
    pub private_key: Option<String>,
}

/// Account the CLI acts as. Absent means disconnected.
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    pub account: Option<Address>,
}

/// Refresh loop parameters.
#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    /// Reload interval (e.g. "15s", "1m"). Parsed via humantime.
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(15)
}

/// Errors from config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl Config {
    /// Load and validate a config from a TOML file.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.ledger.rpc_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "ledger.rpc_url must be an http(s) URL, got {url:?}"
            )));
        }

        if self.watch.interval.is_zero() {
            return Err(ConfigError::Validation(
                "watch.interval must be greater than zero".into(),
            ));
        }

        // A signing key and an explicit account must describe the same identity.
        if let Some(key) = &self.ledger.private_key {
            let signer: PrivateKeySigner = key
                .parse()
                .map_err(|e| ConfigError::Validation(format!("invalid ledger.private_key: {e}")))?;
            if let Some(account) = self.session.account {
                if account != signer.address() {
                    return Err(ConfigError::Validation(format!(
                        "session.account {account} does not match ledger.private_key address {}",
                        signer.address()
                    )));
                }
            }
        }

        Ok(())
    }

    /// The connected account: explicit `session.account`, else the signer's.
    pub fn account(&self) -> Option<Address> {
        self.session.account.or_else(|| {
            self.ledger
                .private_key
                .as_deref()
                .and_then(|key| key.parse::<PrivateKeySigner>().ok())
                .map(|signer| signer.address())
        })
    }
}
