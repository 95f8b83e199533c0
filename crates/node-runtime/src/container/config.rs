//! # Node Configuration
//!
//! One TOML file with a section per subsystem, every field optional. After
//! the file is read, `DC_*` environment variables override single values:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DC_P2P_PORT` | `network.port` |
//! | `DC_WS_PORT` | `network.ws_port` |
//! | `DC_MAGIC` | `protocol.magic` |
//! | `DC_SECONDS_PER_BLOCK` | `protocol.seconds_per_block` |
//! | `DC_SEEDS` | `protocol.seed_list`, comma separated |
//! | `DC_VALIDATORS` | `protocol.standby_validators`, comma separated hex |
//! | `DC_PRIVATE_KEY` | `wallet.private_key`, hex |

use dc_01_peer_network::NetworkConfig as PeerNetworkConfig;
use dc_02_ledger::ProtocolSettings;
use dc_05_mempool::MempoolConfig as PoolConfig;
use dc_07_consensus::ConsensusConfig as RoundConfig;
use serde::Deserialize;
use shared_crypto::{KeyPair, PublicKey};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid key {0:?}")]
    InvalidKey(String),

    #[error("no standby validators configured")]
    NoValidators,
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub protocol: ProtocolSection,
    pub network: NetworkSection,
    pub mempool: MempoolSection,
    pub consensus: ConsensusSection,
    pub wallet: WalletSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtocolSection {
    pub magic: u32,
    pub address_version: u8,
    /// Compressed public keys, hex encoded.
    pub standby_validators: Vec<String>,
    pub seed_list: Vec<String>,
    pub seconds_per_block: u32,
    pub memory_pool_max_transactions: usize,
    pub max_free_transactions_per_block: usize,
}

impl Default for ProtocolSection {
    fn default() -> Self {
        let settings = ProtocolSettings::default();
        Self {
            magic: settings.magic,
            address_version: settings.address_version,
            standby_validators: Vec::new(),
            seed_list: Vec::new(),
            seconds_per_block: settings.seconds_per_block,
            memory_pool_max_transactions: settings.memory_pool_max_transactions,
            max_free_transactions_per_block: settings.max_free_transactions_per_block,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub port: u16,
    pub ws_port: u16,
    pub connected_max: usize,
    pub desired_available: usize,
    pub unconnected_max: usize,
    pub handshake_timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        let network = PeerNetworkConfig::default();
        Self {
            port: network.port,
            ws_port: network.ws_port,
            connected_max: network.connected_max,
            desired_available: network.desired_available,
            unconnected_max: network.unconnected_max,
            handshake_timeout_secs: network.handshake_timeout.as_secs(),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MempoolSection {
    pub reverify_threshold_secs: u64,
    pub known_hash_ttl_secs: u64,
    pub max_transactions_per_block: usize,
}

impl Default for MempoolSection {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            reverify_threshold_secs: pool.reverify_threshold.as_secs(),
            known_hash_ttl_secs: pool.known_hash_ttl.as_secs(),
            max_transactions_per_block: pool.max_transactions_per_block,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsensusSection {
    pub max_future_timestamp_secs: u64,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        Self {
            max_future_timestamp_secs: RoundConfig::default().max_future_timestamp.as_secs(),
        }
    }
}

/// Without a key the node relays and validates but never takes part in
/// consensus.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletSection {
    pub private_key: Option<String>,
}

impl NodeConfig {
    /// Read `path` (defaults when `None`) and apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DC_P2P_PORT") {
            self.network.port = parse_env("DC_P2P_PORT", value)?;
        }
        if let Some(value) = lookup("DC_WS_PORT") {
            self.network.ws_port = parse_env("DC_WS_PORT", value)?;
        }
        if let Some(value) = lookup("DC_MAGIC") {
            self.protocol.magic = parse_env("DC_MAGIC", value)?;
        }
        if let Some(value) = lookup("DC_SECONDS_PER_BLOCK") {
            self.protocol.seconds_per_block = parse_env("DC_SECONDS_PER_BLOCK", value)?;
        }
        if let Some(value) = lookup("DC_SEEDS") {
            self.protocol.seed_list = split_list(&value);
        }
        if let Some(value) = lookup("DC_VALIDATORS") {
            self.protocol.standby_validators = split_list(&value);
        }
        if let Some(value) = lookup("DC_PRIVATE_KEY") {
            self.wallet.private_key = Some(value);
        }
        Ok(())
    }

    pub fn protocol_settings(&self) -> Result<ProtocolSettings, ConfigError> {
        let standby_validators = self
            .protocol
            .standby_validators
            .iter()
            .map(|key| PublicKey::from_str(key).map_err(|_| ConfigError::InvalidKey(key.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        if standby_validators.is_empty() {
            return Err(ConfigError::NoValidators);
        }
        Ok(ProtocolSettings {
            magic: self.protocol.magic,
            address_version: self.protocol.address_version,
            standby_validators,
            seed_list: self.protocol.seed_list.clone(),
            seconds_per_block: self.protocol.seconds_per_block,
            memory_pool_max_transactions: self.protocol.memory_pool_max_transactions,
            max_free_transactions_per_block: self.protocol.max_free_transactions_per_block,
            ..ProtocolSettings::default()
        })
    }

    pub fn network_config(&self) -> PeerNetworkConfig {
        let defaults = PeerNetworkConfig::default();
        PeerNetworkConfig {
            port: self.network.port,
            ws_port: self.network.ws_port,
            connected_max: self.network.connected_max,
            desired_available: self.network.desired_available,
            unconnected_max: self.network.unconnected_max,
            seed_list: self.protocol.seed_list.clone(),
            handshake_timeout: Duration::from_secs(self.network.handshake_timeout_secs),
            user_agent: self
                .network
                .user_agent
                .clone()
                .unwrap_or_else(|| defaults.user_agent.clone()),
            ..defaults
        }
    }

    pub fn mempool_config(&self, settings: &ProtocolSettings) -> PoolConfig {
        PoolConfig {
            reverify_threshold: Duration::from_secs(self.mempool.reverify_threshold_secs),
            known_hash_ttl: Duration::from_secs(self.mempool.known_hash_ttl_secs),
            max_transactions_per_block: self.mempool.max_transactions_per_block,
            ..PoolConfig::from_settings(settings)
        }
    }

    pub fn consensus_config(&self, settings: &ProtocolSettings) -> RoundConfig {
        RoundConfig {
            max_future_timestamp: Duration::from_secs(self.consensus.max_future_timestamp_secs),
            ..RoundConfig::from_settings(settings)
        }
    }

    /// The wallet key, if one is configured.
    pub fn key_pair(&self) -> Result<Option<KeyPair>, ConfigError> {
        let Some(text) = &self.wallet.private_key else {
            return Ok(None);
        };
        let invalid = || ConfigError::InvalidKey("wallet.private_key".to_string());
        let bytes: [u8; 32] = hex::decode(text.trim())
            .map_err(|_| invalid())?
            .try_into()
            .map_err(|_| invalid())?;
        KeyPair::from_bytes(bytes).map(Some).map_err(|_| invalid())
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn key_hex(seed: u8) -> String {
        KeyPair::from_bytes([seed; 32]).unwrap().public_key().to_string()
    }

    #[test]
    fn test_defaults_match_subsystem_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.network.port, 10333);
        assert_eq!(config.network.ws_port, 10334);
        assert_eq!(config.protocol.seconds_per_block, 15);
        assert!(config.wallet.private_key.is_none());
        assert!(matches!(
            config.protocol_settings(),
            Err(ConfigError::NoValidators)
        ));
    }

    #[test]
    fn test_toml_sections_override_defaults() {
        let text = format!(
            r#"
            [protocol]
            magic = 7630401
            seconds_per_block = 5
            standby_validators = ["{}", "{}"]
            seed_list = ["seed1.example:10333"]

            [network]
            port = 20333
            ws_port = 0

            [wallet]
            private_key = "{}"
            "#,
            key_hex(1),
            key_hex(2),
            hex::encode([1u8; 32]),
        );
        let config = NodeConfig::from_toml(&text).unwrap();
        let settings = config.protocol_settings().unwrap();
        assert_eq!(settings.magic, 7_630_401);
        assert_eq!(settings.seconds_per_block, 5);
        assert_eq!(settings.standby_validators.len(), 2);

        let network = config.network_config();
        assert_eq!(network.port, 20333);
        assert_eq!(network.ws_port, 0);
        assert_eq!(network.seed_list, vec!["seed1.example:10333".to_string()]);
        assert_eq!(network.connected_max, PeerNetworkConfig::default().connected_max);

        let consensus = config.consensus_config(&settings);
        assert_eq!(consensus.seconds_per_block, Duration::from_secs(5));

        let pair = config.key_pair().unwrap().unwrap();
        assert_eq!(pair.public_key().to_string(), key_hex(1));
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut config = NodeConfig::from_toml("[network]\nport = 1\n").unwrap();
        let env: HashMap<&str, String> = [
            ("DC_P2P_PORT", "30333".to_string()),
            ("DC_SEEDS", "a:1, b:2,".to_string()),
            ("DC_VALIDATORS", key_hex(3)),
            ("DC_SECONDS_PER_BLOCK", "2".to_string()),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|key| env.get(key).cloned())
            .unwrap();
        assert_eq!(config.network.port, 30333);
        assert_eq!(config.protocol.seed_list, vec!["a:1", "b:2"]);
        assert_eq!(config.protocol_settings().unwrap().seconds_per_block, 2);
    }

    #[test]
    fn test_bad_environment_value_is_reported() {
        let mut config = NodeConfig::default();
        let error = config
            .apply_env(|key| (key == "DC_WS_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidEnv { key: "DC_WS_PORT", .. }));
    }

    #[test]
    fn test_bad_keys_are_rejected() {
        let mut config = NodeConfig::default();
        config.protocol.standby_validators = vec!["02zz".to_string()];
        assert!(matches!(
            config.protocol_settings(),
            Err(ConfigError::InvalidKey(_))
        ));

        config.wallet.private_key = Some("abcd".to_string());
        assert!(config.key_pair().is_err());
    }

    #[test]
    fn test_unknown_file_is_io_error() {
        let error = NodeConfig::from_file(Path::new("/nonexistent/dc.toml")).unwrap_err();
        assert!(matches!(error, ConfigError::Io { .. }));
    }
}
