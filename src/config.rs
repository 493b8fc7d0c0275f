use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;

use crate::abi::{builtin::SystemContract, AbiDescriptor};
use crate::contract::SinkPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: HashMap<String, NetworkConfig>,
    pub default_network: String,
    #[serde(default)]
    pub contracts: HashMap<String, ContractConfig>,
    pub security: SecurityConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: Option<String>,
    pub gas: GasConfig,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    pub default_gas_limit: u64,
    pub max_gas_price: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub address: String,
    /// Path to an ABI JSON file. Without it the contract name must match a
    /// built-in system contract.
    pub abi: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub allow_write_operations: bool,
    /// Environment variable holding the signing key for transactions.
    pub private_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub buffer_size: usize,
    pub sink_policy: SinkPolicy,
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            sink_policy: SinkPolicy::Block,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = HashMap::new();

        networks.insert(
            "bsc".to_string(),
            NetworkConfig {
                rpc_url: "https://bsc-dataseed.binance.org".to_string(),
                chain_id: 56,
                explorer_url: Some("https://bscscan.com".to_string()),
                gas: GasConfig {
                    default_gas_limit: 300000,
                    max_gas_price: Some(20_000_000_000), // 20 Gwei
                },
                poll_interval_ms: default_poll_interval_ms(),
                request_timeout_secs: default_request_timeout_secs(),
            },
        );

        networks.insert(
            "bsc-testnet".to_string(),
            NetworkConfig {
                rpc_url: "https://data-seed-prebsc-1-s1.binance.org:8545".to_string(),
                chain_id: 97,
                explorer_url: Some("https://testnet.bscscan.com".to_string()),
                gas: GasConfig {
                    default_gas_limit: 300000,
                    max_gas_price: Some(20_000_000_000), // 20 Gwei
                },
                poll_interval_ms: default_poll_interval_ms(),
                request_timeout_secs: default_request_timeout_secs(),
            },
        );

        let contracts = SystemContract::ALL
            .into_iter()
            .map(|contract| {
                (
                    contract.name().to_string(),
                    ContractConfig {
                        address: contract.default_address().to_checksum(None),
                        abi: None,
                    },
                )
            })
            .collect();

        Self {
            networks,
            default_network: "bsc".to_string(),
            contracts,
            security: SecurityConfig {
                allow_write_operations: false,
                private_key_env: "CONTRACT_BIND_PRIVATE_KEY".to_string(),
            },
            watch: WatchConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_vars(&mut self) {
        if let Ok(rpc_url) = std::env::var("CONTRACT_BIND_RPC_URL") {
            if let Some(network_config) = self.networks.get_mut(&self.default_network) {
                tracing::info!(
                    "Using CONTRACT_BIND_RPC_URL for network {}",
                    self.default_network
                );
                network_config.rpc_url = rpc_url;
            }
        }
    }

    pub fn network(&self, network: Option<&str>) -> Result<&NetworkConfig> {
        let network_name = network.unwrap_or(&self.default_network);
        self.networks.get(network_name).ok_or_else(|| {
            let mut available: Vec<_> = self.networks.keys().cloned().collect();
            available.sort();
            anyhow!(
                "Network '{}' not configured. Available networks: {}",
                network_name,
                available.join(", ")
            )
        })
    }

    /// Resolves a configured contract to its address and parsed ABI.
    pub async fn contract(&self, name: &str) -> Result<(Address, AbiDescriptor)> {
        let contract = self.contracts.get(name).ok_or_else(|| {
            let mut available: Vec<_> = self.contracts.keys().cloned().collect();
            available.sort();
            anyhow!(
                "Contract '{}' not configured. Available contracts: {}",
                name,
                available.join(", ")
            )
        })?;

        let address = crate::utils::validate_address(&contract.address)
            .map_err(|e| anyhow!("Invalid address for contract '{}': {}", name, e))?;

        let descriptor = match &contract.abi {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .await
                    .map_err(|e| anyhow!("Failed to read ABI file {:?}: {}", path, e))?;
                AbiDescriptor::from_json(&json)?
            }
            None => SystemContract::from_str(name)
                .map_err(|e| anyhow!("{}. Set an 'abi' path for this contract", e))?
                .descriptor()?,
        };

        Ok((address, descriptor))
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("contract-bind").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# contract-bind configuration file

# Default network to use when none is specified
default_network = "bsc"

[networks.bsc]
rpc_url = "https://bsc-dataseed.binance.org"
chain_id = 56
explorer_url = "https://bscscan.com"
poll_interval_ms = 3000
request_timeout_secs = 30

[networks.bsc.gas]
default_gas_limit = 300000
max_gas_price = 20_000_000_000  # 20 Gwei

[networks.bsc-testnet]
rpc_url = "https://data-seed-prebsc-1-s1.binance.org:8545"
chain_id = 97
explorer_url = "https://testnet.bscscan.com"

[networks.bsc-testnet.gas]
default_gas_limit = 300000

# Contracts to bind. Without an `abi` path the name must be one of the
# built-in system contracts: validator_set, light_client, token_hub, relayer_hub.
[contracts.validator_set]
address = "0x0000000000000000000000000000000000001000"

[contracts.light_client]
address = "0x0000000000000000000000000000000000001003"

[contracts.token_hub]
address = "0x0000000000000000000000000000000000001004"

[contracts.relayer_hub]
address = "0x0000000000000000000000000000000000001006"

# [contracts.my_token]
# address = "0x..."
# abi = "/path/to/MyToken.abi.json"

[security]
allow_write_operations = false
private_key_env = "CONTRACT_BIND_PRIVATE_KEY"

[watch]
buffer_size = 256
sink_policy = "block"  # or "reject" to fail when the consumer falls behind

# Environment variables that can be used:
# CONTRACT_BIND_RPC_URL - overrides the RPC URL of the default network
# CONTRACT_BIND_PRIVATE_KEY - signing key for `send` (name set by private_key_env)
"#;
        sample_config.to_string()
    }
}
