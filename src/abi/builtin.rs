//! ABIs of the chain's system contracts, shipped as JSON data.

use alloy::primitives::{address, Address};
use std::{fmt, str::FromStr};

use super::AbiDescriptor;
use crate::error::Result;

/// A system contract with a known ABI and genesis address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemContract {
    ValidatorSet,
    LightClient,
    TokenHub,
    RelayerHub,
}

impl SystemContract {
    pub const ALL: [SystemContract; 4] = [
        SystemContract::ValidatorSet,
        SystemContract::LightClient,
        SystemContract::TokenHub,
        SystemContract::RelayerHub,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ValidatorSet => "validator_set",
            Self::LightClient => "light_client",
            Self::TokenHub => "token_hub",
            Self::RelayerHub => "relayer_hub",
        }
    }

    pub fn abi_json(&self) -> &'static str {
        match self {
            Self::ValidatorSet => include_str!("../../abis/validator_set.json"),
            Self::LightClient => include_str!("../../abis/light_client.json"),
            Self::TokenHub => include_str!("../../abis/token_hub.json"),
            Self::RelayerHub => include_str!("../../abis/relayer_hub.json"),
        }
    }

    /// Address the contract is deployed at in genesis.
    pub fn default_address(&self) -> Address {
        match self {
            Self::ValidatorSet => address!("0000000000000000000000000000000000001000"),
            Self::LightClient => address!("0000000000000000000000000000000000001003"),
            Self::TokenHub => address!("0000000000000000000000000000000000001004"),
            Self::RelayerHub => address!("0000000000000000000000000000000000001006"),
        }
    }

    /// Parses a fresh descriptor for this contract.
    pub fn descriptor(&self) -> Result<AbiDescriptor> {
        AbiDescriptor::from_json(self.abi_json())
    }
}

impl fmt::Display for SystemContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SystemContract {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|contract| contract.name() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown system contract '{}'. Known contracts: {}",
                    s,
                    Self::ALL.map(|c| c.name()).join(", ")
                )
            })
    }
}
