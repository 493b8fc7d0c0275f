use alloy::{
    eips::{BlockId, BlockNumberOrTag},
    primitives::{Address, U256},
};
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Validates and normalizes an address
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Address cannot be empty"));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(anyhow!(
            "Invalid address format: '{}'. Addresses must start with '0x'",
            address
        ));
    }

    if address.len() != 42 {
        return Err(anyhow!(
            "Invalid address length: '{}'. Addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        ));
    }

    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        ));
    }

    Address::from_str(address)
        .map_err(|e| anyhow!("Invalid address: '{}'. Error: {}", address, e))
}

/// Validates a method or event reference: a plain identifier, or a full
/// signature such as `transfer(address,uint256)` for overloaded names.
pub fn validate_member_name(name: &str) -> Result<()> {
    let identifier = match name.find('(') {
        Some(open) => {
            if !name.ends_with(')') {
                return Err(anyhow!(
                    "Invalid signature: '{}'. Expected 'name(type,...)'",
                    name
                ));
            }
            &name[..open]
        }
        None => name,
    };

    let mut chars = identifier.chars();
    match chars.next() {
        None => return Err(anyhow!("Method or event name cannot be empty")),
        Some(first) if !first.is_ascii_alphabetic() && first != '_' && first != '$' => {
            return Err(anyhow!(
                "Invalid name: '{}'. Names must start with a letter or underscore",
                identifier
            ));
        }
        Some(_) => {}
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err(anyhow!(
            "Invalid name: '{}'. Names can only contain letters, numbers, and underscores",
            identifier
        ));
    }

    Ok(())
}

/// Parses a decimal or '0x' prefixed hex amount (transaction values, gas
/// prices)
pub fn parse_amount(value_str: &str) -> Result<U256> {
    if value_str.is_empty() {
        return Err(anyhow!("Value cannot be empty"));
    }

    let value = if let Some(hex) = value_str
        .strip_prefix("0x")
        .or_else(|| value_str.strip_prefix("0X"))
    {
        U256::from_str_radix(hex, 16)
            .map_err(|_| anyhow!("Invalid hexadecimal value: '{}'", value_str))?
    } else {
        U256::from_str(value_str).map_err(|_| {
            anyhow!(
                "Invalid numeric value: '{}'. Use decimal format or '0x' prefixed hex",
                value_str
            )
        })?
    };

    Ok(value)
}

/// Parses a block reference: a number or one of `latest`, `pending`,
/// `earliest`, `safe`, `finalized`.
pub fn parse_block(block: &str) -> Result<BlockId> {
    let tag = match block.to_ascii_lowercase().as_str() {
        "latest" => BlockNumberOrTag::Latest,
        "pending" => BlockNumberOrTag::Pending,
        "earliest" => BlockNumberOrTag::Earliest,
        "safe" => BlockNumberOrTag::Safe,
        "finalized" => BlockNumberOrTag::Finalized,
        _ => BlockNumberOrTag::Number(parse_block_number(block)?),
    };
    Ok(BlockId::Number(tag))
}

/// Parses a block number in decimal or '0x' prefixed hex
pub fn parse_block_number(block: &str) -> Result<u64> {
    let number = parse_amount(block).map_err(|_| {
        anyhow!(
            "Invalid block: '{}'. Use a block number or latest, pending, earliest, safe, finalized",
            block
        )
    })?;
    u64::try_from(number).map_err(|_| anyhow!("Block number {} is too large", number))
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        "The contract reverted execution. This usually means the method's requirements were not met or an assertion failed.".to_string()
    } else if error.contains("insufficient funds") {
        "Transaction failed: Insufficient funds to cover value and gas costs.".to_string()
    } else if error.contains("gas required exceeds allowance") {
        "Transaction failed: Gas limit too low. Try increasing the gas limit for this transaction."
            .to_string()
    } else if error.contains("nonce too low") {
        "Transaction failed: Nonce too low. This usually means another transaction was already mined with this nonce.".to_string()
    } else if error.contains("replacement transaction underpriced") {
        "Transaction failed: Gas price too low to replace pending transaction. Increase the gas price.".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check your internet connection and RPC URL configuration.".to_string()
    } else if error.contains("timed out") || error.contains("timeout") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if error.contains("block range") || error.contains("query returned more than") {
        "Log query rejected: The block range is too wide for this RPC endpoint. Narrow it with --from-block/--to-block.".to_string()
    } else if error.contains("filter not found") {
        "Log subscription lost: The node dropped the log filter. Start the watch again.".to_string()
    } else if error.contains("rate limit") {
        "Rate limit error: Too many requests to the RPC endpoint. Try again in a few moments or use a different endpoint.".to_string()
    } else if error.contains("method not found") {
        "RPC error: The requested method is not supported by this RPC endpoint. Try using a different endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}
