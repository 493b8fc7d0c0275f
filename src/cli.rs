use alloy::{
    network::EthereumWallet,
    primitives::Address,
    signers::local::PrivateKeySigner,
};
use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{json, Value};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use contract_bind::{
    abi::values::{event_to_json, output_to_json, params_from_json, topic_rules_from_json},
    backend::provider::RpcBackend,
    config::{Config, NetworkConfig},
    utils, BindingError, BoundContract, CallOpts, FilterOpts, TransactOpts, WatchOpts,
};

pub fn command() -> Command {
    Command::new("contract-bind")
        .version("0.1.0")
        .about("Call, transact with and watch events of ABI-described contracts")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .global(true)
                .help("Network to use (bsc, bsc-testnet, or any configured network)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .global(true)
                .help("RPC endpoint URL"),
        )
        .arg(
            Arg::new("allow-writes")
                .long("allow-writes")
                .global(true)
                .help("Allow write operations (transactions)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("abi")
                .about("List the methods and events of a contract with their selectors")
                .arg(contract_arg()),
        )
        .subcommand(
            Command::new("call")
                .about("Invoke a read-only method")
                .arg(contract_arg())
                .arg(member_arg("method", "Method name or full signature"))
                .arg(args_arg())
                .arg(
                    Arg::new("block")
                        .short('b')
                        .long("block")
                        .value_name("BLOCK")
                        .help("Block to read state at: number, latest, pending, safe, finalized"),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_name("ADDRESS")
                        .help("Caller address"),
                ),
        )
        .subcommand(
            Command::new("send")
                .about("Send a transaction calling a method, or a plain transfer without one")
                .arg(contract_arg())
                .arg(
                    Arg::new("method")
                        .value_name("METHOD")
                        .help("Method name or full signature. Omit for a plain value transfer"),
                )
                .arg(args_arg())
                .arg(
                    Arg::new("value")
                        .long("value")
                        .value_name("WEI")
                        .help("Value to send, decimal or 0x hex"),
                )
                .arg(
                    Arg::new("gas-limit")
                        .long("gas-limit")
                        .value_name("GAS")
                        .value_parser(clap::value_parser!(u64))
                        .help("Gas limit. Estimated when omitted"),
                )
                .arg(
                    Arg::new("skip-estimate")
                        .long("skip-estimate")
                        .help("Use the network's default gas limit instead of estimating")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("gas-price")
                        .long("gas-price")
                        .value_name("WEI")
                        .help("Legacy gas price, decimal or 0x hex"),
                )
                .arg(
                    Arg::new("nonce")
                        .long("nonce")
                        .value_name("NONCE")
                        .value_parser(clap::value_parser!(u64))
                        .help("Explicit nonce"),
                ),
        )
        .subcommand(
            Command::new("logs")
                .about("Print past events of a contract")
                .arg(contract_arg())
                .arg(member_arg("event", "Event name or full signature"))
                .arg(from_block_arg().default_value("0"))
                .arg(
                    Arg::new("to-block")
                        .long("to-block")
                        .value_name("BLOCK")
                        .help("Last block to include. Defaults to the current block"),
                )
                .arg(topics_arg()),
        )
        .subcommand(
            Command::new("watch")
                .about("Stream events of a contract until interrupted")
                .arg(contract_arg())
                .arg(member_arg("event", "Event name or full signature"))
                .arg(from_block_arg())
                .arg(topics_arg()),
        )
}

fn contract_arg() -> Arg {
    Arg::new("contract")
        .required(true)
        .value_name("CONTRACT")
        .help("Configured contract name, e.g. validator_set")
}

fn member_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .required(true)
        .value_name("NAME")
        .help(help)
}

fn args_arg() -> Arg {
    Arg::new("args")
        .short('a')
        .long("args")
        .value_name("JSON")
        .help("Arguments as a JSON array, or an object keyed by parameter name")
}

fn from_block_arg() -> Arg {
    Arg::new("from-block")
        .long("from-block")
        .value_name("BLOCK")
        .help("First block to include")
}

fn topics_arg() -> Arg {
    Arg::new("topics")
        .short('t')
        .long("topics")
        .value_name("JSON")
        .help("Indexed parameter filters: a JSON array with null, a value or an array of values per indexed parameter")
}

/// Applies global flags that override the loaded configuration.
pub fn apply_overrides(matches: &ArgMatches, config: &mut Config) {
    if let Some(network) = matches.get_one::<String>("network") {
        config.default_network = network.clone();
    }

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        if let Some(network_config) = config.networks.get_mut(&config.default_network) {
            network_config.rpc_url = rpc_url.clone();
        }
    }

    if matches.get_flag("allow-writes") {
        config.security.allow_write_operations = true;
    }
}

pub async fn run(matches: &ArgMatches, config: Config) -> Result<()> {
    match matches.subcommand() {
        Some(("abi", sub)) => print_abi(&config, sub).await,
        Some(("call", sub)) => call(&config, sub).await,
        Some(("send", sub)) => send(&config, sub).await,
        Some(("logs", sub)) => logs(&config, sub).await,
        Some(("watch", sub)) => watch(&config, sub).await,
        _ => Err(anyhow!(
            "No command given. Run with --help to list the available commands"
        )),
    }
}

async fn print_abi(config: &Config, matches: &ArgMatches) -> Result<()> {
    let name = required(matches, "contract")?;
    let (address, abi) = config.contract(name).await?;

    let functions: Vec<Value> = abi
        .selectors()
        .into_iter()
        .map(|(signature, selector)| {
            let mutability = abi
                .function_by_selector(&selector)
                .map(|f| format!("{:?}", f.state_mutability).to_lowercase());
            json!({
                "signature": signature,
                "selector": format!("{:#x}", selector),
                "state_mutability": mutability,
            })
        })
        .collect();
    let events: Vec<Value> = abi
        .topics()
        .into_iter()
        .map(|(signature, topic)| json!({ "signature": signature, "topic": format!("{:#x}", topic) }))
        .collect();

    print_json(&json!({
        "contract": name,
        "address": address.to_checksum(None),
        "functions": functions,
        "events": events,
    }))
}

async fn call(config: &Config, matches: &ArgMatches) -> Result<()> {
    let network = config.network(None)?;
    let contract = bind(config, matches, connect(config, network, None)?).await?;
    let method = member(matches, "method")?;

    let function = contract.abi().function(method)?;
    let args = params_from_json(&function.name, &function.inputs, &json_arg(matches, "args")?)?;

    let mut opts = CallOpts {
        timeout: Some(request_timeout(network)),
        ..Default::default()
    };
    if let Some(block) = matches.get_one::<String>("block") {
        opts.block = Some(utils::parse_block(block)?);
    }
    if let Some(from) = matches.get_one::<String>("from") {
        opts.from = Some(utils::validate_address(from)?);
    }

    let output = contract
        .call(&opts, method, &args)
        .await
        .map_err(friendly)?;
    print_json(&output_to_json(&output))
}

async fn send(config: &Config, matches: &ArgMatches) -> Result<()> {
    if !config.security.allow_write_operations {
        return Err(anyhow!(
            "Write operations are disabled. Pass --allow-writes or set security.allow_write_operations"
        ));
    }

    let network = config.network(None)?;
    let (wallet, sender) = load_wallet(config)?;
    let backend = connect(config, network, Some(wallet))?;
    let chain_id = backend.chain_id().await.map_err(BindingError::from).map_err(friendly)?;
    check_chain_id(network, chain_id)?;
    let contract = bind(config, matches, backend).await?;

    let mut opts = TransactOpts {
        from: Some(sender),
        gas_limit: matches.get_one::<u64>("gas-limit").copied(),
        nonce: matches.get_one::<u64>("nonce").copied(),
        timeout: Some(request_timeout(network)),
        ..Default::default()
    };
    if opts.gas_limit.is_none() && matches.get_flag("skip-estimate") {
        opts.gas_limit = Some(network.gas.default_gas_limit);
    }
    if let Some(value) = matches.get_one::<String>("value") {
        opts.value = Some(utils::parse_amount(value)?);
    }
    if let Some(price) = matches.get_one::<String>("gas-price") {
        let price = u128::try_from(utils::parse_amount(price)?)
            .map_err(|_| anyhow!("Gas price {} is too large", price))?;
        if let Some(max) = network.gas.max_gas_price {
            if price > u128::from(max) {
                return Err(anyhow!(
                    "Gas price {} exceeds the configured maximum of {}",
                    price,
                    max
                ));
            }
        }
        opts.gas_price = Some(price);
    }

    let submitted = match matches.get_one::<String>("method") {
        Some(method) => {
            utils::validate_member_name(method)?;
            let function = contract.abi().function(method)?;
            let args =
                params_from_json(&function.name, &function.inputs, &json_arg(matches, "args")?)?;
            contract.transact(&opts, method, &args).await
        }
        None => contract.transfer(&opts).await,
    }
    .map_err(friendly)?;

    let explorer = network
        .explorer_url
        .as_ref()
        .map(|url| format!("{}/tx/{:#x}", url.trim_end_matches('/'), submitted.hash));
    print_json(&json!({
        "transaction_hash": format!("{:#x}", submitted.hash),
        "from": sender.to_checksum(None),
        "to": contract.address().to_checksum(None),
        "gas_limit": submitted.request.gas,
        "explorer_url": explorer,
    }))
}

async fn logs(config: &Config, matches: &ArgMatches) -> Result<()> {
    let network = config.network(None)?;
    let backend = connect(config, network, None)?;
    let contract = bind(config, matches, backend.clone()).await?;
    let event = member(matches, "event")?;
    let rules = topic_rules_from_json(contract.abi().event(event)?, &json_arg(matches, "topics")?)?;

    let start = match matches.get_one::<String>("from-block") {
        Some(block) => utils::parse_block_number(block)?,
        None => 0,
    };
    let end = match matches.get_one::<String>("to-block") {
        Some(block) => utils::parse_block_number(block)?,
        None => backend.block_number().await.map_err(BindingError::from).map_err(friendly)?,
    };

    let opts = FilterOpts {
        timeout: Some(request_timeout(network)),
        ..FilterOpts::range(start, end)
    };
    let mut iter = contract
        .filter_logs(&opts, event, &rules)
        .await
        .map_err(friendly)?;

    let mut count = 0usize;
    while let Some(item) = iter.next().await {
        match item {
            Ok(decoded) => {
                println!("{}", event_to_json(&decoded));
                count += 1;
            }
            Err(e) => warn!("Skipping undecodable log: {}", e),
        }
    }
    iter.close();

    info!("Found {} {} events in blocks {}..={}", count, event, start, end);
    Ok(())
}

async fn watch(config: &Config, matches: &ArgMatches) -> Result<()> {
    let network = config.network(None)?;
    let contract = bind(config, matches, connect(config, network, None)?).await?;
    let event = member(matches, "event")?;
    let rules = topic_rules_from_json(contract.abi().event(event)?, &json_arg(matches, "topics")?)?;

    let start = matches
        .get_one::<String>("from-block")
        .map(|block| utils::parse_block_number(block))
        .transpose()?;

    let (tx, mut rx) = mpsc::channel(config.watch.buffer_size.max(1));
    let token = CancellationToken::new();
    let opts = WatchOpts {
        start,
        cancel: Some(token.clone()),
        policy: config.watch.sink_policy,
    };
    let watch = contract
        .watch_logs(opts, event, &rules, tx)
        .await
        .map_err(friendly)?;
    info!("Watching {} events on {:?}, press Ctrl-C to stop", event, contract.address());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping watch");
                break;
            }
            item = rx.recv() => match item {
                Some(Ok(decoded)) => println!("{}", event_to_json(&decoded)),
                Some(Err(e)) => warn!("Skipping undecodable log: {}", e),
                None => break,
            }
        }
    }

    watch.unsubscribe().await.map_err(friendly)
}

fn connect(
    config: &Config,
    network: &NetworkConfig,
    wallet: Option<EthereumWallet>,
) -> Result<Arc<RpcBackend>> {
    info!("Using RPC endpoint of network {}", config.default_network);
    Ok(Arc::new(RpcBackend::connect(
        network,
        wallet,
        config.watch.buffer_size,
    )?))
}

async fn bind(config: &Config, matches: &ArgMatches, backend: Arc<RpcBackend>) -> Result<BoundContract> {
    let name = required(matches, "contract")?;
    let (address, abi) = config.contract(name).await?;
    Ok(BoundContract::with_backend(address, Arc::new(abi), backend))
}

fn load_wallet(config: &Config) -> Result<(EthereumWallet, Address)> {
    let key_env = &config.security.private_key_env;
    let key = std::env::var(key_env)
        .map_err(|_| anyhow!("Set {} to the private key used to sign transactions", key_env))?;
    let signer = PrivateKeySigner::from_str(key.trim())
        .map_err(|e| anyhow!("Invalid private key in {}: {}", key_env, e))?;
    let address = signer.address();
    Ok((EthereumWallet::from(signer), address))
}

/// Refuses to sign for a node that serves a different chain than configured.
fn check_chain_id(network: &NetworkConfig, actual: u64) -> Result<()> {
    if network.chain_id != actual {
        return Err(anyhow!(
            "RPC endpoint serves chain {} but the network is configured for chain {}",
            actual,
            network.chain_id
        ));
    }
    Ok(())
}

fn request_timeout(network: &NetworkConfig) -> Duration {
    Duration::from_secs(network.request_timeout_secs)
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing argument '{}'", name))
}

fn member<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    let value = required(matches, name)?;
    utils::validate_member_name(value)?;
    Ok(value)
}

fn json_arg(matches: &ArgMatches, name: &str) -> Result<Value> {
    match matches.get_one::<String>(name) {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| anyhow!("Invalid JSON for --{}: {}", name, e)),
        None => Ok(Value::Null),
    }
}

fn friendly(err: BindingError) -> anyhow::Error {
    match err {
        BindingError::Backend(e) => anyhow!(utils::interpret_rpc_error(&e.to_string())),
        other => other.into(),
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn test_chain_id_mismatch_is_refused() {
        let config = Config::default();
        let testnet = &config.networks["bsc-testnet"];

        assert!(check_chain_id(testnet, 97).is_ok());
        let err = check_chain_id(testnet, 56).unwrap_err();
        assert!(err.to_string().contains("chain 56"));
    }

    #[test]
    fn test_global_overrides() {
        let matches = command()
            .try_get_matches_from([
                "contract-bind",
                "call",
                "validator_set",
                "getValidators",
                "--network",
                "bsc-testnet",
                "--rpc-url",
                "http://localhost:8545",
                "--allow-writes",
            ])
            .unwrap();

        let mut config = Config::default();
        apply_overrides(&matches, &mut config);

        assert_eq!(config.default_network, "bsc-testnet");
        assert_eq!(
            config.networks["bsc-testnet"].rpc_url,
            "http://localhost:8545"
        );
        assert!(config.security.allow_write_operations);
    }

    #[test]
    fn test_json_args() {
        let matches = command()
            .try_get_matches_from([
                "contract-bind",
                "call",
                "validator_set",
                "currentValidatorSet",
                "--args",
                "[3]",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();

        assert_eq!(json_arg(sub, "args").unwrap(), json!([3]));
        assert_eq!(json_arg(sub, "block").unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_send_requires_write_permission() {
        let matches = command()
            .try_get_matches_from(["contract-bind", "send", "token_hub", "--value", "1"])
            .unwrap();

        let err = run(&matches, Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("Write operations are disabled"));
    }
}
