#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use std::str::FromStr;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use bwk_wallet::bitcoin::{Address, Txid};
use bwk_wallet::prices::TradingPair;
use bwk_wallet::{Inline, Registry, Transaction, WalletTxView};
use clap::CommandFactory;
use serde_json::{json, Value};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

use crate::args::{CliCommand, Network};
pub use crate::config::Config;
pub use args::Cli;

mod args;
mod config;

pub fn inner_main(args: args::Cli) -> anyhow::Result<Value> {
    let (appender, _guard) = tracing_appender::non_blocking(std::io::stderr());
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(appender)
        .finish();
    // also forwards the `log` records of the library
    match subscriber.try_init() {
        Ok(_) => tracing::info!("logging initialized"),
        Err(_) => tracing::debug!("logging already initialized"),
    }

    tracing::info!("CLI initialized with args: {:?}", args);

    let server_url = match args.url {
        Some(url) => url,
        None if args.command.requires_server() => {
            return Err(anyhow!(
                "specify the transaction service with --url or BWK_SERVER_URL"
            ))
        }
        None => String::new(),
    };
    let mut config = match args.network {
        Network::Mainnet => Config::default_mainnet(&server_url),
        Network::Testnet => Config::default_testnet(&server_url),
        Network::Regtest => Config::default_regtest(&server_url),
    };
    if let Some(timeout) = args.timeout {
        config.timeout = Duration::from_secs(timeout);
    }
    let network = config.network;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let registry = Registry::new(&config.server_url, runtime.handle().clone())?
        .with_retry_policy(config.retry_policy.clone())
        .with_timeout(config.timeout);

    Ok(match args.command {
        CliCommand::Tx {
            txid,
            wallet_addresses,
        } => {
            let txid = Txid::from_str(&txid).with_context(|| format!("invalid txid {txid}"))?;
            let wallet_addresses = wallet_addresses
                .iter()
                .map(|a| parse_address(a, network))
                .collect::<Result<Vec<_>, _>>()?;
            let tx = registry
                .provider(network)?
                .resolved_transaction(txid)
                .wait()?;
            serde_json::to_value(WalletTxView::new(&tx, network, &wallet_addresses))?
        }
        CliCommand::History {
            address,
            from_height,
        } => {
            let wallet_address = parse_address(&address, network)?;
            let history = registry
                .provider(network)?
                .resolved_history(&address, from_height)
                .wait()?;
            let views: Vec<_> = history
                .iter()
                .map(|item| {
                    WalletTxView::from_history(item, network, std::slice::from_ref(&wallet_address))
                })
                .collect();
            serde_json::to_value(views)?
        }
        CliCommand::Tip => serde_json::to_value(registry.provider(network)?.chain_tip().wait()?)?,
        CliCommand::Broadcast { hex } => {
            let tx = Transaction::from_hex(hex.trim())?;
            let txid = tx.txid();
            let accepted = registry.provider(network)?.broadcast(tx).wait()?;
            json!({ "txid": txid.to_string(), "accepted": accepted })
        }
        CliCommand::Price { currency } => {
            let tracker = registry.tracker(TradingPair::new(currency.into()));
            let (tx, rx) = mpsc::channel();
            let id = tracker.add_listener(Arc::new(Inline), move |rate| {
                let _ = tx.send(rate);
            });
            let rate = rx.recv_timeout(config.price_timeout);
            tracker.remove_listener(id);
            let rate = rate.map_err(|_| {
                anyhow!(
                    "no price for {} within {:?}",
                    tracker.pair(),
                    config.price_timeout
                )
            })?;
            serde_json::to_value(rate)?
        }
        CliCommand::GenerateCompletion { shell } => {
            let mut result = vec![];
            clap_complete::generate(shell, &mut Cli::command(), "bwk", &mut result);
            Value::String(String::from_utf8(result)?)
        }
    })
}

fn parse_address(address: &str, network: bwk_wallet::Network) -> anyhow::Result<Address> {
    Ok(Address::from_str(address)
        .with_context(|| format!("invalid address {address}"))?
        .require_network(network.bitcoin_network())?)
}
