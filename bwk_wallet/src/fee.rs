//! Values derived from a connected transaction: fee, originating addresses and the wallet view.

use std::collections::HashSet;

use bitcoin::{Address, Amount, BlockHash, Txid};
use serde::Serialize;

use crate::model::{HistoryTx, Transaction};
use crate::network::Network;

/// The fee paid by a transaction.
///
/// Unconnected inputs count as zero, so unless `known` is true `sats` is only a lower bound and can
/// even be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fee {
    /// Sum of the spent output values minus the sum of the own output values
    pub sats: i64,

    /// True if every input was connected when the fee was computed
    pub known: bool,
}

impl Fee {
    /// The fee amount, only if it is known and not negative
    pub fn amount(&self) -> Option<Amount> {
        if self.known && self.sats >= 0 {
            Some(Amount::from_sat(self.sats as u64))
        } else {
            None
        }
    }
}

impl Transaction {
    /// Compute the fee from the connected inputs, see [`Fee`] for partially connected transactions.
    ///
    /// Coinbase transactions, and transactions without inputs, pay no fee.
    pub fn fee(&self) -> Fee {
        if self.is_coinbase() || self.inputs().is_empty() {
            return Fee {
                sats: 0,
                known: true,
            };
        }
        let inputs = total_sats(
            self.inputs()
                .iter()
                .filter_map(|i| i.connected())
                .map(|o| o.value),
        );
        let outputs = total_sats(self.outputs().iter().map(|o| o.value));
        match i64::try_from(inputs - outputs) {
            Ok(sats) => Fee {
                sats,
                known: self.is_fully_connected(),
            },
            Err(_) => {
                log::warn!("fee of {} out of range, values are corrupted", self.txid());
                Fee {
                    sats: saturate(inputs - outputs),
                    known: false,
                }
            }
        }
    }

    /// The distinct addresses owning the outputs spent by the connected inputs, in input order.
    ///
    /// Unconnected inputs and non standard scripts contribute nothing.
    pub fn from_addresses(&self, network: Network) -> Vec<Address> {
        let scripts = self
            .inputs()
            .iter()
            .filter_map(|i| i.connected())
            .map(|o| o.script_pubkey.as_script());
        distinct_addresses(scripts, network)
    }

    /// The distinct addresses receiving the outputs of this transaction, in output order.
    pub fn to_addresses(&self, network: Network) -> Vec<Address> {
        let scripts = self.outputs().iter().map(|o| o.script_pubkey.as_script());
        distinct_addresses(scripts, network)
    }
}

/// Values come from the remote service, summing in `i128` keeps corrupted ones from overflowing
fn total_sats(values: impl Iterator<Item = Amount>) -> i128 {
    values.map(|v| i128::from(v.to_sat())).sum()
}

fn saturate(sats: i128) -> i64 {
    i64::try_from(sats).unwrap_or(if sats < 0 { i64::MIN } else { i64::MAX })
}

fn distinct_addresses<'a>(
    scripts: impl Iterator<Item = &'a bitcoin::Script>,
    network: Network,
) -> Vec<Address> {
    let mut seen = HashSet::new();
    scripts
        .filter_map(|s| Address::from_script(s, network.bitcoin_network()).ok())
        .filter(|a| seen.insert(a.clone()))
        .collect()
}

/// A transaction as seen by a wallet owning `wallet_addresses`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletTxView {
    pub txid: Txid,
    pub fee: Fee,

    /// Whether every input is connected, if not `from` and `balance` may be incomplete
    pub fully_connected: bool,
    pub from: Vec<String>,
    pub to: Vec<String>,

    /// Value received by the wallet minus value spent by the wallet, in satoshi, saturating
    pub balance: i64,

    pub height: Option<u32>,
    pub block_hash: Option<BlockHash>,
    pub time: Option<u64>,
}

impl WalletTxView {
    pub fn new(tx: &Transaction, network: Network, wallet_addresses: &[Address]) -> Self {
        let mine: HashSet<_> = wallet_addresses.iter().map(|a| a.script_pubkey()).collect();
        let received = total_sats(
            tx.outputs()
                .iter()
                .filter(|o| mine.contains(&o.script_pubkey))
                .map(|o| o.value),
        );
        let spent = total_sats(
            tx.inputs()
                .iter()
                .filter_map(|i| i.connected())
                .filter(|o| mine.contains(&o.script_pubkey))
                .map(|o| o.value),
        );
        Self {
            txid: tx.txid(),
            fee: tx.fee(),
            fully_connected: tx.is_fully_connected(),
            from: to_strings(tx.from_addresses(network)),
            to: to_strings(tx.to_addresses(network)),
            balance: saturate(received - spent),
            height: None,
            block_hash: None,
            time: None,
        }
    }

    pub fn from_history(item: &HistoryTx, network: Network, wallet_addresses: &[Address]) -> Self {
        Self {
            height: item.height,
            block_hash: item.block_hash,
            time: item.time,
            ..Self::new(&item.tx, network, wallet_addresses)
        }
    }
}

fn to_strings(addresses: Vec<Address>) -> Vec<String> {
    addresses.iter().map(ToString::to_string).collect()
}
