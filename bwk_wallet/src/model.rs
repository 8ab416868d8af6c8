use std::collections::{HashMap, HashSet};

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::consensus::{deserialize, serialize};
use bitcoin::hex::FromHex;
use bitcoin::{Amount, BlockHash, OutPoint, ScriptBuf, TxOut, Txid};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Dependency transactions of a transaction, keyed by their txid.
///
/// Built fresh for every resolution attempt, a missing key means the remote service could not
/// provide that dependency.
pub type DependencyMap = HashMap<Txid, Transaction>;

/// The output an [`Input`] spends, copied from the dependency transaction once resolved.
///
/// This is a lookup result, the dependency transaction itself is not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedOutput {
    /// The value of the spent output
    pub value: Amount,

    /// The locking script of the spent output
    pub script_pubkey: ScriptBuf,
}

impl From<&TxOut> for ConnectedOutput {
    fn from(txout: &TxOut) -> Self {
        Self {
            value: txout.value,
            script_pubkey: txout.script_pubkey.clone(),
        }
    }
}

/// An input of a [`Transaction`] with its connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    previous_output: OutPoint,
    connected: Option<ConnectedOutput>,
}

impl Input {
    /// The outpoint this input spends
    pub fn previous_output(&self) -> OutPoint {
        self.previous_output
    }

    /// The spent output, if the input has been connected
    pub fn connected(&self) -> Option<&ConnectedOutput> {
        self.connected.as_ref()
    }

    /// Whether the spent output is known
    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    /// Coinbase inputs spend the null outpoint and cannot be connected
    pub fn is_coinbase(&self) -> bool {
        self.previous_output.is_null()
    }

    /// Connects the input, returns false if it was already connected.
    ///
    /// Connections are never replaced.
    pub(crate) fn connect(&mut self, output: ConnectedOutput) -> bool {
        if self.connected.is_some() {
            return false;
        }
        self.connected = Some(output);
        true
    }
}

/// A decoded bitcoin transaction whose inputs can be connected to the outputs they spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    inner: bitcoin::Transaction,
    txid: Txid,
    inputs: Vec<Input>,
}

impl From<bitcoin::Transaction> for Transaction {
    fn from(inner: bitcoin::Transaction) -> Self {
        let txid = inner.compute_txid();
        let inputs = inner
            .input
            .iter()
            .map(|i| Input {
                previous_output: i.previous_output,
                connected: None,
            })
            .collect();
        Self {
            inner,
            txid,
            inputs,
        }
    }
}

impl Transaction {
    /// Decode a consensus serialized transaction
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let tx: bitcoin::Transaction = deserialize(bytes)?;
        Ok(tx.into())
    }

    /// Decode a hex encoded consensus serialized transaction
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let bytes = Vec::<u8>::from_hex(hex.trim())?;
        Self::from_bytes(&bytes)
    }

    /// Consensus serialize the transaction
    pub fn serialize(&self) -> Vec<u8> {
        serialize(&self.inner)
    }

    /// Consensus serialize the transaction and hex encode it
    pub fn to_hex(&self) -> String {
        serialize_hex(&self.inner)
    }

    pub fn txid(&self) -> Txid {
        self.txid
    }

    /// The underlying decoded transaction
    pub fn inner(&self) -> &bitcoin::Transaction {
        &self.inner
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut [Input] {
        &mut self.inputs
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.inner.output
    }

    pub fn is_coinbase(&self) -> bool {
        self.inner.is_coinbase()
    }

    /// The distinct txids spent by this transaction, in input order
    pub fn previous_txids(&self) -> Vec<Txid> {
        let mut seen = HashSet::new();
        self.inputs
            .iter()
            .filter(|i| !i.is_coinbase())
            .map(|i| i.previous_output.txid)
            .filter(|txid| seen.insert(*txid))
            .collect()
    }

    /// Number of inputs still waiting for their spent output
    pub fn unconnected_inputs(&self) -> usize {
        self.inputs
            .iter()
            .filter(|i| !i.is_coinbase() && !i.is_connected())
            .count()
    }

    /// True when every spendable input knows the output it spends
    pub fn is_fully_connected(&self) -> bool {
        self.unconnected_inputs() == 0
    }
}

/// Snapshot of the remote blockchain state at the time of the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTipInfo {
    pub height: u32,
    pub hash: BlockHash,
    pub time: u64,
    #[serde(rename = "txn")]
    pub tx_count: u64,
    pub status: String,
    pub network: String,
}

/// A transaction touching an address, with its position in the chain if confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTx {
    pub tx: Transaction,

    /// Hash of the block including the transaction
    pub block_hash: Option<BlockHash>,

    /// Block timestamp
    pub time: Option<u64>,

    /// Confirmation height, `None` if unconfirmed
    pub height: Option<u32>,

    /// Position of the transaction in its block
    pub index: Option<u32>,
}
