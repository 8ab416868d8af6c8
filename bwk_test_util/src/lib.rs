use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, PubkeyHash, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness,
};

/// Testnet address owning the single output spent by the reference fixture
pub const FROM_ADDRESS: &str = "mj2tZKFhiLkxWz6eJpubj5Y5SiGrmBrgtm";

pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// Parse a testnet address
pub fn address(s: &str) -> Address {
    Address::from_str(s)
        .unwrap()
        .require_network(Network::Testnet)
        .unwrap()
}

pub fn address_script(s: &str) -> ScriptBuf {
    address(s).script_pubkey()
}

/// A testnet p2pkh address unrelated to [`FROM_ADDRESS`]
pub fn other_address() -> Address {
    Address::p2pkh(PubkeyHash::from_byte_array([0x42; 20]), Network::Testnet)
}

/// `n` distinct testnet addresses
pub fn addresses(n: u8) -> Vec<Address> {
    (0..n)
        .map(|i| Address::p2pkh(PubkeyHash::from_byte_array([i; 20]), Network::Testnet))
        .collect()
}

fn tx_in(txid: Txid, vout: u32) -> TxIn {
    TxIn {
        previous_output: OutPoint { txid, vout },
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

fn tx(input: Vec<TxIn>, outputs: &[(ScriptBuf, u64)]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output: outputs
            .iter()
            .map(|(script_pubkey, value)| TxOut {
                value: Amount::from_sat(*value),
                script_pubkey: script_pubkey.clone(),
            })
            .collect(),
    }
}

/// A transaction spending `inputs` into outputs with an empty script
pub fn spend_tx(inputs: &[(Txid, u32)], values: &[u64]) -> Transaction {
    let outputs: Vec<_> = values.iter().map(|v| (ScriptBuf::new(), *v)).collect();
    spend_tx_to(inputs, &outputs)
}

pub fn spend_tx_to(inputs: &[(Txid, u32)], outputs: &[(ScriptBuf, u64)]) -> Transaction {
    let input = inputs.iter().map(|(txid, vout)| tx_in(*txid, *vout)).collect();
    tx(input, outputs)
}

/// A transaction that can be used as a dependency, `seed` makes its txid unique
pub fn funding_tx(seed: u8, values: &[u64]) -> Transaction {
    let outputs: Vec<_> = values.iter().map(|v| (ScriptBuf::new(), *v)).collect();
    funding_tx_to(seed, &outputs)
}

pub fn funding_tx_to(seed: u8, outputs: &[(ScriptBuf, u64)]) -> Transaction {
    let input = vec![tx_in(Txid::from_byte_array([seed; 32]), seed as u32)];
    tx(input, outputs)
}

pub fn coinbase_tx(values: &[u64]) -> Transaction {
    let null = OutPoint::null();
    let outputs: Vec<_> = values.iter().map(|v| (ScriptBuf::new(), *v)).collect();
    tx(vec![tx_in(null.txid, null.vout)], &outputs)
}

/// The json item the remote service returns for a transaction
pub fn tx_item_json(tx: &Transaction, height: Option<u32>) -> String {
    let data = bitcoin::consensus::encode::serialize_hex(tx);
    match height {
        Some(height) => format!(
            r#"{{"txid":"{}","data":"{}","block":"{}","time":1600000000,"height":{},"index":0}}"#,
            tx.compute_txid(),
            data,
            bitcoin::BlockHash::all_zeros(),
            height
        ),
        None => format!(r#"{{"txid":"{}","data":"{}"}}"#, tx.compute_txid(), data),
    }
}
