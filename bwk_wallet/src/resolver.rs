//! Connects the inputs of a transaction to the outputs they spend.

use crate::error::Error;
use crate::model::{ConnectedOutput, DependencyMap, Transaction};

/// Outcome of a resolution pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Inputs connected by this pass
    pub newly_connected: usize,

    /// Inputs still unconnected after this pass
    pub unconnected: usize,
}

impl Resolution {
    /// True if every input knows the output it spends
    pub fn is_complete(&self) -> bool {
        self.unconnected == 0
    }
}

/// Connect every unconnected input of `tx` using the dependencies in `deps`.
///
/// Inputs whose dependency is missing from `deps` are left unconnected, partial resolution is not
/// an error. A dependency lacking the output index an input claims to spend is reported as
/// [`Error::CorruptedDependency`] and in that case `tx` is left untouched.
///
/// Running it again with the same `deps` is a no-op.
pub fn resolve(tx: &mut Transaction, deps: &DependencyMap) -> Result<Resolution, Error> {
    let mut connections = vec![];
    for (i, input) in tx.inputs().iter().enumerate() {
        if input.is_connected() || input.is_coinbase() {
            continue;
        }
        let outpoint = input.previous_output();
        let dep = match deps.get(&outpoint.txid) {
            Some(dep) => dep,
            None => {
                log::trace!("{} input {i}: dependency {} missing", tx.txid(), outpoint.txid);
                continue;
            }
        };
        let output = dep.outputs().get(outpoint.vout as usize).ok_or_else(|| {
            log::warn!(
                "{} input {i} spends {outpoint} but dependency has {} outputs",
                tx.txid(),
                dep.outputs().len()
            );
            Error::CorruptedDependency {
                txid: outpoint.txid,
                vout: outpoint.vout,
                outputs: dep.outputs().len(),
            }
        })?;
        connections.push((i, ConnectedOutput::from(output)));
    }

    let mut newly_connected = 0;
    let inputs = tx.inputs_mut();
    for (i, output) in connections {
        if inputs[i].connect(output) {
            newly_connected += 1;
        }
    }

    let resolution = Resolution {
        newly_connected,
        unconnected: tx.unconnected_inputs(),
    };
    log::debug!("{} resolved: {resolution:?}", tx.txid());
    Ok(resolution)
}
