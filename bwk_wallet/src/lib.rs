#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! # Bitcoin Wallet Kit
//!
//! Client side core of a bitcoin wallet: fetches transactions from a remote service with bounded
//! retry, connects their inputs to the outputs they spend and derives fees and originating
//! addresses. It also tracks fiat prices.
//!
//! For an entry point see [`Registry::new()`] or [`RemoteClient::builder()`]

mod clients;
mod error;
mod fee;
mod model;
mod network;
mod registry;
mod resolver;

pub mod prices;
pub mod task;

pub use crate::clients::{
    classify, Provider, RemoteClient, RemoteClientBuilder, ReqwestTransport, RetryDecision,
    RetryPolicy, Transport, MIN_SUBSCRIBE_ADDRESSES,
};
pub use crate::error::Error;
pub use crate::fee::{Fee, WalletTxView};
pub use crate::model::{
    ChainTipInfo, ConnectedOutput, DependencyMap, HistoryTx, Input, Transaction,
};
pub use crate::network::Network;
pub use crate::registry::Registry;
pub use crate::resolver::{resolve, Resolution};
pub use crate::task::{Executor, Inline, TaskHandle};

pub use bitcoin;
