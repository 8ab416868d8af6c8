use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bitcoin::hex::DisplayHex;
use bitcoin::{Address, BlockHash, Txid};
use serde::Deserialize;
use serde_json::json;

use crate::clients::retry::RetryPolicy;
use crate::clients::transport::{ReqwestTransport, Transport};
use crate::error::Error;
use crate::model::{ChainTipInfo, DependencyMap, HistoryTx, Transaction};
use crate::network::Network;
use crate::resolver::resolve;

/// Subscriptions must cover at least this many addresses, so the server cannot single out the
/// ones actually used by the wallet.
pub const MIN_SUBSCRIBE_ADDRESSES: usize = 20;

const DEFAULT_ASSET: &str = "btc";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A builder for the [`RemoteClient`]
pub struct RemoteClientBuilder {
    base_url: String,
    network: Network,
    asset: String,
    timeout: Duration,
    policy: RetryPolicy,
    transport: Option<Arc<dyn Transport>>,
}

impl RemoteClientBuilder {
    pub fn new(base_url: &str, network: Network) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            network,
            asset: DEFAULT_ASSET.to_string(),
            timeout: DEFAULT_TIMEOUT,
            policy: RetryPolicy::default(),
            transport: None,
        }
    }

    /// Set the asset path segment, "btc" by default
    pub fn asset(mut self, asset: &str) -> Self {
        self.asset = asset.to_string();
        self
    }

    /// Set the timeout for HTTP requests
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use `transport` instead of the default `reqwest` one
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<RemoteClient, Error> {
        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(self.timeout)?),
        };
        Ok(RemoteClient {
            api_url: format!(
                "{}/{}/{}",
                self.base_url,
                self.asset,
                self.network.path_segment()
            ),
            network: self.network,
            policy: self.policy,
            transport,
        })
    }
}

/// Client of the remote transaction service.
///
/// Every call goes through the [`RetryPolicy`]; when it gives up, bulk calls return an empty or
/// negative result while single item lookups return [`Error::NotFound`].
pub struct RemoteClient {
    api_url: String,
    network: Network,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
}

impl RemoteClient {
    pub fn builder(base_url: &str, network: Network) -> RemoteClientBuilder {
        RemoteClientBuilder::new(base_url, network)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Transactions touching `address` confirmed at or above `from_height`, plus unconfirmed ones
    pub async fn history(&self, address: &str, from_height: u32) -> Result<Vec<HistoryTx>, Error> {
        let address = self.parse_address(address)?;
        let url = format!(
            "{}/txhistory/{}?from_height={}",
            self.api_url, address, from_height
        );
        let result = self
            .policy
            .run(&url, || async {
                let text = self.transport.get(&url).await?;
                let items: Vec<TxItem> = serde_json::from_str(&text)?;
                items
                    .into_iter()
                    .map(HistoryTx::try_from)
                    .collect::<Result<Vec<_>, _>>()
            })
            .await;
        match result {
            Ok(history) => Ok(history
                .into_iter()
                .filter(|h| h.height.map_or(true, |height| height >= from_height))
                .collect()),
            Err(e) => {
                log::warn!("history of {address} unavailable, returning empty: {e}");
                Ok(vec![])
            }
        }
    }

    pub async fn transaction(&self, txid: Txid) -> Result<Transaction, Error> {
        let url = format!("{}/tx/{}", self.api_url, txid);
        self.policy
            .run(&url, || async {
                let text = self.transport.get(&url).await?;
                let item: TxItem = serde_json::from_str(&text)?;
                Ok::<_, Error>(HistoryTx::try_from(item)?.tx)
            })
            .await
            .map_err(|e| {
                log::info!("transaction {txid} not found: {e}");
                Error::NotFound(format!("transaction {txid}"))
            })
    }

    /// The transactions spent by the inputs of `txid`, fetched in a single round trip.
    ///
    /// Dependencies the server cannot provide are absent from the map.
    pub async fn dependencies(&self, txid: Txid) -> DependencyMap {
        let url = format!("{}/txdeps/{}", self.api_url, txid);
        let result = self
            .policy
            .run(&url, || async {
                let text = self.transport.get(&url).await?;
                let items: Vec<TxItem> = serde_json::from_str(&text)?;
                items
                    .into_iter()
                    .map(|i| HistoryTx::try_from(i).map(|h| (h.tx.txid(), h.tx)))
                    .collect::<Result<DependencyMap, _>>()
            })
            .await;
        match result {
            Ok(deps) => deps,
            Err(e) => {
                log::warn!("dependencies of {txid} unavailable, returning empty: {e}");
                DependencyMap::new()
            }
        }
    }

    pub async fn chain_tip(&self) -> Result<ChainTipInfo, Error> {
        let url = format!("{}/chaininfo", self.api_url);
        self.policy
            .run(&url, || async {
                let text = self.transport.get(&url).await?;
                Ok::<_, Error>(serde_json::from_str::<ChainTipInfo>(&text)?)
            })
            .await
            .map_err(|e| {
                log::info!("chain tip unavailable: {e}");
                Error::NotFound("chain tip".to_string())
            })
    }

    /// Submit `tx` to the network, returns whether the service accepted it
    pub async fn broadcast(&self, tx: &Transaction) -> bool {
        let url = format!("{}/broadcast", self.api_url);
        let body = json!({ "data": tx.to_hex() });
        let accepted = self.post_successful(&url, &body).await;
        log::info!("broadcast of {} accepted:{accepted}", tx.txid());
        accepted
    }

    /// Register `token` to receive notifications about `addresses`
    pub async fn subscribe(
        &self,
        token: &str,
        wallet_id: &str,
        addresses: &[Address],
    ) -> Result<bool, Error> {
        validate_subscription(token, wallet_id, addresses)?;
        let url = format!("{}/subscribe", self.api_url);
        let concatenated: String = addresses
            .iter()
            .map(|a| a.script_pubkey().as_bytes().to_lower_hex_string())
            .collect();
        let body = json!({
            "token": token,
            "wallet_id": wallet_id,
            "addresses": concatenated,
        });
        Ok(self.post_successful(&url, &body).await)
    }

    /// Fetch `txid` and its dependencies and connect its inputs
    pub async fn resolved_transaction(&self, txid: Txid) -> Result<Transaction, Error> {
        let mut tx = self.transaction(txid).await?;
        let deps = self.dependencies(txid).await;
        resolve(&mut tx, &deps)?;
        Ok(tx)
    }

    /// Like [`RemoteClient::history()`] with every transaction resolved
    pub async fn resolved_history(
        &self,
        address: &str,
        from_height: u32,
    ) -> Result<Vec<HistoryTx>, Error> {
        let mut history = self.history(address, from_height).await?;
        for item in history.iter_mut() {
            let deps = self.dependencies(item.tx.txid()).await;
            resolve(&mut item.tx, &deps)?;
        }
        Ok(history)
    }

    async fn post_successful(&self, url: &str, body: &serde_json::Value) -> bool {
        let result = self
            .policy
            .run(url, || async {
                let text = self.transport.post_json(url, body).await?;
                Ok::<_, Error>(serde_json::from_str::<Successful>(&text)?.successful)
            })
            .await;
        result.unwrap_or(false)
    }

    pub(crate) fn parse_address(&self, address: &str) -> Result<Address, Error> {
        parse_address(address, self.network)
    }
}

/// Fails fast on an address that is empty or not valid for `network`
pub(crate) fn parse_address(address: &str, network: Network) -> Result<Address, Error> {
    if address.trim().is_empty() {
        return Err(Error::InvalidArgument("empty address".to_string()));
    }
    Address::from_str(address.trim())
        .and_then(|a| a.require_network(network.bitcoin_network()))
        .map_err(|e| Error::InvalidArgument(format!("invalid address '{address}': {e}")))
}

pub(crate) fn validate_subscription(
    token: &str,
    wallet_id: &str,
    addresses: &[Address],
) -> Result<(), Error> {
    if token.is_empty() {
        return Err(Error::InvalidArgument("empty token".to_string()));
    }
    if wallet_id.is_empty() {
        return Err(Error::InvalidArgument("empty wallet id".to_string()));
    }
    if addresses.len() < MIN_SUBSCRIBE_ADDRESSES {
        return Err(Error::InvalidArgument(format!(
            "subscribing needs at least {MIN_SUBSCRIBE_ADDRESSES} addresses, got {}",
            addresses.len()
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct Successful {
    successful: bool,
}

#[derive(Deserialize)]
struct TxItem {
    txid: String,
    data: String,
    block: Option<BlockHash>,
    time: Option<u64>,
    height: Option<i32>,
    index: Option<u32>,
}

impl TryFrom<TxItem> for HistoryTx {
    type Error = Error;

    fn try_from(item: TxItem) -> Result<Self, Self::Error> {
        let tx = Transaction::from_hex(&item.data)
            .map_err(|e| Error::Decode(format!("{}: {e}", item.txid)))?;
        if tx.txid().to_string() != item.txid {
            return Err(Error::TxidMismatch {
                expected: item.txid,
                computed: tx.txid(),
            });
        }
        // height <= 0 means unconfirmed
        let height = item.height.filter(|h| *h > 0).map(|h| h as u32);
        Ok(HistoryTx {
            tx,
            block_hash: item.block,
            time: item.time,
            height,
            index: item.index,
        })
    }
}
