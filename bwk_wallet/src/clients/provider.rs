use std::future::Future;
use std::sync::Arc;

use bitcoin::{Address, Txid};
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::clients::remote::{parse_address, validate_subscription, RemoteClient};
use crate::error::Error;
use crate::model::{ChainTipInfo, DependencyMap, HistoryTx, Transaction};
use crate::network::Network;
use crate::task::{self, TaskHandle};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Runs the [`RemoteClient`] on a dedicated background thread.
///
/// Operations are executed one at a time in submission order and return a [`TaskHandle`]
/// immediately, the calling thread never waits on network I/O or retry delays unless it calls
/// [`TaskHandle::wait()`]. Argument errors are reported through an already completed handle,
/// without reaching the worker.
pub struct Provider {
    client: Arc<RemoteClient>,
    jobs: mpsc::UnboundedSender<Job>,
}

impl Provider {
    /// Start the worker thread serving `client`
    pub fn new(client: RemoteClient) -> Result<Self, Error> {
        let network = client.network();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        std::thread::Builder::new()
            .name(format!("bwk-provider-{network}"))
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(job) = rx.recv().await {
                        job().await;
                    }
                });
                log::debug!("provider worker for {network} stopped");
            })?;
        Ok(Self {
            client: Arc::new(client),
            jobs,
        })
    }

    pub fn network(&self) -> Network {
        self.client.network()
    }

    pub fn history(&self, address: &str, from_height: u32) -> TaskHandle<Vec<HistoryTx>> {
        if let Err(e) = parse_address(address, self.network()) {
            return TaskHandle::ready(Err(e));
        }
        let address = address.to_string();
        self.submit("history", move |c| async move {
            c.history(&address, from_height).await
        })
    }

    pub fn transaction(&self, txid: Txid) -> TaskHandle<Transaction> {
        self.submit("transaction", move |c| async move { c.transaction(txid).await })
    }

    pub fn dependencies(&self, txid: Txid) -> TaskHandle<DependencyMap> {
        self.submit("dependencies", move |c| async move {
            Ok(c.dependencies(txid).await)
        })
    }

    pub fn chain_tip(&self) -> TaskHandle<ChainTipInfo> {
        self.submit("chain_tip", |c| async move { c.chain_tip().await })
    }

    pub fn broadcast(&self, tx: Transaction) -> TaskHandle<bool> {
        self.submit("broadcast", move |c| async move { Ok(c.broadcast(&tx).await) })
    }

    pub fn subscribe(
        &self,
        token: &str,
        wallet_id: &str,
        addresses: Vec<Address>,
    ) -> TaskHandle<bool> {
        if let Err(e) = validate_subscription(token, wallet_id, &addresses) {
            return TaskHandle::ready(Err(e));
        }
        let token = token.to_string();
        let wallet_id = wallet_id.to_string();
        self.submit("subscribe", move |c| async move {
            c.subscribe(&token, &wallet_id, &addresses).await
        })
    }

    pub fn resolved_transaction(&self, txid: Txid) -> TaskHandle<Transaction> {
        self.submit("resolved_transaction", move |c| async move {
            c.resolved_transaction(txid).await
        })
    }

    pub fn resolved_history(&self, address: &str, from_height: u32) -> TaskHandle<Vec<HistoryTx>> {
        if let Err(e) = parse_address(address, self.network()) {
            return TaskHandle::ready(Err(e));
        }
        let address = address.to_string();
        self.submit("resolved_history", move |c| async move {
            c.resolved_history(&address, from_height).await
        })
    }

    fn submit<T, F, Fut>(&self, what: &'static str, op: F) -> TaskHandle<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Arc<RemoteClient>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let (completer, handle) = task::channel();
        let client = self.client.clone();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                if completer.is_cancelled() {
                    log::debug!("{what} cancelled before starting");
                    return;
                }
                let result = tokio::select! {
                    result = op(client) => result,
                    _ = completer.cancelled() => {
                        log::debug!("{what} cancelled while running");
                        return;
                    }
                };
                completer.complete(result);
            })
        });
        // a failed send drops the job and its completer, which reports `WorkerStopped`
        if self.jobs.send(job).is_err() {
            log::warn!("{what} submitted to a stopped worker");
        }
        handle
    }
}
