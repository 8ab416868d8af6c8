use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::clients::{Provider, RemoteClient, RetryPolicy, Transport};
use crate::error::Error;
use crate::network::Network;
use crate::prices::{HttpPriceSource, PriceSource, PriceTracker, PriceTrackerConfig, TradingPair};

/// One [`Provider`] per network and one [`PriceTracker`] per trading pair.
///
/// Meant to be created once by the application and passed to whoever needs a provider or a
/// tracker. Values are created on first request, concurrent first requests get the same value.
pub struct Registry {
    server_url: String,
    policy: RetryPolicy,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    price_source: Arc<dyn PriceSource>,
    tracker_config: PriceTrackerConfig,
    runtime: Handle,
    providers: Mutex<HashMap<Network, Arc<Provider>>>,
    trackers: Mutex<HashMap<TradingPair, Arc<PriceTracker>>>,
}

impl Registry {
    /// Price trackers refresh on `runtime`
    pub fn new(server_url: &str, runtime: Handle) -> Result<Self, Error> {
        Ok(Self {
            server_url: server_url.to_string(),
            policy: RetryPolicy::default(),
            timeout: None,
            transport: None,
            price_source: Arc::new(HttpPriceSource::new()?),
            tracker_config: PriceTrackerConfig::default(),
            runtime,
            providers: Mutex::new(HashMap::new()),
            trackers: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// HTTP timeout of the providers
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_price_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.price_source = source;
        self
    }

    pub fn with_tracker_config(mut self, config: PriceTrackerConfig) -> Self {
        self.tracker_config = config;
        self
    }

    /// The provider for `network`, started on first use
    pub fn provider(&self, network: Network) -> Result<Arc<Provider>, Error> {
        let mut providers = lock(&self.providers);
        if let Some(provider) = providers.get(&network) {
            return Ok(provider.clone());
        }
        let mut builder =
            RemoteClient::builder(&self.server_url, network).retry_policy(self.policy.clone());
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(transport) = &self.transport {
            builder = builder.transport(transport.clone());
        }
        let provider = Arc::new(Provider::new(builder.build()?)?);
        log::debug!("created provider for {network}");
        providers.insert(network, provider.clone());
        Ok(provider)
    }

    pub fn tracker(&self, pair: TradingPair) -> Arc<PriceTracker> {
        lock(&self.trackers)
            .entry(pair)
            .or_insert_with(|| {
                log::debug!("created tracker for {pair}");
                Arc::new(PriceTracker::new(
                    pair,
                    self.price_source.clone(),
                    self.tracker_config.clone(),
                    self.runtime.clone(),
                ))
            })
            .clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
