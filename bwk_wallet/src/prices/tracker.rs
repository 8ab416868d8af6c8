use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::{ExchangeRate, PriceSource, TradingPair};
use crate::clients::async_sleep;
use crate::task::Executor;

/// Timing of a [`PriceTracker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTrackerConfig {
    /// Wait between successful fetches
    pub refresh_interval: Duration,

    /// Failed fetches retried right away before falling back to `backoff`
    pub immediate_retries: u32,

    /// Wait after `immediate_retries` consecutive failures
    pub backoff: Duration,
}

impl Default for PriceTrackerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5 * 60),
            immediate_retries: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No listener, nothing scheduled
    Idle,

    /// At least one listener, prices are refreshed periodically
    Active,
}

/// Identifies a listener registered with [`PriceTracker::add_listener()`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type PriceCallback = Arc<dyn Fn(ExchangeRate) + Send + Sync>;

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    executor: Arc<dyn Executor>,
    callback: PriceCallback,

    /// Sequence number of the newest price delivered
    delivered: Arc<AtomicU64>,
}

impl Listener {
    /// Prices older than one already delivered are dropped
    fn dispatch(&self, price: Published) {
        let callback = self.callback.clone();
        let delivered = self.delivered.clone();
        self.executor.execute(Box::new(move || {
            if delivered.fetch_max(price.seq, Ordering::SeqCst) < price.seq {
                callback(price.rate)
            }
        }));
    }
}

#[derive(Clone)]
struct Published {
    seq: u64,
    rate: ExchangeRate,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    entries: Vec<Listener>,
    refresh: Option<JoinHandle<()>>,
    last: Option<Published>,
}

struct Shared {
    pair: TradingPair,
    source: Arc<dyn PriceSource>,
    config: PriceTrackerConfig,
    inner: Mutex<Inner>,
}

impl Shared {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, rate: ExchangeRate) {
        // callbacks may register or remove listeners, don't hold the lock while dispatching
        let (price, listeners) = {
            let mut inner = self.inner();
            let seq = inner.last.as_ref().map_or(1, |p| p.seq + 1);
            let price = Published { seq, rate };
            inner.last = Some(price.clone());
            (price, inner.entries.clone())
        };
        log::debug!(
            "{} is {} from {}, notifying {} listeners",
            self.pair,
            price.rate.rate,
            price.rate.source,
            listeners.len()
        );
        for listener in listeners.iter() {
            listener.dispatch(price.clone());
        }
    }
}

/// Keeps the price of a [`TradingPair`] up to date while someone is listening.
///
/// The first listener triggers an immediate fetch, followed by a refresh every
/// [`PriceTrackerConfig::refresh_interval`]. A failed fetch is retried immediately, up to
/// [`PriceTrackerConfig::immediate_retries`] times in a row, then after
/// [`PriceTrackerConfig::backoff`]. Removing the last listener stops refreshing.
pub struct PriceTracker {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl PriceTracker {
    /// The refresh task is spawned on `runtime`
    pub fn new(
        pair: TradingPair,
        source: Arc<dyn PriceSource>,
        config: PriceTrackerConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                pair,
                source,
                config,
                inner: Mutex::new(Inner::default()),
            }),
            runtime,
        }
    }

    pub fn pair(&self) -> TradingPair {
        self.shared.pair
    }

    pub fn state(&self) -> TrackerState {
        match self.shared.inner().refresh {
            Some(_) => TrackerState::Active,
            None => TrackerState::Idle,
        }
    }

    /// The last fetched price, if any
    pub fn last_price(&self) -> Option<f64> {
        self.last_rate().map(|r| r.rate)
    }

    pub fn last_rate(&self) -> Option<ExchangeRate> {
        self.shared.inner().last.as_ref().map(|p| p.rate.clone())
    }

    pub fn listener_count(&self) -> usize {
        self.shared.inner().entries.len()
    }

    /// Call `callback` on `executor` with every new price.
    ///
    /// A listener joining an active tracker immediately receives the last known price, unless a
    /// newer one reaches it first.
    pub fn add_listener<F>(&self, executor: Arc<dyn Executor>, callback: F) -> ListenerId
    where
        F: Fn(ExchangeRate) + Send + Sync + 'static,
    {
        let (listener, cached) = {
            let mut inner = self.shared.inner();
            let id = ListenerId(inner.next_id);
            inner.next_id += 1;
            let listener = Listener {
                id,
                executor,
                callback: Arc::new(callback),
                delivered: Arc::new(AtomicU64::new(0)),
            };
            inner.entries.push(listener.clone());
            let cached = match inner.refresh {
                Some(_) => inner.last.clone(),
                None => {
                    log::info!("tracking {}", self.shared.pair);
                    let shared = self.shared.clone();
                    inner.refresh = Some(self.runtime.spawn(refresh_loop(shared)));
                    None
                }
            };
            (listener, cached)
        };
        if let Some(price) = cached {
            listener.dispatch(price);
        }
        listener.id
    }

    /// Returns false if `id` was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.shared.inner();
        let before = inner.entries.len();
        inner.entries.retain(|l| l.id != id);
        let removed = inner.entries.len() < before;
        if removed && inner.entries.is_empty() {
            if let Some(refresh) = inner.refresh.take() {
                log::info!("stop tracking {}", self.shared.pair);
                refresh.abort();
            }
        }
        removed
    }
}

impl Drop for PriceTracker {
    fn drop(&mut self) {
        if let Some(refresh) = self.shared.inner().refresh.take() {
            refresh.abort();
        }
    }
}

async fn refresh_loop(shared: Arc<Shared>) {
    let mut failures = 0;
    loop {
        match shared.source.fetch(shared.pair).await {
            Ok(rate) => {
                failures = 0;
                shared.publish(rate);
                async_sleep(shared.config.refresh_interval).await;
            }
            Err(e) => {
                failures += 1;
                log::warn!("fetching {} failed ({failures} in a row): {e}", shared.pair);
                if failures > shared.config.immediate_retries {
                    failures = 0;
                    async_sleep(shared.config.backoff).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::runtime::Handle;

    use super::{Listener, ListenerId, PriceTracker, PriceTrackerConfig, Published, TrackerState};
    use crate::prices::{Error, ExchangeRate, Fiat, PriceSource, TradingPair};
    use crate::task::Inline;

    /// Returns 100 times the number of calls, failing the first `failures` calls
    struct Counting {
        calls: AtomicUsize,
        failures: usize,
    }

    impl Counting {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSource for Counting {
        async fn fetch(&self, pair: TradingPair) -> Result<ExchangeRate, Error> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                return Err(Error::Http("unavailable".into()));
            }
            Ok(ExchangeRate {
                rate: n as f64 * 100.0,
                pair,
                source: "counting".into(),
                timestamp: 0,
            })
        }
    }

    fn tracker(source: Arc<Counting>) -> PriceTracker {
        PriceTracker::new(
            TradingPair::new(Fiat::Usd),
            source,
            PriceTrackerConfig::default(),
            Handle::current(),
        )
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl Fn(ExchangeRate) + Send + Sync) {
        let seen = Arc::new(Mutex::new(vec![]));
        let s = seen.clone();
        (seen, move |rate: ExchangeRate| s.lock().unwrap().push(rate.rate))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_listener_fetches_immediately() {
        let source = Counting::new(0);
        let tracker = tracker(source.clone());
        assert_eq!(tracker.state(), TrackerState::Idle);
        assert_eq!(tracker.last_price(), None);

        let (seen, callback) = recorder();
        tracker.add_listener(Arc::new(Inline), callback);
        assert_eq!(tracker.state(), TrackerState::Active);
        settle().await;

        assert_eq!(source.calls(), 1);
        assert_eq!(tracker.last_price(), Some(100.0));
        assert_eq!(*seen.lock().unwrap(), vec![100.0]);

        // a second listener gets the cached price without a new fetch
        let (seen2, callback2) = recorder();
        tracker.add_listener(Arc::new(Inline), callback2);
        settle().await;
        assert_eq!(source.calls(), 1);
        assert_eq!(*seen2.lock().unwrap(), vec![100.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh_and_stop() {
        let source = Counting::new(0);
        let tracker = tracker(source.clone());
        let (seen, callback) = recorder();
        let id = tracker.add_listener(Arc::new(Inline), callback);
        settle().await;

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![100.0, 200.0]);

        assert!(tracker.remove_listener(id));
        assert!(!tracker.remove_listener(id));
        assert_eq!(tracker.state(), TrackerState::Idle);
        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        assert_eq!(source.calls(), 2);
        // the last price survives
        assert_eq!(tracker.last_price(), Some(200.0));
    }

    async fn yield_many() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_retried_immediately() {
        let source = Counting::new(1);
        let tracker = tracker(source.clone());
        let (seen, callback) = recorder();
        let start = tokio::time::Instant::now();
        tracker.add_listener(Arc::new(Inline), callback);
        yield_many().await;

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(source.calls(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![200.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_backs_off() {
        let source = Counting::new(usize::MAX);
        let tracker = tracker(source.clone());
        let (seen, callback) = recorder();
        tracker.add_listener(Arc::new(Inline), callback);
        yield_many().await;
        // the first attempt plus the immediate retries
        assert_eq!(source.calls(), 4);

        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert_eq!(source.calls(), 8);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_listener_drops_older_price() {
        let (seen, callback) = recorder();
        let listener = Listener {
            id: ListenerId(0),
            executor: Arc::new(Inline),
            callback: Arc::new(callback),
            delivered: Arc::new(AtomicU64::new(0)),
        };
        let price = |seq, rate| Published {
            seq,
            rate: ExchangeRate {
                rate,
                pair: TradingPair::new(Fiat::Usd),
                source: "test".into(),
                timestamp: 0,
            },
        };
        listener.dispatch(price(2, 200.0));
        listener.dispatch(price(1, 100.0));
        listener.dispatch(price(2, 200.0));
        listener.dispatch(price(3, 300.0));
        assert_eq!(*seen.lock().unwrap(), vec![200.0, 300.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_idle() {
        let source = Counting::new(0);
        let tracker = tracker(source.clone());
        let (_, callback) = recorder();
        let id = tracker.add_listener(Arc::new(Inline), callback);
        settle().await;
        tracker.remove_listener(id);

        let (_, callback) = recorder();
        tracker.add_listener(Arc::new(Inline), callback);
        settle().await;
        assert_eq!(source.calls(), 2);
        assert_eq!(tracker.listener_count(), 1);
    }
}
