use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{Error, ExchangeRate, Fiat, PriceSource, TradingPair};

const COINBASE_URL: &str = "https://api.coinbase.com";
const KRAKEN_URL: &str = "https://api.kraken.com";

// Response types for different APIs
#[derive(Deserialize)]
struct CoinbaseResponse {
    data: CoinbaseData,
}

#[derive(Deserialize)]
struct CoinbaseData {
    amount: String,
}

/// A builder for the [`HttpPriceSource`]
pub struct HttpPriceSourceBuilder {
    timeout: Duration,
    coinbase_url: String,
    kraken_url: String,
}

impl Default for HttpPriceSourceBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            coinbase_url: COINBASE_URL.to_string(),
            kraken_url: KRAKEN_URL.to_string(),
        }
    }
}

impl HttpPriceSourceBuilder {
    /// Set the timeout for HTTP requests
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base url of the Coinbase API, used for USD
    pub fn coinbase_url(mut self, url: &str) -> Self {
        self.coinbase_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Base url of the Kraken API, used for EUR
    pub fn kraken_url(mut self, url: &str) -> Self {
        self.kraken_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn build(self) -> Result<HttpPriceSource, Error> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(HttpPriceSource {
            client,
            coinbase_url: self.coinbase_url,
            kraken_url: self.kraken_url,
        })
    }
}

/// Prices from public exchange APIs, one exchange per fiat currency
pub struct HttpPriceSource {
    client: reqwest::Client,
    coinbase_url: String,
    kraken_url: String,
}

impl HttpPriceSource {
    pub fn new() -> Result<Self, Error> {
        Self::builder().build()
    }

    pub fn builder() -> HttpPriceSourceBuilder {
        HttpPriceSourceBuilder::default()
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status();
        log::trace!("{url} status_code:{status}");
        if !status.is_success() {
            return Err(Error::Http(format!("{url} returned {status}")));
        }
        response.json().await.map_err(|e| Error::Http(e.to_string()))
    }

    async fn coinbase(&self, pair: TradingPair) -> Result<f64, Error> {
        let url = format!("{}/v2/prices/BTC-{}/spot", self.coinbase_url, pair.fiat);
        let response: CoinbaseResponse = self.get_json(&url).await?;
        response
            .data
            .amount
            .parse::<f64>()
            .map_err(|e| Error::Http(format!("Parse error: {e}")))
    }

    async fn kraken(&self, pair: TradingPair) -> Result<f64, Error> {
        let url = format!(
            "{}/0/public/Ticker?pair=XBT{}",
            self.kraken_url, pair.fiat
        );
        let response: Value = self.get_json(&url).await?;

        // Kraken returns different keys based on currency (XXBTZUSD, XXBTZEUR, etc.)
        let result = response
            .get("result")
            .and_then(|r| r.as_object())
            .and_then(|obj| obj.values().next())
            .ok_or_else(|| Error::Http("Invalid Kraken response".to_string()))?;

        result
            .get("c")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Http("Missing price in Kraken response".to_string()))?
            .parse::<f64>()
            .map_err(|e| Error::Http(format!("Parse error: {e}")))
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch(&self, pair: TradingPair) -> Result<ExchangeRate, Error> {
        let (rate, source) = match pair.fiat {
            Fiat::Usd => (self.coinbase(pair).await?, "Coinbase"),
            Fiat::Eur => (self.kraken(pair).await?, "Kraken"),
        };
        Ok(ExchangeRate {
            rate,
            pair,
            source: source.to_string(),
            timestamp: now(),
        })
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
