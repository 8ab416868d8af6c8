use std::time::Duration;

use bwk_wallet::{Network, RetryPolicy};

#[derive(Clone, Debug)]
pub struct Config {
    /// Base url of the remote transaction service
    pub server_url: String,
    pub network: Network,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,

    /// How long to wait for the first price
    pub price_timeout: Duration,
}

impl Config {
    pub fn default_mainnet(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            network: Network::Mainnet,
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            price_timeout: Duration::from_secs(30),
        }
    }

    pub fn default_testnet(server_url: &str) -> Self {
        Self {
            network: Network::Testnet,
            ..Self::default_mainnet(server_url)
        }
    }

    /// A local server either answers or is not running, so regtest does not retry
    pub fn default_regtest(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            network: Network::Regtest,
            timeout: Duration::from_secs(5),
            retry_policy: RetryPolicy::no_retry(),
            price_timeout: Duration::from_secs(30),
        }
    }
}
