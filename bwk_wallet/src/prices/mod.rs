//! # Prices
//!
//! Exchange rates of fiat currencies against BTC, the trackers keeping them fresh while someone
//! is interested and conversions between bitcoin amounts and fiat values.

mod sources;
mod tracker;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::Amount;

pub use sources::{HttpPriceSource, HttpPriceSourceBuilder};
pub use tracker::{ListenerId, PriceTracker, PriceTrackerConfig, TrackerState};

#[allow(missing_docs)]
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unrecognized currency: {0}")]
    UnrecognizedCurrency(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Fiat currencies with a price source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fiat {
    Usd,
    Eur,
}

impl Fiat {
    pub fn alpha3(&self) -> &'static str {
        match self {
            Fiat::Usd => "USD",
            Fiat::Eur => "EUR",
        }
    }
}

impl fmt::Display for Fiat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alpha3())
    }
}

impl FromStr for Fiat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "USD" => Ok(Fiat::Usd),
            "EUR" => Ok(Fiat::Eur),
            other if other.len() == 3 && other.chars().all(|c| c.is_ascii_alphabetic()) => {
                Err(Error::UnsupportedCurrency(other.to_string()))
            }
            _ => Err(Error::UnrecognizedCurrency(s.to_string())),
        }
    }
}

/// BTC against a fiat currency, displayed as `BTC-USD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TradingPair {
    pub fiat: Fiat,
}

impl TradingPair {
    pub fn new(fiat: Fiat) -> Self {
        Self { fiat }
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BTC-{}", self.fiat)
    }
}

/// `rate` is the amount of fiat needed to buy 1 BTC from `source`
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ExchangeRate {
    pub rate: f64,

    #[serde(serialize_with = "serialize_pair")]
    pub pair: TradingPair,

    pub source: String,

    /// Unix time of the fetch, in seconds
    pub timestamp: u64,
}

fn serialize_pair<S: serde::Serializer>(pair: &TradingPair, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(pair)
}

/// Something able to tell the current price of a pair
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, pair: TradingPair) -> Result<ExchangeRate, Error>;
}

/// Conversions between bitcoin amounts and fiat values at a given price
pub struct CurrencyConverter;

impl CurrencyConverter {
    /// Fiat value of `amount` when 1 BTC costs `price`
    pub fn to_fiat(amount: Amount, price: f64) -> Result<f64, Error> {
        check_price(price)?;
        Ok(amount.to_btc() * price)
    }

    /// Amount buyable with `fiat` when 1 BTC costs `price`, rounded to the nearest satoshi
    pub fn to_sats(fiat: f64, price: f64) -> Result<Amount, Error> {
        check_price(price)?;
        if !fiat.is_finite() || fiat < 0.0 {
            return Err(Error::InvalidPrice(fiat));
        }
        let sats = (fiat / price * Amount::ONE_BTC.to_sat() as f64).round();
        Ok(Amount::from_sat(sats as u64))
    }
}

fn check_price(price: f64) -> Result<(), Error> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidPrice(price))
    }
}
