use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timestamp;
use crate::fingerprint::Fingerprint;

/// Top-of-book quote
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub fingerprint: String,
    pub source: String,
    pub symbol: String,
    pub bid_exchange: String,
    pub bid_price: Decimal,
    pub bid_size: Decimal,
    pub ask_exchange: String,
    pub ask_price: Decimal,
    pub ask_size: Decimal,
    pub timestamp: Timestamp,
    pub conditions: Vec<String>,
}

impl Quote {
    pub fn spread(&self) -> Decimal {
        self.ask_price - self.bid_price
    }

    pub fn mid(&self) -> Decimal {
        (self.ask_price + self.bid_price) / Decimal::TWO
    }
}

impl Fingerprint for Quote {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn store_fingerprint(&mut self, fingerprint: String) {
        self.fingerprint = fingerprint;
    }
}
