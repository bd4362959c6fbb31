use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timestamp;
use crate::fingerprint::Fingerprint;
use crate::types::TimeFrame;

/// OHLCV aggregate for one symbol over one timeframe window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub fingerprint: String,
    pub source: String,
    pub symbol: String,
    pub time_frame: TimeFrame,
    /// Window start
    pub timestamp: Timestamp,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
    pub trade_count: u64,
    pub vwap: Decimal,
}

impl Bar {
    /// Returns the high-low range of the bar
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}

impl Fingerprint for Bar {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn store_fingerprint(&mut self, fingerprint: String) {
        self.fingerprint = fingerprint;
    }
}
