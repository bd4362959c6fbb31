use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timestamp;
use crate::fingerprint::Fingerprint;

/// Single print reported by a venue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub fingerprint: String,
    pub source: String,
    pub symbol: String,
    /// Venue-assigned trade id
    pub id: i64,
    pub exchange: String,
    pub price: Decimal,
    pub size: Decimal,
    pub timestamp: Timestamp,
    pub conditions: Vec<String>,
    pub tape: String,
}

impl Trade {
    /// Returns the notional value of the trade (price * size)
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

impl Fingerprint for Trade {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn store_fingerprint(&mut self, fingerprint: String) {
        self.fingerprint = fingerprint;
    }
}
