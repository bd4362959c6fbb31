use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Timestamp;
use crate::fingerprint::Fingerprint;

/// Sentiment score attached to one news article for one symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsSentiment {
    pub fingerprint: String,
    /// Fingerprint of the scored article
    pub news_fingerprint: String,
    pub symbol: String,
    /// Score in [-1, 1], negative is bearish
    pub score: Decimal,
    pub label: String,
    pub reasoning: String,
    pub model: String,
    /// When the score was produced
    pub timestamp: Timestamp,
}

impl NewsSentiment {
    pub fn new(
        news_fingerprint: impl Into<String>,
        symbol: impl Into<String>,
        score: Decimal,
        label: impl Into<String>,
    ) -> Self {
        Self {
            news_fingerprint: news_fingerprint.into(),
            symbol: symbol.into(),
            score,
            label: label.into(),
            timestamp: Utc::now(),
            ..Default::default()
        }
    }
}

impl Fingerprint for NewsSentiment {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn store_fingerprint(&mut self, fingerprint: String) {
        self.fingerprint = fingerprint;
    }

    // Rescoring the same article must not produce a new identity
    fn masked(&self) -> Self {
        Self {
            fingerprint: String::new(),
            timestamp: DateTime::<Utc>::default(),
            ..self.clone()
        }
    }
}
