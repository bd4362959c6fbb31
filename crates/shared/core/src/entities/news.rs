use serde::{Deserialize, Serialize};

use super::Timestamp;
use crate::fingerprint::Fingerprint;

/// News article as published by a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct News {
    pub fingerprint: String,
    pub source: String,
    /// Provider article id
    pub id: i64,
    pub headline: String,
    pub summary: String,
    pub content: String,
    pub author: String,
    pub url: String,
    /// Symbols the article is tagged with
    pub symbols: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl News {
    pub fn mentions(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }
}

impl Fingerprint for News {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn store_fingerprint(&mut self, fingerprint: String) {
        self.fingerprint = fingerprint;
    }
}
