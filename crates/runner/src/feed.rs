//! Market feed - simulated source of market data
//!
//! Generates prices by a bounded random walk per symbol and turns them into
//! the entities the services exchange:
//! - Historical bars, one walk step per bar
//! - Live trades and quotes, one walk step per tick
//!
//! Seeded feeds are reproducible, which the tests rely on.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use marketbus_core::{Bar, Fingerprint, Quote, TimeFrame, Timestamp, Trade, sources};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

/// Configuration for the simulated feed
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Source name stamped on every entity
    pub source: String,
    /// Starting price per symbol; unknown symbols produce no data
    pub initial_prices: HashMap<String, Decimal>,
    /// Max relative move per walk step (e.g. 0.001 = 0.1%)
    pub price_volatility: f64,
    /// Half of the quoted spread, relative to price
    pub half_spread: Decimal,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let mut initial_prices = HashMap::new();
        initial_prices.insert("AAPL".to_string(), dec!(190.00));
        initial_prices.insert("MSFT".to_string(), dec!(420.00));
        initial_prices.insert("BTCUSD".to_string(), dec!(60000.00));

        Self {
            source: sources::DEFAULT.to_string(),
            initial_prices,
            price_volatility: 0.001,
            half_spread: dec!(0.0005),
        }
    }
}

/// Length of one bar window
pub fn window(time_frame: TimeFrame) -> Duration {
    match time_frame {
        TimeFrame::Minute => Duration::minutes(1),
        TimeFrame::Hour => Duration::hours(1),
        TimeFrame::Day => Duration::days(1),
        TimeFrame::Week => Duration::weeks(1),
        TimeFrame::Month => Duration::days(30),
    }
}

pub struct MarketFeed {
    prices: HashMap<String, Decimal>,
    config: FeedConfig,
    rng: StdRng,
    next_trade_id: i64,
}

impl MarketFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create with a specific seed for reproducible runs
    pub fn with_seed(config: FeedConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: FeedConfig, rng: StdRng) -> Self {
        Self {
            prices: config.initial_prices.clone(),
            config,
            rng,
            next_trade_id: 1,
        }
    }

    pub fn source(&self) -> &str {
        &self.config.source
    }

    /// Current price of `symbol`
    pub fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    pub fn knows(&self, symbol: &str) -> bool {
        self.prices.contains_key(symbol)
    }

    /// Advance the walk of `symbol` by one step and return the new price
    pub fn step(&mut self, symbol: &str) -> Option<Decimal> {
        let current = self.price(symbol)?;
        let change: f64 = self.rng.gen_range(-1.0..1.0);
        let multiplier = 1.0 + self.config.price_volatility * change;
        let next = current
            .to_f64()
            .and_then(|price| Decimal::from_f64_retain(price * multiplier))
            .map(|price| price.round_dp(2))
            .filter(|price| *price > Decimal::ZERO)
            .unwrap_or(current);
        self.prices.insert(symbol.to_string(), next);
        Some(next)
    }

    /// `count` consecutive bars for `symbol` starting at `start`, stamped
    /// with their fingerprints. Empty for unknown symbols.
    pub fn bars(
        &mut self,
        symbol: &str,
        time_frame: TimeFrame,
        start: Timestamp,
        count: usize,
    ) -> Vec<Bar> {
        let mut bars = Vec::with_capacity(count);
        let mut timestamp = start;
        for _ in 0..count {
            let Some(open) = self.price(symbol) else {
                return Vec::new();
            };
            let mut high = open;
            let mut low = open;
            let mut close = open;
            for _ in 0..4 {
                if let Some(price) = self.step(symbol) {
                    high = high.max(price);
                    low = low.min(price);
                    close = price;
                }
            }
            let volume = self.rng.gen_range(100..10_000u64);
            let mut bar = Bar {
                fingerprint: String::new(),
                source: self.config.source.clone(),
                symbol: symbol.to_string(),
                time_frame,
                timestamp,
                open,
                high,
                low,
                close,
                volume,
                trade_count: volume / 10,
                vwap: ((high + low + close) / dec!(3)).round_dp(2),
            };
            // Fingerprinting only fails on serialization, which cannot happen for a bar
            let _ = bar.set_fingerprint();
            bars.push(bar);
            timestamp += window(time_frame);
        }
        bars
    }

    /// Next live trade for `symbol`
    pub fn next_trade(&mut self, symbol: &str) -> Option<Trade> {
        let price = self.step(symbol)?;
        let size = Decimal::from(self.rng.gen_range(1..500u32));
        let id = self.next_trade_id;
        self.next_trade_id += 1;

        let mut trade = Trade {
            fingerprint: String::new(),
            source: self.config.source.clone(),
            symbol: symbol.to_string(),
            id,
            exchange: "SIM".to_string(),
            price,
            size,
            timestamp: Utc::now(),
            conditions: Vec::new(),
            tape: "A".to_string(),
        };
        let _ = trade.set_fingerprint();
        Some(trade)
    }

    /// Next live quote for `symbol`, centred on the walked price
    pub fn next_quote(&mut self, symbol: &str) -> Option<Quote> {
        let mid = self.step(symbol)?;
        let half = (mid * self.config.half_spread).round_dp(2).max(dec!(0.01));
        let bid_size = Decimal::from(self.rng.gen_range(1..50u32) * 100);
        let ask_size = Decimal::from(self.rng.gen_range(1..50u32) * 100);

        let mut quote = Quote {
            fingerprint: String::new(),
            source: self.config.source.clone(),
            symbol: symbol.to_string(),
            bid_exchange: "SIM".to_string(),
            bid_price: mid - half,
            bid_size,
            ask_exchange: "SIM".to_string(),
            ask_price: mid + half,
            ask_size,
            timestamp: Utc::now(),
            conditions: Vec::new(),
        };
        let _ = quote.set_fingerprint();
        Some(quote)
    }
}
