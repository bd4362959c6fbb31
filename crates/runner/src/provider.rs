//! Simulated data provider
//!
//! ```text
//!  dataprovider.command ──► data   ──► MarketFeed bars ──► QueuePublisher (batch)
//!                      └──► stream ──► live topic set
//!  publish_ticks ──► one entity per live topic ──► StreamPublisher
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use log::{debug, info, warn};
use marketbus_core::{
    AssetClass, Bar, Component, DataRequest, DataResponse, DataType, JsonCommand, JsonOperation,
    Message, Reply, Response, StreamOperation, StreamRequest, StreamResponse, TimeFrame, Topic,
    stream_prefix,
};
use marketbus_messaging::{
    Bus, CliHandler, CommandContext, CommandDispatcher, CommandOutput, JsonHandler,
};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ServiceError};
use crate::feed::{MarketFeed, window};

pub const PROVIDER: Component = Component::DataProvider;

/// Bars served when a request carries no time range
pub const DEFAULT_BAR_COUNT: usize = 10;

/// Upper bound on one historical batch
pub const MAX_BAR_COUNT: usize = 1_000;

/// A live stream the provider publishes on
#[derive(Debug, Clone, PartialEq, Eq)]
struct LiveStream {
    data_type: DataType,
    symbol: String,
}

pub struct DataProvider {
    bus: Arc<Bus>,
    feed: Mutex<MarketFeed>,
    live: RwLock<BTreeMap<String, LiveStream>>,
}

impl DataProvider {
    pub fn new(bus: Arc<Bus>, feed: MarketFeed) -> Arc<Self> {
        Arc::new(Self {
            bus,
            feed: Mutex::new(feed),
            live: RwLock::new(BTreeMap::new()),
        })
    }

    /// Start serving `dataprovider.command`
    pub async fn start(self: &Arc<Self>) -> Result<Arc<CommandDispatcher>> {
        let dispatcher = self
            .bus
            .start_commands(PROVIDER, self.clone(), self.clone())
            .await?;
        Ok(dispatcher)
    }

    /// Answer a historical request with a batch of bars, trades or quotes
    pub async fn handle_data(&self, mut request: DataRequest) -> DataResponse {
        request.apply_defaults();
        debug!("[{}] data request {:?}", PROVIDER, request);

        let queues = self.bus.queues();
        match request.data_type {
            dt if dt.is_bar() => {
                let bars = self.bars_for(&request);
                queues.serve_batch(PROVIDER, &request, bars).await
            }
            DataType::Trades => {
                let trades = self.ticks(&request, MarketFeed::next_trade);
                queues.serve_batch(PROVIDER, &request, trades).await
            }
            DataType::Quotes => {
                let quotes = self.ticks(&request, MarketFeed::next_quote);
                queues.serve_batch(PROVIDER, &request, quotes).await
            }
            other => DataResponse::failure(ServiceError::Unsupported(format!("data {other}"))),
        }
    }

    fn bars_for(&self, request: &DataRequest) -> Vec<Bar> {
        let time_frame = request.time_frame.unwrap_or_default();
        let step = window(time_frame);
        let (start, count) = match (request.start_time, request.end_time) {
            (Some(start), Some(end)) if end > start => {
                let windows = (end - start).num_seconds() / step.num_seconds().max(1);
                (start, (windows as usize).clamp(1, MAX_BAR_COUNT))
            }
            (Some(start), _) => (start, DEFAULT_BAR_COUNT),
            _ => {
                let end = request.end_time.unwrap_or_else(Utc::now);
                (end - step * DEFAULT_BAR_COUNT as i32, DEFAULT_BAR_COUNT)
            }
        };
        self.feed
            .lock()
            .bars(&request.symbol, time_frame, start, count)
    }

    fn ticks<E>(&self, request: &DataRequest, next: fn(&mut MarketFeed, &str) -> Option<E>) -> Vec<E> {
        let mut feed = self.feed.lock();
        (0..DEFAULT_BAR_COUNT)
            .map_while(|_| next(&mut *feed, &request.symbol))
            .collect()
    }

    /// Manage the set of live streams
    pub fn handle_stream(&self, mut request: StreamRequest) -> StreamResponse {
        request.apply_defaults();
        let message = match request.operation {
            StreamOperation::Add => {
                if request.symbols.is_empty() || request.data_types.is_empty() {
                    return StreamResponse::failure(ServiceError::EmptyStreamRequest);
                }
                let mut live = self.live.write();
                for topic in request.topics(PROVIDER) {
                    let subject = topic.generate();
                    self.bus.streams().handler_for(&subject);
                    live.insert(subject, live_stream(&topic));
                }
                "Successfully added stream/s"
            }
            StreamOperation::Remove => {
                if request.symbols.is_empty() || request.data_types.is_empty() {
                    return StreamResponse::failure(ServiceError::EmptyStreamRequest);
                }
                let mut live = self.live.write();
                for topic in request.topics(PROVIDER) {
                    live.remove(&topic.generate());
                }
                // publishers without a remaining live topic are stopped
                for prefix in self.bus.streams().prefixes() {
                    let in_use = live
                        .keys()
                        .any(|subject| stream_prefix(subject) == prefix);
                    if !in_use {
                        self.bus.streams().stop(&prefix);
                    }
                }
                "Successfully removed stream/s"
            }
            StreamOperation::Stop => {
                self.live.write().clear();
                self.bus.streams().stop_all();
                "Stopped all streams"
            }
            StreamOperation::Get => "Current streams",
        };
        info!("[{}] {}", PROVIDER, message);
        StreamResponse::success(message, self.live_topics(), self.bus.streams().prefixes())
    }

    /// Subjects currently published on
    pub fn live_topics(&self) -> Vec<String> {
        self.live.read().keys().cloned().collect()
    }

    /// Publish one fresh entity on every live stream, `ticks` times.
    /// Returns the number of messages queued for publication.
    pub async fn publish_ticks(&self, ticks: usize) -> Result<usize> {
        let mut published = 0;
        for _ in 0..ticks {
            for message in self.next_messages()? {
                self.bus.streams().publish(message).await?;
                published += 1;
            }
        }
        Ok(published)
    }

    fn next_messages(&self) -> Result<Vec<Message>> {
        let live: Vec<(String, LiveStream)> = self
            .live
            .read()
            .iter()
            .map(|(subject, stream)| (subject.clone(), stream.clone()))
            .collect();

        let mut feed = self.feed.lock();
        let mut messages = Vec::with_capacity(live.len());
        for (subject, stream) in live {
            let message = match stream.data_type {
                DataType::Trades => feed
                    .next_trade(&stream.symbol)
                    .map(|t| Message::from_entity(subject.as_str(), DataType::Trades, &t)),
                DataType::Quotes => feed
                    .next_quote(&stream.symbol)
                    .map(|q| Message::from_entity(subject.as_str(), DataType::Quotes, &q)),
                dt if dt.is_bar() => feed
                    .bars(&stream.symbol, TimeFrame::Minute, Utc::now(), 1)
                    .pop()
                    .map(|b| Message::from_entity(subject.as_str(), dt, &b)),
                other => {
                    debug!("[{}] no simulated {} data", subject, other);
                    None
                }
            };
            if let Some(message) = message {
                messages.push(message?);
            }
        }
        Ok(messages)
    }

    /// Publish a tick every `interval` until `token` is cancelled
    pub async fn run_streams(&self, token: CancellationToken, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_ticks(1).await {
                        warn!("[{}] tick failed: {}", PROVIDER, e);
                    }
                }
            }
        }
        debug!("[{}] stream loop stopped", PROVIDER);
    }
}

fn live_stream(topic: &Topic) -> LiveStream {
    LiveStream {
        data_type: topic.data_type.unwrap_or(DataType::Trades),
        symbol: topic.symbol.clone(),
    }
}

#[async_trait]
impl JsonHandler for DataProvider {
    async fn handle(&self, _ctx: &CommandContext, command: JsonCommand) -> String {
        match command.operation {
            JsonOperation::Data => match command.parse_request::<DataRequest>() {
                Ok(request) => self.handle_data(request).await.respond(),
                Err(e) => DataResponse::failure(e).respond(),
            },
            JsonOperation::Stream => match command.parse_request::<StreamRequest>() {
                Ok(request) => self.handle_stream(request).respond(),
                Err(e) => StreamResponse::failure(e).respond(),
            },
            other => Response::failure(ServiceError::Unsupported(other.to_string())).respond(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "dataprovider", about = "Simulated market data provider")]
struct ProviderCli {
    #[command(subcommand)]
    command: ProviderCommand,
}

#[derive(Debug, Subcommand)]
enum ProviderCommand {
    /// Serve historical data as a batch
    Data {
        #[arg(short, long)]
        symbol: String,
        #[arg(short = 't', long = "type", default_value = "bar")]
        data_type: DataType,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        asset_class: Option<AssetClass>,
        #[arg(long)]
        time_frame: Option<TimeFrame>,
        /// Publish without waiting for the consumer's ready signal
        #[arg(long)]
        no_confirm: bool,
    },
    /// Manage live streams
    Stream {
        operation: StreamOperation,
        #[arg(short, long = "symbol")]
        symbols: Vec<String>,
        #[arg(short = 't', long = "type")]
        data_types: Vec<DataType>,
    },
    /// Shut the provider down
    Quit,
}

#[async_trait]
impl CliHandler for DataProvider {
    fn command(&self) -> clap::Command {
        ProviderCli::command()
    }

    async fn execute(&self, ctx: &CommandContext, matches: &ArgMatches, output: &mut CommandOutput) {
        let cli = match ProviderCli::from_arg_matches(matches) {
            Ok(cli) => cli,
            Err(e) => return output.eprintln(e.to_string()),
        };

        match cli.command {
            ProviderCommand::Data {
                symbol,
                data_type,
                source,
                asset_class,
                time_frame,
                no_confirm,
            } => {
                let mut request = DataRequest::new(symbol, data_type).with_no_confirm(no_confirm);
                request.source = source.unwrap_or_default();
                request.asset_class = asset_class;
                request.time_frame = time_frame;
                output.println(self.handle_data(request).await.respond());
            }
            ProviderCommand::Stream {
                operation,
                symbols,
                data_types,
            } => {
                let request = StreamRequest::new(operation)
                    .with_symbols(symbols)
                    .with_data_types(data_types);
                output.println(self.handle_stream(request).respond());
            }
            ProviderCommand::Quit => {
                ctx.shutdown();
                output.println(format!("Gracefully shutting down {}", ctx.component()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedConfig;
    use marketbus_messaging::BusConfig;
    use marketbus_transport::InMemoryBroker;

    fn provider() -> Arc<DataProvider> {
        let bus = Arc::new(Bus::new(Arc::new(InMemoryBroker::new()), BusConfig::default()));
        DataProvider::new(bus, MarketFeed::with_seed(FeedConfig::default(), 42))
    }

    #[tokio::test]
    async fn test_data_request_starts_a_batch() {
        let provider = provider();
        let response = provider
            .handle_data(DataRequest::new("AAPL", DataType::Bar).with_no_confirm(true))
            .await;
        assert!(response.response.is_success());
        assert!(response.response_topic.starts_with("dataprovider.data.alpaca.stock.bar.1min.AAPL."));
        assert!(response.response_topic.ends_with(".10"));
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_a_failure() {
        let response = provider()
            .handle_data(DataRequest::new("NOPE", DataType::Bar))
            .await;
        assert_eq!(response.err(), "no bar data available for NOPE");
    }

    #[tokio::test]
    async fn test_unsupported_data_type() {
        let response = provider()
            .handle_data(DataRequest::new("AAPL", DataType::Luld))
            .await;
        assert_eq!(response.err(), "operation data luld not supported");
    }

    #[tokio::test]
    async fn test_stream_add_remove() {
        let provider = provider();
        let added = provider.handle_stream(
            StreamRequest::new(StreamOperation::Add)
                .with_symbols(["AAPL", "MSFT"])
                .with_data_types([DataType::Trades]),
        );
        assert!(added.response.is_success());
        assert_eq!(added.topics.len(), 2);
        assert_eq!(added.streams, vec!["dataprovider.stream.alpaca.stock.trades"]);

        assert_eq!(provider.publish_ticks(3).await.unwrap(), 6);

        let removed = provider.handle_stream(
            StreamRequest::new(StreamOperation::Remove)
                .with_symbols(["AAPL", "MSFT"])
                .with_data_types([DataType::Trades]),
        );
        assert!(removed.topics.is_empty());
        assert!(removed.streams.is_empty());
    }

    #[tokio::test]
    async fn test_empty_stream_request_is_rejected() {
        let response = provider().handle_stream(StreamRequest::new(StreamOperation::Add));
        assert_eq!(
            response.response.err,
            "stream request needs at least one symbol and one data type"
        );
    }
}
