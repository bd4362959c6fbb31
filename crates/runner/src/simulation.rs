//! Simulation - end-to-end pipeline over one in-process broker
//!
//! Drives the services only through their command surfaces, the way a
//! remote operator would:
//! 1. storage subscribes to the provider's streams
//! 2. the provider starts live streams and publishes ticks
//! 3. storage pulls historical bars from the provider as a batch
//! 4. a client pulls the same bars back out of storage

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use marketbus_core::{
    Component, DataRequest, DataType, JsonCommand, JsonOperation, Response, StreamOperation,
    StreamRequest, StreamResponse, StreamSubscribeRequest, Topic,
};
use marketbus_messaging::{Bus, BusConfig, CommandDispatcher};
use marketbus_transport::InMemoryBroker;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ServiceError};
use crate::feed::{FeedConfig, MarketFeed};
use crate::provider::DataProvider;
use crate::storage::DataStorage;

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub bus: BusConfig,
    pub feed: FeedConfig,
    /// Seed for a reproducible feed, entropy when unset
    pub seed: Option<u64>,
    pub symbols: Vec<String>,
    /// Data types streamed live for every symbol
    pub stream_types: Vec<DataType>,
    /// Storage agents per subscription
    pub agents: usize,
    pub ticks: usize,
    pub tick_interval: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let bus = BusConfig::default();
        Self {
            agents: bus.default_agents,
            bus,
            feed: FeedConfig::default(),
            seed: None,
            symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
            stream_types: vec![DataType::Trades],
            ticks: 20,
            tick_interval: Duration::from_millis(10),
        }
    }
}

/// Simulation results
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    /// Live messages published by the provider
    pub streamed: usize,
    /// Live messages that reached storage
    pub stored: usize,
    /// Historical records storage pulled from the provider
    pub fetched: usize,
    /// Records served back out of storage
    pub served: usize,
    pub success: bool,
    pub error: Option<String>,
}

pub struct Simulation {
    config: SimulationConfig,
    bus: Arc<Bus>,
    provider: Arc<DataProvider>,
    storage: Arc<DataStorage>,
    dispatchers: Vec<Arc<CommandDispatcher>>,
    token: CancellationToken,
}

impl Simulation {
    /// Create the broker and bus and start both services
    pub async fn start(config: SimulationConfig) -> Result<Self> {
        config.bus.validate()?;
        let bus = Arc::new(Bus::new(Arc::new(InMemoryBroker::new()), config.bus.clone()));

        let feed = match config.seed {
            Some(seed) => MarketFeed::with_seed(config.feed.clone(), seed),
            None => MarketFeed::new(config.feed.clone()),
        };
        let provider = DataProvider::new(bus.clone(), feed);
        let storage = DataStorage::new(bus.clone());
        let dispatchers = vec![provider.start().await?, storage.start().await?];
        info!("simulation started with {} symbols", config.symbols.len());

        Ok(Self {
            config,
            bus,
            provider,
            storage,
            dispatchers,
            token: CancellationToken::new(),
        })
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn provider(&self) -> &Arc<DataProvider> {
        &self.provider
    }

    pub fn storage(&self) -> &Arc<DataStorage> {
        &self.storage
    }

    /// Token cancelling in-flight batch requests of the simulation
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Send a JSON command to `target` and decode its reply
    pub async fn command<R: DeserializeOwned>(
        &self,
        target: Component,
        command: &JsonCommand,
    ) -> Result<R> {
        let subject = Topic::command(target).generate();
        let reply = self
            .bus
            .broker()
            .request(&subject, command.to_payload()?, self.config.bus.request_timeout())
            .await?;
        Ok(serde_json::from_slice(&reply.payload)?)
    }

    async fn stream_command(
        &self,
        target: Component,
        operation: JsonOperation,
        request: &impl serde::Serialize,
    ) -> Result<StreamResponse> {
        let command = JsonCommand::with_request(operation, request)?;
        let response: StreamResponse = self.command(target, &command).await?;
        if !response.response.is_success() {
            return Err(ServiceError::Remote {
                component: target.to_string(),
                err: response.response.err,
            });
        }
        Ok(response)
    }

    /// Run the whole pipeline once
    pub async fn run(&self) -> SimulationReport {
        match self.try_run().await {
            Ok(report) => report,
            Err(e) => {
                error!("simulation failed: {}", e);
                SimulationReport {
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    async fn try_run(&self) -> Result<SimulationReport> {
        let mut report = SimulationReport::default();

        let subscribe = StreamSubscribeRequest::new(StreamOperation::Add)
            .with_subscription("dataprovider.stream.>", self.config.agents);
        self.stream_command(Component::DataStorage, JsonOperation::StreamSubscribe, &subscribe)
            .await?;

        let streams = StreamRequest::new(StreamOperation::Add)
            .with_symbols(self.config.symbols.iter().cloned())
            .with_data_types(self.config.stream_types.iter().copied());
        self.stream_command(Component::DataProvider, JsonOperation::Stream, &streams)
            .await?;

        for _ in 0..self.config.ticks {
            report.streamed += self.provider.publish_ticks(1).await?;
            tokio::time::sleep(self.config.tick_interval).await;
        }
        report.stored = self.wait_for_stored(report.streamed).await?;
        info!("{} of {} live messages stored", report.stored, report.streamed);

        for symbol in &self.config.symbols {
            let request = DataRequest::new(symbol.clone(), DataType::Bar);
            report.fetched += self
                .storage
                .fetch(&self.token, Component::DataProvider, request.clone())
                .await?;
            report.served += self
                .bus
                .request_data(&self.token, Component::DataStorage, request, |_| {})
                .await?;
        }

        report.success = report.stored == report.streamed && report.served == report.fetched;
        info!(
            "simulation finished: streamed {}, stored {}, fetched {}, served {}",
            report.streamed, report.stored, report.fetched, report.served
        );
        Ok(report)
    }

    async fn wait_for_stored(&self, expected: usize) -> Result<usize> {
        let stored = || {
            self.config
                .stream_types
                .iter()
                .map(|dt| self.storage.store().count(*dt))
                .sum::<usize>()
        };
        let waited = tokio::time::timeout(self.config.bus.request_timeout(), async {
            while stored() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        match waited {
            Ok(()) => Ok(stored()),
            Err(_) => Err(ServiceError::Timeout(format!(
                "{} stored messages, have {}",
                expected,
                stored()
            ))),
        }
    }

    /// Quit both services through their command topics and stop the bus
    pub async fn shutdown(self) -> Result<()> {
        self.token.cancel();
        for dispatcher in &self.dispatchers {
            let quit = JsonCommand::new(JsonOperation::Quit);
            let reply: Response = self.command(dispatcher.component(), &quit).await?;
            info!("{}", reply.message);
            dispatcher.stopped().await;
        }
        self.bus.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_bus_agents() {
        let config = SimulationConfig::default();
        assert_eq!(config.agents, 5);
        assert_eq!(config.stream_types, vec![DataType::Trades]);
    }

    #[tokio::test]
    async fn test_invalid_bus_config_is_rejected() {
        let config = SimulationConfig {
            bus: BusConfig {
                channel_capacity: 0,
                ..BusConfig::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            Simulation::start(config).await,
            Err(ServiceError::Config(_))
        ));
    }
}
