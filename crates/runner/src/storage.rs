//! Simulated data storage
//!
//! ```text
//!  stream-subscribe add ──► StreamSubscriber (queue group "storage", n agents)
//!                                │
//!                           StoreWorker ── stream topic ──► MemoryStore::insert
//!                                └──────── batch topic ───► drain_queue ─► insert_batch
//!
//!  data ──► MemoryStore::query ──► QueuePublisher (batch)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use log::{debug, info, warn};
use marketbus_core::{
    Component, DataRequest, DataResponse, DataType, JsonCommand, JsonOperation, Message, Reply,
    Response, StreamOperation, StreamResponse, StreamSubscribeRequest, StreamSubscription,
    is_queue,
};
use marketbus_messaging::{
    Bus, CliHandler, CommandContext, CommandDispatcher, CommandOutput, JsonHandler, QueueBuffers,
    Worker,
};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ServiceError};
use crate::store::MemoryStore;

pub const STORAGE: Component = Component::DataStorage;

/// Stores every message delivered to one of its agents
pub struct StoreWorker {
    store: Arc<MemoryStore>,
    buffers: Arc<QueueBuffers>,
}

impl StoreWorker {
    pub fn new(store: Arc<MemoryStore>, buffers: Arc<QueueBuffers>) -> Self {
        Self { store, buffers }
    }
}

#[async_trait]
impl Worker<Message> for StoreWorker {
    async fn work(&self, message: Message) {
        if is_queue(&message.topic) {
            // the agent that completes the batch stores all of it
            let Some(batch) = self.buffers.drain(&message.topic) else {
                return;
            };
            match self.store.insert_batch(&batch) {
                Ok(inserted) => info!("[{}] stored {} records", message.topic, inserted),
                Err(e) => warn!("[{}] failed to store batch: {}", message.topic, e),
            }
            return;
        }

        if let Err(e) = self.store.insert(&message) {
            warn!("[{}] failed to store message: {}", message.topic, e);
        }
    }
}

pub struct DataStorage {
    bus: Arc<Bus>,
    store: Arc<MemoryStore>,
    subscribed: RwLock<BTreeMap<String, usize>>,
}

impl DataStorage {
    pub fn new(bus: Arc<Bus>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            store: Arc::new(MemoryStore::new()),
            subscribed: RwLock::new(BTreeMap::new()),
        })
    }

    /// Start serving `datastorage.command`
    pub async fn start(self: &Arc<Self>) -> Result<Arc<CommandDispatcher>> {
        let dispatcher = self
            .bus
            .start_commands(STORAGE, self.clone(), self.clone())
            .await?;
        Ok(dispatcher)
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Subscribed topic patterns with their agent counts
    pub fn subscribed_topics(&self) -> Vec<StreamSubscription> {
        self.subscribed
            .read()
            .iter()
            .map(|(topic, agents)| StreamSubscription {
                agent_count: *agents,
                topic: topic.clone(),
            })
            .collect()
    }

    /// Start or stop consuming topics
    pub async fn handle_stream_subscribe(&self, request: StreamSubscribeRequest) -> StreamResponse {
        let message = match request.operation {
            StreamOperation::Add => {
                for subscription in &request.stream_subscribe_with_agents {
                    if let Err(e) = self.subscribe(subscription).await {
                        return StreamResponse::failure(e);
                    }
                }
                "Successfully added stream/s"
            }
            StreamOperation::Remove => {
                for subscription in &request.stream_subscribe_with_agents {
                    self.bus.subscriptions().stop(&subscription.topic);
                    self.subscribed.write().remove(&subscription.topic);
                    info!("[{}] unsubscribed from {}", STORAGE, subscription.topic);
                }
                "Successfully removed stream/s"
            }
            StreamOperation::Get => "Subscribed streams",
            other => {
                return StreamResponse::failure(ServiceError::Unsupported(other.to_string()));
            }
        };
        self.stream_response(message)
    }

    async fn subscribe(&self, subscription: &StreamSubscription) -> Result<()> {
        let worker = Arc::new(StoreWorker::new(
            self.store.clone(),
            self.bus.subscriptions().buffers().clone(),
        ));
        let attached = self
            .bus
            .subscriptions()
            .attach_round_robin(&subscription.topic, worker, subscription.agent_count)
            .await?;
        if attached {
            self.subscribed
                .write()
                .insert(subscription.topic.clone(), subscription.agent_count);
            info!(
                "[{}] storing {} with {} agents",
                STORAGE, subscription.topic, subscription.agent_count
            );
        } else {
            debug!("[{}] already storing {}", STORAGE, subscription.topic);
        }
        Ok(())
    }

    fn stream_response(&self, message: &str) -> StreamResponse {
        let topics = self.subscribed.read().keys().cloned().collect();
        StreamResponse::success(message, topics, Vec::new())
    }

    /// Serve stored records as a batch
    pub async fn handle_data(&self, mut request: DataRequest) -> DataResponse {
        request.apply_defaults();
        let queues = self.bus.queues();
        match request.data_type {
            dt if dt.is_bar() => queues.serve_batch(STORAGE, &request, self.store.bars(&request)).await,
            DataType::Trades => {
                queues
                    .serve_batch(STORAGE, &request, self.store.trades(&request))
                    .await
            }
            DataType::Quotes => {
                queues
                    .serve_batch(STORAGE, &request, self.store.quotes(&request))
                    .await
            }
            DataType::News | DataType::RawText => {
                queues
                    .serve_batch(STORAGE, &request, self.store.news(&request))
                    .await
            }
            DataType::NewsSentiment => {
                queues
                    .serve_batch(STORAGE, &request, self.store.sentiments(&request))
                    .await
            }
            other => DataResponse::failure(ServiceError::Unsupported(format!("data {other}"))),
        }
    }

    /// Pull a batch from `source` and store it. Returns how many records were new.
    pub async fn fetch(
        &self,
        token: &CancellationToken,
        source: Component,
        request: DataRequest,
    ) -> Result<usize> {
        let mut received = Vec::new();
        let count = self
            .bus
            .request_data(token, source, request, |message| received.push(message))
            .await?;
        let inserted = self.store.insert_batch(&received)?;
        info!(
            "[{}] fetched {} records from {}, {} new",
            STORAGE, count, source, inserted
        );
        Ok(inserted)
    }
}

#[async_trait]
impl JsonHandler for DataStorage {
    async fn handle(&self, _ctx: &CommandContext, command: JsonCommand) -> String {
        match command.operation {
            JsonOperation::StreamSubscribe => {
                match command.parse_request::<StreamSubscribeRequest>() {
                    Ok(request) => self.handle_stream_subscribe(request).await.respond(),
                    Err(e) => StreamResponse::failure(e).respond(),
                }
            }
            JsonOperation::Data => match command.parse_request::<DataRequest>() {
                Ok(request) => self.handle_data(request).await.respond(),
                Err(e) => DataResponse::failure(e).respond(),
            },
            other => Response::failure(ServiceError::Unsupported(other.to_string())).respond(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "datastorage", about = "Simulated data storage")]
struct StorageCli {
    #[command(subcommand)]
    command: StorageCommand,
}

#[derive(Debug, Subcommand)]
enum StorageCommand {
    /// Stream management
    Stream {
        #[command(subcommand)]
        operation: StreamCommand,
    },
    /// Serve stored data as a batch
    Data {
        #[arg(short, long)]
        symbol: String,
        #[arg(short = 't', long = "type", default_value = "bar")]
        data_type: DataType,
        #[arg(long)]
        no_confirm: bool,
    },
    /// Shut the storage down
    Quit,
}

#[derive(Debug, Subcommand)]
enum StreamCommand {
    /// Store the data published on a topic
    Add {
        /// `topic[,agents]`, 5 agents when omitted
        #[arg(short = 't', long = "topic-agents", required = true)]
        topic_agents: Vec<String>,
    },
    /// Stop storing a topic
    Delete {
        #[arg(short, long = "topic", required = true)]
        topics: Vec<String>,
    },
    /// List stored topics
    List,
}

#[async_trait]
impl CliHandler for DataStorage {
    fn command(&self) -> clap::Command {
        StorageCli::command()
    }

    async fn execute(&self, ctx: &CommandContext, matches: &ArgMatches, output: &mut CommandOutput) {
        let cli = match StorageCli::from_arg_matches(matches) {
            Ok(cli) => cli,
            Err(e) => return output.eprintln(e.to_string()),
        };

        match cli.command {
            StorageCommand::Stream { operation } => {
                let request = match operation {
                    StreamCommand::Add { topic_agents } => {
                        StreamSubscribeRequest::from_raw(&topic_agents, StreamOperation::Add)
                    }
                    StreamCommand::Delete { topics } => {
                        StreamSubscribeRequest::from_raw(&topics, StreamOperation::Remove)
                    }
                    StreamCommand::List => Ok(StreamSubscribeRequest::new(StreamOperation::Get)),
                };
                let response = match request {
                    Ok(request) => self.handle_stream_subscribe(request).await,
                    Err(e) => StreamResponse::failure(e),
                };
                output.println(response.respond());
            }
            StorageCommand::Data {
                symbol,
                data_type,
                no_confirm,
            } => {
                let request = DataRequest::new(symbol, data_type).with_no_confirm(no_confirm);
                output.println(self.handle_data(request).await.respond());
            }
            StorageCommand::Quit => {
                ctx.shutdown();
                output.println(format!("Gracefully shutting down {}", ctx.component()));
            }
        }
    }
}
