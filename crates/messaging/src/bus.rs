//! Registry context
//!
//! A [`Bus`] owns every handler registry of one process. Services receive it
//! explicitly instead of reaching for globals, so several simulated services
//! can share one process.

use std::sync::Arc;

use marketbus_core::{Component, DataRequest, Message, Topic};
use marketbus_transport::Broker;
use tokio_util::sync::CancellationToken;

use crate::command::{CliHandler, CommandDispatcher, JsonHandler};
use crate::config::BusConfig;
use crate::error::Result;
use crate::producer::{QueuePublisher, StreamPublisher};
use crate::request::request_data;
use crate::subscriber::StreamSubscriber;

pub struct Bus {
    broker: Arc<dyn Broker>,
    config: BusConfig,
    streams: StreamPublisher,
    queues: QueuePublisher,
    subscriptions: StreamSubscriber,
}

impl Bus {
    pub fn new(broker: Arc<dyn Broker>, config: BusConfig) -> Self {
        Self {
            streams: StreamPublisher::new(broker.clone(), config.channel_capacity),
            queues: QueuePublisher::new(broker.clone(), config.confirm_timeout()),
            subscriptions: StreamSubscriber::new(
                broker.clone(),
                config.stream_queue_group.clone(),
                config.channel_capacity,
            ),
            broker,
            config,
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Live stream publishers
    pub fn streams(&self) -> &StreamPublisher {
        &self.streams
    }

    /// In-flight batch transfers
    pub fn queues(&self) -> &QueuePublisher {
        &self.queues
    }

    /// Round-robin stream consumers
    pub fn subscriptions(&self) -> &StreamSubscriber {
        &self.subscriptions
    }

    /// Start serving `component`'s command topic
    pub async fn start_commands(
        &self,
        component: Component,
        cli: Arc<dyn CliHandler>,
        json: Arc<dyn JsonHandler>,
    ) -> Result<Arc<CommandDispatcher>> {
        CommandDispatcher::start(
            self.broker.clone(),
            component,
            &self.config.command_queue_group,
            cli,
            json,
        )
        .await
    }

    /// Request a batch from `target`, see [`request_data`]
    pub async fn request_data<F>(
        &self,
        token: &CancellationToken,
        target: Component,
        request: DataRequest,
        on_data: F,
    ) -> Result<usize>
    where
        F: FnMut(Message) + Send,
    {
        request_data(
            self.broker.as_ref(),
            token,
            &Topic::command(target),
            request,
            self.config.request_timeout(),
            on_data,
        )
        .await
    }

    /// Stop every publisher, subscription and in-flight batch
    pub fn shutdown(&self) {
        self.streams.stop_all();
        self.subscriptions.stop_all();
        self.queues.cancel_all();
    }
}
