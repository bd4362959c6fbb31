//! Live stream publishing
//!
//! All symbols of one stream share a publisher: handlers are keyed by the
//! topic with its trailing symbol segment removed. Each handler owns a single
//! task that encodes envelopes and publishes them to their own topic, so every
//! destination has exactly one writer.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error, info};
use marketbus_core::{Message, stream_prefix};
use marketbus_transport::Broker;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::handler::{Handler, SimpleHandler};

pub type StreamHandler = SimpleHandler<Message>;

/// Registry of live stream publishers
pub struct StreamPublisher {
    broker: Arc<dyn Broker>,
    capacity: usize,
    handlers: RwLock<HashMap<String, Arc<StreamHandler>>>,
    started: AtomicUsize,
}

impl StreamPublisher {
    pub fn new(broker: Arc<dyn Broker>, capacity: usize) -> Self {
        Self {
            broker,
            capacity,
            handlers: RwLock::new(HashMap::new()),
            started: AtomicUsize::new(0),
        }
    }

    /// Publisher for `prefix`, created and started on first use
    pub fn get_or_create(&self, prefix: &str) -> Arc<StreamHandler> {
        if let Some(handler) = self.handlers.read().get(prefix) {
            return handler.clone();
        }

        let (handler, rx) = {
            let mut handlers = self.handlers.write();
            if let Some(handler) = handlers.get(prefix) {
                return handler.clone();
            }
            let (handler, rx) = SimpleHandler::new(self.capacity);
            let handler = Arc::new(handler);
            handlers.insert(prefix.to_string(), handler.clone());
            (handler, rx)
        };

        self.started.fetch_add(1, Ordering::SeqCst);
        handler.context().spawn(run_publisher(
            self.broker.clone(),
            handler.context().token().clone(),
            rx,
            prefix.to_string(),
        ));
        info!("[{}] stream publisher created", prefix);
        handler
    }

    /// Publisher responsible for a full stream topic
    pub fn handler_for(&self, topic: &str) -> Arc<StreamHandler> {
        self.get_or_create(stream_prefix(topic))
    }

    /// Queue `message` for publication on its own topic
    pub async fn publish(&self, message: Message) -> Result<()> {
        self.handler_for(&message.topic).send(message).await
    }

    /// Cancel and forget the publisher for `prefix`. Returns false when none exists.
    pub fn stop(&self, prefix: &str) -> bool {
        let removed = self.handlers.write().remove(prefix);
        match removed {
            Some(handler) => {
                handler.cancel();
                handler.close();
                info!("[{}] stream publisher stopped", prefix);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let drained: Vec<(String, Arc<StreamHandler>)> = self.handlers.write().drain().collect();
        for (prefix, handler) in drained {
            handler.cancel();
            handler.close();
            debug!("[{}] stream publisher stopped", prefix);
        }
    }

    /// Prefixes with a live publisher
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.handlers.read().keys().cloned().collect();
        prefixes.sort();
        prefixes
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Publishing tasks started since creation
    pub fn workers_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

async fn run_publisher(
    broker: Arc<dyn Broker>,
    token: CancellationToken,
    mut rx: mpsc::Receiver<Message>,
    prefix: String,
) {
    debug!("[{}] stream publisher running", prefix);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            next = rx.recv() => {
                let Some(message) = next else { break };
                let payload = match message.encode() {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("[{}] failed to encode message for {}: {}", prefix, message.topic, e);
                        continue;
                    }
                };
                if let Err(e) = broker.publish(&message.topic, payload).await {
                    error!("[{}] failed to publish to {}: {}", prefix, message.topic, e);
                }
            }
        }
    }
    debug!("[{}] stream publisher exited", prefix);
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketbus_transport::InMemoryBroker;

    const TOPIC: &str = "dataprovider.stream.alpaca.stock.trades.AAPL";

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe(TOPIC).await.unwrap();
        let publisher = StreamPublisher::new(Arc::new(broker.clone()), 16);

        publisher
            .publish(Message::new(TOPIC, b"t1".to_vec(), "trades"))
            .await
            .unwrap();

        let delivery = sub.next().await.unwrap();
        let message = Message::decode(&delivery.payload).unwrap();
        assert_eq!(message.payload, b"t1");
        assert_eq!(publisher.prefixes(), vec!["dataprovider.stream.alpaca.stock.trades"]);
    }

    #[tokio::test]
    async fn test_symbols_share_a_publisher() {
        let publisher = StreamPublisher::new(Arc::new(InMemoryBroker::new()), 16);
        let a = publisher.handler_for(TOPIC);
        let b = publisher.handler_for("dataprovider.stream.alpaca.stock.trades.MSFT");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(publisher.workers_started(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_starts_one_worker() {
        let publisher = Arc::new(StreamPublisher::new(Arc::new(InMemoryBroker::new()), 16));
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let publisher = publisher.clone();
            tasks.push(tokio::spawn(async move {
                publisher.get_or_create("dataprovider.stream.alpaca.stock.trades")
            }));
        }
        let mut handlers = Vec::new();
        for task in tasks {
            handlers.push(task.await.unwrap());
        }

        assert!(handlers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(publisher.workers_started(), 1);
        assert_eq!(publisher.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_allows_recreation() {
        let publisher = StreamPublisher::new(Arc::new(InMemoryBroker::new()), 16);
        let first = publisher.get_or_create("p");
        assert!(publisher.stop("p"));
        assert!(!publisher.stop("p"));
        assert!(first.is_cancelled());
        first.context().wait().await;

        let second = publisher.get_or_create("p");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(publisher.workers_started(), 2);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_stop_loop() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe("a.stream.>").await.unwrap();
        let publisher = StreamPublisher::new(Arc::new(broker.clone()), 16);

        // wildcard subjects are rejected by the broker
        let handler = publisher.get_or_create("a.stream");
        handler
            .send(Message::new("a.stream.*", Vec::new(), "trades"))
            .await
            .unwrap();
        handler
            .send(Message::new("a.stream.ok", b"x".to_vec(), "trades"))
            .await
            .unwrap();

        let delivery = sub.next().await.unwrap();
        assert_eq!(delivery.subject, "a.stream.ok");
    }
}
