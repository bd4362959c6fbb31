//! Batched transfer with confirmation
//!
//! A queue handler moves exactly one batch to one topic and then removes
//! itself:
//!
//! ```text
//!  producer                         broker                      consumer
//!  get_or_create(topic) ── subscribe(topic) ─►
//!  send(batch)
//!                                             ◄── subscribe(topic)
//!                                             ◄── publish(topic, "")   ready
//!  ready | timeout ──────── publish(msg_1..n) ─►  ─────────────► collect n
//!  cancel + deregister
//! ```
//!
//! The confirmation subscription is opened before `get_or_create` returns, so
//! a consumer that learns the topic from a reply sent afterwards can never
//! signal ready before the producer listens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use marketbus_core::{
    Component, DataRequest, DataResponse, Fingerprint, Message, batch_fingerprint,
    messages_for_batch,
};
use marketbus_transport::{Broker, Subscription};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{BusError, Result};
use crate::handler::{Handler, SimpleHandler};

pub type QueueHandler = SimpleHandler<Vec<Message>>;

type QueueRegistry = Arc<RwLock<HashMap<String, Arc<QueueHandler>>>>;

/// Registry of in-flight batch transfers, at most one per topic
pub struct QueuePublisher {
    broker: Arc<dyn Broker>,
    confirm_timeout: Duration,
    handlers: QueueRegistry,
}

impl QueuePublisher {
    pub fn new(broker: Arc<dyn Broker>, confirm_timeout: Duration) -> Self {
        Self {
            broker,
            confirm_timeout,
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create the one-shot handler for `topic`. Fails while a batch for the
    /// same topic is still in flight.
    ///
    /// Every message later sent to the handler must carry `topic`. A batch
    /// addressed elsewhere is dropped unpublished, since the consumer only
    /// listens on `topic`.
    pub async fn get_or_create(&self, topic: &str, no_confirm: bool) -> Result<Arc<QueueHandler>> {
        if self.handlers.read().contains_key(topic) {
            return Err(BusError::QueueExists(topic.to_string()));
        }

        let (handler, rx) = {
            let mut handlers = self.handlers.write();
            if handlers.contains_key(topic) {
                return Err(BusError::QueueExists(topic.to_string()));
            }
            let (handler, rx) = SimpleHandler::new(1);
            let handler = Arc::new(handler);
            handlers.insert(topic.to_string(), handler.clone());
            (handler, rx)
        };

        let confirm = if no_confirm {
            None
        } else {
            match self.broker.subscribe(topic).await {
                Ok(sub) => Some(sub),
                Err(e) => {
                    handler.cancel();
                    deregister(&self.handlers, topic, &handler);
                    return Err(e.into());
                }
            }
        };

        handler.context().spawn(run_queue(
            QueueTask {
                broker: self.broker.clone(),
                registry: self.handlers.clone(),
                handler: handler.clone(),
                topic: topic.to_string(),
                confirm_timeout: self.confirm_timeout,
            },
            rx,
            confirm,
        ));
        info!("[{}] Created new queue handler (confirm: {})", topic, !no_confirm);
        Ok(handler)
    }

    /// Create the handler for `topic` and hand it the whole batch
    pub async fn publish_batch(
        &self,
        topic: &str,
        messages: Vec<Message>,
        no_confirm: bool,
    ) -> Result<Arc<QueueHandler>> {
        if let Some(stray) = misaddressed(topic, &messages) {
            return Err(BusError::TopicMismatch {
                expected: topic.to_string(),
                found: stray.to_string(),
            });
        }
        let handler = self.get_or_create(topic, no_confirm).await?;
        handler.send(messages).await?;
        Ok(handler)
    }

    /// Answer a data request with `entities`: fingerprint them, derive the
    /// batch topic and start a transfer. The reply names the topic the batch
    /// will be published on.
    pub async fn serve_batch<E: Fingerprint + Send>(
        &self,
        component: Component,
        request: &DataRequest,
        mut entities: Vec<E>,
    ) -> DataResponse {
        if entities.is_empty() {
            return DataResponse::failure(format!(
                "no {} data available for {}",
                request.data_type, request.symbol
            ));
        }

        let queue_id = match batch_fingerprint(&mut entities) {
            Ok(queue_id) => queue_id,
            Err(e) => return DataResponse::failure(e),
        };
        let topic = request.response_topic(component, &queue_id, entities.len());
        let messages = match messages_for_batch(&topic, request.data_type, &entities) {
            Ok(messages) => messages,
            Err(e) => return DataResponse::failure(e),
        };

        let subject = topic.generate();
        match self.publish_batch(&subject, messages, request.no_confirm).await {
            Ok(_) => DataResponse::success("Created new queue handler", subject),
            Err(e) => DataResponse::failure(e),
        }
    }

    /// Topics with a batch in flight
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.handlers.read().contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Cancel every in-flight transfer
    pub fn cancel_all(&self) {
        for handler in self.handlers.read().values() {
            handler.cancel();
        }
    }
}

/// Removes `handler` from the registry unless a newer handler took its place
fn deregister(registry: &QueueRegistry, topic: &str, handler: &Arc<QueueHandler>) {
    let mut handlers = registry.write();
    if handlers.get(topic).is_some_and(|current| Arc::ptr_eq(current, handler)) {
        handlers.remove(topic);
    }
}

struct QueueTask {
    broker: Arc<dyn Broker>,
    registry: QueueRegistry,
    handler: Arc<QueueHandler>,
    topic: String,
    confirm_timeout: Duration,
}

async fn run_queue(
    task: QueueTask,
    mut rx: mpsc::Receiver<Vec<Message>>,
    confirm: Option<Subscription>,
) {
    let token = task.handler.context().token().clone();
    let batch = tokio::select! {
        _ = token.cancelled() => None,
        batch = rx.recv() => batch,
    };

    match batch {
        Some(batch) if !batch.is_empty() => {
            deliver_batch(&task, &token, batch, confirm).await;
        }
        Some(_) => warn!("[{}] empty batch, nothing to publish", task.topic),
        None => debug!("[{}] queue handler stopped before a batch arrived", task.topic),
    }

    task.handler.cancel();
    task.handler.close();
    deregister(&task.registry, &task.topic, &task.handler);
    debug!("[{}] queue handler removed", task.topic);
}

/// Topic of the first message not addressed to `topic`
fn misaddressed<'a>(topic: &str, batch: &'a [Message]) -> Option<&'a str> {
    batch
        .iter()
        .map(|message| message.topic.as_str())
        .find(|t| *t != topic)
}

async fn deliver_batch(
    task: &QueueTask,
    token: &CancellationToken,
    batch: Vec<Message>,
    confirm: Option<Subscription>,
) {
    if let Some(stray) = misaddressed(&task.topic, &batch) {
        error!(
            "[{}] batch message addressed to {}, dropping {} messages",
            task.topic,
            stray,
            batch.len()
        );
        return;
    }

    if let Some(mut confirm) = confirm {
        tokio::select! {
            _ = token.cancelled() => {
                info!("[{}] cancelled while waiting for ready signal", task.topic);
                return;
            }
            ready = confirm.next() => {
                if ready.is_some() {
                    debug!("[{}] consumer ready", task.topic);
                }
            }
            _ = tokio::time::sleep(task.confirm_timeout) => {
                warn!(
                    "[{}] no ready signal within {:?}, publishing anyway",
                    task.topic, task.confirm_timeout
                );
            }
        }
        confirm.unsubscribe();
    }

    let total = batch.len();
    let mut dropped = 0;
    for message in batch {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("[{}] failed to encode batch message: {}", task.topic, e);
                dropped += 1;
                continue;
            }
        };
        if let Err(e) = task.broker.publish(&message.topic, payload).await {
            error!("[{}] failed to publish batch message: {}", task.topic, e);
            dropped += 1;
        }
    }

    if dropped > 0 {
        error!(
            "[{}] partial batch: {} of {} messages dropped",
            task.topic, dropped, total
        );
    } else {
        info!("[{}] published batch of {} messages", task.topic, total);
    }
}
