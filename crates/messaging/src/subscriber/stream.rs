//! Round-robin stream consumption
//!
//! ```text
//!  broker ──queue group "storage"──► receive loop
//!                                       │ one task per delivery
//!                                       ▼
//!                           decode ─► batch topic? ─► QueueBuffers
//!                                       │
//!                                 next_agent()
//!                     ┌─────────────┬───┴─────────┐
//!                   agent 0      agent 1   ...  agent n-1   (Worker)
//! ```
//!
//! Batch messages are buffered before they are dispatched, so a worker can
//! call [`StreamSubscriber::drain_queue`] on every delivery and act once the
//! whole batch is there.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error, info, trace, warn};
use marketbus_core::{Message, is_queue};
use marketbus_transport::{Broker, BrokerMessage, Subscription, matches};
use parking_lot::RwLock;

use crate::error::{BusError, Result};
use crate::handler::{FanOutHandler, Handler, Worker};
use crate::subscriber::buffer::QueueBuffers;

pub type SubscriberHandler = FanOutHandler<Message>;

/// Registry of subscriptions served by round-robin agent pools
pub struct StreamSubscriber {
    broker: Arc<dyn Broker>,
    queue_group: String,
    capacity: usize,
    handlers: RwLock<HashMap<String, Arc<SubscriberHandler>>>,
    buffers: Arc<QueueBuffers>,
    started: AtomicUsize,
}

impl StreamSubscriber {
    pub fn new(broker: Arc<dyn Broker>, queue_group: impl Into<String>, capacity: usize) -> Self {
        Self {
            broker,
            queue_group: queue_group.into(),
            capacity,
            handlers: RwLock::new(HashMap::new()),
            buffers: Arc::new(QueueBuffers::new()),
            started: AtomicUsize::new(0),
        }
    }

    /// Handler for `topic` with `max_agents` agent channels. The first caller
    /// creates it and subscribes; later callers get the same handler.
    /// Zero agents is rejected before anything is registered.
    pub async fn get_or_create_round_robin(
        &self,
        topic: &str,
        max_agents: usize,
    ) -> Result<Arc<SubscriberHandler>> {
        if max_agents == 0 {
            return Err(BusError::NoAgents);
        }
        if let Some(handler) = self.handlers.read().get(topic) {
            return Ok(handler.clone());
        }

        let handler = {
            let mut handlers = self.handlers.write();
            if let Some(handler) = handlers.get(topic) {
                return Ok(handler.clone());
            }
            let handler = Arc::new(FanOutHandler::new(max_agents, self.capacity));
            handlers.insert(topic.to_string(), handler.clone());
            handler
        };

        let subscription = match self.broker.queue_subscribe(topic, &self.queue_group).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("[{}] queue subscribe failed: {}", topic, e);
                handler.cancel();
                let mut handlers = self.handlers.write();
                if handlers.get(topic).is_some_and(|h| Arc::ptr_eq(h, &handler)) {
                    handlers.remove(topic);
                }
                return Err(e.into());
            }
        };

        self.started.fetch_add(1, Ordering::SeqCst);
        handler.context().spawn(run_receiver(
            handler.clone(),
            subscription,
            self.buffers.clone(),
            topic.to_string(),
        ));
        info!(
            "[{}] subscribed in group {} with {} agents",
            topic, self.queue_group, max_agents
        );
        Ok(handler)
    }

    /// Start `num_agents` workers on `topic`. Returns false when workers were
    /// already attached, in which case nothing new is started.
    pub async fn attach_round_robin(
        &self,
        topic: &str,
        worker: Arc<dyn Worker<Message>>,
        num_agents: usize,
    ) -> Result<bool> {
        let handler = self.get_or_create_round_robin(topic, num_agents).await?;
        let attached = handler.attach(worker, topic);
        if attached {
            debug!("[{}] attached {} workers", topic, handler.agent_count());
        }
        Ok(attached)
    }

    /// Complete batch for a batch topic, `None` while messages are missing
    pub fn drain_queue(&self, topic: &str) -> Option<Vec<Message>> {
        self.buffers.drain(topic)
    }

    /// Shared accumulation buffers
    pub fn buffers(&self) -> &Arc<QueueBuffers> {
        &self.buffers
    }

    /// Cancel the handler for `topic` and forget it. Returns false when none exists.
    /// Stop consuming `topic` and drop the partial batches it buffered
    pub fn stop(&self, topic: &str) -> bool {
        let Some(handler) = self.handlers.write().remove(topic) else {
            return false;
        };
        handler.cancel();
        info!("[{}] subscription stopped", topic);
        self.discard_partial(|buffered| matches(topic, buffered));
        true
    }

    pub fn stop_all(&self) {
        let stopped: Vec<_> = self.handlers.write().drain().collect();
        for (topic, handler) in stopped {
            handler.cancel();
            debug!("[{}] subscription stopped", topic);
        }
        self.discard_partial(|_| true);
    }

    fn discard_partial(&self, stopped: impl Fn(&str) -> bool) {
        for buffered in self.buffers.topics() {
            if stopped(&buffered) {
                let dropped = self.buffers.discard(&buffered);
                error!("[{}] partial batch discarded, {} messages", buffered, dropped);
            }
        }
    }

    pub fn handler(&self, topic: &str) -> Option<Arc<SubscriberHandler>> {
        self.handlers.read().get(topic).cloned()
    }

    /// Subscribed topic patterns
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Receive loops started since creation
    pub fn workers_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

async fn run_receiver(
    handler: Arc<SubscriberHandler>,
    mut subscription: Subscription,
    buffers: Arc<QueueBuffers>,
    topic: String,
) {
    let token = handler.context().token().clone();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            delivery = subscription.next() => {
                let Some(delivery) = delivery else {
                    warn!("[{}] subscription closed", topic);
                    break;
                };
                let handler_for_task = handler.clone();
                let buffers = buffers.clone();
                handler.context().spawn(process_delivery(handler_for_task, buffers, delivery));
            }
        }
    }
    subscription.unsubscribe();
    debug!("[{}] receive loop exited", topic);
}

async fn process_delivery(
    handler: Arc<SubscriberHandler>,
    buffers: Arc<QueueBuffers>,
    delivery: BrokerMessage,
) {
    // Empty payloads are batch ready signals, not data
    if delivery.is_empty() {
        trace!("[{}] ignoring empty delivery", delivery.subject);
        return;
    }

    let message = match Message::decode(&delivery.payload) {
        Ok(message) => message,
        Err(e) => {
            warn!("[{}] dropping undecodable delivery: {}", delivery.subject, e);
            return;
        }
    };

    if is_queue(&message.topic) {
        buffers.push(message.clone());
    }

    if let Err(e) = handler.dispatch(message).await {
        debug!("[{}] delivery not dispatched: {}", delivery.subject, e);
    }
}
