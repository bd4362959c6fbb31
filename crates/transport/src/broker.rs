//! Broker abstraction
//!
//! Provides one trait for the three messaging patterns the substrate relies on:
//! plain pub/sub, queue-group subscriptions and request/reply.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// A delivery as seen by a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    /// Subject the sender awaits a reply on, set for requests
    pub reply: Option<String>,
}

impl BrokerMessage {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
            reply: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

type UnsubscribeHook = Box<dyn FnOnce() + Send>;

/// Live interest in a subject pattern.
///
/// Deliveries are buffered without bound and read in FIFO order. Dropping the
/// subscription unsubscribes it.
pub struct Subscription {
    subject: String,
    rx: mpsc::UnboundedReceiver<BrokerMessage>,
    on_unsubscribe: Option<UnsubscribeHook>,
}

impl Subscription {
    /// Wraps a delivery channel. `on_unsubscribe` runs once, on the first
    /// `unsubscribe` call or on drop.
    pub fn new(
        subject: impl Into<String>,
        rx: mpsc::UnboundedReceiver<BrokerMessage>,
        on_unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            subject: subject.into(),
            rx,
            on_unsubscribe: Some(Box::new(on_unsubscribe)),
        }
    }

    /// Subject pattern this subscription was created with
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Wait for the next delivery. `None` once unsubscribed and drained.
    pub async fn next(&mut self) -> Option<BrokerMessage> {
        self.rx.recv().await
    }

    /// Try to receive without blocking (returns None if no message available)
    pub fn try_next(&mut self) -> Result<Option<BrokerMessage>, TransportError> {
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::ChannelClosed),
        }
    }

    /// Stops new deliveries. Messages already buffered can still be drained.
    pub fn unsubscribe(&mut self) {
        if let Some(hook) = self.on_unsubscribe.take() {
            hook();
        }
        self.rx.close();
    }

    /// Discards every buffered delivery, returning how many were dropped
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(Some(_)) = self.try_next() {
            dropped += 1;
        }
        dropped
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hook) = self.on_unsubscribe.take() {
            hook();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Message broker
#[async_trait]
pub trait Broker: Send + Sync {
    /// Fire-and-forget publish
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Publish carrying a reply subject
    async fn publish_request(
        &self,
        subject: &str,
        reply: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Every matching subscription receives every message
    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError>;

    /// Members sharing `group` split the matching messages, one member each
    async fn queue_subscribe(
        &self,
        pattern: &str,
        group: &str,
    ) -> Result<Subscription, TransportError>;

    /// Publish and wait for the first reply
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<BrokerMessage, TransportError>;

    /// Reply to a request delivery
    async fn respond(&self, request: &BrokerMessage, payload: Vec<u8>) -> Result<(), TransportError> {
        match &request.reply {
            Some(reply) => self.publish(reply, payload).await,
            None => Err(TransportError::NoReplySubject(request.subject.clone())),
        }
    }
}
