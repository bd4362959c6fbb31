//! Single-process broker
//!
//! Subscriptions live in a concurrent map keyed by a monotonically increasing
//! id. Publishing snapshots the matching entries, hands a copy to every plain
//! subscriber and picks one member per queue group in rotation. A queue group
//! is the pair of subscribed pattern and group name, so overlapping patterns
//! under the same name each receive their own copy.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, trace, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::broker::{Broker, BrokerMessage, Subscription};
use crate::error::TransportError;
use crate::subject::{INBOX_PREFIX, matches, validate_pattern, validate_subject};

struct Entry {
    pattern: String,
    group: Option<String>,
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

type GroupKey = (String, String);

#[derive(Default)]
struct Inner {
    subscriptions: DashMap<u64, Entry>,
    next_id: AtomicU64,
    /// Rotation cursor per (pattern, group)
    cursors: DashMap<GroupKey, usize>,
}

impl Inner {
    fn add(self: &Arc<Self>, pattern: &str, group: Option<&str>) -> Result<Subscription, TransportError> {
        validate_pattern(pattern)?;
        if group.is_some_and(str::is_empty) {
            return Err(TransportError::Subscribe(format!(
                "empty queue group for {pattern}"
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.insert(
            id,
            Entry {
                pattern: pattern.to_string(),
                group: group.map(str::to_string),
                tx,
            },
        );
        debug!("[broker] subscribed #{} to {} (group {:?})", id, pattern, group);

        let weak: Weak<Inner> = Arc::downgrade(self);
        Ok(Subscription::new(pattern, rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscriptions.remove(&id);
                debug!("[broker] unsubscribed #{}", id);
            }
        }))
    }

    /// Routes one message, returning the number of subscriptions it reached
    fn deliver(&self, subject: &str, reply: Option<String>, payload: Vec<u8>) -> usize {
        let mut plain = Vec::new();
        let mut groups: BTreeMap<GroupKey, Vec<(u64, mpsc::UnboundedSender<BrokerMessage>)>> =
            BTreeMap::new();

        // Snapshot first, the map shards must not stay locked while sending
        for entry in self.subscriptions.iter() {
            if !matches(&entry.pattern, subject) {
                continue;
            }
            match &entry.group {
                Some(group) => groups
                    .entry((entry.pattern.clone(), group.clone()))
                    .or_default()
                    .push((*entry.key(), entry.tx.clone())),
                None => plain.push((*entry.key(), entry.tx.clone())),
            }
        }

        let message = BrokerMessage {
            subject: subject.to_string(),
            payload,
            reply,
        };
        let mut delivered = 0;
        let mut stale = Vec::new();

        for (id, tx) in plain {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                stale.push(id);
            }
        }

        for (key, mut members) in groups {
            members.sort_by_key(|(id, _)| *id);
            let start = {
                let mut cursor = self.cursors.entry(key.clone()).or_insert(0);
                let start = *cursor % members.len();
                *cursor = cursor.wrapping_add(1);
                start
            };
            // Closed members are skipped so a live one still gets the message
            let mut sent = false;
            for offset in 0..members.len() {
                let (id, tx) = &members[(start + offset) % members.len()];
                if tx.send(message.clone()).is_ok() {
                    sent = true;
                    break;
                }
                stale.push(*id);
            }
            if sent {
                delivered += 1;
            } else {
                warn!(
                    "[broker] queue group {} on {} has no live member for {}",
                    key.1, key.0, subject
                );
            }
        }

        for id in stale {
            self.subscriptions.remove(&id);
        }

        trace!("[broker] {} delivered to {} subscription(s)", subject, delivered);
        delivered
    }
}

/// In-process broker with NATS semantics
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions, reply inboxes included
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Number of live subscriptions whose pattern matches `subject`
    pub fn interest(&self, subject: &str) -> usize {
        self.inner
            .subscriptions
            .iter()
            .filter(|entry| matches(&entry.pattern, subject))
            .count()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        validate_subject(subject)?;
        self.inner.deliver(subject, None, payload);
        Ok(())
    }

    async fn publish_request(
        &self,
        subject: &str,
        reply: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        validate_subject(subject)?;
        validate_subject(reply)?;
        self.inner.deliver(subject, Some(reply.to_string()), payload);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        self.inner.add(pattern, None)
    }

    async fn queue_subscribe(
        &self,
        pattern: &str,
        group: &str,
    ) -> Result<Subscription, TransportError> {
        self.inner.add(pattern, Some(group))
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<BrokerMessage, TransportError> {
        validate_subject(subject)?;
        let inbox = format!("{}.{}", INBOX_PREFIX, Uuid::new_v4().simple());
        let mut replies = self.inner.add(&inbox, None)?;

        if self.inner.deliver(subject, Some(inbox), payload) == 0 {
            return Err(TransportError::NoResponders(subject.to_string()));
        }

        match tokio::time::timeout(timeout, replies.next()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(TransportError::ChannelClosed),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_plain_subscriber() {
        let broker = InMemoryBroker::new();
        let mut a = broker.subscribe("md.AAPL").await.unwrap();
        let mut b = broker.subscribe("md.*").await.unwrap();
        let mut other = broker.subscribe("md.MSFT").await.unwrap();

        broker.publish("md.AAPL", b"tick".to_vec()).await.unwrap();

        assert_eq!(a.next().await.unwrap().payload, b"tick");
        assert_eq!(b.next().await.unwrap().subject, "md.AAPL");
        assert!(other.try_next().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_group_splits_messages() {
        let broker = InMemoryBroker::new();
        let mut first = broker.queue_subscribe("work.>", "storage").await.unwrap();
        let mut second = broker.queue_subscribe("work.>", "storage").await.unwrap();
        let mut observer = broker.subscribe("work.>").await.unwrap();

        for i in 0..4u8 {
            broker.publish("work.item", vec![i]).await.unwrap();
        }

        let mut first_count = 0;
        while first.try_next().unwrap().is_some() {
            first_count += 1;
        }
        let mut second_count = 0;
        while second.try_next().unwrap().is_some() {
            second_count += 1;
        }
        let mut observed = 0;
        while observer.try_next().unwrap().is_some() {
            observed += 1;
        }

        assert_eq!(first_count, 2);
        assert_eq!(second_count, 2);
        assert_eq!(observed, 4);
    }

    #[tokio::test]
    async fn test_same_group_on_overlapping_patterns_gets_one_copy_each() {
        let broker = InMemoryBroker::new();
        let mut wide = broker.queue_subscribe("a.>", "storage").await.unwrap();
        let mut narrow = broker.queue_subscribe("a.b", "storage").await.unwrap();

        broker.publish("a.b", b"x".to_vec()).await.unwrap();
        broker.publish("a.c", b"y".to_vec()).await.unwrap();

        assert_eq!(wide.drain(), 2);
        assert_eq!(narrow.drain(), 1);
    }

    #[tokio::test]
    async fn test_queue_group_skips_dropped_member() {
        let broker = InMemoryBroker::new();
        let dropped = broker.queue_subscribe("jobs", "g").await.unwrap();
        let mut live = broker.queue_subscribe("jobs", "g").await.unwrap();
        drop(dropped);

        for _ in 0..3 {
            broker.publish("jobs", b"x".to_vec()).await.unwrap();
        }
        assert_eq!(live.drain(), 3);
    }

    #[tokio::test]
    async fn test_request_reply() {
        let broker = InMemoryBroker::new();
        let mut service = broker.queue_subscribe("svc.command", "command").await.unwrap();

        let responder = broker.clone();
        tokio::spawn(async move {
            while let Some(req) = service.next().await {
                let mut reply = b"echo:".to_vec();
                reply.extend_from_slice(&req.payload);
                responder.respond(&req, reply).await.unwrap();
            }
        });

        let reply = broker
            .request("svc.command", b"ping".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.payload, b"echo:ping");
        assert!(reply.subject.starts_with("_INBOX."));
    }

    #[tokio::test]
    async fn test_request_without_responders() {
        let broker = InMemoryBroker::new();
        let err = broker
            .request("nobody.command", Vec::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoResponders(_)));
        // the reply inbox is gone
        assert_eq!(broker.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let broker = InMemoryBroker::new();
        let _silent = broker.subscribe("slow.command").await.unwrap();
        let err = broker
            .request("slow.command", Vec::new(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }

    #[tokio::test]
    async fn test_respond_requires_reply_subject() {
        let broker = InMemoryBroker::new();
        let msg = BrokerMessage::new("a.b", Vec::new());
        assert!(matches!(
            broker.respond(&msg, Vec::new()).await,
            Err(TransportError::NoReplySubject(_))
        ));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let broker = InMemoryBroker::new();
        let sub = broker.subscribe("a.>").await.unwrap();
        assert_eq!(broker.interest("a.b"), 1);
        drop(sub);
        assert_eq!(broker.interest("a.b"), 0);
        assert_eq!(broker.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_subjects_are_rejected() {
        let broker = InMemoryBroker::new();
        assert!(broker.publish("a.*", Vec::new()).await.is_err());
        assert!(broker.subscribe("a..b").await.is_err());
        assert!(broker.queue_subscribe("a.b", "").await.is_err());
    }
}
