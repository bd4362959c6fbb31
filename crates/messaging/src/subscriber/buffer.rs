//! Per-topic accumulation of batch messages.
//!
//! Guarded by its own mutex, never taken while a registry lock is held.

use std::collections::HashMap;

use log::warn;
use marketbus_core::{Message, queue_count};
use parking_lot::Mutex;

#[derive(Default)]
pub struct QueueBuffers {
    buffers: Mutex<HashMap<String, Vec<Message>>>,
}

impl QueueBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch message under its own topic
    pub fn push(&self, message: Message) {
        self.buffers
            .lock()
            .entry(message.topic.clone())
            .or_default()
            .push(message);
    }

    /// The whole batch once at least `queueCount` messages arrived, otherwise
    /// `None`. A returned batch is removed from the buffer.
    pub fn drain(&self, topic: &str) -> Option<Vec<Message>> {
        let expected = match queue_count(topic) {
            Ok(count) => count,
            Err(e) => {
                warn!("[{}] cannot drain: {}", topic, e);
                return None;
            }
        };
        let mut buffers = self.buffers.lock();
        let ready = buffers.get(topic).is_some_and(|b| b.len() >= expected);
        if ready { buffers.remove(topic) } else { None }
    }

    /// Messages buffered for `topic`
    pub fn pending(&self, topic: &str) -> usize {
        self.buffers.lock().get(topic).map_or(0, Vec::len)
    }

    /// Drop a partial batch
    pub fn discard(&self, topic: &str) -> usize {
        self.buffers.lock().remove(topic).map_or(0, |b| b.len())
    }

    /// Topics with buffered messages
    pub fn topics(&self) -> Vec<String> {
        self.buffers.lock().keys().cloned().collect()
    }
}
