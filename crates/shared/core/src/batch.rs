//! Helpers for building and consuming batches.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::fingerprint::{Fingerprint, hash_struct};
use crate::message::Message;
use crate::topic::Topic;
use crate::types::DataType;

/// Stamps every entity with its fingerprint and returns the batch id: the
/// fingerprint of the ordered list of member fingerprints.
pub fn batch_fingerprint<E: Fingerprint>(entities: &mut [E]) -> Result<String> {
    let mut fingerprints = Vec::with_capacity(entities.len());
    for entity in entities.iter_mut() {
        fingerprints.push(entity.set_fingerprint()?.to_string());
    }
    hash_struct(&fingerprints)
}

/// Wraps each entity in an envelope addressed to `topic`
pub fn messages_for_batch<E: Serialize>(
    topic: &Topic,
    data_type: DataType,
    entities: &[E],
) -> Result<Vec<Message>> {
    let subject = topic.generate();
    entities
        .iter()
        .map(|entity| Message::from_entity(subject.clone(), data_type, entity))
        .collect()
}

/// Decodes a drained batch into its entities, preserving order
pub fn decode_batch<E: DeserializeOwned>(messages: &[Message]) -> Result<Vec<E>> {
    messages.iter().map(Message::decode_payload).collect()
}
