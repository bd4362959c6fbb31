use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::DataType;

/// Wire envelope published on every data and stream subject.
///
/// The payload is an opaque serialized entity; the substrate only routes on
/// `topic` and never inspects the payload itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub data_type: String,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, data_type: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            data_type: data_type.into(),
        }
    }

    /// Serializes `entity` into a new envelope addressed to `topic`
    pub fn from_entity<E: Serialize>(
        topic: impl Into<String>,
        data_type: DataType,
        entity: &E,
    ) -> Result<Self> {
        let payload = bincode::serialize(entity).map_err(|e| CoreError::Encode(e.to_string()))?;
        Ok(Self::new(topic, payload, data_type.as_str()))
    }

    /// Readdresses the envelope
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Parsed data type of the payload
    pub fn kind(&self) -> Result<DataType> {
        self.data_type.parse()
    }

    /// Decodes the payload as entity `E`
    pub fn decode_payload<E: DeserializeOwned>(&self) -> Result<E> {
        bincode::deserialize(&self.payload).map_err(|e| CoreError::Decode(e.to_string()))
    }

    /// Serialize the envelope to bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CoreError::Encode(e.to_string()))
    }

    /// Deserialize an envelope from bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| CoreError::Decode(e.to_string()))
    }
}
