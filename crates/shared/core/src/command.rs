//! JSON command envelope.
//!
//! A command request whose payload starts with the four bytes `json` carries a
//! [`JsonCommand`]; any other payload is CLI text.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::JsonOperation;

pub const JSON_COMMAND_PREFIX: &str = "json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonCommand {
    pub operation: JsonOperation,
    /// Operation-specific body, decoded by the handler
    #[serde(default)]
    pub request: serde_json::Value,
    /// Caller-chosen key under which the operation can be cancelled
    #[serde(default)]
    pub cancel_key: String,
}

impl JsonCommand {
    pub fn new(operation: JsonOperation) -> Self {
        Self {
            operation,
            request: serde_json::Value::Null,
            cancel_key: String::new(),
        }
    }

    pub fn with_request<T: Serialize>(operation: JsonOperation, request: &T) -> Result<Self> {
        Ok(Self {
            request: serde_json::to_value(request)?,
            ..Self::new(operation)
        })
    }

    /// Command cancelling the operation registered under `key`
    pub fn cancel(key: impl Into<String>) -> Self {
        Self::new(JsonOperation::Cancel).with_cancel_key(key)
    }

    pub fn with_cancel_key(mut self, key: impl Into<String>) -> Self {
        self.cancel_key = key.into();
        self
    }

    /// Decodes the request body
    pub fn parse_request<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.request)?)
    }

    /// `json` prefix followed by the JSON encoding, ready to send to a command topic
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        let mut payload = JSON_COMMAND_PREFIX.as_bytes().to_vec();
        serde_json::to_writer(&mut payload, self)?;
        Ok(payload)
    }

    pub fn from_json(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Returns the JSON body when `payload` is a JSON command
pub fn strip_json_prefix(payload: &[u8]) -> Option<&[u8]> {
    payload.strip_prefix(JSON_COMMAND_PREFIX.as_bytes())
}
