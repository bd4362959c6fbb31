//! Command replies.
//!
//! Every reply is JSON with at least `{status, message, err}`. Data replies add
//! the batch `responseTopic`, stream replies list the affected topics.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::OpStatus;

/// Serializes a reply for the wire. Never fails: a marshalling error turns
/// into a failure reply describing it.
pub trait Reply: Serialize {
    fn respond(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => serde_json::json!({
                "err": format!("failed to marshal response: {e}"),
                "message": "",
                "status": OpStatus::Failure.as_str(),
            })
            .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub err: String,
    #[serde(default)]
    pub message: String,
    pub status: OpStatus,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            err: String::new(),
            message: message.into(),
            status: OpStatus::Success,
        }
    }

    pub fn failure(err: impl fmt::Display) -> Self {
        Self {
            err: err.to_string(),
            message: String::new(),
            status: OpStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OpStatus::Success && self.err.is_empty()
    }
}

impl Reply for Response {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataResponse {
    #[serde(flatten)]
    pub response: Response,
    /// Batch topic the data will be published on
    #[serde(rename = "responseTopic", default)]
    pub response_topic: String,
}

impl DataResponse {
    pub fn success(message: impl Into<String>, response_topic: impl Into<String>) -> Self {
        Self {
            response: Response::success(message),
            response_topic: response_topic.into(),
        }
    }

    pub fn failure(err: impl fmt::Display) -> Self {
        Self {
            response: Response::failure(err),
            response_topic: String::new(),
        }
    }

    pub fn err(&self) -> &str {
        &self.response.err
    }
}

impl Reply for DataResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamResponse {
    #[serde(flatten)]
    pub response: Response,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub streams: Vec<String>,
}

impl StreamResponse {
    pub fn success(message: impl Into<String>, topics: Vec<String>, streams: Vec<String>) -> Self {
        Self {
            response: Response::success(message),
            topics,
            streams,
        }
    }

    pub fn failure(err: impl fmt::Display) -> Self {
        Self {
            response: Response::failure(err),
            topics: Vec::new(),
            streams: Vec::new(),
        }
    }
}

impl Reply for StreamResponse {}
