//! Hierarchical topic addressing.
//!
//! A topic is rendered as a dot-delimited subject. The layout depends on the
//! functionality:
//!
//! ```text
//! command  : {component}.command
//! logging  : {component}.logging[.{source}]
//! stream   : {component}.stream[.{source}].{asset}.{type}.{symbol}
//! data     : {component}.data[.{source}].{asset}.{type}[.{timeframe}].{symbol}.{queueID}.{queueCount}
//!                                                    ^ only for bars
//! ```
//!
//! Only the trailing one or two segments are ever parsed back: a numeric last
//! segment marks a batch topic and carries its element count. Symbols are
//! therefore never purely numeric.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{AssetClass, Component, DataType, Functionality, TimeFrame};

/// Structured form of a subject. Immutable once built, render with [`Topic::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub component: Component,
    pub functionality: Functionality,
    /// Empty means "no source segment"
    pub source: String,
    pub asset_class: Option<AssetClass>,
    pub data_type: Option<DataType>,
    /// Only rendered for bar data topics
    pub time_frame: Option<TimeFrame>,
    pub symbol: String,
    pub queue_id: String,
    pub queue_count: usize,
}

impl Topic {
    fn base(component: Component, functionality: Functionality) -> Self {
        Self {
            component,
            functionality,
            source: String::new(),
            asset_class: None,
            data_type: None,
            time_frame: None,
            symbol: String::new(),
            queue_id: String::new(),
            queue_count: 0,
        }
    }

    /// Command topic of a component
    pub fn command(component: Component) -> Self {
        Self::base(component, Functionality::Command)
    }

    /// Log topic of a component
    pub fn logging(component: Component) -> Self {
        Self::base(component, Functionality::Logging)
    }

    /// Live stream topic for one symbol and data type
    pub fn stream(
        component: Component,
        source: impl Into<String>,
        asset_class: AssetClass,
        data_type: DataType,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            asset_class: Some(asset_class),
            data_type: Some(data_type),
            symbol: symbol.into(),
            ..Self::base(component, Functionality::Stream)
        }
    }

    /// Batch topic: `queue_id` identifies the batch, `queue_count` is its size
    pub fn data(
        component: Component,
        source: impl Into<String>,
        asset_class: AssetClass,
        data_type: DataType,
        symbol: impl Into<String>,
        queue_id: impl Into<String>,
        queue_count: usize,
    ) -> Self {
        Self {
            source: source.into(),
            asset_class: Some(asset_class),
            data_type: Some(data_type),
            symbol: symbol.into(),
            queue_id: queue_id.into(),
            queue_count,
            ..Self::base(component, Functionality::Data)
        }
    }

    /// Batch topic for bars, which carries the timeframe segment
    pub fn bar_data(
        component: Component,
        source: impl Into<String>,
        asset_class: AssetClass,
        time_frame: TimeFrame,
        symbol: impl Into<String>,
        queue_id: impl Into<String>,
        queue_count: usize,
    ) -> Self {
        Self {
            time_frame: Some(time_frame),
            ..Self::data(
                component,
                source,
                asset_class,
                DataType::Bar,
                symbol,
                queue_id,
                queue_count,
            )
        }
    }

    /// Sets the source segment
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Renders the subject. Pure and infallible.
    pub fn generate(&self) -> String {
        let mut segments: Vec<String> = vec![
            self.component.as_str().to_string(),
            self.functionality.as_str().to_string(),
        ];

        if self.functionality == Functionality::Command {
            return segments.join(".");
        }

        if !self.source.is_empty() {
            segments.push(self.source.clone());
        }

        let asset = self.asset_class.map(|a| a.as_str()).unwrap_or_default();
        let data_type = self.data_type.map(|d| d.as_str()).unwrap_or_default();

        match self.functionality {
            Functionality::Stream => {
                segments.push(asset.to_string());
                segments.push(data_type.to_string());
                segments.push(self.symbol.clone());
            }
            Functionality::Data => {
                segments.push(asset.to_string());
                segments.push(data_type.to_string());
                if self.data_type.is_some_and(|d| d.is_bar()) {
                    let tf = self.time_frame.map(|t| t.as_str()).unwrap_or_default();
                    segments.push(tf.to_string());
                }
                segments.push(self.symbol.clone());
                segments.push(self.queue_id.clone());
                segments.push(self.queue_count.to_string());
            }
            Functionality::Command | Functionality::Logging => {}
        }

        segments.join(".")
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.generate())
    }
}

/// Last dot-delimited segment, `None` when the topic ends with a dot or is empty
pub fn last_segment(topic: &str) -> Option<&str> {
    topic.rsplit('.').next().filter(|s| !s.is_empty())
}

/// A topic is a batch topic when its last segment is an unsigned integer
pub fn is_queue(topic: &str) -> bool {
    last_segment(topic).is_some_and(|s| s.parse::<u64>().is_ok())
}

/// Splits a batch topic into `(queue_id, queue_count)`
pub fn queue_components(topic: &str) -> Result<(&str, usize)> {
    let mut parts = topic.rsplitn(3, '.');
    let count = parts
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| CoreError::NotBatchTopic(topic.to_string()))?;
    let queue_id = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::NotBatchTopic(topic.to_string()))?;
    Ok((queue_id, count))
}

/// Element count of a batch topic
pub fn queue_count(topic: &str) -> Result<usize> {
    queue_components(topic).map(|(_, count)| count)
}

/// Topic with its last segment removed. Producer stream handlers are keyed by
/// this prefix so every symbol of one stream shares a publisher.
pub fn stream_prefix(topic: &str) -> &str {
    match topic.rfind('.') {
        Some(idx) => &topic[..idx],
        None => topic,
    }
}
