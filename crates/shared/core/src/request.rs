//! Request bodies carried inside JSON commands.

use serde::{Deserialize, Serialize};

use crate::entities::Timestamp;
use crate::error::{CoreError, Result};
use crate::topic::Topic;
use crate::types::{
    AssetClass, Component, DataOperation, DataType, StreamOperation, TimeFrame, sources,
};

/// Agents spawned per subscription when the caller does not say
pub const DEFAULT_AGENT_COUNT: usize = 5;

/// Historical data request answered with a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub asset_class: Option<AssetClass>,
    pub symbol: String,
    #[serde(default)]
    pub operation: Option<DataOperation>,
    pub data_type: DataType,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    #[serde(default)]
    pub end_time: Option<Timestamp>,
    #[serde(default)]
    pub time_frame: Option<TimeFrame>,
    /// Skip the confirmation handshake and publish the batch immediately
    #[serde(default)]
    pub no_confirm: bool,
}

impl DataRequest {
    pub fn new(symbol: impl Into<String>, data_type: DataType) -> Self {
        Self {
            source: String::new(),
            asset_class: None,
            symbol: symbol.into(),
            operation: None,
            data_type,
            account: String::new(),
            start_time: None,
            end_time: None,
            time_frame: None,
            no_confirm: false,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_asset_class(mut self, asset_class: AssetClass) -> Self {
        self.asset_class = Some(asset_class);
        self
    }

    pub fn with_time_frame(mut self, time_frame: TimeFrame) -> Self {
        self.time_frame = Some(time_frame);
        self
    }

    pub fn with_range(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn with_no_confirm(mut self, no_confirm: bool) -> Self {
        self.no_confirm = no_confirm;
        self
    }

    /// Fills every unset field with its pipeline default
    pub fn apply_defaults(&mut self) {
        if self.source.is_empty() {
            self.source = sources::DEFAULT.to_string();
        }
        if self.account.is_empty() {
            self.account = "default".to_string();
        }
        self.asset_class.get_or_insert(AssetClass::Stock);
        self.time_frame.get_or_insert(TimeFrame::Minute);
        self.operation.get_or_insert(DataOperation::Get);
    }

    /// Batch topic on which `component` answers this request
    pub fn response_topic(&self, component: Component, queue_id: &str, count: usize) -> Topic {
        let asset_class = self.asset_class.unwrap_or(AssetClass::Stock);
        if self.data_type.is_bar() {
            Topic::bar_data(
                component,
                self.source.clone(),
                asset_class,
                self.time_frame.unwrap_or_default(),
                self.symbol.clone(),
                queue_id,
                count,
            )
        } else {
            Topic::data(
                component,
                self.source.clone(),
                asset_class,
                self.data_type,
                self.symbol.clone(),
                queue_id,
                count,
            )
        }
    }
}

/// Live stream management request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub asset_class: Option<AssetClass>,
    #[serde(default)]
    pub symbols: Vec<String>,
    pub operation: StreamOperation,
    #[serde(default)]
    pub data_types: Vec<DataType>,
    #[serde(default)]
    pub account: String,
}

impl StreamRequest {
    pub fn new(operation: StreamOperation) -> Self {
        Self {
            source: String::new(),
            asset_class: None,
            symbols: Vec::new(),
            operation,
            data_types: Vec::new(),
            account: String::new(),
        }
    }

    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data_types(mut self, data_types: impl IntoIterator<Item = DataType>) -> Self {
        self.data_types = data_types.into_iter().collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn apply_defaults(&mut self) {
        if self.source.is_empty() {
            self.source = sources::DEFAULT.to_string();
        }
        if self.account.is_empty() {
            self.account = "default".to_string();
        }
        self.asset_class.get_or_insert(AssetClass::Stock);
    }

    /// One stream topic per (data type, symbol) pair
    pub fn topics(&self, component: Component) -> Vec<Topic> {
        let asset_class = self.asset_class.unwrap_or(AssetClass::Stock);
        self.data_types
            .iter()
            .flat_map(|dt| {
                self.symbols.iter().map(move |symbol| {
                    Topic::stream(component, self.source.clone(), asset_class, *dt, symbol.clone())
                })
            })
            .collect()
    }
}

/// One subject to consume with a pool of round-robin agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSubscription {
    pub agent_count: usize,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSubscribeRequest {
    pub stream_subscribe_with_agents: Vec<StreamSubscription>,
    pub operation: StreamOperation,
}

impl StreamSubscribeRequest {
    pub fn new(operation: StreamOperation) -> Self {
        Self {
            stream_subscribe_with_agents: Vec::new(),
            operation,
        }
    }

    pub fn with_subscription(mut self, topic: impl Into<String>, agent_count: usize) -> Self {
        self.stream_subscribe_with_agents.push(StreamSubscription {
            agent_count,
            topic: topic.into(),
        });
        self
    }

    /// Parses `topic[,agents]` entries as typed on the command line. A missing
    /// agent count falls back to [`DEFAULT_AGENT_COUNT`].
    pub fn from_raw<S: AsRef<str>>(entries: &[S], operation: StreamOperation) -> Result<Self> {
        let mut request = Self::new(operation);
        for entry in entries {
            let entry = entry.as_ref().trim();
            let (topic, agents) = match entry.split_once(',') {
                Some((topic, agents)) => {
                    let agents = agents
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| CoreError::InvalidSubscription(entry.to_string()))?;
                    (topic.trim(), agents)
                }
                None => (entry, DEFAULT_AGENT_COUNT),
            };
            if topic.is_empty() {
                return Err(CoreError::InvalidSubscription(entry.to_string()));
            }
            request = request.with_subscription(topic, agents);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_request_defaults() {
        let mut req = DataRequest::new("AAPL", DataType::Bar);
        req.apply_defaults();
        assert_eq!(req.source, "alpaca");
        assert_eq!(req.account, "default");
        assert_eq!(req.asset_class, Some(AssetClass::Stock));
        assert_eq!(req.time_frame, Some(TimeFrame::Minute));
        assert_eq!(req.operation, Some(DataOperation::Get));
    }

    #[test]
    fn test_data_request_defaults_keep_explicit_values() {
        let mut req = DataRequest::new("BTCUSD", DataType::Quotes)
            .with_source("internal")
            .with_asset_class(AssetClass::Crypto);
        req.apply_defaults();
        assert_eq!(req.source, "internal");
        assert_eq!(req.asset_class, Some(AssetClass::Crypto));
    }

    #[test]
    fn test_data_request_json_is_camel_case() {
        let req = DataRequest::new("AAPL", DataType::Bar).with_no_confirm(true);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["noConfirm"], true);
        assert_eq!(json["dataType"], "bar");

        let parsed: DataRequest =
            serde_json::from_str(r#"{"symbol":"MSFT","dataType":"trades"}"#).unwrap();
        assert_eq!(parsed.symbol, "MSFT");
        assert!(!parsed.no_confirm);
    }

    #[test]
    fn test_response_topic_for_bars() {
        let mut req = DataRequest::new("AAPL", DataType::Bar).with_source("x");
        req.apply_defaults();
        let topic = req.response_topic(Component::DataStorage, "qid", 3);
        assert_eq!(topic.generate(), "datastorage.data.x.stock.bar.1min.AAPL.qid.3");
    }

    #[test]
    fn test_stream_request_topics() {
        let mut req = StreamRequest::new(StreamOperation::Add)
            .with_symbols(["AAPL", "MSFT"])
            .with_data_types([DataType::Trades]);
        req.apply_defaults();
        let topics: Vec<String> = req
            .topics(Component::DataProvider)
            .iter()
            .map(Topic::generate)
            .collect();
        assert_eq!(
            topics,
            vec![
                "dataprovider.stream.alpaca.stock.trades.AAPL",
                "dataprovider.stream.alpaca.stock.trades.MSFT",
            ]
        );
    }

    #[test]
    fn test_stream_subscribe_from_raw() {
        let req = StreamSubscribeRequest::from_raw(
            &["dataprovider.stream.>,3", "dataprovider.data.>"],
            StreamOperation::Add,
        )
        .unwrap();
        assert_eq!(
            req.stream_subscribe_with_agents,
            vec![
                StreamSubscription {
                    agent_count: 3,
                    topic: "dataprovider.stream.>".to_string()
                },
                StreamSubscription {
                    agent_count: DEFAULT_AGENT_COUNT,
                    topic: "dataprovider.data.>".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_stream_subscribe_from_raw_rejects_bad_counts() {
        assert!(StreamSubscribeRequest::from_raw(&["a.b,zero"], StreamOperation::Add).is_err());
        assert!(StreamSubscribeRequest::from_raw(&["a.b,0"], StreamOperation::Add).is_err());
        assert!(StreamSubscribeRequest::from_raw(&[",2"], StreamOperation::Add).is_err());
    }
}
