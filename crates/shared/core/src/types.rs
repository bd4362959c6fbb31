//! Closed vocabularies used in topics and command payloads.
//!
//! Every enum here has a fixed wire spelling that appears both as a topic
//! segment and as a JSON string, so `Display`, `FromStr` and serde all agree.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant ),+
        }

        impl $name {
            /// Every variant in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire spelling used in topics and JSON
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(CoreError::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Services that own a command topic
    pub enum Component {
        DataProvider => "dataprovider",
        DataStorage => "datastorage",
        SentimentAnalyzer => "sentimentanalyzer",
    }
}

wire_enum! {
    /// Second topic segment, selects the topic layout
    pub enum Functionality {
        Command => "command",
        Stream => "stream",
        Data => "data",
        Logging => "logging",
    }
}

wire_enum! {
    pub enum AssetClass {
        Crypto => "crypto",
        Stock => "stock",
        News => "news",
    }
}

wire_enum! {
    /// Kind of entity carried in a message payload
    pub enum DataType {
        NewsSentiment => "news-sentiment",
        Log => "log",
        Bar => "bar",
        Luld => "luld",
        Status => "status",
        OrderBook => "orderbook",
        DailyBars => "daily-bars",
        Quotes => "quotes",
        Trades => "trades",
        UpdatedBars => "updated-bars",
        RawText => "raw-text",
        News => "news",
    }
}

wire_enum! {
    /// Bar aggregation window
    pub enum TimeFrame {
        Minute => "1min",
        Hour => "1hour",
        Day => "1day",
        Week => "1week",
        Month => "1month",
    }
}

wire_enum! {
    /// Outcome reported in every command reply
    pub enum OpStatus {
        Success => "success",
        Failure => "failure",
    }
}

wire_enum! {
    /// Operations accepted through the JSON command surface
    pub enum JsonOperation {
        /// Reply, then shut the component down
        Quit => "quit",
        Data => "data",
        Stream => "stream",
        StreamSubscribe => "stream-subscribe",
        /// Cancel the in-flight operation registered under `cancelKey`
        Cancel => "cancel",
    }
}

wire_enum! {
    pub enum StreamOperation {
        Add => "add",
        Remove => "remove",
        Stop => "stop",
        Get => "get",
    }
}

wire_enum! {
    pub enum DataOperation {
        Get => "get",
    }
}

impl Default for TimeFrame {
    fn default() -> Self {
        TimeFrame::Minute
    }
}

impl DataType {
    /// Returns true for the bar family, whose data topics carry a timeframe segment
    pub fn is_bar(&self) -> bool {
        matches!(self, DataType::Bar)
    }
}

/// Well-known source names. Sources are free-form topic segments, these are
/// the ones the pipeline itself produces.
pub mod sources {
    pub const ALPACA: &str = "alpaca";
    pub const INTERNAL: &str = "internal";

    /// Source assumed when a request leaves it empty
    pub const DEFAULT: &str = ALPACA;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_spelling_round_trips_through_from_str() {
        for dt in DataType::ALL {
            assert_eq!(dt.as_str().parse::<DataType>().unwrap(), *dt);
        }
        assert_eq!("1hour".parse::<TimeFrame>().unwrap(), TimeFrame::Hour);
        assert_eq!(
            "stream-subscribe".parse::<JsonOperation>().unwrap(),
            JsonOperation::StreamSubscribe
        );
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let err = "bogus".parse::<Component>().unwrap_err();
        assert_eq!(err.to_string(), "unknown Component 'bogus'");
    }

    #[test]
    fn test_serde_uses_wire_spelling() {
        let json = serde_json::to_string(&DataType::DailyBars).unwrap();
        assert_eq!(json, "\"daily-bars\"");

        let op: OpStatus = serde_json::from_str("\"failure\"").unwrap();
        assert_eq!(op, OpStatus::Failure);
    }
}
