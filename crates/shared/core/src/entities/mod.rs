//! Market-data entities carried in message payloads.
//!
//! Each entity stores its own fingerprint and knows which of its fields are
//! volatile. [`fingerprint_of`] recovers the dedup key of an envelope payload
//! without the caller knowing the concrete type.

mod bar;
mod news;
mod quote;
mod sentiment;
mod trade;

use chrono::{DateTime, Utc};

pub use bar::Bar;
pub use news::News;
pub use quote::Quote;
pub use sentiment::NewsSentiment;
pub use trade::Trade;

use crate::error::{CoreError, Result};
use crate::fingerprint::Fingerprint;
use crate::types::DataType;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

fn decode_and_fingerprint<E>(payload: &[u8]) -> Result<String>
where
    E: Fingerprint + serde::de::DeserializeOwned,
{
    let entity: E =
        bincode::deserialize(payload).map_err(|e| CoreError::Decode(e.to_string()))?;
    entity.compute_fingerprint()
}

/// Decodes `payload` as the entity registered for `data_type` and returns its
/// freshly computed fingerprint.
pub fn fingerprint_of(data_type: DataType, payload: &[u8]) -> Result<String> {
    match data_type {
        DataType::Bar | DataType::DailyBars | DataType::UpdatedBars => {
            decode_and_fingerprint::<Bar>(payload)
        }
        DataType::Trades => decode_and_fingerprint::<Trade>(payload),
        DataType::Quotes => decode_and_fingerprint::<Quote>(payload),
        DataType::News | DataType::RawText => decode_and_fingerprint::<News>(payload),
        DataType::NewsSentiment => decode_and_fingerprint::<NewsSentiment>(payload),
        other => Err(CoreError::UnsupportedDataType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fingerprint_of_matches_entity_fingerprint() {
        let mut trade = Trade {
            symbol: "AAPL".to_string(),
            price: dec!(190.10),
            size: dec!(25),
            ..Default::default()
        };
        let expected = trade.set_fingerprint().unwrap().to_string();

        let msg = Message::from_entity("t", DataType::Trades, &trade).unwrap();
        assert_eq!(fingerprint_of(DataType::Trades, &msg.payload).unwrap(), expected);
    }

    #[test]
    fn test_fingerprint_of_unsupported_type() {
        assert!(matches!(
            fingerprint_of(DataType::Luld, &[]),
            Err(CoreError::UnsupportedDataType(DataType::Luld))
        ));
    }
}
