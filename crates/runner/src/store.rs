//! In-memory record store of the storage service.
//!
//! Records are deduplicated on their content fingerprint: the same entity
//! arriving twice, from a stream and again inside a batch, is stored once.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};
use marketbus_core::{
    Bar, CoreError, DataRequest, DataType, Message, News, NewsSentiment, Quote, Timestamp, Trade,
    fingerprint_of,
};
use parking_lot::RwLock;

use crate::error::Result;

/// A stored entity
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Bar(Bar),
    Trade(Trade),
    Quote(Quote),
    News(News),
    Sentiment(NewsSentiment),
}

impl Record {
    /// Decode an envelope payload as the entity registered for `data_type`
    pub fn decode(message: &Message) -> Result<Self> {
        let record = match message.kind()? {
            DataType::Bar | DataType::DailyBars | DataType::UpdatedBars => {
                Record::Bar(message.decode_payload()?)
            }
            DataType::Trades => Record::Trade(message.decode_payload()?),
            DataType::Quotes => Record::Quote(message.decode_payload()?),
            DataType::News | DataType::RawText => Record::News(message.decode_payload()?),
            DataType::NewsSentiment => Record::Sentiment(message.decode_payload()?),
            other => return Err(CoreError::UnsupportedDataType(other).into()),
        };
        Ok(record)
    }

    pub fn mentions(&self, symbol: &str) -> bool {
        match self {
            Record::Bar(bar) => bar.symbol == symbol,
            Record::Trade(trade) => trade.symbol == symbol,
            Record::Quote(quote) => quote.symbol == symbol,
            Record::News(news) => news.mentions(symbol),
            Record::Sentiment(sentiment) => sentiment.symbol == symbol,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Record::Bar(bar) => bar.timestamp,
            Record::Trade(trade) => trade.timestamp,
            Record::Quote(quote) => quote.timestamp,
            Record::News(news) => news.created_at,
            Record::Sentiment(sentiment) => sentiment.timestamp,
        }
    }

    fn within(&self, request: &DataRequest) -> bool {
        let ts = self.timestamp();
        request.start_time.is_none_or(|start| ts >= start)
            && request.end_time.is_none_or(|end| ts <= end)
    }
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<DataType, Vec<Record>>,
    fingerprints: HashSet<String>,
    logs: Vec<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the entity carried by `message`. Returns false for duplicates.
    pub fn insert(&self, message: &Message) -> Result<bool> {
        let data_type = message.kind()?;
        if data_type == DataType::Log {
            let line = String::from_utf8_lossy(&message.payload).into_owned();
            self.inner.write().logs.push(line);
            return Ok(true);
        }

        let fingerprint = fingerprint_of(data_type, &message.payload)?;
        if self.inner.read().fingerprints.contains(&fingerprint) {
            trace!("[{}] duplicate {} dropped", message.topic, fingerprint);
            return Ok(false);
        }
        let record = Record::decode(message)?;

        let mut inner = self.inner.write();
        if !inner.fingerprints.insert(fingerprint) {
            return Ok(false);
        }
        inner.records.entry(data_type).or_default().push(record);
        Ok(true)
    }

    /// Store a drained batch, returning how many records were new
    pub fn insert_batch(&self, messages: &[Message]) -> Result<usize> {
        let mut inserted = 0;
        for message in messages {
            if self.insert(message)? {
                inserted += 1;
            }
        }
        debug!("stored {} of {} batch records", inserted, messages.len());
        Ok(inserted)
    }

    /// Records matching the request's data type, symbol and time range, oldest first
    pub fn query(&self, request: &DataRequest) -> Vec<Record> {
        let inner = self.inner.read();
        let Some(records) = inner.records.get(&request.data_type) else {
            return Vec::new();
        };
        let mut matched: Vec<Record> = records
            .iter()
            .filter(|record| record.mentions(&request.symbol) && record.within(request))
            .filter(|record| match (record, request.time_frame) {
                (Record::Bar(bar), Some(time_frame)) => bar.time_frame == time_frame,
                _ => true,
            })
            .cloned()
            .collect();
        matched.sort_by_key(Record::timestamp);
        matched
    }

    /// Stored bars for the request
    pub fn bars(&self, request: &DataRequest) -> Vec<Bar> {
        self.query(request)
            .into_iter()
            .filter_map(|record| match record {
                Record::Bar(bar) => Some(bar),
                _ => None,
            })
            .collect()
    }

    pub fn trades(&self, request: &DataRequest) -> Vec<Trade> {
        self.query(request)
            .into_iter()
            .filter_map(|record| match record {
                Record::Trade(trade) => Some(trade),
                _ => None,
            })
            .collect()
    }

    pub fn quotes(&self, request: &DataRequest) -> Vec<Quote> {
        self.query(request)
            .into_iter()
            .filter_map(|record| match record {
                Record::Quote(quote) => Some(quote),
                _ => None,
            })
            .collect()
    }

    pub fn news(&self, request: &DataRequest) -> Vec<News> {
        self.query(request)
            .into_iter()
            .filter_map(|record| match record {
                Record::News(news) => Some(news),
                _ => None,
            })
            .collect()
    }

    pub fn sentiments(&self, request: &DataRequest) -> Vec<NewsSentiment> {
        self.query(request)
            .into_iter()
            .filter_map(|record| match record {
                Record::Sentiment(sentiment) => Some(sentiment),
                _ => None,
            })
            .collect()
    }

    /// Stored records of `data_type`
    pub fn count(&self, data_type: DataType) -> usize {
        self.inner.read().records.get(&data_type).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.inner.read().fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn logs(&self) -> Vec<String> {
        self.inner.read().logs.clone()
    }
}
