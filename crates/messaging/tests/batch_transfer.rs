//! Batch transfer integration tests
//!
//! Producer and consumer share one in-memory broker. The consumer side uses
//! either a raw subscription or `request_data`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{ArgMatches, Command};
use marketbus_core::{
    AssetClass, Bar, Component, DataRequest, DataResponse, DataType, JsonCommand, Message, Reply,
    TimeFrame, Topic, batch_fingerprint, decode_batch, messages_for_batch,
};
use marketbus_messaging::{
    Bus, BusConfig, BusError, CliHandler, CommandContext, CommandDispatcher, CommandOutput,
    Handler, JsonHandler, QueuePublisher,
};
use marketbus_transport::{Broker, BrokerMessage, InMemoryBroker, Subscription};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

const TOPIC: &str = "dataprovider.data.x.stock.bar.1min.AAPL.q1.3";

fn bars() -> Vec<Bar> {
    [dec!(101.5), dec!(102.0), dec!(101.75)]
        .into_iter()
        .enumerate()
        .map(|(i, close)| Bar {
            source: "x".to_string(),
            symbol: "AAPL".to_string(),
            close,
            volume: 100 * (i as u64 + 1),
            ..Default::default()
        })
        .collect()
}

fn batch() -> Vec<Message> {
    (0..3u8).map(|i| Message::new(TOPIC, vec![i], "bar")).collect()
}

async fn collect(sub: &mut Subscription, count: usize) -> Vec<BrokerMessage> {
    let mut received = Vec::new();
    while received.len() < count {
        let delivery = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap();
        if !delivery.is_empty() {
            received.push(delivery);
        }
    }
    received
}

#[tokio::test]
async fn test_batch_waits_for_ready_signal() {
    let _ = env_logger::try_init();
    let broker = InMemoryBroker::new();
    let publisher = QueuePublisher::new(Arc::new(broker.clone()), Duration::from_secs(30));

    let handler = publisher.publish_batch(TOPIC, batch(), false).await.unwrap();
    let mut sub = broker.subscribe(TOPIC).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sub.try_next().unwrap().is_none());
    assert!(publisher.contains(TOPIC));

    broker.publish(TOPIC, Vec::new()).await.unwrap();
    let received = collect(&mut sub, 3).await;
    let payloads: Vec<u8> = received
        .iter()
        .map(|d| Message::decode(&d.payload).unwrap().payload[0])
        .collect();
    assert_eq!(payloads, vec![0, 1, 2]);

    handler.context().wait().await;
    assert!(publisher.is_empty());
}

#[tokio::test]
async fn test_no_confirm_publishes_immediately() {
    let _ = env_logger::try_init();
    let broker = InMemoryBroker::new();
    let mut sub = broker.subscribe(TOPIC).await.unwrap();
    let publisher = QueuePublisher::new(Arc::new(broker.clone()), Duration::from_secs(30));

    publisher.publish_batch(TOPIC, batch(), true).await.unwrap();
    assert_eq!(collect(&mut sub, 3).await.len(), 3);
}

#[tokio::test]
async fn test_confirm_timeout_still_delivers() {
    let _ = env_logger::try_init();
    let broker = InMemoryBroker::new();
    let mut sub = broker.subscribe(TOPIC).await.unwrap();
    let publisher = QueuePublisher::new(Arc::new(broker.clone()), Duration::from_millis(50));

    let handler = publisher.publish_batch(TOPIC, batch(), false).await.unwrap();
    assert_eq!(collect(&mut sub, 3).await.len(), 3);
    handler.context().wait().await;
    assert!(!publisher.contains(TOPIC));
}

#[tokio::test]
async fn test_subscriber_drains_complete_batch() {
    let _ = env_logger::try_init();
    let broker = InMemoryBroker::new();
    let bus = Arc::new(Bus::new(Arc::new(broker.clone()), BusConfig::default()));
    let drained = Arc::new(Mutex::new(Vec::new()));

    let worker = {
        let bus = bus.clone();
        let drained = drained.clone();
        move |msg: Message| {
            if let Some(batch) = bus.subscriptions().drain_queue(&msg.topic) {
                drained.lock().push(batch);
            }
        }
    };
    bus.subscriptions()
        .attach_round_robin("dataprovider.data.>", Arc::new(worker), 3)
        .await
        .unwrap();

    let mut entities = bars();
    let queue_id = batch_fingerprint(&mut entities).unwrap();
    let topic = Topic::bar_data(
        Component::DataProvider,
        "x",
        AssetClass::Stock,
        TimeFrame::Minute,
        "AAPL",
        queue_id,
        entities.len(),
    );
    let messages = messages_for_batch(&topic, DataType::Bar, &entities).unwrap();
    bus.queues()
        .publish_batch(&topic.generate(), messages, true)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while drained.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let batches = drained.lock().clone();
    assert_eq!(batches.len(), 1);
    let mut decoded: Vec<Bar> = decode_batch(&batches[0]).unwrap();
    decoded.sort_by_key(|b| b.volume);
    assert_eq!(decoded, entities);
    bus.shutdown();
}

struct NoCli;

#[async_trait]
impl CliHandler for NoCli {
    fn command(&self) -> Command {
        Command::new("dataprovider")
    }

    async fn execute(&self, _ctx: &CommandContext, _matches: &ArgMatches, _output: &mut CommandOutput) {}
}

/// Serves fixture bars, fails for `FAIL` and promises a batch it never sends for `HANG`
struct BarServer {
    bus: Arc<Bus>,
}

#[async_trait]
impl JsonHandler for BarServer {
    async fn handle(&self, _ctx: &CommandContext, command: JsonCommand) -> String {
        let mut request: DataRequest = match command.parse_request() {
            Ok(request) => request,
            Err(e) => return DataResponse::failure(e).respond(),
        };
        request.apply_defaults();
        match request.symbol.as_str() {
            "FAIL" => DataResponse::failure("boom").respond(),
            "HANG" => DataResponse::success("", "dataprovider.data.x.stock.bar.1min.HANG.q9.5")
                .respond(),
            _ => self
                .bus
                .queues()
                .serve_batch(Component::DataProvider, &request, bars())
                .await
                .respond(),
        }
    }
}

async fn serve(bus: &Arc<Bus>) -> Arc<CommandDispatcher> {
    bus.start_commands(
        Component::DataProvider,
        Arc::new(NoCli),
        Arc::new(BarServer { bus: bus.clone() }),
    )
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_data_end_to_end() {
    let _ = env_logger::try_init();
    let bus = Arc::new(Bus::new(Arc::new(InMemoryBroker::new()), BusConfig::default()));
    let dispatcher = serve(&bus).await;

    let request = DataRequest::new("AAPL", DataType::Bar).with_source("x");
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let count = bus
        .request_data(&CancellationToken::new(), Component::DataProvider, request.clone(), move |msg| {
            sink.lock().push(msg)
        })
        .await
        .unwrap();
    assert_eq!(count, 3);

    let mut expected = bars();
    let queue_id = batch_fingerprint(&mut expected).unwrap();
    let mut served = request;
    served.apply_defaults();
    let expected_topic = served
        .response_topic(Component::DataProvider, &queue_id, 3)
        .generate();

    let received = received.lock().clone();
    assert_eq!(received.len(), 3);
    assert!(received.iter().all(|m| m.topic == expected_topic));
    let decoded: Vec<Bar> = decode_batch(&received).unwrap();
    assert_eq!(decoded, expected);

    dispatcher.stop().await;
    tokio::time::timeout(Duration::from_secs(1), async {
        while !bus.queues().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_request_data_remote_failure() {
    let _ = env_logger::try_init();
    let bus = Arc::new(Bus::new(Arc::new(InMemoryBroker::new()), BusConfig::default()));
    let dispatcher = serve(&bus).await;

    let err = bus
        .request_data(
            &CancellationToken::new(),
            Component::DataProvider,
            DataRequest::new("FAIL", DataType::Bar),
            |_| {},
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Remote(ref e) if e == "boom"));
    dispatcher.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_data_cancelled_while_collecting() {
    let _ = env_logger::try_init();
    let bus = Arc::new(Bus::new(Arc::new(InMemoryBroker::new()), BusConfig::default()));
    let dispatcher = serve(&bus).await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = bus
        .request_data(&token, Component::DataProvider, DataRequest::new("HANG", DataType::Bar), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Cancelled));
    dispatcher.stop().await;
}

#[tokio::test]
async fn test_empty_batch_is_a_failure_reply() {
    let _ = env_logger::try_init();
    let bus = Bus::new(Arc::new(InMemoryBroker::new()), BusConfig::default());
    let response = bus
        .queues()
        .serve_batch(
            Component::DataProvider,
            &DataRequest::new("MSFT", DataType::Bar),
            Vec::<Bar>::new(),
        )
        .await;
    assert_eq!(response.err(), "no bar data available for MSFT");
    assert!(bus.queues().is_empty());
}
