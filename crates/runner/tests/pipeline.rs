//! End-to-end pipeline tests
//!
//! Provider and storage run against one in-memory broker and are driven
//! through their command topics only.

use std::time::Duration;

use marketbus_core::{Component, DataRequest, DataType, StreamResponse, Topic};
use marketbus_runner::{Simulation, SimulationConfig};

fn config(ticks: usize) -> SimulationConfig {
    SimulationConfig {
        seed: Some(7),
        ticks,
        tick_interval: Duration::from_millis(1),
        agents: 2,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simulation_streams_fetches_and_serves() {
    let _ = env_logger::try_init();

    let sim = Simulation::start(config(5)).await.unwrap();
    let report = sim.run().await;

    assert!(report.success, "simulation failed: {:?}", report.error);
    // one trade per symbol per tick
    assert_eq!(report.streamed, 10);
    assert_eq!(report.stored, 10);
    // ten default bars per symbol
    assert_eq!(report.fetched, 20);
    assert_eq!(report.served, 20);

    let store = sim.storage().store();
    assert_eq!(store.count(DataType::Trades), 10);
    assert_eq!(store.count(DataType::Bar), 20);
    assert_eq!(store.trades(&DataRequest::new("MSFT", DataType::Trades)).len(), 5);

    sim.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refetching_stores_nothing_new() {
    let _ = env_logger::try_init();

    let sim = Simulation::start(config(1)).await.unwrap();
    assert!(sim.run().await.success);

    // storage serving its own bars back yields only duplicates
    let again = sim
        .storage()
        .fetch(
            sim.token(),
            Component::DataStorage,
            DataRequest::new("AAPL", DataType::Bar),
        )
        .await
        .unwrap();
    assert_eq!(again, 0);

    sim.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_storage_cli_lists_subscriptions() {
    let _ = env_logger::try_init();

    let sim = Simulation::start(config(1)).await.unwrap();
    assert!(sim.run().await.success);

    let subject = Topic::command(Component::DataStorage).generate();
    let reply = sim
        .bus()
        .broker()
        .request(&subject, b"stream list".to_vec(), Duration::from_secs(2))
        .await
        .unwrap();
    let response: StreamResponse =
        serde_json::from_str(String::from_utf8_lossy(&reply.payload).trim()).unwrap();
    assert!(response.response.is_success());
    assert_eq!(response.topics, vec!["dataprovider.stream.>".to_string()]);

    sim.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_symbol_is_reported() {
    let _ = env_logger::try_init();

    let sim = Simulation::start(SimulationConfig {
        symbols: vec!["ZZZZ".to_string()],
        ..config(1)
    })
    .await
    .unwrap();
    let report = sim.run().await;

    assert!(!report.success);
    let err = report.error.unwrap();
    assert!(err.contains("no bar data available for ZZZZ"), "{}", err);

    sim.shutdown().await.unwrap();
}
