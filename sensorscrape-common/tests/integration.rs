//! Integration tests for sensorscrape-common library.

use std::sync::Arc;
use std::time::Duration;

use sensorscrape_common::{
    AcquisitionError, Broker, BrokerConfig, BrokerConnection, MockBroker, ReadingStore, Script,
    load_config, pair_up,
};

#[test]
fn test_pairs_seed_the_store() {
    let pairs = pair_up(
        &["sensors/home/temp", "sensors/home/humidity"],
        &["temp", "humidity"],
    )
    .expect("pairing failed");

    let store = ReadingStore::new(pairs.iter().map(|p| p.key.clone()), "0");

    assert_eq!(store.snapshot().len(), 2);
    for pair in &pairs {
        assert!(store.contains(&pair.key));
        assert_eq!(store.get(&pair.key), "0");
    }
}

#[test]
fn test_load_broker_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broker.json5");
    std::fs::write(
        &path,
        r#"{
            // comments are allowed in JSON5
            host: "broker.local",
            port: 8883,
            username: "sensor",
            password: "secret",
        }"#,
    )
    .unwrap();

    let config: BrokerConfig = load_config(&path).unwrap();

    assert_eq!(
        config,
        BrokerConfig::new("broker.local", 8883, "sensor", "secret")
    );
}

#[test]
fn test_load_missing_config_file() {
    let result: sensorscrape_common::Result<BrokerConfig> =
        load_config("/nonexistent/sensorscrape.json5");

    assert!(matches!(result, Err(sensorscrape_common::Error::Io(_))));
}

#[tokio::test]
async fn test_mock_broker_one_message_per_connection() {
    let broker = MockBroker::new();
    broker.script("sensors/home/temp", Script::publish("22.5"));

    let mut conn = broker.connect().await.unwrap();
    conn.subscribe("sensors/home/temp").await.unwrap();

    let first = conn.await_message(Duration::from_millis(20)).await;
    let second = conn.await_message(Duration::from_millis(20)).await;
    conn.close().await.unwrap();

    assert_eq!(first, Ok(b"22.5".to_vec()));
    assert!(matches!(second, Err(AcquisitionError::Broker(_))));
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn test_mock_broker_cancelled_wait_releases_connection() {
    let broker = MockBroker::new();
    broker.script("slow", Script::Silent);

    let waiting = {
        let broker = broker.clone();
        tokio::spawn(async move {
            let mut conn = broker.connect().await.unwrap();
            conn.subscribe("slow").await.unwrap();
            let _ = conn.await_message(Duration::from_secs(30)).await;
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(broker.open_connections(), 1);

    waiting.abort();
    let _ = waiting.await;

    assert_eq!(broker.open_connections(), 0);
}

#[test]
fn test_store_shared_across_threads() {
    let store = Arc::new(ReadingStore::new(["temp"], "0"));

    let writer = {
        let store = store.clone();
        std::thread::spawn(move || store.set("temp", "19.5"))
    };
    assert!(writer.join().unwrap());

    assert_eq!(store.get("temp"), "19.5");
}
