//! Gateway round trip against a real broker.
//!
//! Needs an MQTT broker on localhost:1883 (for example `mosquitto -p 1883`):
//! `cargo test --test e2e -- --ignored`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use mqgate::broker::{
    BrokerClient, BrokerConnector, BrokerError, ConnectOptions, RumqttConnector,
};
use mqgate::config::PoolSettings;
use mqgate::pool::ConnectionPool;
use mqgate::transport::router;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tower::ServiceExt;

struct CountingConnector {
    inner: RumqttConnector,
    connects: Arc<AtomicUsize>,
}

#[async_trait]
impl BrokerConnector for CountingConnector {
    async fn connect(&self, options: ConnectOptions) -> Result<Box<dyn BrokerClient>, BrokerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.connect(options).await
    }
}

async fn subscribe(topic: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
    let mut options = MqttOptions::new("mqgate-e2e-subscriber", "localhost", 1883);
    options.set_keep_alive(Duration::from_secs(5));
    let (client, mut eventloop) = AsyncClient::new(options, 10);
    client.subscribe(topic, QoS::AtLeastOnce).await.unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _client = client;
        let mut ready = Some(ready_tx);
        while let Ok(event) = eventloop.poll().await {
            match event {
                Event::Incoming(Packet::SubAck(_)) => {
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(());
                    }
                }
                Event::Incoming(Packet::Publish(publish)) => {
                    let _ = tx.send(publish.payload.to_vec());
                }
                _ => {}
            }
        }
    });
    tokio::time::timeout(Duration::from_secs(5), ready_rx)
        .await
        .expect("subscription acknowledged")
        .unwrap();
    rx
}

fn publish_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/publish")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
#[ignore = "requires an MQTT broker on localhost:1883"]
async fn publish_round_trip_through_local_broker() {
    let mut received = subscribe("sensors/temp").await;

    let connects = Arc::new(AtomicUsize::new(0));
    let connector = CountingConnector {
        inner: RumqttConnector::default(),
        connects: connects.clone(),
    };
    let pool = ConnectionPool::new(Arc::new(connector), PoolSettings::default());
    let app = router(pool.clone());

    let body = r#"{"host":"localhost","port":1883,"topic":"sensors/temp","payload":"21.5"}"#;
    let response = app.clone().oneshot(publish_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let payload = tokio::time::timeout(Duration::from_secs(5), received.recv())
        .await
        .expect("message delivered")
        .unwrap();
    assert_eq!(payload, b"21.5");

    let response = app.oneshot(publish_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(connects.load(Ordering::SeqCst), 1);

    pool.shutdown().await;
}
