//! In-memory broker capability used by the pool and transport tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::broker::client::{BrokerClient, BrokerConnector, BrokerError};
use crate::broker::options::{ConnectOptions, QualityOfService};

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub connection: usize,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QualityOfService,
    pub retain: bool,
}

#[derive(Default)]
struct FakeState {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    connect_delay: Mutex<Duration>,
    publish_delay: Mutex<Duration>,
    connect_error: Mutex<Option<BrokerError>>,
    publish_error: Mutex<Option<BrokerError>>,
    options: Mutex<Vec<ConnectOptions>>,
    published: Mutex<Vec<Published>>,
}

/// Counts connects, records publishes and lets tests inject failures.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<FakeState>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.published.lock().unwrap().clone()
    }

    pub fn connect_options(&self) -> Vec<ConnectOptions> {
        self.state.options.lock().unwrap().clone()
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock().unwrap() = delay;
    }

    pub fn set_publish_delay(&self, delay: Duration) {
        *self.state.publish_delay.lock().unwrap() = delay;
    }

    pub fn fail_connects_with(&self, err: Option<BrokerError>) {
        *self.state.connect_error.lock().unwrap() = err;
    }

    pub fn fail_publishes_with(&self, err: Option<BrokerError>) {
        *self.state.publish_error.lock().unwrap() = err;
    }

    /// Fires the connection-lost handler of the `index`-th successful connect.
    pub fn lose_connection(&self, index: usize) {
        let handler = self.state.options.lock().unwrap()[index]
            .on_connection_lost
            .clone();
        handler(BrokerError::Transport("connection reset by peer".to_string()));
    }
}

#[async_trait]
impl BrokerConnector for FakeConnector {
    async fn connect(&self, options: ConnectOptions) -> Result<Box<dyn BrokerClient>, BrokerError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.state.connect_error.lock().unwrap().clone() {
            return Err(err);
        }

        let mut recorded = self.state.options.lock().unwrap();
        recorded.push(options);
        Ok(Box::new(FakeClient {
            state: self.state.clone(),
            connection: recorded.len() - 1,
        }))
    }
}

struct FakeClient {
    state: Arc<FakeState>,
    connection: usize,
}

#[async_trait]
impl BrokerClient for FakeClient {
    async fn publish(
        &self,
        topic: &str,
        qos: QualityOfService,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let delay = *self.state.publish_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.state.publish_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.state.published.lock().unwrap().push(Published {
            connection: self.connection,
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    fn disconnect(&self) {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}
