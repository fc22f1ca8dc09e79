//! rumqttc-backed broker capability
//!
//! `rumqttc` splits a connection into an `AsyncClient` (request side) and an
//! `EventLoop` that must be polled for anything to happen. After the CONNACK
//! the event loop is moved into a background task which:
//! - pairs outgoing publishes with waiting callers (FIFO, then by packet id)
//! - resolves those callers on PUBACK / PUBCOMP
//! - stops on the first error instead of letting rumqttc reconnect, and
//!   reports the loss unless `disconnect()` asked for it
//!
//! Concurrency notes:
//! - Every queued waiter stands for exactly one request in the rumqttc
//!   channel. The waiter is queued and the request handed over with
//!   `try_publish` under the same lock, with no await in between, so a
//!   caller dropped at any point (e.g. by a timeout) cannot shift the
//!   pairing. Its waiter is still resolved when the ack arrives.
//! - Packets over `max_packet_size` are refused before they reach rumqttc,
//!   which would otherwise fail the whole event loop.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::broker::client::{BrokerClient, BrokerConnector, BrokerError};
use crate::broker::options::{ConnectOptions, ConnectionLostHandler, QualityOfService};

type AckSender = oneshot::Sender<Result<(), BrokerError>>;
type AckReceiver = oneshot::Receiver<Result<(), BrokerError>>;

/// Pause between attempts while the request channel is full.
const QUEUE_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Opens one rumqttc connection per `connect` call.
#[derive(Debug, Clone)]
pub struct RumqttConnector {
    request_capacity: usize,
}

impl RumqttConnector {
    /// Default bound of the rumqttc request channel.
    pub const REQUEST_CAPACITY: usize = 10;

    pub fn new(request_capacity: usize) -> Self {
        Self {
            request_capacity: request_capacity.max(1),
        }
    }
}

impl Default for RumqttConnector {
    fn default() -> Self {
        Self::new(Self::REQUEST_CAPACITY)
    }
}

#[async_trait]
impl BrokerConnector for RumqttConnector {
    async fn connect(&self, options: ConnectOptions) -> Result<Box<dyn BrokerClient>, BrokerError> {
        if options.auto_reconnect {
            warn!(
                client_id = %options.client_id,
                "auto_reconnect is not supported by the rumqttc connector; loss will be reported instead"
            );
        }

        let (client, mut eventloop) =
            AsyncClient::new(mqtt_options(&options), self.request_capacity);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => continue,
                Err(e) => return Err(map_connection_error(e)),
            }
        }
        debug!(client_id = %options.client_id, broker = %options.broker_url(), "CONNACK received");

        let shared = Arc::new(Shared::default());
        let task = tokio::spawn(drive(
            eventloop,
            shared.clone(),
            options.on_connection_lost.clone(),
            options.client_id.clone(),
        ));

        Ok(Box::new(RumqttClient {
            client,
            shared,
            task,
            max_packet_size: options.max_packet_size,
        }))
    }
}

pub(crate) fn mqtt_options(options: &ConnectOptions) -> MqttOptions {
    let mut mqtt = MqttOptions::new(options.client_id.clone(), options.host.clone(), options.port);

    // rumqttc rejects sub-second keep-alives other than zero (disabled)
    let keep_alive = if options.keep_alive.is_zero() {
        Duration::ZERO
    } else {
        options.keep_alive.max(Duration::from_secs(1))
    };
    mqtt.set_keep_alive(keep_alive);
    mqtt.set_clean_session(true);
    mqtt.set_max_packet_size(options.max_packet_size, options.max_packet_size);

    if let Some(credentials) = &options.credentials {
        mqtt.set_credentials(credentials.username.clone(), credentials.password.clone());
    }
    mqtt
}

fn map_qos(qos: QualityOfService) -> QoS {
    match qos {
        QualityOfService::AtLeastOnce => QoS::AtLeastOnce,
        QualityOfService::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn map_connection_error(err: ConnectionError) -> BrokerError {
    match err {
        ConnectionError::ConnectionRefused(code) => BrokerError::Refused(format!("{code:?}")),
        other => BrokerError::Transport(other.to_string()),
    }
}

/// Encoded size of a PUBLISH packet carrying a packet id.
pub(crate) fn publish_packet_size(topic: &str, payload_len: usize) -> usize {
    let remaining = 2 + topic.len() + 2 + payload_len;
    let length_bytes = match remaining {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    };
    1 + length_bytes + remaining
}

#[derive(Default)]
struct AckTracker {
    queued: VecDeque<AckSender>,
    inflight: HashMap<u16, AckSender>,
    closed: bool,
}

/// State shared between the client handle and its event loop task.
#[derive(Default)]
struct Shared {
    closing: AtomicBool,
    acks: Mutex<AckTracker>,
}

impl Shared {
    fn tracker(&self) -> std::sync::MutexGuard<'_, AckTracker> {
        self.acks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hands one publish to the event loop and queues its waiter in the same step.
    ///
    /// `Ok(None)` means the request channel is full and nothing was queued.
    fn submit(
        &self,
        client: &AsyncClient,
        topic: &str,
        qos: QualityOfService,
        retain: bool,
        payload: &[u8],
    ) -> Result<Option<AckReceiver>, BrokerError> {
        let mut acks = self.tracker();
        if acks.closed {
            return Err(BrokerError::Closed);
        }
        match client.try_publish(topic, map_qos(qos), retain, payload.to_vec()) {
            Ok(()) => {
                let (tx, rx) = oneshot::channel();
                acks.queued.push_back(tx);
                Ok(Some(rx))
            }
            Err(ClientError::TryRequest(_)) => Ok(None),
            Err(e) => Err(BrokerError::Transport(e.to_string())),
        }
    }

    fn sent(&self, pkid: u16) {
        let mut acks = self.tracker();
        if let Some(ack) = acks.queued.pop_front() {
            acks.inflight.insert(pkid, ack);
        }
    }

    fn acked(&self, pkid: u16) {
        if let Some(ack) = self.tracker().inflight.remove(&pkid) {
            let _ = ack.send(Ok(()));
        }
    }

    fn close(&self, reason: &BrokerError) {
        let mut acks = self.tracker();
        acks.closed = true;
        for ack in acks.queued.drain(..) {
            let _ = ack.send(Err(reason.clone()));
        }
        for (_, ack) in acks.inflight.drain() {
            let _ = ack.send(Err(reason.clone()));
        }
    }
}

async fn drive(
    mut eventloop: EventLoop,
    shared: Arc<Shared>,
    on_connection_lost: ConnectionLostHandler,
    client_id: String,
) {
    let lost = loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => shared.sent(pkid),
            Ok(Event::Incoming(Packet::PubAck(ack))) => shared.acked(ack.pkid),
            Ok(Event::Incoming(Packet::PubComp(comp))) => shared.acked(comp.pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break None,
            Ok(Event::Incoming(Packet::Disconnect)) => {
                break Some(BrokerError::Transport(
                    "broker closed the session".to_string(),
                ));
            }
            Ok(_) => {}
            Err(e) => break Some(map_connection_error(e)),
        }
    };

    shared.close(&BrokerError::Closed);

    match lost {
        Some(reason) if !shared.closing.load(Ordering::SeqCst) => {
            warn!(%client_id, %reason, "broker connection lost");
            on_connection_lost(reason);
        }
        _ => debug!(%client_id, "event loop stopped after local disconnect"),
    }
}

/// Handle to one live rumqttc connection.
pub struct RumqttClient {
    client: AsyncClient,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
    max_packet_size: usize,
}

#[async_trait]
impl BrokerClient for RumqttClient {
    async fn publish(
        &self,
        topic: &str,
        qos: QualityOfService,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(BrokerError::Refused(format!("invalid publish topic '{topic}'")));
        }
        let size = publish_packet_size(topic, payload.len());
        if size > self.max_packet_size {
            return Err(BrokerError::Refused(format!(
                "packet of {size} bytes exceeds the maximum packet size of {} bytes",
                self.max_packet_size
            )));
        }

        let ack = loop {
            if self.task.is_finished() {
                return Err(BrokerError::Closed);
            }
            match self.shared.submit(&self.client, topic, qos, retain, &payload)? {
                Some(ack) => break ack,
                None => tokio::time::sleep(QUEUE_RETRY_INTERVAL).await,
            }
        };

        ack.await.unwrap_or(Err(BrokerError::Closed))
    }

    fn disconnect(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "disconnect request not queued");
        }
    }
}

impl Drop for RumqttClient {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            self.disconnect();
        }
    }
}
