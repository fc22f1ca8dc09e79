//! Pooled connection entry
//!
//! A `Connection` wraps one `BrokerClient` together with its idle-expiry
//! timer. Everything that touches the client or the timer runs under the
//! entry's own async mutex, so a publish in progress is never torn down
//! underneath its caller.
//!
//! Lifecycle: `Connected → {IdleExpired | Lost | Disconnected}`, all of which
//! are terminal. The connecting phase happens inside the pool before an entry
//! exists, and removal from the pool map is the pool's job: the entry only
//! reports through the eviction channel.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, BrokerError, QualityOfService};
use crate::config::PoolSettings;
use crate::pool::Endpoint;
use crate::utils::{GatewayError, Operation};

/// Teardown requests sent to the pool by timers and connection-lost handlers.
pub(crate) enum Eviction {
    /// The idle timer armed at `generation` fired.
    Expired {
        connection: Arc<Connection>,
        generation: u64,
    },
    /// The transport under `connection_id` dropped.
    Lost {
        endpoint: Endpoint,
        connection_id: u64,
        reason: BrokerError,
    },
    /// `connection_id` was disconnected on request.
    Closed {
        endpoint: Endpoint,
        connection_id: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    IdleExpired,
    Lost,
    Disconnected,
}

struct ConnectionState {
    status: ConnectionStatus,
    /// Bumped on every rearm; a fired timer from an older generation is stale.
    generation: u64,
    idle_timer: Option<JoinHandle<()>>,
}

impl ConnectionState {
    fn cancel_idle_timer(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
    }
}

pub struct Connection {
    id: u64,
    client_id: String,
    endpoint: Endpoint,
    client: Box<dyn BrokerClient>,
    guard: Mutex<ConnectionState>,
    idle_timeout: Duration,
    publish_timeout: Duration,
    qos: QualityOfService,
    evictions: mpsc::UnboundedSender<Eviction>,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        client_id: String,
        endpoint: Endpoint,
        client: Box<dyn BrokerClient>,
        settings: &PoolSettings,
        evictions: mpsc::UnboundedSender<Eviction>,
    ) -> Self {
        Self {
            id,
            client_id,
            endpoint,
            client,
            guard: Mutex::new(ConnectionState {
                status: ConnectionStatus::Connected,
                generation: 0,
                idle_timer: None,
            }),
            idle_timeout: settings.idle_timeout(),
            publish_timeout: settings.publish_timeout(),
            qos: settings.qos(),
            evictions,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.guard.lock().await.status
    }

    /// Arms the first idle timer of a freshly connected entry.
    pub(crate) async fn start_idle_timer(self: &Arc<Self>) {
        let mut state = self.guard.lock().await;
        if state.status == ConnectionStatus::Connected {
            self.rearm_idle_timer(&mut state);
        }
    }

    /// Publishes at the configured QoS with retain off, pushing the idle expiry out first.
    ///
    /// Fails with `ConnectionClosed` if the entry was torn down before the
    /// guard was acquired; the caller may then resolve a fresh entry.
    pub async fn publish(self: &Arc<Self>, topic: &str, payload: Vec<u8>) -> Result<(), GatewayError> {
        let mut state = self.guard.lock().await;
        if state.status != ConnectionStatus::Connected {
            return Err(GatewayError::ConnectionClosed {
                endpoint: self.endpoint.clone(),
            });
        }
        self.rearm_idle_timer(&mut state);

        let publish = self
            .client
            .publish(topic, self.qos, false, payload);
        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => {
                debug!(endpoint = %self.endpoint, topic, connection_id = self.id, "published");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(endpoint = %self.endpoint, topic, error = %e, "publish failed");
                Err(GatewayError::PublishFailure {
                    endpoint: self.endpoint.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(endpoint = %self.endpoint, topic, "publish timed out");
                Err(GatewayError::Timeout {
                    operation: Operation::Publish,
                    endpoint: self.endpoint.clone(),
                    after: self.publish_timeout,
                })
            }
        }
    }

    /// Disconnects without waiting and asks the pool to drop this entry.
    ///
    /// Returns false if the entry had already been torn down.
    pub async fn disconnect(&self) -> bool {
        let mut state = self.guard.lock().await;
        if state.status != ConnectionStatus::Connected {
            return false;
        }
        state.cancel_idle_timer();
        state.status = ConnectionStatus::Disconnected;
        self.client.disconnect();
        drop(state);

        info!(endpoint = %self.endpoint, client_id = %self.client_id, "disconnected");
        let _ = self.evictions.send(Eviction::Closed {
            endpoint: self.endpoint.clone(),
            connection_id: self.id,
        });
        true
    }

    /// Tears the entry down if the timer armed at `generation` is still current.
    pub(crate) async fn expire(&self, generation: u64) -> bool {
        let mut state = self.guard.lock().await;
        if state.status != ConnectionStatus::Connected || state.generation != generation {
            return false;
        }
        state.idle_timer = None;
        state.status = ConnectionStatus::IdleExpired;
        self.client.disconnect();
        true
    }

    /// Marks the entry dead after the transport reported a loss.
    pub(crate) async fn mark_lost(&self) -> bool {
        let mut state = self.guard.lock().await;
        if state.status != ConnectionStatus::Connected {
            return false;
        }
        state.cancel_idle_timer();
        state.status = ConnectionStatus::Lost;
        true
    }

    fn rearm_idle_timer(self: &Arc<Self>, state: &mut ConnectionState) {
        state.cancel_idle_timer();
        state.generation += 1;

        let generation = state.generation;
        let idle_timeout = self.idle_timeout;
        let evictions = self.evictions.clone();
        let connection: Weak<Connection> = Arc::downgrade(self);

        state.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            // an entry nobody holds any more has nothing left to tear down
            if let Some(connection) = connection.upgrade() {
                let _ = evictions.send(Eviction::Expired {
                    connection,
                    generation,
                });
            }
        }));
        debug!(endpoint = %self.endpoint, generation, "idle timer armed");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
