//! Broker connection pool
//!
//! The pool maps each `Endpoint` to at most one live `Connection` and is the
//! only component allowed to insert into or remove from that map.
//!
//! Concurrency and usage notes:
//! - Lookups take the read lock and release it before any network I/O; the
//!   entry's own guard serializes access to the broker client.
//! - Creation is double-checked: on a miss the write lock is taken and the
//!   map re-checked before connecting, so concurrent first publishes to one
//!   endpoint produce exactly one connect. The write lock is held for the
//!   (bounded) connect.
//! - Idle timers and connection-lost handlers never touch the map. They send
//!   an `Eviction` to a reaper task that applies it under the same lock
//!   discipline and only removes the entry whose id the event names.

mod connection;
mod endpoint;
mod request;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{BrokerConnector, ConnectOptions, ConnectionLostHandler};
use crate::config::PoolSettings;
use crate::utils::{GatewayError, Operation};

use connection::Eviction;
pub use connection::{Connection, ConnectionStatus};
pub use endpoint::Endpoint;
pub use request::{DEFAULT_HOST, DEFAULT_PORT, PublishRequest};

/// Cheap to clone; all clones share one map.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    connections: RwLock<HashMap<Endpoint, Arc<Connection>>>,
    connector: Arc<dyn BrokerConnector>,
    settings: PoolSettings,
    next_id: AtomicU64,
    evictions: mpsc::UnboundedSender<Eviction>,
}

impl ConnectionPool {
    /// Creates an empty pool and starts its reaper task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(connector: Arc<dyn BrokerConnector>, settings: PoolSettings) -> Self {
        let (evictions, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(PoolInner {
            connections: RwLock::new(HashMap::new()),
            connector,
            settings,
            next_id: AtomicU64::new(0),
            evictions,
        });
        tokio::spawn(run_reaper(Arc::downgrade(&inner), rx));
        Self { inner }
    }

    /// Forwards one request to its broker, connecting first if needed.
    pub async fn publish(&self, request: &PublishRequest) -> Result<(), GatewayError> {
        let topic = request.validate()?;
        let endpoint = request.endpoint();
        let payload = request.payload.as_bytes().to_vec();

        let connection = self.find_or_connect(&endpoint).await?;
        match connection.publish(topic, payload.clone()).await {
            Err(GatewayError::ConnectionClosed { .. }) => {
                // torn down between lookup and guard; resolve once more
                debug!(%endpoint, connection_id = connection.id(), "entry closed, resolving again");
                self.inner
                    .remove_if_current(&endpoint, connection.id())
                    .await;
                let connection = self.find_or_connect(&endpoint).await?;
                connection.publish(topic, payload).await
            }
            result => result,
        }
    }

    /// Removes the entry for `endpoint` from the map, if any.
    ///
    /// Callers already holding the entry keep using it; only later lookups
    /// miss. Removing an absent endpoint is a no-op.
    pub async fn delete(&self, endpoint: &Endpoint) -> bool {
        let removed = self.inner.connections.write().await.remove(endpoint);
        if let Some(connection) = &removed {
            debug!(%endpoint, connection_id = connection.id(), "removed from pool");
        }
        removed.is_some()
    }

    /// Disconnects the live entry for `endpoint` and removes it.
    pub async fn disconnect(&self, endpoint: &Endpoint) -> bool {
        let Some(connection) = self.connection(endpoint).await else {
            return false;
        };
        let disconnected = connection.disconnect().await;
        // the reaper may have applied the Closed event already
        self.inner
            .remove_if_current(endpoint, connection.id())
            .await;
        disconnected
    }

    pub async fn connection(&self, endpoint: &Endpoint) -> Option<Arc<Connection>> {
        self.inner.connections.read().await.get(endpoint).cloned()
    }

    pub async fn contains(&self, endpoint: &Endpoint) -> bool {
        self.inner.connections.read().await.contains_key(endpoint)
    }

    pub async fn len(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Disconnects every live entry and leaves the pool empty.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<Connection>> = {
            let mut connections = self.inner.connections.write().await;
            connections.drain().map(|(_, connection)| connection).collect()
        };
        let count = drained.len();
        join_all(drained.iter().map(|connection| connection.disconnect())).await;
        info!(count, "connection pool shut down");
    }

    async fn find_or_connect(&self, endpoint: &Endpoint) -> Result<Arc<Connection>, GatewayError> {
        let existing = {
            let connections = self.inner.connections.read().await;
            connections.get(endpoint).cloned()
        };
        if let Some(connection) = existing {
            debug!(%endpoint, connection_id = connection.id(), "reusing connection");
            return Ok(connection);
        }

        let mut connections = self.inner.connections.write().await;
        // another caller may have connected between the two locks
        if let Some(connection) = connections.get(endpoint) {
            debug!(%endpoint, connection_id = connection.id(), "connection created concurrently");
            return Ok(connection.clone());
        }

        let connection = self.inner.connect(endpoint).await?;
        connections.insert(endpoint.clone(), connection.clone());
        drop(connections);

        connection.start_idle_timer().await;
        Ok(connection)
    }
}

impl PoolInner {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<Connection>, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client_id = client_id(&self.settings.client_id_prefix);

        let evictions = self.evictions.clone();
        let lost_endpoint = endpoint.clone();
        let on_connection_lost: ConnectionLostHandler = Arc::new(move |reason| {
            let _ = evictions.send(Eviction::Lost {
                endpoint: lost_endpoint.clone(),
                connection_id: id,
                reason,
            });
        });

        let options = ConnectOptions {
            host: endpoint.host().to_string(),
            port: endpoint.port(),
            client_id: client_id.clone(),
            keep_alive: self.settings.keep_alive(),
            auto_reconnect: false,
            credentials: endpoint.credentials().cloned(),
            max_packet_size: self.settings.max_packet_size,
            on_connection_lost,
        };

        info!(%endpoint, %client_id, connection_id = id, "connecting to broker");
        let bound = self.settings.connect_timeout();
        let client = match tokio::time::timeout(bound, self.connector.connect(options)).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                warn!(%endpoint, error = %e, "connect failed");
                return Err(GatewayError::ConnectFailure {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(%endpoint, "connect timed out");
                return Err(GatewayError::Timeout {
                    operation: Operation::Connect,
                    endpoint: endpoint.clone(),
                    after: bound,
                });
            }
        };
        info!(%endpoint, %client_id, connection_id = id, "connected");

        Ok(Arc::new(Connection::new(
            id,
            client_id,
            endpoint.clone(),
            client,
            &self.settings,
            self.evictions.clone(),
        )))
    }

    /// Removes `endpoint` only if it still maps to `connection_id`.
    async fn remove_if_current(&self, endpoint: &Endpoint, connection_id: u64) -> bool {
        let mut connections = self.connections.write().await;
        if connections
            .get(endpoint)
            .is_some_and(|connection| connection.id() == connection_id)
        {
            connections.remove(endpoint);
            true
        } else {
            false
        }
    }

    async fn apply(&self, eviction: Eviction) {
        match eviction {
            Eviction::Expired {
                connection,
                generation,
            } => {
                if connection.expire(generation).await {
                    info!(
                        endpoint = %connection.endpoint(),
                        connection_id = connection.id(),
                        "idle connection expired"
                    );
                    self.remove_if_current(connection.endpoint(), connection.id())
                        .await;
                }
            }
            Eviction::Lost {
                endpoint,
                connection_id,
                reason,
            } => {
                let current = {
                    let connections = self.connections.read().await;
                    connections
                        .get(&endpoint)
                        .filter(|connection| connection.id() == connection_id)
                        .cloned()
                };
                if let Some(connection) = current {
                    connection.mark_lost().await;
                }
                warn!(%endpoint, connection_id, %reason, "evicting lost connection");
                self.remove_if_current(&endpoint, connection_id).await;
            }
            Eviction::Closed {
                endpoint,
                connection_id,
            } => {
                self.remove_if_current(&endpoint, connection_id).await;
            }
        }
    }
}

async fn run_reaper(inner: Weak<PoolInner>, mut evictions: mpsc::UnboundedReceiver<Eviction>) {
    while let Some(eviction) = evictions.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply(eviction).await;
    }
    debug!("connection pool reaper stopped");
}

/// Unique per connection: prefix, creation time and a random suffix.
fn client_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}
