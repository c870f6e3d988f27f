// SPDX-License-Identifier: Apache-2.0

//! Shared transport and client bundles, keyed by connection identity.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_once_cell::OnceCell;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::YdbConfig;
use crate::error::{YdbError, YdbResult};
use crate::transport::{ClientFactory, SchemeClient, TableClient, Transport};

/// Cache key: normalized address plus every connection property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    address: String,
    properties: BTreeMap<String, String>,
}

impl ConnectionIdentity {
    pub fn new(address: impl Into<String>, properties: BTreeMap<String, String>) -> Self {
        Self {
            address: address.into(),
            properties,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Transport, table client and lazily built scheme client of one endpoint
pub struct Clients {
    transport: Arc<dyn Transport>,
    table_client: Arc<dyn TableClient>,
    scheme_client: OnceCell<Arc<dyn SchemeClient>>,
    factory: Arc<dyn ClientFactory>,
    closed: AtomicBool,
}

impl Clients {
    /// Open the transport and build the table client.
    ///
    /// If the table client cannot be built the transport is closed before
    /// the error is returned.
    pub async fn build(factory: Arc<dyn ClientFactory>, config: &YdbConfig) -> YdbResult<Self> {
        let transport = factory
            .open_transport(&config.connection)
            .await
            .map_err(|status| YdbError::Construction {
                resource: "transport",
                status,
            })?;

        let table_client = match factory.table_client(transport.clone(), &config.client) {
            Ok(client) => client,
            Err(status) => {
                if let Err(e) = transport.close() {
                    error!("Unable to close transport after failed construction: {}", e);
                }
                return Err(YdbError::Construction {
                    resource: "table client",
                    status,
                });
            }
        };

        Ok(Self {
            transport,
            table_client,
            scheme_client: OnceCell::new(),
            factory,
            closed: AtomicBool::new(false),
        })
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn table_client(&self) -> &Arc<dyn TableClient> {
        &self.table_client
    }

    /// Scheme client, built once on first access
    pub async fn scheme_client(&self) -> YdbResult<&Arc<dyn SchemeClient>> {
        self.scheme_client
            .get_or_try_init(async {
                debug!("Creating scheme client for {}", self.transport.endpoint());
                self.factory
                    .scheme_client(self.transport.clone())
                    .map_err(|status| YdbError::Construction {
                        resource: "scheme client",
                        status,
                    })
            })
            .await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every client and the transport; later calls do nothing
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Closing clients for {}", self.transport.endpoint());

        if let Some(scheme_client) = self.scheme_client.get() {
            if let Err(e) = scheme_client.close() {
                error!("Unable to close scheme client: {}", e);
            }
        }
        if let Err(e) = self.table_client.close() {
            error!("Unable to close table client: {}", e);
        }
        if let Err(e) = self.transport.close() {
            error!("Unable to close transport: {}", e);
        }
    }
}

impl Drop for Clients {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients")
            .field("endpoint", &self.transport.endpoint())
            .field("database", &self.transport.database())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Bundle handed to a connection
#[derive(Debug, Clone)]
pub enum ClientsLease {
    /// Owned by the cache and shared with every equal identity
    Shared(Arc<Clients>),
    /// Built for one connection only; closed when that connection closes
    Private(Arc<Clients>),
}

impl ClientsLease {
    pub fn clients(&self) -> &Arc<Clients> {
        match self {
            ClientsLease::Shared(clients) | ClientsLease::Private(clients) => clients,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, ClientsLease::Shared(_))
    }

    /// Close the bundle if this lease owns it
    pub fn release(&self) {
        if let ClientsLease::Private(clients) = self {
            clients.close();
        }
    }
}

/// Process scoped cache of client bundles.
///
/// Every operation holds the whole-cache lock, so concurrent acquirers of an
/// unseen identity build exactly one bundle.
pub struct ConnectionsCache {
    factory: Arc<dyn ClientFactory>,
    cache: Mutex<HashMap<ConnectionIdentity, Arc<Clients>>>,
}

impl ConnectionsCache {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Get the bundle for `identity`, building it if needed
    pub async fn acquire(
        &self,
        identity: &ConnectionIdentity,
        config: &YdbConfig,
    ) -> YdbResult<ClientsLease> {
        let mut cache = self.cache.lock().await;
        let connection = &config.connection;

        if config.operation.cache_connections_in_driver {
            if let Some(clients) = cache.get(identity) {
                debug!(
                    "Reusing YDB connection to {}{}",
                    connection.endpoint, connection.database
                );
                return Ok(ClientsLease::Shared(clients.clone()));
            }
        }

        info!(
            "Creating new YDB connection to {}{}{}",
            connection.endpoint,
            connection.database,
            if connection.has_auth() {
                " with auth"
            } else {
                " without auth"
            }
        );
        let clients = Arc::new(Clients::build(self.factory.clone(), config).await?);

        if config.operation.cache_connections_in_driver {
            cache.insert(identity.clone(), clients.clone());
            Ok(ClientsLease::Shared(clients))
        } else {
            Ok(ClientsLease::Private(clients))
        }
    }

    /// Number of cached bundles
    pub async fn size(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Close and forget every cached bundle
    pub async fn close(&self) {
        let mut cache = self.cache.lock().await;
        info!("Closing {} cached connection(s)...", cache.len());
        for (_, clients) in cache.drain() {
            clients.close();
        }
    }
}

impl std::fmt::Debug for ConnectionsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionsCache").finish_non_exhaustive()
    }
}
