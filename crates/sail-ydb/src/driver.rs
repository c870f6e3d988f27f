// SPDX-License-Identifier: Apache-2.0

//! Driver entry point: turns a URL into a connection with its own session.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{ConnectionIdentity, ConnectionsCache};
use crate::config::YdbConfig;
use crate::connection::YdbConnection;
use crate::error::YdbResult;
use crate::retry::Validator;
use crate::transport::ClientFactory;

/// YDB driver.
///
/// Create one per process at startup and close it at shutdown; every
/// connection it opens shares its [`ConnectionsCache`].
pub struct YdbDriver {
    connections: ConnectionsCache,
}

impl YdbDriver {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            connections: ConnectionsCache::new(factory),
        }
    }

    pub fn accepts_url(url: &str) -> bool {
        YdbConfig::accepts_url(url)
    }

    pub fn connections_cache(&self) -> &ConnectionsCache {
        &self.connections
    }

    /// Open a connection: acquire a client bundle, then a session
    pub async fn connect(
        &self,
        url: &str,
        properties: &HashMap<String, String>,
    ) -> YdbResult<YdbConnection> {
        let parsed = YdbConfig::parse_url(url, properties)?;
        let address = parsed.address();
        // Property values may hold secrets, log keys only
        info!(
            "About to connect to [{}] using properties {:?}",
            address,
            parsed.properties.keys().collect::<Vec<_>>()
        );

        let config = YdbConfig::from_parsed(&parsed)?;
        config.validate()?;
        let identity = ConnectionIdentity::new(address, parsed.properties);

        let lease = self.connections.acquire(&identity, &config).await?;

        let operation = &config.operation;
        let session_timeout = operation.session_timeout();
        let table_client = lease.clients().table_client().clone();
        let session = Validator::from_properties(operation)
            .run("Get or create session", || {
                table_client.create_session(session_timeout)
            })
            .await;

        let session = match session {
            Ok(session) => session,
            Err(e) => {
                lease.release();
                return Err(e);
            }
        };
        debug!("Obtained session {}", session.id());

        Ok(YdbConnection::new(
            lease,
            session,
            config.operation.clone(),
            url,
            config.connection.database.clone(),
        ))
    }

    /// Close every cached bundle
    pub async fn close(&self) {
        self.connections.close().await;
    }
}

impl std::fmt::Debug for YdbDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YdbDriver").finish_non_exhaustive()
    }
}
