// SPDX-License-Identifier: Apache-2.0

//! Connection bound to one session on a shared or private client bundle.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::batch::BatchedStatement;
use crate::cache::ClientsLease;
use crate::config::OperationProperties;
use crate::error::{YdbError, YdbResult};
use crate::reader::{QueryResult, ScanResultReader};
use crate::retry::Validator;
use crate::transport::{SchemeClient, SchemeEntry, Session, TxControl};
use crate::value::Params;

/// Logical connection to a YDB database.
///
/// Owns its session exclusively; not meant to be used from two tasks at once.
pub struct YdbConnection {
    clients: ClientsLease,
    session: Arc<dyn Session>,
    validator: Validator,
    properties: OperationProperties,
    url: String,
    database: String,
    auto_commit: bool,
    tx_id: Mutex<Option<String>>,
    closed: bool,
}

impl YdbConnection {
    pub fn new(
        clients: ClientsLease,
        session: Arc<dyn Session>,
        properties: OperationProperties,
        url: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            clients,
            session,
            validator: Validator::from_properties(&properties),
            auto_commit: properties.auto_commit,
            properties,
            url: url.into(),
            database: database.into(),
            tx_id: Mutex::new(None),
            closed: false,
        }
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn clients(&self) -> &ClientsLease {
        &self.clients
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn operation_properties(&self) -> &OperationProperties {
        &self.properties
    }

    /// URL the connection was opened with
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Id of the open transaction, if any
    pub async fn tx_id(&self) -> Option<String> {
        self.tx_id.lock().await.clone()
    }

    /// Switch auto-commit; enabling it commits the open transaction first
    pub async fn set_auto_commit(&mut self, auto_commit: bool) -> YdbResult<()> {
        self.ensure_open()?;
        if auto_commit && !self.auto_commit {
            self.commit().await?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    /// Commit the open transaction; without one no remote call is made
    pub async fn commit(&self) -> YdbResult<()> {
        self.ensure_open()?;
        let Some(tx_id) = self.tx_id.lock().await.take() else {
            return Ok(());
        };
        debug!("Committing transaction {}", tx_id);
        self.validator
            .call("Commit transaction", self.session.commit_transaction(&tx_id))
            .await
    }

    /// Roll back the open transaction; without one no remote call is made
    pub async fn rollback(&self) -> YdbResult<()> {
        self.ensure_open()?;
        let Some(tx_id) = self.tx_id.lock().await.take() else {
            return Ok(());
        };
        debug!("Rolling back transaction {}", tx_id);
        self.validator
            .call("Rollback transaction", self.session.rollback_transaction(&tx_id))
            .await
    }

    /// Scheme client of the bundle, built on first access
    pub async fn scheme_client(&self) -> YdbResult<Arc<dyn SchemeClient>> {
        self.ensure_open()?;
        self.clients.clients().scheme_client().await.cloned()
    }

    /// List a directory of the database through the scheme client
    pub async fn list_directory(&self, path: &str) -> YdbResult<Vec<SchemeEntry>> {
        let scheme = self.scheme_client().await?;
        self.validator
            .call("List directory", scheme.list_directory(path))
            .await
    }

    /// Prepare a statement whose rows are sent as the batch list parameter
    pub fn prepare_batched(&self, query: impl Into<String>) -> BatchedStatement<'_> {
        BatchedStatement::new(self, query.into())
    }

    /// Execute a data query; results are capped by the server
    pub async fn execute_query(&self, query: &str, params: Params) -> YdbResult<QueryResult> {
        self.execute_data("Execute data query", query, params).await
    }

    /// Run a data query in the connection's transaction mode
    pub(crate) async fn execute_data(
        &self,
        description: &str,
        query: &str,
        params: Params,
    ) -> YdbResult<QueryResult> {
        self.ensure_open()?;
        let mut tx_id = self.tx_id.lock().await;
        let tx = match (self.auto_commit, tx_id.as_ref()) {
            (true, _) => TxControl::AutoCommit,
            (false, None) => TxControl::Begin,
            (false, Some(id)) => TxControl::Continue(id.clone()),
        };

        let result = self
            .validator
            .call(description, self.session.execute_data_query(query, params, tx))
            .await;
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                if let Some(id) = tx_id.take() {
                    warn!("Transaction {} ended by failed query", id);
                }
                return Err(e);
            }
        };
        if !self.auto_commit {
            *tx_id = result.tx_id;
        }

        Ok(QueryResult::new(
            result.result_sets,
            self.properties.result_row_limit,
            self.properties.fail_on_truncated_result,
        ))
    }

    /// Execute a scan query that reads the complete result in parts.
    ///
    /// Starting the scan and reading every part share one deadline.
    pub async fn execute_scan_query(
        &self,
        query: &str,
        params: Params,
    ) -> YdbResult<ScanResultReader> {
        self.ensure_open()?;
        let deadline = Instant::now() + self.properties.scan_query_timeout();
        let stream = self
            .validator
            .call_until(
                "Execute scan query",
                deadline,
                self.session.execute_scan_query(query, params),
            )
            .await?;
        Ok(ScanResultReader::new(stream, self.validator, deadline))
    }

    /// Execute a DDL statement
    pub async fn execute_scheme_query(&self, query: &str) -> YdbResult<()> {
        self.ensure_open()?;
        self.validator
            .call(
                "Execute scheme query",
                self.session.execute_scheme_query(query),
            )
            .await
    }

    /// Release the session and, for a private bundle, the bundle itself
    pub async fn close(&mut self) -> YdbResult<()> {
        if self.closed {
            return Ok(());
        }
        if let Err(e) = self.rollback().await {
            warn!("Unable to roll back open transaction: {}", e);
        }
        self.closed = true;
        info!("Closing YDB connection to {}", self.database);

        let result = self
            .validator
            .call("Close session", self.session.close())
            .await;
        if let Err(e) = &result {
            debug!("Session {} did not close cleanly: {}", self.session.id(), e);
        }
        self.clients.release();
        result
    }

    pub(crate) fn ensure_open(&self) -> YdbResult<()> {
        if self.closed {
            return Err(YdbError::Misuse("Connection is closed".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for YdbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YdbConnection")
            .field("database", &self.database)
            .field("session", &self.session.id())
            .field("shared_clients", &self.clients.is_shared())
            .field("auto_commit", &self.auto_commit)
            .field("closed", &self.closed)
            .finish()
    }
}
