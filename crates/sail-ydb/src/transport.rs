// SPDX-License-Identifier: Apache-2.0

//! Interfaces of the underlying YDB transport library.
//!
//! The driver never speaks the wire protocol itself. Everything remote goes
//! through these traits, which a transport implementation provides via a
//! [`ClientFactory`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ClientProperties, ConnectionProperties};
use crate::status::RemoteResult;
use crate::value::{Params, ResultSet};

/// Established gRPC transport to a YDB endpoint
pub trait Transport: Send + Sync {
    fn endpoint(&self) -> &str;

    fn database(&self) -> &str;

    fn close(&self) -> RemoteResult<()>;
}

/// Client for table service operations
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Get a session from the client's pool or create a new one
    async fn create_session(&self, timeout: Duration) -> RemoteResult<Arc<dyn Session>>;

    fn close(&self) -> RemoteResult<()>;
}

/// Transaction a data query runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxControl {
    /// Begin and commit within the query
    AutoCommit,
    /// Begin a transaction and leave it open
    Begin,
    /// Run inside an open transaction
    Continue(String),
}

/// Result sets of a data query and the transaction it left open
#[derive(Debug, Clone, Default)]
pub struct DataQueryResult {
    pub result_sets: Vec<ResultSet>,
    /// `None` once the transaction was committed
    pub tx_id: Option<String>,
}

/// Execution context bound to one logical connection
#[async_trait]
pub trait Session: Send + Sync {
    fn id(&self) -> &str;

    /// Execute a data query; each result set is capped by the server
    async fn execute_data_query(
        &self,
        query: &str,
        params: Params,
        tx: TxControl,
    ) -> RemoteResult<DataQueryResult>;

    async fn commit_transaction(&self, tx_id: &str) -> RemoteResult<()>;

    async fn rollback_transaction(&self, tx_id: &str) -> RemoteResult<()>;

    /// Start a scan query that streams its result in parts
    async fn execute_scan_query(
        &self,
        query: &str,
        params: Params,
    ) -> RemoteResult<Box<dyn ScanStream>>;

    /// Execute a DDL statement
    async fn execute_scheme_query(&self, query: &str) -> RemoteResult<()>;

    async fn close(&self) -> RemoteResult<()>;
}

/// Continuation based stream of scan query result parts
#[async_trait]
pub trait ScanStream: Send {
    /// Next part of the result, `None` once the scan is complete
    async fn next_part(&mut self) -> RemoteResult<Option<ResultSet>>;
}

/// Entry of a scheme directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeEntry {
    pub name: String,
    pub kind: SchemeEntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeEntryKind {
    Directory,
    Table,
    Other,
}

/// Client for scheme (directory) operations
#[async_trait]
pub trait SchemeClient: Send + Sync {
    async fn list_directory(&self, path: &str) -> RemoteResult<Vec<SchemeEntry>>;

    fn close(&self) -> RemoteResult<()>;
}

/// Entry point of a transport implementation
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn open_transport(
        &self,
        connection: &ConnectionProperties,
    ) -> RemoteResult<Arc<dyn Transport>>;

    fn table_client(
        &self,
        transport: Arc<dyn Transport>,
        client: &ClientProperties,
    ) -> RemoteResult<Arc<dyn TableClient>>;

    fn scheme_client(&self, transport: Arc<dyn Transport>) -> RemoteResult<Arc<dyn SchemeClient>>;
}
