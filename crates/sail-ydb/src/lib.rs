// SPDX-License-Identifier: Apache-2.0

//! YDB connectivity core for Sail.
//!
//! This crate sits between callers issuing YDB queries and the transport
//! library that talks to the cluster. It shares transports and clients
//! between connections with identical settings, turns remote statuses into
//! typed errors with bounded retry, and batches parameter sets into single
//! bulk writes while detecting results cut off by the server's row cap.
//!
//! # Architecture
//!
//! ```text
//! YdbDriver::connect(url, properties)
//!   ↓
//! ConnectionsCache (one Clients bundle per ConnectionIdentity)
//!   ↓
//! Validator::run("Get or create session")
//!   ↓
//! YdbConnection
//!   ├─ BatchedStatement ── execute_batch ──▶ one bulk data query
//!   ├─ execute_query ──▶ QueryResult (truncation aware)
//!   └─ execute_scan_query ──▶ ScanResultReader (no row cap)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use sail_ydb::{ClientFactory, Params, YdbDriver, YdbError};
//!
//! async fn load(factory: Arc<dyn ClientFactory>) -> Result<(), YdbError> {
//!     let driver = YdbDriver::new(factory);
//!     let connection = driver
//!         .connect("jdbc:ydb:localhost:2135/local", &HashMap::new())
//!         .await?;
//!
//!     let mut statement = connection.prepare_batched(
//!         "declare $values as List<Struct<key:Int32,c_Utf8:Utf8>>; \
//!          upsert into unit_2 select * from as_table($values)",
//!     );
//!     for i in 1..=5000 {
//!         statement.set("key", i);
//!         statement.set("c_Utf8", format!("Row#{}", i));
//!         statement.add_to_batch();
//!     }
//!     statement.execute_batch().await?;
//!
//!     let query = "select key, c_Utf8 from unit_2";
//!     let mut result = connection.execute_query(query, Params::new()).await?;
//!     if let Some(set) = result.result_set(0) {
//!         if let Err(e) = set.collect_rows() {
//!             if e.is_truncation() {
//!                 let rows = connection
//!                     .execute_scan_query(query, Params::new())
//!                     .await?
//!                     .collect_rows()
//!                     .await?;
//!                 println!("read {} rows", rows.len());
//!             }
//!         }
//!     }
//!
//!     driver.close().await;
//!     Ok(())
//! }
//! ```

// Re-export commonly used types
pub use batch::{BatchEntry, BatchPhase, BatchedStatement, RowCount};
pub use cache::{Clients, ClientsLease, ConnectionIdentity, ConnectionsCache};
pub use config::{ClientProperties, ConnectionProperties, OperationProperties, YdbConfig};
pub use connection::YdbConnection;
pub use driver::YdbDriver;
pub use error::{YdbError, YdbResult};
pub use reader::{QueryResult, ResultSetReader, ScanResultReader, TruncationState};
pub use retry::{RetryOutcome, Validator};
pub use status::{RemoteResult, Status, StatusCode};
pub use transport::{
    ClientFactory, DataQueryResult, ScanStream, SchemeClient, SchemeEntry, SchemeEntryKind, Session,
    TableClient, Transport, TxControl,
};
pub use value::{Column, Params, ResultSet, Row, Value};

pub mod batch;
pub mod cache;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod reader;
pub mod retry;
pub mod status;
pub mod sync_bridge;
pub mod transport;
pub mod value;

#[cfg(test)]
mod mock;
