// SPDX-License-Identifier: Apache-2.0

//! Client-side accumulation of parameter sets flushed as one bulk write.
//!
//! A batched statement declares a single list-of-struct parameter (by
//! default `$values`). Every queued parameter set becomes one struct of that
//! list, so a flush of N entries is one remote call.
//!
//! ```text
//!          bind                add_to_batch              execute_batch
//! Idle ──────────▶ Pending ──────────────────▶ Queued ─────────────────▶ Idle
//!                     │  clear_parameters       │  clear_batch
//!                     └──────────▶ Idle          └──────────▶ Idle
//! ```

use std::mem;

use tracing::debug;

use crate::connection::YdbConnection;
use crate::error::{YdbError, YdbResult};
use crate::reader::QueryResult;
use crate::value::{Params, Value};

/// Frozen parameter set waiting in the batch queue
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry(Params);

impl BatchEntry {
    pub fn params(&self) -> &Params {
        &self.0
    }
}

/// Row count reported for one flushed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    /// The statement succeeded but the store does not report affected rows
    Unknown,
    Known(u64),
}

/// Observable phase of a batched statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Pending,
    Queued,
}

#[derive(Debug, Default)]
enum BatchState {
    #[default]
    Idle,
    Pending {
        bindings: Params,
    },
    /// At least one entry queued; `bindings` may be empty
    Queued {
        entries: Vec<BatchEntry>,
        bindings: Params,
    },
}

/// Statement that accumulates parameter sets and flushes them in bulk
#[derive(Debug)]
pub struct BatchedStatement<'c> {
    connection: &'c YdbConnection,
    query: String,
    state: BatchState,
}

impl<'c> BatchedStatement<'c> {
    pub(crate) fn new(connection: &'c YdbConnection, query: String) -> Self {
        Self {
            connection,
            query,
            state: BatchState::Idle,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn phase(&self) -> BatchPhase {
        match &self.state {
            BatchState::Idle => BatchPhase::Idle,
            BatchState::Pending { .. } => BatchPhase::Pending,
            BatchState::Queued { .. } => BatchPhase::Queued,
        }
    }

    /// Number of queued entries
    pub fn batch_len(&self) -> usize {
        match &self.state {
            BatchState::Queued { entries, .. } => entries.len(),
            _ => 0,
        }
    }

    /// Currently bound, not yet queued parameters
    pub fn bindings(&self) -> Option<&Params> {
        match &self.state {
            BatchState::Idle => None,
            BatchState::Pending { bindings } | BatchState::Queued { bindings, .. } => {
                Some(bindings)
            }
        }
    }

    /// Bind `value` to `name`, replacing an earlier binding of the same name
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.state = match mem::take(&mut self.state) {
            BatchState::Idle => {
                let mut bindings = Params::new();
                bindings.set(name, value);
                BatchState::Pending { bindings }
            }
            BatchState::Pending { mut bindings } => {
                bindings.set(name, value);
                BatchState::Pending { bindings }
            }
            BatchState::Queued {
                entries,
                mut bindings,
            } => {
                bindings.set(name, value);
                BatchState::Queued { entries, bindings }
            }
        };
    }

    /// Queue a snapshot of the current bindings and clear them.
    ///
    /// With nothing bound an empty entry is queued; missing members are
    /// reported by the store when the batch is flushed.
    pub fn add_to_batch(&mut self) {
        self.state = match mem::take(&mut self.state) {
            BatchState::Idle => BatchState::Queued {
                entries: vec![BatchEntry(Params::new())],
                bindings: Params::new(),
            },
            BatchState::Pending { bindings } => BatchState::Queued {
                entries: vec![BatchEntry(bindings)],
                bindings: Params::new(),
            },
            BatchState::Queued {
                mut entries,
                bindings,
            } => {
                entries.push(BatchEntry(bindings));
                BatchState::Queued {
                    entries,
                    bindings: Params::new(),
                }
            }
        };
    }

    /// Drop pending bindings, keeping queued entries
    pub fn clear_parameters(&mut self) {
        self.state = match mem::take(&mut self.state) {
            BatchState::Idle | BatchState::Pending { .. } => BatchState::Idle,
            BatchState::Queued { entries, .. } => BatchState::Queued {
                entries,
                bindings: Params::new(),
            },
        };
    }

    /// Drop queued entries and pending bindings without executing them
    pub fn clear_batch(&mut self) {
        self.state = BatchState::Idle;
    }

    /// Execute once with the current bindings as a single row.
    ///
    /// The batch queue is left untouched and the bindings are not queued.
    pub async fn execute(&mut self) -> YdbResult<QueryResult> {
        let rows = match self.bindings() {
            Some(bindings) if !bindings.is_empty() => vec![bindings.clone().into_struct()],
            _ => vec![],
        };
        self.send("Execute data query", rows).await
    }

    /// Like [`BatchedStatement::execute`] but the statement must return data
    pub async fn execute_query(&mut self) -> YdbResult<QueryResult> {
        let result = self.execute().await?;
        if result.is_empty() {
            return Err(YdbError::Misuse("Query must return ResultSet".to_string()));
        }
        Ok(result)
    }

    /// Flush the queue as one bulk write.
    ///
    /// An empty queue returns immediately without a remote call. Pending
    /// bindings that were never queued are dropped. On failure the queue is
    /// kept so the flush can be repeated.
    pub async fn execute_batch(&mut self) -> YdbResult<Vec<RowCount>> {
        let rows = match &self.state {
            BatchState::Queued { entries, .. } if !entries.is_empty() => entries
                .iter()
                .map(|entry| entry.params().clone().into_struct())
                .collect::<Vec<_>>(),
            _ => {
                self.state = BatchState::Idle;
                return Ok(vec![]);
            }
        };

        let count = rows.len();
        debug!("Flushing batch of {} row(s)", count);
        self.send("Execute batch", rows).await?;

        self.state = BatchState::Idle;
        Ok(vec![RowCount::Unknown; count])
    }

    async fn send(&self, description: &str, rows: Vec<Value>) -> YdbResult<QueryResult> {
        let connection = self.connection;
        let mut params = Params::new();
        params.set(
            &connection.operation_properties().batch_parameter,
            Value::List(rows),
        );
        connection
            .execute_data(description, &self.query, params)
            .await
    }
}
