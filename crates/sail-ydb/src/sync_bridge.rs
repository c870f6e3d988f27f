// SPDX-License-Identifier: Apache-2.0

//! Blocking wrappers for callers outside of async code.
//!
//! Each call blocks the current thread until the store answers or the
//! operation's retry budget and deadline run out. Calls made from a task of
//! a current-thread runtime cannot block and fail with
//! [`YdbError::Misuse`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Handle, RuntimeFlavor};

use crate::batch::{BatchPhase, BatchedStatement, RowCount};
use crate::connection::YdbConnection;
use crate::driver::YdbDriver;
use crate::error::{YdbError, YdbResult};
use crate::reader::QueryResult;
use crate::value::{Params, Row, Value};

pub fn block_on_ydb<F: Future>(rt: &Handle, f: F) -> YdbResult<F::Output> {
    match Handle::try_current() {
        Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            Err(YdbError::Misuse(
                "Blocking YDB calls are not allowed on a current-thread runtime".to_string(),
            ))
        }
        Ok(_) => Ok(tokio::task::block_in_place(|| rt.block_on(f))),
        Err(_) => Ok(rt.block_on(f)),
    }
}

pub struct YdbDriverSync {
    inner: Arc<YdbDriver>,
    rt: Handle,
}

impl YdbDriverSync {
    pub fn new(inner: Arc<YdbDriver>, rt: Handle) -> Self {
        Self { inner, rt }
    }

    pub fn driver(&self) -> &Arc<YdbDriver> {
        &self.inner
    }

    pub fn connect(
        &self,
        url: &str,
        properties: &HashMap<String, String>,
    ) -> YdbResult<YdbConnectionSync> {
        let inner = block_on_ydb(&self.rt, self.inner.connect(url, properties))??;
        Ok(YdbConnectionSync {
            inner,
            rt: self.rt.clone(),
        })
    }

    pub fn connection_count(&self) -> YdbResult<usize> {
        block_on_ydb(&self.rt, self.inner.connections_cache().size())
    }

    pub fn close(&self) -> YdbResult<()> {
        block_on_ydb(&self.rt, self.inner.close())
    }
}

pub struct YdbConnectionSync {
    inner: YdbConnection,
    rt: Handle,
}

impl YdbConnectionSync {
    pub fn connection(&self) -> &YdbConnection {
        &self.inner
    }

    pub fn execute_query(&self, query: &str, params: Params) -> YdbResult<QueryResult> {
        block_on_ydb(&self.rt, self.inner.execute_query(query, params))?
    }

    /// Run a scan query and drain it completely
    pub fn execute_scan_query(&self, query: &str, params: Params) -> YdbResult<Vec<Row>> {
        block_on_ydb(&self.rt, async {
            self.inner
                .execute_scan_query(query, params)
                .await?
                .collect_rows()
                .await
        })?
    }

    pub fn execute_scheme_query(&self, query: &str) -> YdbResult<()> {
        block_on_ydb(&self.rt, self.inner.execute_scheme_query(query))?
    }

    pub fn tx_id(&self) -> YdbResult<Option<String>> {
        block_on_ydb(&self.rt, self.inner.tx_id())
    }

    pub fn set_auto_commit(&mut self, auto_commit: bool) -> YdbResult<()> {
        block_on_ydb(&self.rt, self.inner.set_auto_commit(auto_commit))?
    }

    pub fn commit(&self) -> YdbResult<()> {
        block_on_ydb(&self.rt, self.inner.commit())?
    }

    pub fn rollback(&self) -> YdbResult<()> {
        block_on_ydb(&self.rt, self.inner.rollback())?
    }

    pub fn prepare_batched(&self, query: impl Into<String>) -> BatchedStatementSync<'_> {
        BatchedStatementSync {
            inner: self.inner.prepare_batched(query),
            rt: &self.rt,
        }
    }

    pub fn close(&mut self) -> YdbResult<()> {
        block_on_ydb(&self.rt, self.inner.close())?
    }
}

pub struct BatchedStatementSync<'c> {
    inner: BatchedStatement<'c>,
    rt: &'c Handle,
}

impl BatchedStatementSync<'_> {
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.inner.set(name, value);
    }

    pub fn add_to_batch(&mut self) {
        self.inner.add_to_batch();
    }

    pub fn clear_parameters(&mut self) {
        self.inner.clear_parameters();
    }

    pub fn clear_batch(&mut self) {
        self.inner.clear_batch();
    }

    pub fn phase(&self) -> BatchPhase {
        self.inner.phase()
    }

    pub fn execute(&mut self) -> YdbResult<QueryResult> {
        block_on_ydb(self.rt, self.inner.execute())?
    }

    pub fn execute_batch(&mut self) -> YdbResult<Vec<RowCount>> {
        block_on_ydb(self.rt, self.inner.execute_batch())?
    }
}
