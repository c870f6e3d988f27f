// SPDX-License-Identifier: Apache-2.0

//! Readers over query results.
//!
//! Data queries return fully materialized result sets that the server cuts
//! off at a fixed row cap. [`ResultSetReader`] records whether that happened
//! and reports it once the returned rows are exhausted. Scan queries have no
//! cap; [`ScanResultReader`] pulls their parts on demand.

use futures::stream::{self, Stream};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{YdbError, YdbResult};
use crate::retry::Validator;
use crate::transport::ScanStream;
use crate::value::{Column, ResultSet, Row};

/// Whether a result set was cut off by the server's row cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationState {
    Complete,
    Truncated { rows: usize },
}

impl TruncationState {
    /// Decide truncation from the row count and the server's flag
    pub fn evaluate(set: &ResultSet, row_limit: usize) -> Self {
        if set.truncated && set.rows.len() >= row_limit {
            TruncationState::Truncated {
                rows: set.rows.len(),
            }
        } else {
            TruncationState::Complete
        }
    }

    pub fn is_truncated(self) -> bool {
        matches!(self, TruncationState::Truncated { .. })
    }
}

/// Cursor over one result set of a data query
#[derive(Debug)]
pub struct ResultSetReader {
    index: usize,
    columns: Vec<Column>,
    rows: Vec<Row>,
    position: usize,
    truncation: TruncationState,
    fail_on_truncated: bool,
}

impl ResultSetReader {
    pub fn new(index: usize, set: ResultSet, row_limit: usize, fail_on_truncated: bool) -> Self {
        let truncation = TruncationState::evaluate(&set, row_limit);
        if let TruncationState::Truncated { rows } = truncation {
            warn!("Result #{} was truncated to {} rows", index, rows);
        }
        Self {
            index,
            columns: set.columns,
            rows: set.rows,
            position: 0,
            truncation,
            fail_on_truncated,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Number of rows returned by the server
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn truncation(&self) -> TruncationState {
        self.truncation
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation.is_truncated()
    }

    /// Next row, `None` at the end of a complete result.
    ///
    /// Reading past the last returned row of a truncated result yields
    /// [`YdbError::ResultTruncated`] when failing on truncation is enabled.
    pub fn next_row(&mut self) -> YdbResult<Option<&Row>> {
        if self.position < self.rows.len() {
            let row = &self.rows[self.position];
            self.position += 1;
            return Ok(Some(row));
        }
        match self.truncation {
            TruncationState::Truncated { rows } if self.fail_on_truncated => {
                Err(YdbError::ResultTruncated {
                    index: self.index,
                    rows,
                })
            }
            _ => Ok(None),
        }
    }

    /// Remaining rows; fails like [`ResultSetReader::next_row`] at the end
    pub fn collect_rows(&mut self) -> YdbResult<Vec<Row>> {
        let mut rows = Vec::with_capacity(self.rows.len().saturating_sub(self.position));
        while let Some(row) = self.next_row()? {
            rows.push(row.clone());
        }
        Ok(rows)
    }

    /// Give up the cursor and return every row the server sent
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Result of a data query: zero or more independently evaluated result sets
#[derive(Debug, Default)]
pub struct QueryResult {
    result_sets: Vec<ResultSetReader>,
}

impl QueryResult {
    pub fn new(sets: Vec<ResultSet>, row_limit: usize, fail_on_truncated: bool) -> Self {
        let result_sets = sets
            .into_iter()
            .enumerate()
            .map(|(index, set)| ResultSetReader::new(index, set, row_limit, fail_on_truncated))
            .collect();
        Self { result_sets }
    }

    pub fn len(&self) -> usize {
        self.result_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result_sets.is_empty()
    }

    pub fn result_set(&mut self, index: usize) -> Option<&mut ResultSetReader> {
        self.result_sets.get_mut(index)
    }

    pub fn result_sets(&self) -> &[ResultSetReader] {
        &self.result_sets
    }

    /// Whether any result set was truncated
    pub fn any_truncated(&self) -> bool {
        self.result_sets.iter().any(ResultSetReader::is_truncated)
    }

    pub fn into_result_sets(self) -> Vec<ResultSetReader> {
        self.result_sets
    }
}

/// Incremental reader over a scan query
pub struct ScanResultReader {
    stream: Box<dyn ScanStream>,
    validator: Validator,
    deadline: Instant,
    columns: Vec<Column>,
    part: std::vec::IntoIter<Row>,
    parts_read: usize,
    rows_read: usize,
    finished: bool,
}

impl ScanResultReader {
    /// Wrap a scan stream; every part must arrive before `deadline`
    pub fn new(stream: Box<dyn ScanStream>, validator: Validator, deadline: Instant) -> Self {
        Self {
            stream,
            deadline,
            validator,
            columns: Vec::new(),
            part: Vec::new().into_iter(),
            parts_read: 0,
            rows_read: 0,
            finished: false,
        }
    }

    /// Columns of the scan, known once the first part arrived
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    pub async fn next_row(&mut self) -> YdbResult<Option<Row>> {
        loop {
            if let Some(row) = self.part.next() {
                self.rows_read += 1;
                return Ok(Some(row));
            }
            if self.finished {
                return Ok(None);
            }

            let next = self
                .validator
                .call_until("Read scan query part", self.deadline, self.stream.next_part())
                .await?;

            match next {
                Some(set) => {
                    self.parts_read += 1;
                    if self.columns.is_empty() {
                        self.columns = set.columns;
                    }
                    self.part = set.rows.into_iter();
                }
                None => {
                    debug!(
                        "Scan query finished: {} row(s) in {} part(s)",
                        self.rows_read, self.parts_read
                    );
                    self.finished = true;
                }
            }
        }
    }

    /// Drain the scan to completion
    pub async fn collect_rows(mut self) -> YdbResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Rows as a stream; the stream ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = YdbResult<Row>> + Send {
        stream::try_unfold(self, |mut reader| async move {
            Ok(reader.next_row().await?.map(|row| (row, reader)))
        })
    }
}

impl std::fmt::Debug for ScanResultReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanResultReader")
            .field("parts_read", &self.parts_read)
            .field("rows_read", &self.rows_read)
            .field("finished", &self.finished)
            .finish()
    }
}
