// SPDX-License-Identifier: Apache-2.0

//! In-memory store implementing the transport interfaces for tests.
//!
//! Understands just enough query text to be useful: statements starting with
//! `upsert` store the structs of every list parameter (keyed by their first
//! member), `select` statements return the stored rows (honouring an optional
//! `limit N`), and `;` separates statements that each produce a result set.
//! Open transactions work on a private copy of the rows that replaces the
//! committed rows on commit.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ClientProperties, ConnectionProperties};
use crate::status::{RemoteResult, Status, StatusCode};
use crate::transport::{
    ClientFactory, DataQueryResult, ScanStream, SchemeClient, SchemeEntry, SchemeEntryKind, Session,
    TableClient, Transport, TxControl,
};
use crate::value::{Column, Params, ResultSet, Row, Value};

#[derive(Debug, Clone, Default)]
pub struct MockStats {
    pub transports_opened: usize,
    pub transports_closed: usize,
    pub table_clients_built: usize,
    pub table_clients_closed: usize,
    pub scheme_clients_built: usize,
    pub sessions_created: usize,
    pub sessions_closed: usize,
    pub session_attempts: usize,
    pub data_queries: usize,
    pub scan_queries: usize,
    pub scheme_queries: usize,
    /// Rows carried by the most recent data query
    pub last_rows_sent: usize,
    pub transactions_begun: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

type StoredRow = Vec<(String, Value)>;

struct State {
    stats: MockStats,
    rows: Vec<StoredRow>,
    transactions: HashMap<String, Vec<StoredRow>>,
    row_cap: usize,
    scan_part_size: usize,
    scan_start_delay: Duration,
    scan_part_delay: Duration,
    required_columns: Vec<String>,
    open_delay: Duration,
    table_client_failure: Option<StatusCode>,
    transport_close_failure: Option<StatusCode>,
    session_failures: VecDeque<StatusCode>,
    data_query_failures: VecDeque<StatusCode>,
    sent: Vec<Params>,
}

/// Shared handle to the in-memory store
#[derive(Clone)]
pub struct MockStore {
    state: Arc<Mutex<State>>,
    sessions: Arc<AtomicUsize>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                stats: MockStats::default(),
                rows: Vec::new(),
                transactions: HashMap::new(),
                row_cap: 1000,
                scan_part_size: 250,
                scan_start_delay: Duration::ZERO,
                scan_part_delay: Duration::ZERO,
                required_columns: Vec::new(),
                open_delay: Duration::ZERO,
                table_client_failure: None,
                transport_close_failure: None,
                session_failures: VecDeque::new(),
                data_query_failures: VecDeque::new(),
                sent: Vec::new(),
            })),
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn factory(&self) -> Arc<dyn ClientFactory> {
        Arc::new(MockFactory {
            store: self.clone(),
        })
    }

    pub fn stats(&self) -> MockStats {
        self.state().stats.clone()
    }

    /// Parameters of every data query, in order
    pub fn sent(&self) -> Vec<Params> {
        self.state().sent.clone()
    }

    pub fn row_count(&self) -> usize {
        self.state().rows.len()
    }

    pub fn set_open_delay(&self, delay: Duration) {
        self.state().open_delay = delay;
    }

    pub fn set_row_cap(&self, cap: usize) {
        self.state().row_cap = cap;
    }

    pub fn set_scan_part_size(&self, size: usize) {
        self.state().scan_part_size = size;
    }

    /// Delay before a scan query returns its stream
    pub fn set_scan_start_delay(&self, delay: Duration) {
        self.state().scan_start_delay = delay;
    }

    /// Delay before every scan part
    pub fn set_scan_part_delay(&self, delay: Duration) {
        self.state().scan_part_delay = delay;
    }

    /// Number of transactions neither committed nor rolled back
    pub fn open_transactions(&self) -> usize {
        self.state().transactions.len()
    }

    pub fn set_required_columns(&self, columns: &[&str]) {
        self.state().required_columns = columns.iter().map(|c| c.to_string()).collect();
    }

    pub fn fail_table_client(&self, code: StatusCode) {
        self.state().table_client_failure = Some(code);
    }

    pub fn clear_table_client_failure(&self) {
        self.state().table_client_failure = None;
    }

    pub fn fail_transport_close(&self, code: StatusCode) {
        self.state().transport_close_failure = Some(code);
    }

    pub fn fail_sessions(&self, codes: &[StatusCode]) {
        self.state().session_failures.extend(codes.iter().copied());
    }

    pub fn fail_data_queries(&self, codes: &[StatusCode]) {
        self.state().data_query_failures.extend(codes.iter().copied());
    }

    /// Insert `count` rows `(key: i, c_Utf8: "Row#i")` for i in 1..=count
    pub fn seed_rows(&self, count: usize) {
        let mut state = self.state();
        for i in 1..=count {
            state.rows.push(vec![
                ("key".to_string(), Value::Int32(i as i32)),
                ("c_Utf8".to_string(), Value::Utf8(format!("Row#{}", i))),
            ]);
        }
    }

    fn execute(&self, query: &str, params: Params, tx: TxControl) -> RemoteResult<DataQueryResult> {
        let mut state = self.state();
        state.stats.data_queries += 1;
        state.stats.last_rows_sent = params
            .iter()
            .map(|(_, v)| match v {
                Value::List(items) => items.len(),
                _ => 0,
            })
            .sum();
        state.sent.push(params.clone());

        if let Some(code) = state.data_query_failures.pop_front() {
            if let TxControl::Continue(id) = &tx {
                state.transactions.remove(id);
            }
            return Err(Status::new(code));
        }

        let tx_id = match tx {
            TxControl::AutoCommit => None,
            TxControl::Begin => {
                state.stats.transactions_begun += 1;
                let id = format!("tx-{}", state.stats.transactions_begun);
                let snapshot = state.rows.clone();
                state.transactions.insert(id.clone(), snapshot);
                Some(id)
            }
            TxControl::Continue(id) => {
                if !state.transactions.contains_key(&id) {
                    return Err(Status::with_issue(
                        StatusCode::NotFound,
                        format!("Transaction not found: {}", id),
                    ));
                }
                Some(id)
            }
        };

        let mut rows = match &tx_id {
            Some(id) => state.transactions.get(id).cloned().unwrap_or_default(),
            None => state.rows.clone(),
        };
        let result_sets = match run_statements(&state, &mut rows, query, &params) {
            Ok(result_sets) => result_sets,
            Err(status) => {
                if let Some(id) = &tx_id {
                    state.transactions.remove(id);
                }
                return Err(status);
            }
        };
        match &tx_id {
            Some(id) => {
                state.transactions.insert(id.clone(), rows);
            }
            None => state.rows = rows,
        }
        Ok(DataQueryResult { result_sets, tx_id })
    }

    fn end_transaction(&self, tx_id: &str, commit: bool) -> RemoteResult<()> {
        let mut state = self.state();
        let Some(rows) = state.transactions.remove(tx_id) else {
            return Err(Status::with_issue(
                StatusCode::NotFound,
                format!("Transaction not found: {}", tx_id),
            ));
        };
        if commit {
            state.stats.commits += 1;
            state.rows = rows;
        } else {
            state.stats.rollbacks += 1;
        }
        Ok(())
    }
}

fn run_statements(
    state: &State,
    rows: &mut Vec<StoredRow>,
    query: &str,
    params: &Params,
) -> RemoteResult<Vec<ResultSet>> {
    let mut results = Vec::new();
    for statement in query.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let lower = statement.to_ascii_lowercase();
        if lower.starts_with("upsert") {
            upsert(rows, &state.required_columns, params)?;
        } else if lower.starts_with("select") {
            let selected = select(rows, limit_of(&lower));
            let truncated = selected.len() > state.row_cap;
            let mut set = to_result_set(selected.into_iter().take(state.row_cap).collect());
            set.truncated = truncated;
            results.push(set);
        }
    }
    Ok(results)
}

fn upsert(rows: &mut Vec<StoredRow>, required_columns: &[String], params: &Params) -> RemoteResult<()> {
    for (_, value) in params.iter() {
        let Value::List(items) = value else { continue };
        for item in items {
            let Value::Struct(members) = item else {
                return Err(Status::with_issue(StatusCode::BadRequest, "expected struct"));
            };
            for required in required_columns {
                if !members.iter().any(|(n, _)| n == required) {
                    return Err(Status::with_issue(
                        StatusCode::BadRequest,
                        format!("Missing member: {}", required),
                    ));
                }
            }
            let key = members.first().map(|(_, v)| v.clone());
            match rows
                .iter_mut()
                .find(|row| row.first().map(|(_, v)| v.clone()) == key)
            {
                Some(row) => *row = members.clone(),
                None => rows.push(members.clone()),
            }
        }
    }
    Ok(())
}

fn limit_of(statement: &str) -> Option<usize> {
    let mut words = statement.split_whitespace();
    while let Some(word) = words.next() {
        if word == "limit" {
            return words.next().and_then(|n| n.parse().ok());
        }
    }
    None
}

fn select(rows: &[StoredRow], limit: Option<usize>) -> Vec<StoredRow> {
    rows.iter()
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

fn to_result_set(rows: Vec<StoredRow>) -> ResultSet {
    let columns = rows
        .first()
        .map(|row| {
            row.iter()
                .map(|(name, _)| Column::new(name.clone(), "Utf8"))
                .collect()
        })
        .unwrap_or_default();
    let rows: Vec<Row> = rows
        .into_iter()
        .map(|row| row.into_iter().map(|(_, v)| v).collect())
        .collect();
    ResultSet::new(columns, rows)
}

struct MockFactory {
    store: MockStore,
}

#[async_trait]
impl ClientFactory for MockFactory {
    async fn open_transport(
        &self,
        connection: &ConnectionProperties,
    ) -> RemoteResult<Arc<dyn Transport>> {
        let delay = self.store.state().open_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.store.state().stats.transports_opened += 1;
        Ok(Arc::new(MockTransport {
            store: self.store.clone(),
            endpoint: connection.endpoint.clone(),
            database: connection.database.clone(),
        }))
    }

    fn table_client(
        &self,
        _transport: Arc<dyn Transport>,
        _client: &ClientProperties,
    ) -> RemoteResult<Arc<dyn TableClient>> {
        let mut state = self.store.state();
        if let Some(code) = state.table_client_failure {
            return Err(Status::new(code));
        }
        state.stats.table_clients_built += 1;
        Ok(Arc::new(MockTableClient {
            store: self.store.clone(),
        }))
    }

    fn scheme_client(&self, _transport: Arc<dyn Transport>) -> RemoteResult<Arc<dyn SchemeClient>> {
        self.store.state().stats.scheme_clients_built += 1;
        Ok(Arc::new(MockSchemeClient))
    }
}

struct MockTransport {
    store: MockStore,
    endpoint: String,
    database: String,
}

impl Transport for MockTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn close(&self) -> RemoteResult<()> {
        let mut state = self.store.state();
        state.stats.transports_closed += 1;
        match state.transport_close_failure {
            Some(code) => Err(Status::new(code)),
            None => Ok(()),
        }
    }
}

struct MockTableClient {
    store: MockStore,
}

#[async_trait]
impl TableClient for MockTableClient {
    async fn create_session(&self, _timeout: Duration) -> RemoteResult<Arc<dyn Session>> {
        let mut state = self.store.state();
        state.stats.session_attempts += 1;
        if let Some(code) = state.session_failures.pop_front() {
            return Err(Status::new(code));
        }
        state.stats.sessions_created += 1;
        let n = self.store.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSession {
            store: self.store.clone(),
            id: format!("session-{}", n),
        }))
    }

    fn close(&self) -> RemoteResult<()> {
        self.store.state().stats.table_clients_closed += 1;
        Ok(())
    }
}

struct MockSession {
    store: MockStore,
    id: String,
}

#[async_trait]
impl Session for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute_data_query(
        &self,
        query: &str,
        params: Params,
        tx: TxControl,
    ) -> RemoteResult<DataQueryResult> {
        self.store.execute(query, params, tx)
    }

    async fn commit_transaction(&self, tx_id: &str) -> RemoteResult<()> {
        self.store.end_transaction(tx_id, true)
    }

    async fn rollback_transaction(&self, tx_id: &str) -> RemoteResult<()> {
        self.store.end_transaction(tx_id, false)
    }

    async fn execute_scan_query(
        &self,
        query: &str,
        _params: Params,
    ) -> RemoteResult<Box<dyn ScanStream>> {
        let delay = self.store.state().scan_start_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.store.state();
        state.stats.scan_queries += 1;
        let lower = query.to_ascii_lowercase();
        let rows = select(&state.rows, limit_of(&lower));
        let part_size = state.scan_part_size.max(1);
        let parts = rows
            .chunks(part_size)
            .map(|chunk| to_result_set(chunk.to_vec()))
            .collect();
        Ok(Box::new(MockScanStream {
            parts,
            delay: state.scan_part_delay,
        }))
    }

    async fn execute_scheme_query(&self, _query: &str) -> RemoteResult<()> {
        self.store.state().stats.scheme_queries += 1;
        Ok(())
    }

    async fn close(&self) -> RemoteResult<()> {
        self.store.state().stats.sessions_closed += 1;
        Ok(())
    }
}

struct MockScanStream {
    parts: VecDeque<ResultSet>,
    delay: Duration,
}

#[async_trait]
impl ScanStream for MockScanStream {
    async fn next_part(&mut self) -> RemoteResult<Option<ResultSet>> {
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.parts.pop_front())
    }
}

struct MockSchemeClient;

#[async_trait]
impl SchemeClient for MockSchemeClient {
    async fn list_directory(&self, path: &str) -> RemoteResult<Vec<SchemeEntry>> {
        Ok(vec![SchemeEntry {
            name: format!("{}/unit_2", path.trim_end_matches('/')),
            kind: SchemeEntryKind::Table,
        }])
    }

    fn close(&self) -> RemoteResult<()> {
        Ok(())
    }
}
