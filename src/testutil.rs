//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::DbKind;
use crate::core::traits::Backend;
use crate::error::Result;

/// A backend that records every statement and replays canned result sets,
/// so the collection/cursor/driver pipeline is exercised without a server.
pub(crate) struct StubBackend {
    executed: Mutex<Vec<String>>,
    rows: Mutex<VecDeque<Vec<String>>>,
    scalars: Mutex<VecDeque<i64>>,
}

impl StubBackend {
    pub(crate) fn new() -> Self {
        Self {
            executed: Mutex::new(Vec::new()),
            rows: Mutex::new(VecDeque::new()),
            scalars: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue the rows the next `query_column` call returns.
    pub(crate) fn push_rows(&self, rows: Vec<&str>) {
        self.rows
            .lock()
            .unwrap()
            .push_back(rows.into_iter().map(str::to_string).collect());
    }

    /// Queue the value the next `query_scalar` call returns.
    pub(crate) fn push_scalar(&self, value: i64) {
        self.scalars.lock().unwrap().push_back(value);
    }

    /// Every statement seen so far, in order.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn record(&self, sql: &str) {
        self.executed.lock().unwrap().push(sql.to_string());
    }
}

#[async_trait]
impl Backend for StubBackend {
    fn kind(&self) -> DbKind {
        DbKind::Mysql
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.record(sql);
        Ok(1)
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        self.record(sql);
        Ok(())
    }

    async fn query_column(&self, sql: &str) -> Result<Vec<String>> {
        self.record(sql);
        Ok(self.rows.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn query_scalar(&self, sql: &str) -> Result<Option<i64>> {
        self.record(sql);
        Ok(self.scalars.lock().unwrap().pop_front())
    }

    async fn server_version(&self) -> Result<String> {
        Ok("8.0.36".to_string())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
