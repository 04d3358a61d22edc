//! MySQL/MariaDB backend over one `mysql_async` connection.
//!
//! Requires MySQL 5.7.9+ (JSON support and shorthand operators) or
//! MariaDB 10.2.6+ (JSON support and generated columns).

mod dialect;

pub use dialect::MysqlDialect;

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{ConnectionOptions, DbKind};
use crate::core::traits::Backend;
use crate::drivers::common::{assert_version_supported, mariadb_version};
use crate::error::{DriverError, Result};

const MIN_SERVER_VERSION: &str = "5.7.9";
const MIN_SERVER_VERSION_MARIADB: &str = "10.2.6";

/// One exclusively-owned MySQL connection.
///
/// The client API needs `&mut` access per statement, so the connection sits
/// behind an async mutex; `close` takes it out for a clean disconnect.
pub struct MysqlBackend {
    conn: Mutex<Option<Conn>>,
}

impl MysqlBackend {
    /// Open the connection, run the session init commands and gate on the
    /// server version.
    pub async fn connect(options: &ConnectionOptions) -> Result<Self> {
        let set_names = match options.charset() {
            // Collation must ride along for the default charset
            "utf8mb4" => "SET NAMES utf8mb4 COLLATE 'utf8mb4_unicode_ci'".to_string(),
            charset => format!("SET NAMES {}", charset),
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(options.host.clone())
            .tcp_port(options.port())
            .db_name(Some(options.dbname.clone()))
            .user(Some(options.username.clone()))
            .pass(Some(options.password.clone()))
            // ISO/IEC 9075 identifier rules, matching the emitted SQL
            .init(vec![set_names, "SET sql_mode = 'ANSI'".to_string()]);

        if let Some(size) = options.driver_option_u64("stmt_cache_size") {
            builder = builder.stmt_cache_size(Some(size as usize));
        }

        let conn = Conn::new(Opts::from(builder))
            .await
            .map_err(|e| DriverError::config(format!("MySQL connection failed: {}", e)))?;

        let backend = Self {
            conn: Mutex::new(Some(conn)),
        };
        backend.assert_supported().await?;

        info!(
            "connected to MySQL server at {}:{}/{}",
            options.host,
            options.port(),
            options.dbname
        );
        Ok(backend)
    }

    /// Gate on the minimum server version, recognizing MariaDB behind its
    /// MySQL-compatibility version prefix.
    async fn assert_supported(&self) -> Result<()> {
        let raw = self.server_version().await?;
        match mariadb_version(&raw) {
            Some(version) => {
                assert_version_supported("MariaDB", version, MIN_SERVER_VERSION_MARIADB)
            }
            None => assert_version_supported("MySQL", &raw, MIN_SERVER_VERSION),
        }
    }
}

fn wrap_execution(sql: &str, err: mysql_async::Error) -> DriverError {
    let code = match &err {
        mysql_async::Error::Server(server) => Some(server.code.to_string()),
        _ => None,
    };
    DriverError::execution(sql, code, err.to_string())
}

fn connection_closed() -> DriverError {
    DriverError::config("MySQL connection already closed")
}

#[async_trait]
impl Backend for MysqlBackend {
    fn kind(&self) -> DbKind {
        DbKind::Mysql
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        debug!("mysql execute: {}", sql);
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(connection_closed)?;
        conn.query_drop(sql)
            .await
            .map_err(|e| wrap_execution(sql, e))?;
        Ok(conn.affected_rows())
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        debug!("mysql ddl: {}", sql);
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(connection_closed)?;
        conn.query_drop(sql)
            .await
            .map_err(|e| wrap_execution(sql, e))
    }

    async fn query_column(&self, sql: &str) -> Result<Vec<String>> {
        debug!("mysql query: {}", sql);
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(connection_closed)?;
        conn.query(sql).await.map_err(|e| wrap_execution(sql, e))
    }

    async fn query_scalar(&self, sql: &str) -> Result<Option<i64>> {
        debug!("mysql query: {}", sql);
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(connection_closed)?;
        conn.query_first(sql)
            .await
            .map_err(|e| wrap_execution(sql, e))
    }

    async fn server_version(&self) -> Result<String> {
        // SELECT VERSION() reports MariaDB's real version even where the
        // protocol handshake carries the 5.5.5 compatibility prefix
        let sql = "SELECT VERSION()";
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(connection_closed)?;
        let version: Option<String> = conn
            .query_first(sql)
            .await
            .map_err(|e| wrap_execution(sql, e))?;
        version.ok_or_else(|| DriverError::execution(sql, None, "server returned no version row"))
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.disconnect()
                .await
                .map_err(|e| wrap_execution("DISCONNECT", e))?;
        }
        Ok(())
    }
}
