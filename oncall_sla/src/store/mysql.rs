//! MySQL-backed indicator store.
//!
//! One connection is opened at startup and kept for the lifetime of the
//! process; there is no pool and no reconnect.

use super::IndicatorStore;
use async_trait::async_trait;
use oncall_core::{CancellationToken, OncallError, Result};
use oncall_metrics::IndicatorRecord;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

pub const TABLE_NAME: &str = "indicators";
pub const INSERT_TIMEOUT: Duration = Duration::from_secs(10);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Session `lock_wait_timeout` while the schema is checked, in seconds.
const SCHEMA_LOCK_WAIT_SECS: u32 = 10;

/// `(index name, column)` pairs every indicators table carries.
const INDEXES: [(&str, &str); 2] = [
    ("idx_indicators_datetime", "datetime"),
    ("idx_indicators_name", "name"),
];

#[derive(Clone)]
pub struct MySqlSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl MySqlSettings {
    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
    }
}

impl fmt::Debug for MySqlSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Checks that `name` can be used unescaped inside backticks.
pub fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if valid {
        Ok(())
    } else {
        Err(OncallError::InvalidConfig(format!(
            "Invalid database name '{}': use 1-64 letters, digits, '_' or '$'",
            name
        )))
    }
}

fn create_table_sql(database: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS `{db}`.`{table}` (\
            datetime DATETIME NOT NULL DEFAULT NOW(), \
            name VARCHAR(255) NOT NULL, \
            slo FLOAT NOT NULL, \
            value FLOAT NOT NULL, \
            is_bad BOOLEAN NOT NULL DEFAULT FALSE, \
            INDEX `{idx_datetime}` (datetime), \
            INDEX `{idx_name}` (name)\
        )",
        db = database,
        table = TABLE_NAME,
        idx_datetime = INDEXES[0].0,
        idx_name = INDEXES[1].0,
    )
}

fn insert_sql(database: &str) -> String {
    format!(
        "INSERT INTO `{}`.`{}` (datetime, name, slo, value, is_bad) VALUES (?, ?, ?, ?, ?)",
        database, TABLE_NAME
    )
}

fn add_index_sql(database: &str, index: &str, column: &str) -> String {
    format!(
        "ALTER TABLE `{}`.`{}` ADD INDEX `{}` (`{}`)",
        database, TABLE_NAME, index, column
    )
}

/// Indexes the table still needs, given the first column of every index it
/// already has. An index counts whatever its name, so tables whose indexes
/// were created unnamed are left alone.
fn missing_indexes<S: AsRef<str>>(leading_columns: &[S]) -> Vec<(&'static str, &'static str)> {
    INDEXES
        .into_iter()
        .filter(|(_, column)| {
            !leading_columns
                .iter()
                .any(|existing| existing.as_ref().eq_ignore_ascii_case(column))
        })
        .collect()
}

/// Runs a statement over the text protocol. `USE` and DDL go through here
/// since not all of them can be prepared.
async fn execute_text(conn: &mut MySqlConnection, sql: &str) -> Result<()> {
    conn.execute(sql)
        .await
        .map(|_| ())
        .map_err(|e| OncallError::Database(format!("{}: {}", sql, e)))
}

pub struct MySqlIndicatorStore {
    conn: Mutex<MySqlConnection>,
    database: String,
    insert_timeout: Duration,
}

impl MySqlIndicatorStore {
    pub async fn connect(settings: &MySqlSettings) -> Result<Self> {
        info!("Connecting to MySQL at {}:{}", settings.host, settings.port);
        Self::connect_with(settings.connect_options(), &settings.database).await
    }

    /// Connects and prepares the schema, giving up quietly if `shutdown`
    /// fires first. `Ok(None)` means shutdown was requested.
    pub async fn open(settings: &MySqlSettings, shutdown: &CancellationToken) -> Result<Option<Self>> {
        let startup = async {
            let store = Self::connect(settings).await?;
            store.ensure_schema().await?;
            Ok::<_, OncallError>(store)
        };

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested while connecting to MySQL");
                Ok(None)
            }
            store = startup => store.map(Some),
        }
    }

    pub async fn connect_with(options: MySqlConnectOptions, database: &str) -> Result<Self> {
        Self::connect_within(options, database, CONNECT_TIMEOUT).await
    }

    async fn connect_within(
        options: MySqlConnectOptions,
        database: &str,
        connect_timeout: Duration,
    ) -> Result<Self> {
        validate_identifier(database)?;

        let conn = match tokio::time::timeout(connect_timeout, options.connect()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(OncallError::Database(format!("Failed to connect: {}", e)));
            }
            Err(_) => {
                return Err(OncallError::Database(format!(
                    "Connection timed out after {:?}",
                    connect_timeout
                )));
            }
        };

        Ok(Self {
            conn: Mutex::new(conn),
            database: database.to_string(),
            insert_timeout: INSERT_TIMEOUT,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Closes the connection cleanly.
    pub async fn close(self) -> Result<()> {
        self.conn
            .into_inner()
            .close()
            .await
            .map_err(|e| OncallError::Database(format!("Failed to close connection: {}", e)))
    }
}

#[async_trait]
impl IndicatorStore for MySqlIndicatorStore {
    async fn ensure_schema(&self) -> Result<()> {
        info!("Ensuring schema in database '{}'", self.database);
        let mut conn = self.conn.lock().await;

        execute_text(
            &mut conn,
            &format!("CREATE DATABASE IF NOT EXISTS `{}`", self.database),
        )
        .await?;
        execute_text(&mut conn, &format!("USE `{}`", self.database)).await?;
        execute_text(
            &mut conn,
            &format!("SET SESSION lock_wait_timeout = {}", SCHEMA_LOCK_WAIT_SECS),
        )
        .await?;
        execute_text(&mut conn, &create_table_sql(&self.database)).await?;

        // Tables created by older deployments may lack some indexes.
        let leading_columns: Vec<String> = sqlx::query_scalar(
            "SELECT CAST(column_name AS CHAR) FROM information_schema.statistics \
             WHERE table_schema = ? AND table_name = ? AND seq_in_index = 1",
        )
        .bind(self.database.as_str())
        .bind(TABLE_NAME)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| OncallError::Database(format!("Failed to inspect indexes: {}", e)))?;

        for (index, column) in missing_indexes(&leading_columns) {
            info!("Adding index '{}' on {}.{}", index, TABLE_NAME, column);
            execute_text(&mut conn, &add_index_sql(&self.database, index, column)).await?;
        }

        Ok(())
    }

    async fn insert(&self, record: &IndicatorRecord) -> Result<()> {
        let sql = insert_sql(&self.database);
        let query = sqlx::query(&sql)
            .bind(record.timestamp().naive_utc())
            .bind(record.name())
            .bind(record.slo())
            .bind(record.value())
            .bind(record.is_bad());

        let mut conn = self.conn.lock().await;
        match tokio::time::timeout(self.insert_timeout, query.execute(&mut *conn)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(OncallError::Persistence(format!(
                "Failed to insert '{}': {}",
                record.name(),
                e
            ))),
            Err(_) => Err(OncallError::Persistence(format!(
                "Insert of '{}' timed out after {:?}",
                record.name(),
                self.insert_timeout
            ))),
        }
    }
}
