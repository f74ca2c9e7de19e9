//! PostgreSQL recovery log for production gateways.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS satp_logs (
//!     key             TEXT PRIMARY KEY,
//!     session_id      TEXT NOT NULL,
//!     type            TEXT NOT NULL,
//!     operation       TEXT NOT NULL,
//!     timestamp       TEXT NOT NULL,
//!     data            TEXT NOT NULL,
//!     sequence_number BIGINT NOT NULL
//! );
//! ```

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

use super::{LocalLog, LogRepository, PROOF_LOG_TYPE};

/// DDL for the log table, applied by [`PostgresLogRepository::migrate`].
pub const LOG_TABLE_SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS satp_logs (
        key             TEXT PRIMARY KEY,
        session_id      TEXT NOT NULL,
        type            TEXT NOT NULL,
        operation       TEXT NOT NULL,
        timestamp       TEXT NOT NULL,
        data            TEXT NOT NULL,
        sequence_number BIGINT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS satp_logs_session_seq ON satp_logs (session_id, sequence_number)",
];

/// Configuration for the PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLogConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PostgresLogConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/satp".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresLogConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// PostgreSQL recovery log.
pub struct PostgresLogRepository {
    pool: PgPool,
}

impl PostgresLogRepository {
    /// Connect with the given configuration.
    pub async fn new(config: PostgresLogConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Connect using environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresLogConfig::from_env()).await
    }

    /// Create the log table if it does not exist.
    pub async fn migrate(&self) -> Result<(), PostgresLogError> {
        for statement in LOG_TABLE_SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("recovery log schema applied");
        Ok(())
    }

    /// Connection pool, for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether the database answers.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    fn parse_log_row(row: &PgRow) -> Result<LocalLog, PostgresLogError> {
        let sequence_number: i64 = row.try_get("sequence_number")?;
        Ok(LocalLog {
            session_id: row.try_get("session_id")?,
            log_type: row.try_get("type")?,
            key: row.try_get("key")?,
            operation: row.try_get("operation")?,
            timestamp: row.try_get("timestamp")?,
            data: row.try_get("data")?,
            sequence_number: u64::try_from(sequence_number)
                .map_err(|_| PostgresLogError::InvalidSequence(sequence_number))?,
        })
    }

    fn parse_rows(rows: &[PgRow]) -> Result<Vec<LocalLog>, PostgresLogError> {
        rows.iter().map(Self::parse_log_row).collect()
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// Error type for the PostgreSQL log.
#[derive(Debug, thiserror::Error)]
pub enum PostgresLogError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Stored sequence number is negative.
    #[error("invalid sequence number in log: {0}")]
    InvalidSequence(i64),
    /// Sequence number does not fit the column.
    #[error("sequence number out of range: {0}")]
    SequenceOverflow(u64),
}

const SELECT_COLUMNS: &str = "SELECT key, session_id, type, operation, timestamp, data, sequence_number FROM satp_logs";

#[async_trait]
impl LogRepository for PostgresLogRepository {
    type Error = PostgresLogError;

    async fn create(&self, log: LocalLog) -> Result<(), Self::Error> {
        let sequence_number = i64::try_from(log.sequence_number)
            .map_err(|_| PostgresLogError::SequenceOverflow(log.sequence_number))?;
        sqlx::query(
            r#"
            INSERT INTO satp_logs (key, session_id, type, operation, timestamp, data, sequence_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&log.key)
        .bind(&log.session_id)
        .bind(&log.log_type)
        .bind(&log.operation)
        .bind(&log.timestamp)
        .bind(&log.data)
        .bind(sequence_number)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_logs_not_proofs(&self) -> Result<Vec<LocalLog>, Self::Error> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE type <> $1 ORDER BY sequence_number, session_id"
        ))
        .bind(PROOF_LOG_TYPE)
        .fetch_all(&self.pool)
        .await?;
        Self::parse_rows(&rows)
    }

    async fn read_latest_log(&self, session_id: &str) -> Result<Option<LocalLog>, Self::Error> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE session_id = $1 AND type <> $2 ORDER BY sequence_number DESC LIMIT 1"
        ))
        .bind(session_id)
        .bind(PROOF_LOG_TYPE)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::parse_log_row).transpose()
    }

    async fn read_logs_more_recent_than(
        &self,
        session_id: &str,
        sequence_number: u64,
    ) -> Result<Vec<LocalLog>, Self::Error> {
        let sequence_number = i64::try_from(sequence_number)
            .map_err(|_| PostgresLogError::SequenceOverflow(sequence_number))?;
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE session_id = $1 AND sequence_number > $2 ORDER BY sequence_number"
        ))
        .bind(session_id)
        .bind(sequence_number)
        .fetch_all(&self.pool)
        .await?;
        Self::parse_rows(&rows)
    }

    async fn read_by_id(&self, key: &str) -> Result<Option<LocalLog>, Self::Error> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE key = $1"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::parse_log_row).transpose()
    }
}
