//! Recovery log storage backends.
//!
//! The stage handlers append one [`LocalLog`] row per state transition; the
//! crash manager reads them back to rebuild sessions after a restart and to
//! hand the counterparty the rows it missed.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Log type of rows that carry ledger proofs rather than session data.
pub const PROOF_LOG_TYPE: &str = "proof";

/// Operation of a row that closes a step.
pub const DONE_OPERATION: &str = "done";

/// One row of the recovery log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalLog {
    /// Session the row belongs to.
    pub session_id: String,
    /// Step type (message or proof).
    #[serde(rename = "type")]
    pub log_type: String,
    /// `{sessionId}-{type}-{operation}`.
    pub key: String,
    /// Step operation; [`DONE_OPERATION`] once the step finished.
    pub operation: String,
    /// Epoch milliseconds, as a decimal string.
    pub timestamp: String,
    /// Serialized session data.
    pub data: String,
    /// Position of the row in the session's log.
    pub sequence_number: u64,
}

impl LocalLog {
    /// Build a row with its key derived from the other fields.
    pub fn new(
        session_id: impl Into<String>,
        log_type: impl Into<String>,
        operation: impl Into<String>,
        timestamp: impl Into<String>,
        data: impl Into<String>,
        sequence_number: u64,
    ) -> Self {
        let session_id = session_id.into();
        let log_type = log_type.into();
        let operation = operation.into();
        Self {
            key: get_satp_log_key(&session_id, &log_type, &operation),
            session_id,
            log_type,
            operation,
            timestamp: timestamp.into(),
            data: data.into(),
            sequence_number,
        }
    }

    /// Timestamp in epoch milliseconds, if well formed.
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.timestamp.trim().parse().ok()
    }

    /// Whether the row carries a proof.
    pub fn is_proof(&self) -> bool {
        self.log_type == PROOF_LOG_TYPE
    }
}

/// Key of a log row.
pub fn get_satp_log_key(session_id: &str, log_type: &str, operation: &str) -> String {
    format!("{session_id}-{log_type}-{operation}")
}

/// Append-only recovery log.
///
/// Reads return rows in ascending sequence number order.
#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Error type for repository operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append a row.
    async fn create(&self, log: LocalLog) -> Result<(), Self::Error>;

    /// Every row that is not a proof, across all sessions.
    async fn read_logs_not_proofs(&self) -> Result<Vec<LocalLog>, Self::Error>;

    /// Non-proof row with the highest sequence number for `session_id`.
    async fn read_latest_log(&self, session_id: &str) -> Result<Option<LocalLog>, Self::Error>;

    /// Rows of `session_id` with a sequence number above `sequence_number`.
    async fn read_logs_more_recent_than(
        &self,
        session_id: &str,
        sequence_number: u64,
    ) -> Result<Vec<LocalLog>, Self::Error>;

    /// Row stored under `key`.
    async fn read_by_id(&self, key: &str) -> Result<Option<LocalLog>, Self::Error>;
}

pub use memory::InMemoryLogRepository;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresLogConfig, PostgresLogRepository};
