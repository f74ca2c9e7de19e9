//! In-memory recovery log for tests and single-process gateways.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{LocalLog, LogRepository};

/// Error type for the in-memory log.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryLogError {
    /// A row with this key already exists.
    #[error("duplicate log key: {0}")]
    DuplicateKey(String),
}

/// In-memory recovery log.
///
/// Rows are kept in append order; reads sort by sequence number, with
/// append order breaking ties.
#[derive(Debug, Default)]
pub struct InMemoryLogRepository {
    rows: RwLock<Vec<LocalLog>>,
}

impl InMemoryLogRepository {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows across all sessions.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Rows of one session, in log order.
    pub fn session_logs(&self, session_id: &str) -> Vec<LocalLog> {
        self.select(|row| row.session_id == session_id)
    }

    fn select(&self, keep: impl Fn(&LocalLog) -> bool) -> Vec<LocalLog> {
        let mut rows: Vec<LocalLog> = self.rows.read().iter().filter(|r| keep(r)).cloned().collect();
        rows.sort_by_key(|row| row.sequence_number);
        rows
    }
}

#[async_trait]
impl LogRepository for InMemoryLogRepository {
    type Error = InMemoryLogError;

    async fn create(&self, log: LocalLog) -> Result<(), Self::Error> {
        let mut rows = self.rows.write();
        if rows.iter().any(|row| row.key == log.key) {
            return Err(InMemoryLogError::DuplicateKey(log.key));
        }
        tracing::trace!(key = %log.key, sequence_number = log.sequence_number, "log row appended");
        rows.push(log);
        Ok(())
    }

    async fn read_logs_not_proofs(&self) -> Result<Vec<LocalLog>, Self::Error> {
        Ok(self.select(|row| !row.is_proof()))
    }

    async fn read_latest_log(&self, session_id: &str) -> Result<Option<LocalLog>, Self::Error> {
        Ok(self.select(|row| row.session_id == session_id && !row.is_proof()).pop())
    }

    async fn read_logs_more_recent_than(
        &self,
        session_id: &str,
        sequence_number: u64,
    ) -> Result<Vec<LocalLog>, Self::Error> {
        Ok(self.select(|row| row.session_id == session_id && row.sequence_number > sequence_number))
    }

    async fn read_by_id(&self, key: &str) -> Result<Option<LocalLog>, Self::Error> {
        Ok(self.rows.read().iter().find(|row| row.key == key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{get_satp_log_key, PROOF_LOG_TYPE};

    fn make_log(session: &str, log_type: &str, operation: &str, seq: u64) -> LocalLog {
        LocalLog::new(session, log_type, operation, "1000", "{}", seq)
    }

    #[test]
    fn test_log_key_format() {
        assert_eq!(get_satp_log_key("s1", "lock", "done"), "s1-lock-done");
        assert_eq!(make_log("s1", "lock", "init", 1).key, "s1-lock-init");
    }

    #[tokio::test]
    async fn test_latest_and_more_recent() {
        let repo = InMemoryLogRepository::new();
        repo.create(make_log("s1", "a", "init", 1)).await.unwrap();
        repo.create(make_log("s1", "a", "done", 2)).await.unwrap();
        repo.create(make_log("s1", "b", "init", 3)).await.unwrap();
        repo.create(make_log("s2", "a", "init", 1)).await.unwrap();

        let latest = repo.read_latest_log("s1").await.unwrap().unwrap();
        assert_eq!(latest.sequence_number, 3);
        assert!(repo.read_latest_log("missing").await.unwrap().is_none());

        let newer = repo.read_logs_more_recent_than("s1", 1).await.unwrap();
        let seqs: Vec<u64> = newer.iter().map(|l| l.sequence_number).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert_eq!(repo.len(), 4);
    }

    #[tokio::test]
    async fn test_not_proofs_filters_and_orders() {
        let repo = InMemoryLogRepository::new();
        repo.create(make_log("s1", "a", "init", 2)).await.unwrap();
        repo.create(make_log("s1", PROOF_LOG_TYPE, "done", 3)).await.unwrap();
        repo.create(make_log("s2", "a", "init", 1)).await.unwrap();

        let rows = repo.read_logs_not_proofs().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].session_id, "s2");
        assert!(rows.iter().all(|r| !r.is_proof()));
    }

    #[tokio::test]
    async fn test_latest_skips_proofs() {
        let repo = InMemoryLogRepository::new();
        repo.create(make_log("s1", "a", "init", 1)).await.unwrap();
        repo.create(make_log("s1", PROOF_LOG_TYPE, "done", 2)).await.unwrap();

        let latest = repo.read_latest_log("s1").await.unwrap().unwrap();
        assert_eq!(latest.sequence_number, 1);
        assert_eq!(latest.operation, "init");
        assert!(repo.read_latest_log("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let repo = InMemoryLogRepository::new();
        repo.create(make_log("s1", "a", "init", 1)).await.unwrap();
        let err = repo.create(make_log("s1", "a", "init", 2)).await.unwrap_err();
        assert!(matches!(err, InMemoryLogError::DuplicateKey(_)));

        let found = repo.read_by_id("s1-a-init").await.unwrap().unwrap();
        assert_eq!(found.sequence_number, 1);
    }
}
