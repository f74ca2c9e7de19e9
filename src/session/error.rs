//! Session validation errors.

use thiserror::Error;

use super::data::SessionRole;

/// Errors raised while creating, loading or verifying a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session already finished and may not progress.
    #[error("session already completed: {reason}")]
    SessionCompleted {
        /// Why the session counts as completed.
        reason: String,
    },

    /// A required session field is empty or unset.
    #[error("{tag}: required field {field} is missing")]
    MissingField {
        /// Operation tag.
        tag: String,
        /// Wire name of the field.
        field: String,
    },

    /// Session data was produced by another protocol version.
    #[error("{tag}: SATP version mismatch, found {found}, expected {expected}")]
    VersionMismatch {
        /// Operation tag.
        tag: String,
        /// Version carried by the session.
        found: String,
        /// Version this gateway speaks.
        expected: String,
    },

    /// Verification failed; wraps the first failed check.
    #[error("{tag}: session data not loaded correctly: {source}")]
    SessionDataNotLoaded {
        /// Operation tag.
        tag: String,
        /// First failed check.
        #[source]
        source: Box<SessionError>,
    },

    /// Data for this role already exists in the session.
    #[error("{role} session data already defined")]
    SessionDataAlreadyDefined {
        /// Role whose data exists.
        role: SessionRole,
    },

    /// No data for this role in the session.
    #[error("{role} session data is undefined")]
    SessionDataUndefined {
        /// Role whose data is missing.
        role: SessionRole,
    },

    /// Neither client nor server role, or an unspecified role.
    #[error("invalid gateway type: {reason}")]
    InvalidGatewayType {
        /// What was wrong.
        reason: String,
    },
}

impl SessionError {
    pub(crate) fn missing(tag: &str, field: &str) -> Self {
        Self::MissingField {
            tag: tag.to_string(),
            field: field.to_string(),
        }
    }
}
