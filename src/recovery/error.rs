//! Crash recovery errors.

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::session::SessionError;

/// Errors raised by the crash manager and rollback strategies.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The session is not tracked by this gateway.
    #[error("{context}: session {session_id} not found")]
    SessionNotFound {
        /// Operation tag.
        context: String,
        /// Requested session.
        session_id: String,
    },

    /// The recovery log failed.
    #[error("{context}: log repository error: {reason}")]
    Repository {
        /// Operation tag.
        context: String,
        /// Backend message.
        reason: String,
    },

    /// The counterparty gateway failed or answered unexpectedly.
    #[error("{context}: counterparty error: {reason}")]
    Counterparty {
        /// Operation tag.
        context: String,
        /// What went wrong.
        reason: String,
    },

    /// A recovery message signature did not verify.
    #[error("{context}: invalid signature on message for session {session_id}")]
    InvalidSignature {
        /// Operation tag.
        context: String,
        /// Session the message belongs to.
        session_id: String,
    },

    /// A rollback strategy could not run.
    #[error("{context}: rollback failed: {reason}")]
    Rollback {
        /// Operation tag.
        context: String,
        /// What went wrong.
        reason: String,
    },

    /// Session data or a message could not be (de)serialized.
    #[error("{context}: serialization error: {reason}")]
    Serialization {
        /// Operation tag.
        context: String,
        /// Parser message.
        reason: String,
    },

    /// Session lookup or validation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A compensating ledger call failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl RecoveryError {
    pub(crate) fn repository(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Repository {
            context: context.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn serialization(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            context: context.to_string(),
            reason: err.to_string(),
        }
    }
}
