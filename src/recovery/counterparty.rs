//! Transport seam to the other gateway of a session.

use async_trait::async_trait;

use super::error::RecoveryError;
use super::messages::{
    RecoverMessage, RecoverSuccessMessage, RecoverUpdateMessage, RollbackAckMessage, RollbackMessage,
};

/// The gateway on the other side of a session.
///
/// Implementations carry the messages over whatever transport the host uses.
/// [`CrashManager`](super::CrashManager) itself answers these messages, so an
/// in-process implementation can simply forward to the peer's crash manager.
#[async_trait]
pub trait CounterpartyGateway: Send + Sync {
    /// Request the rows missed since `message.sequence_number`.
    async fn recover(&self, message: RecoverMessage) -> Result<RecoverUpdateMessage, RecoveryError>;

    /// Report that the recovered rows were applied.
    async fn recover_success(&self, message: RecoverSuccessMessage) -> Result<(), RecoveryError>;

    /// Report a local rollback and wait for the counterparty's acknowledgement.
    async fn rollback(&self, message: RollbackMessage) -> Result<RollbackAckMessage, RecoveryError>;
}
