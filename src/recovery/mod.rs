//! Crash recovery and rollback.
//!
//! ## Purpose
//!
//! A gateway that crashes mid-transfer must either finish the transfer or
//! undo its own ledger effects. The [`CrashManager`] decides which:
//!
//! ```text
//! log rows ──recover_sessions()──> sessions ──check_crash()──┬─ IN_RECOVERY ─> handle_recovery()
//!                                                            ├─ IN_ROLLBACK ─> initiate_rollback()
//!                                                            └─ IDLE / ERROR ─> nothing
//! ```
//!
//! Recovery asks the counterparty for the log rows it holds beyond ours and
//! merges their hash chain. Rollback picks a [`RollbackStrategy`] from the hash
//! chain and runs the compensating leaf calls. Every message between the two
//! gateways is ed25519-signed; see [`messages`].

mod counterparty;
mod crash_manager;
mod error;
pub mod messages;
pub mod rollback;

pub use counterparty::CounterpartyGateway;
pub use crash_manager::{CrashManager, CrashManagerOptions, CrashStatus, DEFAULT_HEALTH_CHECK_INTERVAL};
pub use error::RecoveryError;
pub use messages::{
    RecoverMessage, RecoverSuccessMessage, RecoverUpdateMessage, RollbackAckMessage, RollbackMessage,
    SignedMessage,
};
pub use rollback::{
    RollbackLogEntry, RollbackState, RollbackStatus, RollbackStrategy, RollbackStrategyFactory,
    Stage0RollbackStrategy, Stage1RollbackStrategy, Stage2RollbackStrategy, Stage3RollbackStrategy,
};
