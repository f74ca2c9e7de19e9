//! SATP sessions.
//!
//! ## Purpose
//!
//! A session is one asset transfer between a client gateway (source ledger)
//! and a server gateway (destination ledger). Each gateway keeps its own
//! [`SessionData`]: negotiated parameters, the asset snapshots, and the
//! per-stage hash chain that crash recovery reads back from the log.
//!
//! | Type | Role |
//! |------|------|
//! | [`SatpSession`] | holds client and/or server data, verifies it |
//! | [`SessionData`] | one gateway's record of the transfer |
//! | [`MessageStages`] | one slot per protocol message, for hashes, signatures and timestamps |
//! | [`SessionError`] | creation, lookup and verification failures |

mod data;
mod error;
mod satp_session;

pub use data::{
    LockType, MessageStages, MessageType, SatpStage, SessionAsset, SessionData, SessionRole,
    SignatureAlgorithm, Stage0Record, Stage1Record, Stage2Record, Stage3Record, State,
    TimestampType, SATP_VERSION,
};
pub use error::SessionError;
pub use satp_session::{SatpSession, SatpSessionOptions};
