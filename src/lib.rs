//! # satp-hermes
//!
//! Gateway core for the Secure Asset Transfer Protocol (SATP).
//!
//! A gateway moves a token from one ledger to another by locking or burning
//! it on the origin side and minting or unlocking it on the destination side.
//! This crate holds the parts of a gateway that touch ledgers and survive
//! crashes:
//!
//! ## Architecture
//!
//! ```text
//! SatpSession ──stage handlers──> BridgeManager ──> BridgeExecutionLayer ──> BridgeLeaf (EVM / Fabric)
//!      │                                                   │
//!      │                                          OntologyManager (wrapper calls per token)
//!      ▼
//! LogRepository <──── CrashManager ────> CounterpartyGateway
//!                    (recover / rollback)
//! ```
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | networks, assets, receipts |
//! | [`ontology`] | per-token interaction documents, hashing and signing |
//! | [`bridge`] | ledger leaves and the execution layer |
//! | [`session`] | per-session protocol state |
//! | [`store`] | the recovery log |
//! | [`recovery`] | crash detection, recovery and rollback |
//!
//! ## Determinism
//!
//! - Ontology hashes and message signatures cover key-sorted JSON only
//! - The log key of a step is `{sessionId}-{type}-{operation}`
//! - Log rows are replayed in sequence-number order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod canonical;
pub mod ontology;
pub mod recovery;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod types;

pub use bridge::{BridgeError, BridgeExecutionLayer, BridgeLeaf, BridgeManager, StageOperation};
pub use canonical::{canonical_hash, canonical_hash_hex, stable_stringify, to_canonical_bytes, try_stable_stringify};
pub use ontology::{OntologyCheckLevel, OntologyDocument, OntologyError, OntologyManager};
pub use recovery::{CounterpartyGateway, CrashManager, CrashManagerOptions, CrashStatus, RecoveryError};
pub use session::{SatpSession, SatpSessionOptions, SessionData, SessionError, SessionRole, State, SATP_VERSION};
pub use store::{InMemoryLogRepository, LocalLog, LogRepository};
#[cfg(feature = "postgres")]
pub use store::{PostgresLogConfig, PostgresLogRepository};
pub use telemetry::{init_tracing, SpanScope};
pub use types::{Asset, ClaimFormat, LedgerType, NetworkId, TokenType};
