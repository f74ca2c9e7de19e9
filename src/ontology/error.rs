//! Ontology errors.

use serde::{Deserialize, Serialize};

use crate::types::network::LedgerType;

/// Error raised while loading, validating or serving ontologies.
///
/// Serializable so a gateway can report the exact failure to its counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OntologyError {
    /// No ontology for the ledger type / token id.
    #[error("{context}: ontology not found for {ledger_type} / {token_id}")]
    OntologyNotFound {
        /// Operation tag.
        context: String,
        /// Requested ledger type.
        ledger_type: LedgerType,
        /// Requested token id.
        token_id: String,
    },
    /// Ledger family has no interaction encoding.
    #[error("{context}: ledger {ledger_type} not supported")]
    LedgerNotSupported {
        /// Operation tag.
        context: String,
        /// Offending ledger type.
        ledger_type: LedgerType,
    },
    /// Ledger type string is not recognized.
    #[error("{context}: unknown ledger type {value}")]
    UnsupportedLedger {
        /// Operation tag.
        context: String,
        /// Raw value.
        value: String,
    },
    /// Stored hash does not match the recomputed canonical hash.
    #[error("{context}: ontology {id} hash mismatch (expected {expected}, computed {computed})")]
    InvalidOntologyHash {
        /// Operation tag.
        context: String,
        /// Ontology id.
        id: String,
        /// Hash stored in the document.
        expected: String,
        /// Hash recomputed from content.
        computed: String,
    },
    /// No trusted key verifies the signature.
    #[error("{context}: ontology {id} signature not valid for any trusted key")]
    InvalidOntologySignature {
        /// Operation tag.
        context: String,
        /// Ontology id.
        id: String,
    },
    /// An EVM function is not marked available.
    #[error("{context}: function {function} of interaction {interaction} not available")]
    OntologyFunctionNotAvailable {
        /// Operation tag.
        context: String,
        /// Interaction name.
        interaction: String,
        /// Function signature.
        function: String,
    },
    /// A variable name has no positional code on this ledger.
    #[error("{context}: variable {variable} of {function} not supported on {ledger_type}")]
    OntologyFunctionVariableNotSupported {
        /// Operation tag.
        context: String,
        /// Function signature.
        function: String,
        /// Variable name.
        variable: String,
        /// Ledger type of the document.
        ledger_type: LedgerType,
    },
    /// Interaction name is not a known interaction type.
    #[error("{context}: unknown interaction {interaction}")]
    UnknownInteraction {
        /// Operation tag.
        context: String,
        /// Interaction name.
        interaction: String,
    },
    /// Interaction declares no functions.
    #[error("{context}: interaction {interaction} has no functions")]
    InteractionWithoutFunction {
        /// Operation tag.
        context: String,
        /// Interaction name.
        interaction: String,
    },
    /// On-chain bytecode differs from the registered bytecode.
    #[error("{context}: bytecode at {address} does not match ontology {token_id}")]
    InvalidBytecode {
        /// Operation tag.
        context: String,
        /// Token id.
        token_id: String,
        /// Contract address.
        address: String,
    },
    /// Document does not have the required fields/shapes.
    #[error("{context}: invalid ontology format: {reason}")]
    InvalidOntologyFormat {
        /// Operation tag.
        context: String,
        /// What was wrong.
        reason: String,
    },
    /// Document is not valid JSON.
    #[error("{context}: failed to parse {source_name}: {reason}")]
    Parse {
        /// Operation tag.
        context: String,
        /// File name or other origin.
        source_name: String,
        /// Parser message.
        reason: String,
    },
    /// Reading the ontology directory failed.
    #[error("{context}: io error on {path}: {reason}")]
    Io {
        /// Operation tag.
        context: String,
        /// Path involved.
        path: String,
        /// OS message.
        reason: String,
    },
    /// Trusted key material is malformed.
    #[error("{context}: invalid trusted key: {reason}")]
    InvalidTrustedKey {
        /// Operation tag.
        context: String,
        /// What was wrong.
        reason: String,
    },
    /// Fetching bytecode from the ledger failed.
    #[error("{context}: bytecode lookup failed: {reason}")]
    BytecodeLookup {
        /// Operation tag.
        context: String,
        /// Underlying failure.
        reason: String,
    },
    /// Operation reserved for dynamic ontology management.
    #[error("{context}: operation not implemented")]
    UnsupportedOperation {
        /// Operation tag.
        context: String,
    },
}

impl OntologyError {
    /// Build an io error from a std error.
    pub fn io(context: &str, path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            context: context.to_string(),
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}
