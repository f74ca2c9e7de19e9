//! Bridge errors.
//!
//! Every variant carries the `Component#operation` tag of the call that
//! raised it, so an error read from a log or from a counterparty is enough
//! to locate the failure.

use serde::{Deserialize, Serialize};

use crate::ontology::OntologyError;
use crate::types::network::LedgerType;

/// Error raised by a bridge leaf, the bridge manager or the execution layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeError {
    // ---- configuration ----
    /// Network ledger type does not match the leaf.
    #[error("{context}: unsupported network {ledger_type}")]
    UnsupportedNetwork {
        /// Operation tag.
        context: String,
        /// Offending ledger type.
        ledger_type: LedgerType,
    },
    /// Signing credential is `None`.
    #[error("{context}: no signing credential")]
    NoSigningCredential {
        /// Operation tag.
        context: String,
    },
    /// Wrapper contract configuration is inconsistent.
    #[error("{context}: invalid wrapper contract: {reason}")]
    InvalidWrapperContract {
        /// Operation tag.
        context: String,
        /// What was wrong.
        reason: String,
    },
    /// Connector options are missing or invalid.
    #[error("{context}: invalid connector options: {reason}")]
    ConnectorOptions {
        /// Operation tag.
        context: String,
        /// What was wrong.
        reason: String,
    },
    /// Fabric channel name is missing.
    #[error("{context}: channel name not available")]
    ChannelName {
        /// Operation tag.
        context: String,
    },

    // ---- deployment lifecycle ----
    /// The wrapper contract is already deployed.
    #[error("{context}: wrapper contract already created")]
    WrapperContractAlreadyCreated {
        /// Operation tag.
        context: String,
    },
    /// Deployment returned no (or a failed) receipt.
    #[error("{context}: transaction receipt missing or failed")]
    TransactionReceipt {
        /// Operation tag.
        context: String,
    },
    /// Deployment receipt has no contract address.
    #[error("{context}: contract address missing from receipt")]
    ContractAddress {
        /// Operation tag.
        context: String,
    },
    /// Deployment receipt requested before deployment.
    #[error("{context}: deployment receipt not available")]
    Receipt {
        /// Operation tag.
        context: String,
    },

    // ---- operational ----
    /// Wrapper contract not deployed, or not available for the token type.
    #[error("{context}: wrapper contract error: {reason}")]
    WrapperContract {
        /// Operation tag.
        context: String,
        /// What was wrong.
        reason: String,
    },
    /// The underlying send or call failed.
    #[error("{context}: transaction failed: {reason}")]
    Transaction {
        /// Operation tag.
        context: String,
        /// Underlying failure.
        reason: String,
    },
    /// No approve address for the token type.
    #[error("{context}: approve address error: {reason}")]
    ApproveAddress {
        /// Operation tag.
        context: String,
        /// What was wrong.
        reason: String,
    },
    /// On-chain token has a type this gateway cannot map.
    #[error("{context}: unexpected token type {token_type}")]
    UnexpectedTokenType {
        /// Operation tag.
        context: String,
        /// Raw token type.
        token_type: String,
    },
    /// A leaf operation returned no transaction id.
    #[error("{context}: transaction id undefined")]
    TransactionIdUndefined {
        /// Operation tag.
        context: String,
    },
    /// Connector transport failure outside a transaction.
    #[error("{context}: connector error: {reason}")]
    Connector {
        /// Operation tag.
        context: String,
        /// Underlying failure.
        reason: String,
    },
    /// Ledger output could not be decoded.
    #[error("{context}: serialization error: {reason}")]
    Serialization {
        /// Operation tag.
        context: String,
        /// Decoder message.
        reason: String,
    },

    // ---- proof / claim ----
    /// Bungee is not configured on this leaf.
    #[error("{context}: bungee not initialized")]
    Bungee {
        /// Operation tag.
        context: String,
    },
    /// Bungee produced no view.
    #[error("{context}: view is undefined")]
    View {
        /// Operation tag.
        context: String,
    },
    /// Proof requested in an unsupported format.
    #[error("{context}: claim format not supported for proofs: {claim_format}")]
    Proof {
        /// Operation tag.
        context: String,
        /// Requested format.
        claim_format: String,
    },
    /// Claim format not supported by the leaf.
    #[error("{context}: claim format not supported: {claim_format}")]
    ClaimFormat {
        /// Operation tag.
        context: String,
        /// Requested format.
        claim_format: String,
    },

    // ---- registry ----
    /// A leaf with this id is already registered for the network.
    #[error("{context}: leaf {leaf_id} already deployed")]
    DeployLeaf {
        /// Operation tag.
        context: String,
        /// Leaf id.
        leaf_id: String,
    },
    /// No leaf matches the request.
    #[error("{context}: leaf error: {reason}")]
    Leaf {
        /// Operation tag.
        context: String,
        /// What was wrong.
        reason: String,
    },

    /// Ontology lookup failed.
    #[error(transparent)]
    Ontology {
        /// Underlying ontology error.
        #[from]
        error: OntologyError,
    },
}

impl BridgeError {
    /// Whether this is the expected "already deployed" outcome.
    pub fn is_already_created(&self) -> bool {
        matches!(self, Self::WrapperContractAlreadyCreated { .. })
    }

    /// Map a connector failure inside a transaction.
    pub fn transaction(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Transaction {
            context: context.to_string(),
            reason: err.to_string(),
        }
    }

    /// Map a connector failure outside a transaction.
    pub fn connector(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Connector {
            context: context.to_string(),
            reason: err.to_string(),
        }
    }

    /// Wrapper contract not deployed.
    pub fn not_deployed(context: &str) -> Self {
        Self::WrapperContract {
            context: context.to_string(),
            reason: "wrapper contract not deployed".to_string(),
        }
    }
}
