//! Transaction results returned by bridge leaves.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How a contract method is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationType {
    /// State-changing transaction.
    Send,
    /// Read-only call.
    Call,
}

impl fmt::Display for InvocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => write!(f, "SEND"),
            Self::Call => write!(f, "CALL"),
        }
    }
}

/// Result of a wrapper-contract invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    /// Ledger transaction id (EVM: transaction hash).
    pub transaction_id: String,
    /// Stable-stringified receipt, when the ledger returns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_receipt: Option<String>,
    /// Call output, when the method returns data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl TransactionResponse {
    /// Whether the ledger assigned a transaction id.
    pub fn has_transaction_id(&self) -> bool {
        !self.transaction_id.is_empty()
    }
}

/// Receipt plus claim evidence produced by the execution layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    /// Raw receipt fetched from the ledger.
    pub receipt: String,
    /// Proof in the requested claim format (empty for `DEFAULT`).
    pub proof: String,
}
