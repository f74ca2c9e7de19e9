//! Ledger connector seams.
//!
//! Leaves never talk to a ledger directly. They drive one of these traits,
//! which the host implements on top of its ledger client:
//!
//! | Trait | Consumed methods |
//! |-------|------------------|
//! | [`EvmConnector`] | `deployContract`, `invokeContract`, `getTransaction`, raw web3 calls |
//! | [`FabricConnector`] | `deployContract`, `transact`, shutdown |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::transaction::InvocationType;

/// Failure reported by a connector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    /// The ledger could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
    /// The ledger rejected the request.
    #[error("rejected by ledger: {0}")]
    Rejected(String),
    /// The connector has been shut down.
    #[error("connector closed")]
    Closed,
}

/// Credential used to sign EVM transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Web3SigningCredential {
    /// No credential. Rejected by the leaves.
    None,
    /// Raw private key.
    #[serde(rename_all = "camelCase")]
    PrivateKeyHex {
        /// Account address.
        eth_account: String,
        /// Hex private key.
        secret: String,
    },
    /// Key held in a keychain plugin.
    #[serde(rename_all = "camelCase")]
    CactusKeychainRef {
        /// Account address.
        eth_account: String,
        /// Keychain id.
        keychain_id: String,
        /// Entry key.
        keychain_entry_key: String,
    },
    /// Account unlocked by the node with a password.
    #[serde(rename_all = "camelCase")]
    GethKeychainPassword {
        /// Account address.
        eth_account: String,
        /// Unlock password.
        secret: String,
    },
}

impl Web3SigningCredential {
    /// Whether this is the `None` credential.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Signing account, if any.
    pub fn eth_account(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::PrivateKeyHex { eth_account, .. }
            | Self::CactusKeychainRef { eth_account, .. }
            | Self::GethKeychainPassword { eth_account, .. } => Some(eth_account),
        }
    }
}

/// Credential used to sign Fabric transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricSigningCredential {
    /// Keychain holding the identity.
    pub keychain_id: String,
    /// Identity key inside the keychain.
    pub keychain_ref: String,
}

// ============================================================================
// EVM
// ============================================================================

/// Receipt of a mined EVM transaction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTransactionReceipt {
    /// Transaction hash.
    #[serde(default)]
    pub transaction_hash: String,
    /// Address of a deployed contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    /// Remaining receipt fields as returned by the node.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Contract deployment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmDeployRequest {
    /// Contract name, used by keychain-backed connectors to find the ABI.
    pub contract_name: String,
    /// Constructor arguments.
    pub constructor_args: Vec<Value>,
    /// Signing credential.
    pub signing_credential: Web3SigningCredential,
    /// Gas limit.
    pub gas: u64,
}

/// Contract deployment outcome.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmDeployResponse {
    /// Receipt, absent when the node returned none.
    pub transaction_receipt: Option<EvmTransactionReceipt>,
}

/// Contract invocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmInvokeRequest {
    /// Wrapper contract name.
    pub contract_name: String,
    /// Wrapper contract address.
    pub contract_address: String,
    /// Send or call.
    pub invocation_type: InvocationType,
    /// Contract method.
    pub method_name: String,
    /// Method parameters.
    pub params: Vec<Value>,
    /// Signing credential.
    pub signing_credential: Web3SigningCredential,
    /// Gas limit.
    pub gas: u64,
}

/// Contract invocation outcome.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmInvokeResponse {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Receipt of a send.
    pub transaction_receipt: Option<EvmTransactionReceipt>,
    /// Return value of a call.
    pub call_output: Option<Value>,
}

/// EVM ledger client consumed by the EVM leaves.
#[async_trait]
pub trait EvmConnector: Send + Sync {
    /// Deploy a contract.
    async fn deploy_contract(&self, request: EvmDeployRequest) -> Result<EvmDeployResponse, ConnectorError>;

    /// Invoke a contract method.
    async fn invoke_contract(&self, request: EvmInvokeRequest) -> Result<EvmInvokeResponse, ConnectorError>;

    /// Fetch a transaction by hash.
    async fn get_transaction(&self, transaction_hash: &str) -> Result<Value, ConnectorError>;

    /// Call a raw `web3.eth` method (e.g. `getCode`).
    async fn invoke_raw_web3_eth_method(&self, method: &str, params: Vec<Value>) -> Result<Value, ConnectorError>;
}

// ============================================================================
// Fabric
// ============================================================================

/// Chaincode source file shipped with a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBase64 {
    /// Base64 file body.
    pub body: String,
    /// Directory relative to the chaincode root.
    pub filepath: String,
    /// File name.
    pub filename: String,
}

/// Chaincode deployment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricDeployRequest {
    /// Channel to deploy on.
    pub channel_id: String,
    /// Chaincode name.
    pub cc_name: String,
    /// Chaincode version.
    pub cc_version: String,
    /// Chaincode package label.
    pub cc_label: String,
    /// Lifecycle sequence number.
    pub cc_sequence: u32,
    /// Chaincode sources.
    pub source_files: Vec<FileBase64>,
    /// Organizations that approve the chaincode.
    pub target_organizations: Vec<Value>,
    /// Orderer TLS CA file.
    pub ca_file: String,
    /// Orderer endpoint.
    pub orderer: String,
    /// Orderer TLS host override.
    pub orderer_tls_hostname_override: String,
    /// Connection timeout in seconds.
    pub conn_timeout: Option<u64>,
    /// Endorsement policy.
    pub signature_policy: Option<String>,
}

/// Chaincode deployment outcome.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricDeployResponse {
    /// Whether every lifecycle step succeeded.
    pub success: bool,
    /// Connector-specific details.
    #[serde(default)]
    pub detail: Value,
}

/// Chaincode transaction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricTransactRequest {
    /// Signing identity.
    pub signing_credential: FabricSigningCredential,
    /// Channel.
    pub channel_name: String,
    /// Chaincode name.
    pub contract_name: String,
    /// Chaincode function.
    pub method_name: String,
    /// Function arguments.
    pub params: Vec<String>,
    /// Submit or evaluate.
    pub invocation_type: InvocationType,
}

/// Chaincode transaction outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricTransactResponse {
    /// Transaction id; empty for evaluations or on failure.
    pub transaction_id: String,
    /// Function output as returned by the chaincode.
    pub function_output: String,
}

/// Fabric ledger client consumed by the Fabric leaf.
#[async_trait]
pub trait FabricConnector: Send + Sync {
    /// Package, install, approve and commit a chaincode.
    async fn deploy_contract(&self, request: FabricDeployRequest) -> Result<FabricDeployResponse, ConnectorError>;

    /// Submit or evaluate a chaincode function.
    async fn transact(&self, request: FabricTransactRequest) -> Result<FabricTransactResponse, ConnectorError>;

    /// Release gateway connections.
    async fn shutdown(&self) -> Result<(), ConnectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_receipt_keeps_node_fields() {
        let raw = json!({
            "transactionHash": "0xabc",
            "contractAddress": "0xdef",
            "blockNumber": 12,
            "status": true
        });
        let receipt: EvmTransactionReceipt = serde_json::from_value(raw).unwrap();
        assert_eq!(receipt.transaction_hash, "0xabc");
        assert_eq!(receipt.contract_address.as_deref(), Some("0xdef"));
        assert_eq!(receipt.extra["blockNumber"], 12);
    }

    #[test]
    fn test_credential_account() {
        let cred = Web3SigningCredential::PrivateKeyHex {
            eth_account: "0x01".to_string(),
            secret: "00".to_string(),
        };
        assert_eq!(cred.eth_account(), Some("0x01"));
        assert!(Web3SigningCredential::None.is_none());
        assert_eq!(serde_json::to_value(&cred).unwrap()["type"], "PRIVATE_KEY_HEX");
    }
}
