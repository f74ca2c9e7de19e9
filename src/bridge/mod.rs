//! Bridge leaves: per-ledger drivers of the SATP wrapper contract.
//!
//! ## Purpose
//!
//! A leaf owns one ledger connector and one wrapper contract. Every asset
//! movement of a transfer (wrap, lock, mint, burn, assign, unwrap) is a call
//! on the wrapper, and the wrapper only performs the token-contract calls the
//! asset's ontology allows.
//!
//! ## Lifecycle
//!
//! ```text
//! NOT_DEPLOYED --deploy_contracts()--> DEPLOYED
//! ```
//!
//! The transition is one-way. A second deploy fails with
//! `WrapperContractAlreadyCreated`, and every asset operation requires
//! `DEPLOYED`.
//!
//! ## Leaves
//!
//! | Leaf | Ledgers | Bungee strategy |
//! |------|---------|-----------------|
//! | [`BesuLeaf`] | `BESU_1X`, `BESU_2X` | Besu |
//! | [`EthereumLeaf`] | `ETHEREUM` | Ethereum |
//! | [`FabricLeaf`] | `FABRIC_2` | Fabric |

pub mod besu;
pub mod bungee;
pub mod connector;
pub mod error;
pub mod ethereum;
pub mod evm;
pub mod execution;
pub mod fabric;
pub mod manager;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::asset::{Asset, AssetAttribute, TokenType};
use crate::types::network::{ClaimFormat, NetworkId};
use crate::types::transaction::{InvocationType, TransactionResponse};

pub use besu::{Besu, BesuLeaf, BesuLeafOptions};
pub use bungee::{BungeeFactory, BungeeHermes, BungeeStrategy, GeneratedView, NetworkDetails};
pub use connector::{
    ConnectorError, EvmConnector, FabricConnector, FabricSigningCredential, Web3SigningCredential,
};
pub use error::BridgeError;
pub use ethereum::{Ethereum, EthereumLeaf, EthereumLeafOptions};
pub use evm::{EvmFlavor, EvmLeaf, EvmLeafOptions, GasConfig};
pub use execution::{BridgeExecutionLayer, StageOperation};
pub use fabric::{FabricDeployOptions, FabricLeaf, FabricLeafOptions};
pub use manager::{BridgeManager, LeafOptions};

/// Operation set every ledger leaf implements.
///
/// Fungible operations take an [`AssetAttribute::Amount`], non-fungible ones
/// an [`AssetAttribute::UniqueDescriptor`].
#[async_trait]
pub trait BridgeLeaf: Send + Sync {
    /// Leaf id.
    fn id(&self) -> &str;

    /// Network this leaf is connected to.
    fn network_identification(&self) -> &NetworkId;

    /// Claim formats the leaf can prove in (always includes `DEFAULT`).
    fn supported_claim_formats(&self) -> &[ClaimFormat];

    /// Whether `claim_format` is supported.
    fn supports_claim_format(&self, claim_format: ClaimFormat) -> bool {
        self.supported_claim_formats().contains(&claim_format)
    }

    /// Deploy the wrapper contract if it is not deployed yet.
    async fn deploy_contracts(&self) -> Result<(), BridgeError>;

    /// Wrapper contract identifier (address or chaincode name) for a token type.
    fn get_wrapper_contract(&self, token_type: TokenType) -> Result<String, BridgeError>;

    /// Account the asset owner must approve for a token type.
    fn get_approve_address(&self, token_type: TokenType) -> Result<String, BridgeError>;

    /// Register an asset with the wrapper, with its ontology interactions.
    async fn wrap_asset(&self, asset: &Asset) -> Result<TransactionResponse, BridgeError>;

    /// Remove an asset from the wrapper.
    async fn unwrap_asset(&self, asset_id: &str) -> Result<TransactionResponse, BridgeError>;

    /// Escrow into the wrapper.
    async fn lock_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError>;

    /// Release escrow back to the owner.
    async fn unlock_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError>;

    /// Create into the wrapper.
    async fn mint_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError>;

    /// Destroy from the wrapper.
    async fn burn_asset(&self, asset_id: &str, attribute: &AssetAttribute) -> Result<TransactionResponse, BridgeError>;

    /// Transfer from the wrapper to `to`.
    async fn assign_asset(
        &self,
        asset_id: &str,
        to: &str,
        attribute: &AssetAttribute,
    ) -> Result<TransactionResponse, BridgeError>;

    /// Ids of every wrapped asset.
    async fn get_assets(&self) -> Result<Vec<String>, BridgeError>;

    /// A wrapped asset in the common shape.
    async fn get_asset(&self, asset_id: &str) -> Result<Asset, BridgeError>;

    /// Call an arbitrary wrapper method.
    async fn run_transaction(
        &self,
        method_name: &str,
        params: Vec<Value>,
        invocation_type: InvocationType,
    ) -> Result<TransactionResponse, BridgeError>;

    /// Raw transaction or receipt for audit.
    async fn get_receipt(&self, transaction_id: &str) -> Result<String, BridgeError>;

    /// Bungee view of an asset, stable-stringified.
    async fn get_view(&self, asset_id: &str) -> Result<String, BridgeError>;

    /// Claim evidence for an asset.
    async fn get_proof(&self, asset: &Asset, claim_format: ClaimFormat) -> Result<String, BridgeError>;

    /// Release connector resources.
    async fn shutdown_connection(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}

/// Shared `getProof` dispatch.
pub(crate) async fn proof_for<L: BridgeLeaf + ?Sized>(
    leaf: &L,
    fn_tag: &str,
    has_bungee: bool,
    asset: &Asset,
    claim_format: ClaimFormat,
) -> Result<String, BridgeError> {
    tracing::debug!(leaf_id = leaf.id(), asset_id = %asset.id, %claim_format, "getting proof");
    match claim_format {
        ClaimFormat::Default => Ok(String::new()),
        ClaimFormat::Bungee if !has_bungee => Err(BridgeError::Bungee {
            context: fn_tag.to_string(),
        }),
        ClaimFormat::Bungee => leaf.get_view(&asset.id).await,
        ClaimFormat::Unknown(_) => Err(BridgeError::Proof {
            context: fn_tag.to_string(),
            claim_format: claim_format.to_string(),
        }),
    }
}

/// Claim formats from options: the given ones plus `DEFAULT`.
pub(crate) fn with_default_claim(mut formats: Vec<ClaimFormat>) -> Vec<ClaimFormat> {
    if !formats.contains(&ClaimFormat::Default) {
        formats.push(ClaimFormat::Default);
    }
    formats
}

/// Generated leaf id.
pub(crate) fn create_leaf_id(class_name: &str) -> String {
    format!("{}-{}", class_name, uuid::Uuid::new_v4())
}
