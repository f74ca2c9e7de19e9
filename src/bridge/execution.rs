//! Stage-level asset operations with receipt and proof collection.
//!
//! The SATP stage handlers never talk to a leaf directly. They go through a
//! [`BridgeExecutionLayer`], which runs one wrapper operation, insists on a
//! transaction id, then gathers the ledger receipt and the claim proof that
//! end up in the stage message.

use std::fmt;
use std::sync::Arc;

use super::error::BridgeError;
use super::BridgeLeaf;
use crate::telemetry::SpanScope;
use crate::types::asset::Asset;
use crate::types::network::ClaimFormat;
use crate::types::transaction::{TransactionReceipt, TransactionResponse};

const CLASS_NAME: &str = "BridgeExecutionLayer";

/// Wrapper operation performed during a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageOperation {
    /// Register the asset with the wrapper.
    Wrap,
    /// Remove the asset from the wrapper.
    Unwrap,
    /// Escrow.
    Lock,
    /// Release escrow.
    Unlock,
    /// Create on the receiving ledger.
    Mint,
    /// Destroy on the sending ledger.
    Burn,
    /// Hand over to the asset owner.
    Assign,
}

impl StageOperation {
    /// Leaf method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrap => "wrapAsset",
            Self::Unwrap => "unwrapAsset",
            Self::Lock => "lockAsset",
            Self::Unlock => "unlockAsset",
            Self::Mint => "mintAsset",
            Self::Burn => "burnAsset",
            Self::Assign => "assignAsset",
        }
    }
}

impl fmt::Display for StageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runs stage operations on one leaf in one claim format.
#[derive(Clone)]
pub struct BridgeExecutionLayer {
    leaf: Arc<dyn BridgeLeaf>,
    claim_format: ClaimFormat,
}

impl fmt::Debug for BridgeExecutionLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeExecutionLayer")
            .field("leaf", &self.leaf.id())
            .field("claim_format", &self.claim_format)
            .finish()
    }
}

impl BridgeExecutionLayer {
    /// Bind a leaf; fails with `ClaimFormat` if the leaf cannot prove in `claim_format`.
    pub fn new(leaf: Arc<dyn BridgeLeaf>, claim_format: ClaimFormat) -> Result<Self, BridgeError> {
        if !leaf.supports_claim_format(claim_format) {
            return Err(BridgeError::ClaimFormat {
                context: format!("{CLASS_NAME}#constructor"),
                claim_format: claim_format.to_string(),
            });
        }
        Ok(Self { leaf, claim_format })
    }

    /// The bound leaf.
    pub fn leaf(&self) -> &Arc<dyn BridgeLeaf> {
        &self.leaf
    }

    /// Claim format of the produced proofs.
    pub fn claim_format(&self) -> ClaimFormat {
        self.claim_format
    }

    /// Wrap `asset`.
    pub async fn wrap_asset(&self, asset: &Asset) -> Result<TransactionReceipt, BridgeError> {
        self.execute(StageOperation::Wrap, asset).await
    }

    /// Unwrap `asset`.
    pub async fn unwrap_asset(&self, asset: &Asset) -> Result<TransactionReceipt, BridgeError> {
        self.execute(StageOperation::Unwrap, asset).await
    }

    /// Lock the asset's quantity.
    pub async fn lock_asset(&self, asset: &Asset) -> Result<TransactionReceipt, BridgeError> {
        self.execute(StageOperation::Lock, asset).await
    }

    /// Unlock the asset's quantity.
    pub async fn unlock_asset(&self, asset: &Asset) -> Result<TransactionReceipt, BridgeError> {
        self.execute(StageOperation::Unlock, asset).await
    }

    /// Mint the asset's quantity.
    pub async fn mint_asset(&self, asset: &Asset) -> Result<TransactionReceipt, BridgeError> {
        self.execute(StageOperation::Mint, asset).await
    }

    /// Burn the asset's quantity.
    pub async fn burn_asset(&self, asset: &Asset) -> Result<TransactionReceipt, BridgeError> {
        self.execute(StageOperation::Burn, asset).await
    }

    /// Assign the asset's quantity to `asset.owner`.
    pub async fn assign_asset(&self, asset: &Asset) -> Result<TransactionReceipt, BridgeError> {
        self.execute(StageOperation::Assign, asset).await
    }

    /// Run `op` on `asset`, then collect its receipt and proof.
    pub async fn execute(&self, op: StageOperation, asset: &Asset) -> Result<TransactionReceipt, BridgeError> {
        let fn_tag = format!("{CLASS_NAME}#{}", op.as_str());
        SpanScope::start(fn_tag.clone())
            .run(async {
                let response = self.dispatch(op, asset).await?;
                if !response.has_transaction_id() {
                    return Err(BridgeError::TransactionIdUndefined { context: fn_tag.clone() });
                }
                let receipt = self.leaf.get_receipt(&response.transaction_id).await?;
                tracing::info!(
                    leaf_id = self.leaf.id(),
                    operation = %op,
                    asset_id = %asset.id,
                    transaction_id = %response.transaction_id,
                    "stage operation executed"
                );
                let proof = self.leaf.get_proof(asset, self.claim_format).await?;
                Ok(TransactionReceipt { receipt, proof })
            })
            .await
    }

    async fn dispatch(&self, op: StageOperation, asset: &Asset) -> Result<TransactionResponse, BridgeError> {
        let attribute = asset.quantity.to_attribute();
        match op {
            StageOperation::Wrap => self.leaf.wrap_asset(asset).await,
            StageOperation::Unwrap => self.leaf.unwrap_asset(&asset.id).await,
            StageOperation::Lock => self.leaf.lock_asset(&asset.id, &attribute).await,
            StageOperation::Unlock => self.leaf.unlock_asset(&asset.id, &attribute).await,
            StageOperation::Mint => self.leaf.mint_asset(&asset.id, &attribute).await,
            StageOperation::Burn => self.leaf.burn_asset(&asset.id, &attribute).await,
            StageOperation::Assign => self.leaf.assign_asset(&asset.id, &asset.owner, &attribute).await,
        }
    }
}
