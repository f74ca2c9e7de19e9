//! Ledger-agnostic value types shared by the ontology, bridge and session layers.

pub mod asset;
pub mod network;
pub mod transaction;

pub use asset::{
    Amount, Asset, AssetAttribute, AssetQuantity, AssetShapeError, ErcTokenStandard, FabricToken,
    LedgerDetails, TokenResponse, TokenType, UniqueTokenId,
};
pub use network::{ClaimFormat, LedgerFamily, LedgerType, NetworkId};
pub use transaction::{InvocationType, TransactionReceipt, TransactionResponse};
