//! Asset model shared across ledgers.
//!
//! ## Shape
//!
//! Every asset carries the common fields (`id`, `referenceId`, `type`, `owner`,
//! `contractName`, `network`). The quantity is either a fungible [`Amount`] or a
//! non-fungible [`UniqueTokenId`], and ledger specializations add their own
//! addressing data through [`LedgerDetails`].
//!
//! | Ledger | Extra fields |
//! |--------|--------------|
//! | EVM    | `contractAddress`, `ercTokenStandard` |
//! | Fabric | `mspId`, `channelName` |
//!
//! [`Asset::validate`] enforces that the quantity shape matches the token type
//! and that the ledger details match the network's ledger family.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use super::network::{LedgerFamily, NetworkId};

/// Token type as understood by the wrapper contracts.
///
/// Wire codes follow the SATP message schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    /// Not set.
    Unspecified,
    /// Standard ERC-20 token.
    Erc20,
    /// Standard ERC-721 token.
    Erc721,
    /// Standard ERC-1155 token.
    Erc1155,
    /// Wrapper-managed fungible token.
    NonstandardFungible,
    /// Wrapper-managed non-fungible token.
    NonstandardNonfungible,
}

impl TokenType {
    /// Numeric wire code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::Erc20 => 1,
            Self::Erc721 => 2,
            Self::Erc1155 => 3,
            Self::NonstandardFungible => 4,
            Self::NonstandardNonfungible => 5,
        }
    }

    /// Parse from a numeric wire code.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Erc20),
            2 => Some(Self::Erc721),
            3 => Some(Self::Erc1155),
            4 => Some(Self::NonstandardFungible),
            5 => Some(Self::NonstandardNonfungible),
            _ => None,
        }
    }

    /// Whether assets of this type carry an amount.
    pub fn is_fungible(&self) -> bool {
        matches!(self, Self::Erc20 | Self::NonstandardFungible)
    }

    /// Whether assets of this type carry a unique descriptor.
    pub fn is_non_fungible(&self) -> bool {
        matches!(self, Self::Erc721 | Self::NonstandardNonfungible)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => write!(f, "UNSPECIFIED"),
            Self::Erc20 => write!(f, "ERC20"),
            Self::Erc721 => write!(f, "ERC721"),
            Self::Erc1155 => write!(f, "ERC1155"),
            Self::NonstandardFungible => write!(f, "NONSTANDARD_FUNGIBLE"),
            Self::NonstandardNonfungible => write!(f, "NONSTANDARD_NONFUNGIBLE"),
        }
    }
}

/// ERC standard of the underlying EVM token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErcTokenStandard {
    /// Not set.
    #[default]
    Unspecified,
    /// ERC-20.
    Erc20,
    /// ERC-721.
    Erc721,
}

impl ErcTokenStandard {
    /// Numeric wire code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::Erc20 => 1,
            Self::Erc721 => 2,
        }
    }

    /// Parse from a numeric wire code, defaulting to `Unspecified`.
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Erc20,
            2 => Self::Erc721,
            _ => Self::Unspecified,
        }
    }
}

/// Fungible amount.
///
/// Serialized as a decimal string so values beyond 2^53 survive JSON
/// round trips through other gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u128);

impl Amount {
    /// Zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Create from a raw integer.
    pub fn new(value: u128) -> Self {
        Self(value)
    }

    /// Raw integer value.
    pub fn value(&self) -> u128 {
        self.0
    }

    /// Parse from a decimal string.
    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse::<u128>().ok().map(Self)
    }

    /// Parse from a JSON number or numeric string.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(|v| Self(v as u128)),
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }

    /// Checked subtraction.
    pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Checked addition.
    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value as u128)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Amount::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {value}")))
    }
}

/// Unique descriptor of a non-fungible token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueTokenId(String);

impl UniqueTokenId {
    /// Create a new descriptor.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueTokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Argument of lock/unlock/mint/burn/assign: an amount for fungible assets or
/// a unique descriptor for non-fungible ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetAttribute {
    /// Fungible amount.
    Amount(Amount),
    /// Non-fungible descriptor.
    UniqueDescriptor(UniqueTokenId),
}

impl AssetAttribute {
    /// Contract parameter encoding (decimal string or descriptor).
    pub fn to_param(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl fmt::Display for AssetAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amount(a) => write!(f, "{a}"),
            Self::UniqueDescriptor(d) => write!(f, "{d}"),
        }
    }
}

impl From<Amount> for AssetAttribute {
    fn from(a: Amount) -> Self {
        Self::Amount(a)
    }
}

/// Quantity carried by an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetQuantity {
    /// Fungible amount.
    Amount(Amount),
    /// Non-fungible descriptor.
    UniqueDescriptor(UniqueTokenId),
}

impl AssetQuantity {
    /// The matching operation attribute.
    pub fn to_attribute(&self) -> AssetAttribute {
        match self {
            Self::Amount(a) => AssetAttribute::Amount(*a),
            Self::UniqueDescriptor(d) => AssetAttribute::UniqueDescriptor(d.clone()),
        }
    }
}

/// Ledger-specific addressing data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum LedgerDetails {
    /// No ledger specialization.
    #[default]
    Generic,
    /// EVM contract data.
    #[serde(rename_all = "camelCase")]
    Evm {
        /// Address of the token contract.
        contract_address: String,
        /// ERC standard of the token contract.
        #[serde(default)]
        erc_token_standard: ErcTokenStandard,
    },
    /// Fabric chaincode data.
    #[serde(rename_all = "camelCase")]
    Fabric {
        /// MSP of the owner.
        msp_id: String,
        /// Channel the chaincode lives on.
        channel_name: String,
    },
}

/// An asset as seen by a bridge leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Token id inside the wrapper contract.
    pub id: String,
    /// Reference id used to look up the asset's ontology.
    pub reference_id: String,
    /// Token type.
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Current owner.
    pub owner: String,
    /// Name of the token contract.
    pub contract_name: String,
    /// Network the asset lives on.
    pub network: NetworkId,
    /// Amount or unique descriptor.
    pub quantity: AssetQuantity,
    /// Ledger specialization.
    #[serde(default)]
    pub ledger: LedgerDetails,
}

/// Asset shape invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetShapeError {
    /// Quantity does not match the token type.
    #[error("asset {id}: token type {token_type} does not match quantity shape")]
    QuantityMismatch {
        /// Asset id.
        id: String,
        /// Declared token type.
        token_type: TokenType,
    },
    /// Ledger details do not match the network's ledger family.
    #[error("asset {id}: ledger details do not match network {network}")]
    LedgerMismatch {
        /// Asset id.
        id: String,
        /// Declared network.
        network: NetworkId,
    },
}

impl Asset {
    /// Create a fungible asset.
    pub fn fungible(
        id: impl Into<String>,
        reference_id: impl Into<String>,
        owner: impl Into<String>,
        contract_name: impl Into<String>,
        network: NetworkId,
        amount: Amount,
    ) -> Self {
        Self {
            id: id.into(),
            reference_id: reference_id.into(),
            token_type: TokenType::NonstandardFungible,
            owner: owner.into(),
            contract_name: contract_name.into(),
            network,
            quantity: AssetQuantity::Amount(amount),
            ledger: LedgerDetails::Generic,
        }
    }

    /// Create a non-fungible asset.
    pub fn non_fungible(
        id: impl Into<String>,
        reference_id: impl Into<String>,
        owner: impl Into<String>,
        contract_name: impl Into<String>,
        network: NetworkId,
        descriptor: UniqueTokenId,
    ) -> Self {
        Self {
            id: id.into(),
            reference_id: reference_id.into(),
            token_type: TokenType::NonstandardNonfungible,
            owner: owner.into(),
            contract_name: contract_name.into(),
            network,
            quantity: AssetQuantity::UniqueDescriptor(descriptor),
            ledger: LedgerDetails::Generic,
        }
    }

    /// Attach EVM contract data.
    pub fn with_evm(mut self, contract_address: impl Into<String>, erc: ErcTokenStandard) -> Self {
        self.ledger = LedgerDetails::Evm {
            contract_address: contract_address.into(),
            erc_token_standard: erc,
        };
        self
    }

    /// Attach Fabric chaincode data.
    pub fn with_fabric(mut self, msp_id: impl Into<String>, channel_name: impl Into<String>) -> Self {
        self.ledger = LedgerDetails::Fabric {
            msp_id: msp_id.into(),
            channel_name: channel_name.into(),
        };
        self
    }

    /// Fungible amount, if any.
    pub fn amount(&self) -> Option<Amount> {
        match &self.quantity {
            AssetQuantity::Amount(a) => Some(*a),
            AssetQuantity::UniqueDescriptor(_) => None,
        }
    }

    /// Unique descriptor, if any.
    pub fn unique_descriptor(&self) -> Option<&UniqueTokenId> {
        match &self.quantity {
            AssetQuantity::UniqueDescriptor(d) => Some(d),
            AssetQuantity::Amount(_) => None,
        }
    }

    /// EVM contract address, if this is an EVM asset.
    pub fn contract_address(&self) -> Option<&str> {
        match &self.ledger {
            LedgerDetails::Evm { contract_address, .. } => Some(contract_address),
            _ => None,
        }
    }

    /// Check the shape invariants.
    pub fn validate(&self) -> Result<(), AssetShapeError> {
        let quantity_ok = match &self.quantity {
            AssetQuantity::Amount(_) => !self.token_type.is_non_fungible(),
            AssetQuantity::UniqueDescriptor(_) => !self.token_type.is_fungible(),
        };
        if !quantity_ok {
            return Err(AssetShapeError::QuantityMismatch {
                id: self.id.clone(),
                token_type: self.token_type,
            });
        }

        let ledger_ok = match (&self.ledger, self.network.ledger_type.family()) {
            (LedgerDetails::Generic, _) => true,
            (LedgerDetails::Evm { .. }, LedgerFamily::Evm) => true,
            (LedgerDetails::Fabric { .. }, LedgerFamily::Fabric) => true,
            _ => false,
        };
        if !ledger_ok {
            return Err(AssetShapeError::LedgerMismatch {
                id: self.id.clone(),
                network: self.network.clone(),
            });
        }
        Ok(())
    }
}

/// Raw token as returned by the EVM wrapper's `getToken`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Name of the token contract.
    pub contract_name: String,
    /// Token id.
    pub token_id: String,
    /// Ontology reference id.
    #[serde(default)]
    pub reference_id: String,
    /// Token contract address.
    #[serde(default)]
    pub contract_address: String,
    /// Token type code (number or numeric string on the wire).
    pub token_type: Value,
    /// Owner.
    pub owner: String,
    /// Amount (fungible) or descriptor (non-fungible).
    pub amount: Value,
    /// ERC standard code.
    #[serde(default)]
    pub erc_token_standard: Option<Value>,
}

/// Raw token as stored by the Fabric wrapper chaincode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricToken {
    /// Token type code.
    pub token_type: Value,
    /// Token id.
    pub token_id: String,
    /// Ontology reference id.
    #[serde(default)]
    pub reference_id: String,
    /// Owner.
    pub owner: String,
    /// MSP of the owner.
    pub msp_id: String,
    /// Channel name.
    pub channel_name: String,
    /// Chaincode name of the token contract.
    pub contract_name: String,
    /// Amount held in the wrapper.
    pub amount: Value,
}

/// Parse a numeric wire code carried as a JSON number or numeric string.
pub fn code_from_json(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
