//! Ledger and network identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger technology a network runs.
///
/// Only a subset has bridge leaves; the others exist so that ontology
/// documents naming them fail with a precise "ledger not supported" error
/// rather than a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LedgerType {
    /// Hyperledger Besu 1.x.
    #[serde(rename = "BESU_1X")]
    Besu1X,
    /// Hyperledger Besu 2.x.
    #[serde(rename = "BESU_2X")]
    Besu2X,
    /// Ethereum (geth and compatible).
    #[serde(rename = "ETHEREUM")]
    Ethereum,
    /// Hyperledger Fabric 2.x.
    #[serde(rename = "FABRIC_2")]
    Fabric2,
    /// Corda 4.x.
    #[serde(rename = "CORDA_4X")]
    Corda4X,
    /// Quorum 2.x.
    #[serde(rename = "QUORUM_2X")]
    Quorum2X,
    /// Hyperledger Sawtooth 1.x.
    #[serde(rename = "SAWTOOTH_1X")]
    Sawtooth1X,
}

/// Ledger family used for exhaustive dispatch over encodings and leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerFamily {
    /// EVM chains (Besu, Ethereum).
    Evm,
    /// Hyperledger Fabric.
    Fabric,
    /// No bridge support.
    Unsupported,
}

impl LedgerType {
    /// Parse from the wire string (e.g. `BESU_2X`).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BESU_1X" => Some(Self::Besu1X),
            "BESU_2X" => Some(Self::Besu2X),
            "ETHEREUM" => Some(Self::Ethereum),
            "FABRIC_2" => Some(Self::Fabric2),
            "CORDA_4X" => Some(Self::Corda4X),
            "QUORUM_2X" => Some(Self::Quorum2X),
            "SAWTOOTH_1X" => Some(Self::Sawtooth1X),
            _ => None,
        }
    }

    /// Wire string for this ledger type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Besu1X => "BESU_1X",
            Self::Besu2X => "BESU_2X",
            Self::Ethereum => "ETHEREUM",
            Self::Fabric2 => "FABRIC_2",
            Self::Corda4X => "CORDA_4X",
            Self::Quorum2X => "QUORUM_2X",
            Self::Sawtooth1X => "SAWTOOTH_1X",
        }
    }

    /// The ledger family this type belongs to.
    pub fn family(&self) -> LedgerFamily {
        match self {
            Self::Besu1X | Self::Besu2X | Self::Ethereum => LedgerFamily::Evm,
            Self::Fabric2 => LedgerFamily::Fabric,
            Self::Corda4X | Self::Quorum2X | Self::Sawtooth1X => LedgerFamily::Unsupported,
        }
    }

    /// Whether this ledger runs the EVM.
    pub fn is_evm(&self) -> bool {
        self.family() == LedgerFamily::Evm
    }
}

impl fmt::Display for LedgerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identification of a network a gateway is connected to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkId {
    /// Operator-assigned network id (e.g. `BesuLedgerTestNetwork`).
    pub id: String,
    /// Ledger technology of the network.
    pub ledger_type: LedgerType,
}

impl NetworkId {
    /// Create a new network identification.
    pub fn new(id: impl Into<String>, ledger_type: LedgerType) -> Self {
        Self {
            id: id.into(),
            ledger_type,
        }
    }

    /// Stable string key used to group leaves by network.
    pub fn key(&self) -> String {
        crate::canonical::stable_stringify(self)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ledger_type, self.id)
    }
}

/// Evidence format accompanying a bridge operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimFormat {
    /// No evidence.
    Default,
    /// Bungee snapshot/view evidence.
    Bungee,
    /// A format this gateway does not understand (carries the wire value).
    #[serde(untagged)]
    Unknown(i32),
}

impl fmt::Display for ClaimFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "DEFAULT"),
            Self::Bungee => write!(f, "BUNGEE"),
            Self::Unknown(v) => write!(f, "UNKNOWN({v})"),
        }
    }
}
