//! Bungee view generation seam.
//!
//! A leaf that supports the `BUNGEE` claim format asks a Bungee instance for
//! a snapshot of the wrapper's state for one asset, then for a signed view
//! over that snapshot. The view, stable-stringified, is the proof.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::connector::ConnectorError;

/// Upper bound of the view time window (`Number.MAX_SAFE_INTEGER`).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Ledger-specific snapshot strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BungeeStrategy {
    /// Besu state reader.
    Besu,
    /// Ethereum state reader.
    Ethereum,
    /// Fabric state reader.
    Fabric,
}

/// Where a snapshot reads wrapper state from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDetails {
    /// Wrapper contract name.
    pub contract_name: String,
    /// Wrapper contract address (EVM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    /// Channel (Fabric).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    /// Leaf id of the requester.
    pub participant: String,
}

/// Output of `generateView`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratedView {
    /// The view, absent when the snapshot held no states.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<Value>,
    /// Signature of the view by the Bungee key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Snapshot and view generator.
#[async_trait]
pub trait BungeeHermes: Send + Sync {
    /// Capture the state of `asset_ids` on `network_id`.
    async fn generate_snapshot(
        &self,
        asset_ids: Vec<String>,
        network_id: &str,
        details: &NetworkDetails,
    ) -> Result<Value, ConnectorError>;

    /// Build a view over a snapshot for the time window `[ti, tf]`.
    fn generate_view(&self, snapshot: &Value, ti: &str, tf: &str, view_id: Option<&str>) -> GeneratedView;
}

/// Creates Bungee instances for leaves that enable the `BUNGEE` format.
pub trait BungeeFactory: Send + Sync {
    /// Create an instance with `strategy` registered for `network_id`.
    fn create(&self, network_id: &str, strategy: BungeeStrategy) -> Arc<dyn BungeeHermes>;
}
