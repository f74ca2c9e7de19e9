//! Hyperledger Besu leaf.

use super::bungee::BungeeStrategy;
use super::evm::{EvmFlavor, EvmLeaf, EvmLeafOptions, ReceiptSource};
use crate::types::network::{LedgerType, NetworkId};

/// Besu flavor of the EVM leaf.
#[derive(Debug, Clone, Copy, Default)]
pub struct Besu;

impl EvmFlavor for Besu {
    const CLASS_NAME: &'static str = "BesuLeaf";
    const STRATEGY: BungeeStrategy = BungeeStrategy::Besu;
    const RECEIPT_SOURCE: ReceiptSource = ReceiptSource::ConnectorTransaction;

    fn accepts(ledger_type: LedgerType) -> bool {
        matches!(ledger_type, LedgerType::Besu1X | LedgerType::Besu2X)
    }

    // Besu ontologies are registered once, under BESU_2X, for both versions.
    fn ontology_ledger(_network: &NetworkId) -> LedgerType {
        LedgerType::Besu2X
    }
}

/// Bridge leaf for Besu networks.
pub type BesuLeaf = EvmLeaf<Besu>;

/// Construction options for [`BesuLeaf`].
pub type BesuLeafOptions = EvmLeafOptions;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::evm::tests::{make_credential, make_manager, RecordingConnector};
    use crate::bridge::BridgeLeaf;
    use crate::types::asset::{Amount, AssetAttribute};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_invocations_pass_contract_name() {
        let connector = Arc::new(RecordingConnector::default());
        let mut options = BesuLeafOptions::new(
            NetworkId::new("besu", LedgerType::Besu1X),
            connector.clone(),
            make_credential(),
        );
        options.wrapper_contract_name = Some("satp-wrapper".to_string());
        options.wrapper_contract_address = Some("0xwrapper".to_string());
        let leaf = BesuLeaf::new(options, make_manager()).unwrap();

        let amount = AssetAttribute::Amount(Amount::new(10));
        leaf.lock_asset("asset-1", &amount).await.unwrap();
        leaf.assign_asset("asset-1", "0xreceiver", &amount).await.unwrap();

        let invocations = connector.invocations.lock();
        assert_eq!(invocations.len(), 2);
        for request in invocations.iter() {
            assert_eq!(request.contract_name, "satp-wrapper");
            assert_eq!(request.contract_address, "0xwrapper");
        }
        assert_eq!(invocations[0].method_name, "lock");
        assert_eq!(invocations[0].params[1], serde_json::json!("10"));
    }

    #[tokio::test]
    async fn test_receipt_uses_connector_transaction() {
        let connector = Arc::new(RecordingConnector::default());
        let leaf = BesuLeaf::new(
            BesuLeafOptions::new(NetworkId::new("besu", LedgerType::Besu2X), connector.clone(), make_credential()),
            make_manager(),
        )
        .unwrap();
        let receipt = leaf.get_receipt("0xabc").await.unwrap();
        assert_eq!(receipt, r#"{"hash":"0xabc"}"#);
        assert_eq!(connector.raw_calls.lock().as_slice(), ["connector:0xabc".to_string()]);
    }
}
